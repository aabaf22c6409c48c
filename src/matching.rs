// =============================================================================
// matching.rs — THE MATCHMAKER
// =============================================================================
//
// Given one cargo, which ships? Given one ship, which cargoes?
//
// The service fetches the anchor record, asks the store for counterparts that
// could possibly pass the tonnage gate (nobody wants to haversine a Capesize
// against a 3,000 MT parcel), scores the survivors on every core rayon can
// find, ranks them, and writes the lot back as SUGGESTED matches.
// =============================================================================

use rayon::prelude::*;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{MatchError, Result};
use crate::models::{
    CargoRecord, MatchCandidate, MatchEvent, MatchStatus, PersistedMatch, VesselRecord,
};
use crate::ranker::rank;
use crate::scorer::{evaluate_with, CompatibilityEstimator, Evaluation, MIN_MATCH_SCORE};
use crate::store::{AcceptOutcome, CargoFilter, MatchStore, VesselFilter};

/// A cargo below half the ship's deadweight is rejected by the scorer anyway.
const MIN_UTILIZATION: f64 = 0.5;

pub const DEFAULT_BATCH_CAP: usize = 20;
pub const DEFAULT_LIMIT: usize = 10;

/// A ranked candidate together with the row it was persisted as.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RankedMatch {
    pub match_id: Uuid,
    pub status: MatchStatus,
    pub candidate: MatchCandidate,
}

impl RankedMatch {
    pub fn to_event(&self) -> MatchEvent {
        MatchEvent {
            match_id: self.match_id,
            cargo_id: self.candidate.cargo_id,
            vessel_id: self.candidate.vessel_id,
            score: self.candidate.score,
            recommendation: self.candidate.recommendation,
            reasons: self.candidate.reasons.clone(),
            emitted_at: chrono::Utc::now(),
        }
    }
}

pub struct MatchService {
    store: Arc<dyn MatchStore>,
    estimator: Option<Arc<dyn CompatibilityEstimator>>,
    min_score: u8,
    batch_cap: usize,
    default_limit: usize,
}

impl MatchService {
    pub fn new(store: Arc<dyn MatchStore>) -> Self {
        Self {
            store,
            estimator: None,
            min_score: MIN_MATCH_SCORE,
            batch_cap: DEFAULT_BATCH_CAP,
            default_limit: DEFAULT_LIMIT,
        }
    }

    pub fn with_min_score(mut self, min_score: u8) -> Self {
        self.min_score = min_score.min(100);
        self
    }

    pub fn with_batch_cap(mut self, batch_cap: usize) -> Self {
        self.batch_cap = batch_cap;
        self
    }

    pub fn with_default_limit(mut self, limit: usize) -> Self {
        self.default_limit = limit.max(1);
        self
    }

    pub fn with_estimator(mut self, estimator: Arc<dyn CompatibilityEstimator>) -> Self {
        self.estimator = Some(estimator);
        self
    }

    pub fn store(&self) -> &Arc<dyn MatchStore> {
        &self.store
    }

    /// Rank vessels for one cargo. `limit == 0` means the configured default.
    pub fn compute_matches_for_cargo(
        &self,
        cargo_id: Uuid,
        limit: usize,
    ) -> Result<Vec<RankedMatch>> {
        let cargo = self
            .store
            .get_cargo(cargo_id)
            .ok_or(MatchError::CargoNotFound(cargo_id))?;
        let qty = cargo.quantity.value;
        let vessels = self.store.list_vessels(&VesselFilter {
            min_dwt: Some(qty),
            max_dwt: Some(qty / MIN_UTILIZATION),
            limit: self.batch_cap,
        });
        debug!(cargo_id = %cargo_id, vessels = vessels.len(), "Scoring cargo against fleet");

        let candidates: Vec<MatchCandidate> =
            vessels.par_iter().filter_map(|vessel| self.score_pair(&cargo, vessel)).collect();
        Ok(self.persist(candidates, limit))
    }

    /// Rank cargoes for one vessel. `limit == 0` means the configured default.
    pub fn compute_matches_for_vessel(
        &self,
        vessel_id: Uuid,
        limit: usize,
    ) -> Result<Vec<RankedMatch>> {
        let vessel = self
            .store
            .get_vessel(vessel_id)
            .ok_or(MatchError::VesselNotFound(vessel_id))?;
        let cargos = self.store.list_cargos(&CargoFilter {
            min_quantity: Some(vessel.dwt * MIN_UTILIZATION),
            max_quantity: Some(vessel.dwt),
            limit: self.batch_cap,
        });
        debug!(vessel_id = %vessel_id, cargos = cargos.len(), "Scoring vessel against order book");

        let candidates: Vec<MatchCandidate> =
            cargos.par_iter().filter_map(|cargo| self.score_pair(cargo, &vessel)).collect();
        Ok(self.persist(candidates, limit))
    }

    pub fn accept_match(&self, match_id: Uuid, decided_by: &str) -> Result<AcceptOutcome> {
        self.store.accept_match(match_id, decided_by)
    }

    pub fn reject_match(&self, match_id: Uuid, decided_by: &str) -> Result<PersistedMatch> {
        self.store.reject_match(match_id, decided_by)
    }

    fn score_pair(&self, cargo: &CargoRecord, vessel: &VesselRecord) -> Option<MatchCandidate> {
        match evaluate_with(cargo, vessel, self.estimator.as_deref()) {
            Evaluation::Scored(scored) => Some(scored.into_candidate(cargo, vessel)),
            Evaluation::Rejected { .. } => None,
        }
    }

    /// Every survivor is written back; only the top `limit` are returned.
    fn persist(&self, candidates: Vec<MatchCandidate>, limit: usize) -> Vec<RankedMatch> {
        let scored = candidates.len();
        let limit = if limit == 0 { self.default_limit } else { limit };

        let mut ranked: Vec<RankedMatch> = rank(candidates, self.min_score, usize::MAX)
            .into_iter()
            .map(|candidate| {
                let record = self.store.upsert_match(
                    candidate.cargo_id,
                    candidate.vessel_id,
                    candidate.score,
                    candidate.reasons.clone(),
                );
                RankedMatch { match_id: record.id, status: record.status, candidate }
            })
            .collect();

        info!(scored = scored, persisted = ranked.len(), limit = limit, "Matches computed");
        ranked.truncate(limit);
        ranked
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Laycan, Quantity, QuantityUnit};
    use crate::store::InMemoryMatchStore;
    use chrono::NaiveDate;

    fn wheat_cargo() -> CargoRecord {
        let d = |day| NaiveDate::from_ymd_opt(2025, 3, day).unwrap();
        let qty = Quantity::new(25_000.0, QuantityUnit::Mt).unwrap();
        CargoRecord::new("wheat", qty, "Constanta", "Alexandria")
            .unwrap()
            .with_laycan(Laycan::new(d(10), d(15)).unwrap())
    }

    fn vessel(name: &str, dwt: f64, port: &str) -> VesselRecord {
        VesselRecord::new(name, dwt, port).unwrap()
    }

    /// Returns (service, cargo id, [snug, roomy]) vessel ids.
    fn fixture() -> (MatchService, Uuid, [Uuid; 2]) {
        let store = Arc::new(InMemoryMatchStore::new());
        let cargo_id = store.insert_cargo(wheat_cargo());
        let snug = store.insert_vessel(vessel("MV Snug", 27_000.0, "Varna"));
        let roomy = store.insert_vessel(vessel("MV Roomy", 33_000.0, "Varna"));
        store.insert_vessel(vessel("MV Tiny", 20_000.0, "Varna"));
        store.insert_vessel(vessel("MV Cape", 170_000.0, "Varna"));
        store.insert_vessel(vessel("MV Faraway", 27_000.0, "Alexandria"));
        (MatchService::new(store), cargo_id, [snug, roomy])
    }

    #[test]
    fn test_cargo_matches_ranked_and_persisted() {
        let (service, cargo_id, [snug, roomy]) = fixture();
        let ranked = service.compute_matches_for_cargo(cargo_id, 0).unwrap();

        let vessels: Vec<Uuid> = ranked.iter().map(|m| m.candidate.vessel_id).collect();
        assert_eq!(vessels, vec![snug, roomy]);
        assert_eq!(ranked[0].candidate.score, 70);
        assert_eq!(ranked[1].candidate.score, 60);
        assert!(ranked.iter().all(|m| m.status == MatchStatus::Suggested));
        assert_eq!(service.store().matches_for_cargo(cargo_id).len(), 2);
    }

    #[test]
    fn test_recompute_does_not_duplicate() {
        let (service, cargo_id, _) = fixture();
        let first = service.compute_matches_for_cargo(cargo_id, 10).unwrap();
        let second = service.compute_matches_for_cargo(cargo_id, 10).unwrap();
        assert_eq!(first[0].match_id, second[0].match_id);
        assert_eq!(service.store().matches_for_cargo(cargo_id).len(), 2);
    }

    #[test]
    fn test_limit_truncates_but_everything_is_stored() {
        let (service, cargo_id, [snug, _]) = fixture();
        let ranked = service.compute_matches_for_cargo(cargo_id, 1).unwrap();
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].candidate.vessel_id, snug);
        assert_eq!(service.store().matches_for_cargo(cargo_id).len(), 2);
    }

    #[test]
    fn test_vessel_side_finds_the_cargo() {
        let (service, cargo_id, [snug, _]) = fixture();
        let ranked = service.compute_matches_for_vessel(snug, 5).unwrap();
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].candidate.cargo_id, cargo_id);
    }

    #[test]
    fn test_unknown_anchor_is_not_found() {
        let (service, _, _) = fixture();
        let ghost = Uuid::new_v4();
        assert_eq!(
            service.compute_matches_for_cargo(ghost, 5),
            Err(MatchError::CargoNotFound(ghost))
        );
        assert_eq!(
            service.compute_matches_for_vessel(ghost, 5),
            Err(MatchError::VesselNotFound(ghost))
        );
    }

    #[test]
    fn test_accept_through_the_service() {
        let (service, cargo_id, _) = fixture();
        let ranked = service.compute_matches_for_cargo(cargo_id, 10).unwrap();
        let outcome = service.accept_match(ranked[0].match_id, "ops").unwrap();
        assert_eq!(outcome.auto_rejected, vec![ranked[1].match_id]);
    }

    struct Pessimist;

    impl CompatibilityEstimator for Pessimist {
        fn estimate(&self, _: &CargoRecord, _: &VesselRecord) -> Option<u8> {
            Some(0)
        }
    }

    #[test]
    fn test_estimator_can_sink_a_pair_below_threshold() {
        let (service, cargo_id, _) = fixture();
        let service = service.with_estimator(Arc::new(Pessimist));
        // 70 blended with 0 is 35, 60 with 0 is 30.
        assert!(service.compute_matches_for_cargo(cargo_id, 10).unwrap().is_empty());
    }
}
