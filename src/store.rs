// =============================================================================
// store.rs — WHERE MATCHES GO TO BE JUDGED
// =============================================================================
//
// The persistence boundary. The engine only ever talks to `MatchStore`; what
// sits behind it (Postgres, Redis, a spreadsheet someone refuses to retire)
// is somebody else's problem.
//
// `InMemoryMatchStore` is the one we ship. One parking_lot Mutex guards the
// lot: records, matches and the pair index. Accepting a match and rejecting
// its siblings happens under that single lock, so two brokers clicking
// "accept" on the same cargo at the same moment cannot both win.
// =============================================================================

use chrono::Utc;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{MatchError, Result};
use crate::models::{CargoRecord, MatchStatus, PersistedMatch, VesselRecord};
use crate::ranker::transition;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct VesselFilter {
    pub min_dwt: Option<f64>,
    pub max_dwt: Option<f64>,
    /// 0 means unlimited.
    pub limit: usize,
}

impl VesselFilter {
    fn admits(&self, v: &VesselRecord) -> bool {
        self.min_dwt.map_or(true, |min| v.dwt >= min)
            && self.max_dwt.map_or(true, |max| v.dwt <= max)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CargoFilter {
    pub min_quantity: Option<f64>,
    pub max_quantity: Option<f64>,
    /// 0 means unlimited.
    pub limit: usize,
}

impl CargoFilter {
    fn admits(&self, c: &CargoRecord) -> bool {
        let q = c.quantity.value;
        self.min_quantity.map_or(true, |min| q >= min)
            && self.max_quantity.map_or(true, |max| q <= max)
    }
}

/// What happened when a match was accepted.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AcceptOutcome {
    pub accepted: PersistedMatch,
    /// Sibling suggestions for the same cargo that were rejected with it.
    pub auto_rejected: Vec<Uuid>,
}

pub trait MatchStore: Send + Sync {
    fn get_cargo(&self, id: Uuid) -> Option<CargoRecord>;
    fn get_vessel(&self, id: Uuid) -> Option<VesselRecord>;
    fn list_vessels(&self, filter: &VesselFilter) -> Vec<VesselRecord>;
    fn list_cargos(&self, filter: &CargoFilter) -> Vec<CargoRecord>;
    fn insert_cargo(&self, cargo: CargoRecord) -> Uuid;
    fn insert_vessel(&self, vessel: VesselRecord) -> Uuid;

    /// Create a SUGGESTED match for the pair, or refresh score and reasons
    /// of the existing one. Never creates a second row for a pair.
    fn upsert_match(
        &self,
        cargo_id: Uuid,
        vessel_id: Uuid,
        score: u8,
        reasons: Vec<String>,
    ) -> PersistedMatch;

    /// Accept one match and reject every other SUGGESTED match for the same
    /// cargo, atomically.
    fn accept_match(&self, match_id: Uuid, decided_by: &str) -> Result<AcceptOutcome>;
    fn reject_match(&self, match_id: Uuid, decided_by: &str) -> Result<PersistedMatch>;
    fn get_match(&self, match_id: Uuid) -> Option<PersistedMatch>;
    /// Best score first.
    fn matches_for_cargo(&self, cargo_id: Uuid) -> Vec<PersistedMatch>;
}

#[derive(Default)]
struct StoreState {
    cargos: HashMap<Uuid, CargoRecord>,
    cargo_order: Vec<Uuid>,
    vessels: HashMap<Uuid, VesselRecord>,
    vessel_order: Vec<Uuid>,
    matches: HashMap<Uuid, PersistedMatch>,
    by_pair: HashMap<(Uuid, Uuid), Uuid>,
}

#[derive(Default)]
pub struct InMemoryMatchStore {
    state: Mutex<StoreState>,
}

impl InMemoryMatchStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn counts(&self) -> (usize, usize, usize) {
        let state = self.state.lock();
        (state.cargos.len(), state.vessels.len(), state.matches.len())
    }
}

fn take_limit(limit: usize) -> usize {
    if limit == 0 {
        usize::MAX
    } else {
        limit
    }
}

impl MatchStore for InMemoryMatchStore {
    fn get_cargo(&self, id: Uuid) -> Option<CargoRecord> {
        self.state.lock().cargos.get(&id).cloned()
    }

    fn get_vessel(&self, id: Uuid) -> Option<VesselRecord> {
        self.state.lock().vessels.get(&id).cloned()
    }

    fn list_vessels(&self, filter: &VesselFilter) -> Vec<VesselRecord> {
        let state = self.state.lock();
        state
            .vessel_order
            .iter()
            .filter_map(|id| state.vessels.get(id))
            .filter(|v| filter.admits(v))
            .take(take_limit(filter.limit))
            .cloned()
            .collect()
    }

    fn list_cargos(&self, filter: &CargoFilter) -> Vec<CargoRecord> {
        let state = self.state.lock();
        state
            .cargo_order
            .iter()
            .filter_map(|id| state.cargos.get(id))
            .filter(|c| filter.admits(c))
            .take(take_limit(filter.limit))
            .cloned()
            .collect()
    }

    fn insert_cargo(&self, cargo: CargoRecord) -> Uuid {
        let id = cargo.id;
        let mut state = self.state.lock();
        if state.cargos.insert(id, cargo).is_none() {
            state.cargo_order.push(id);
        }
        debug!(cargo_id = %id, "Cargo stored");
        id
    }

    fn insert_vessel(&self, vessel: VesselRecord) -> Uuid {
        let id = vessel.id;
        let mut state = self.state.lock();
        if state.vessels.insert(id, vessel).is_none() {
            state.vessel_order.push(id);
        }
        debug!(vessel_id = %id, "Vessel stored");
        id
    }

    fn upsert_match(
        &self,
        cargo_id: Uuid,
        vessel_id: Uuid,
        score: u8,
        reasons: Vec<String>,
    ) -> PersistedMatch {
        let now = Utc::now();
        let mut state = self.state.lock();

        if let Some(existing_id) = state.by_pair.get(&(cargo_id, vessel_id)).copied() {
            if let Some(existing) = state.matches.get_mut(&existing_id) {
                existing.score = score;
                existing.reasons = reasons;
                existing.updated_at = now;
                debug!(match_id = %existing_id, score = score, "Match refreshed");
                return existing.clone();
            }
        }

        let record = PersistedMatch {
            id: Uuid::new_v4(),
            cargo_id,
            vessel_id,
            score,
            reasons,
            status: MatchStatus::Suggested,
            decided_by: None,
            decided_at: None,
            created_at: now,
            updated_at: now,
        };
        state.by_pair.insert((cargo_id, vessel_id), record.id);
        state.matches.insert(record.id, record.clone());
        debug!(match_id = %record.id, score = score, "Match suggested");
        record
    }

    fn accept_match(&self, match_id: Uuid, decided_by: &str) -> Result<AcceptOutcome> {
        let now = Utc::now();
        let mut state = self.state.lock();

        let target = state.matches.get(&match_id).ok_or(MatchError::MatchNotFound(match_id))?;
        if target.status != MatchStatus::Suggested {
            return Err(MatchError::AlreadyDecided { id: match_id, status: target.status });
        }
        let cargo_id = target.cargo_id;
        if let Some(fixed) = state
            .matches
            .values()
            .find(|m| {
                m.cargo_id == cargo_id && m.id != match_id && m.status == MatchStatus::Accepted
            })
        {
            return Err(MatchError::CargoAlreadyFixed { cargo_id, accepted: fixed.id });
        }

        let accepted = {
            let target = state
                .matches
                .get_mut(&match_id)
                .ok_or(MatchError::MatchNotFound(match_id))?;
            transition(target, MatchStatus::Accepted, Some(decided_by), now)?;
            target.clone()
        };

        let mut auto_rejected = Vec::new();
        for sibling in state.matches.values_mut().filter(|m| {
            m.cargo_id == cargo_id && m.id != match_id && m.status == MatchStatus::Suggested
        }) {
            transition(sibling, MatchStatus::Rejected, Some(decided_by), now)?;
            auto_rejected.push(sibling.id);
        }

        info!(
            match_id = %match_id,
            cargo_id = %cargo_id,
            decided_by = decided_by,
            auto_rejected = auto_rejected.len(),
            "Match accepted"
        );
        Ok(AcceptOutcome { accepted, auto_rejected })
    }

    fn reject_match(&self, match_id: Uuid, decided_by: &str) -> Result<PersistedMatch> {
        let mut state = self.state.lock();
        let target = state.matches.get_mut(&match_id).ok_or(MatchError::MatchNotFound(match_id))?;
        transition(target, MatchStatus::Rejected, Some(decided_by), Utc::now())?;
        info!(match_id = %match_id, decided_by = decided_by, "Match rejected");
        Ok(target.clone())
    }

    fn get_match(&self, match_id: Uuid) -> Option<PersistedMatch> {
        self.state.lock().matches.get(&match_id).cloned()
    }

    fn matches_for_cargo(&self, cargo_id: Uuid) -> Vec<PersistedMatch> {
        let state = self.state.lock();
        let mut found: Vec<PersistedMatch> =
            state.matches.values().filter(|m| m.cargo_id == cargo_id).cloned().collect();
        found.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| a.created_at.cmp(&b.created_at)));
        found
    }
}
