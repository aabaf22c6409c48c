// =============================================================================
// ranker.rs — THE LEAGUE TABLE
// =============================================================================
//
// Takes a pile of scored pairs and decides which ones a broker gets to see:
// one entry per (cargo, vessel), nothing under the threshold, best first,
// and no more than asked for.
//
// Ties are broken by who gets there sooner, then who fills the ship better,
// then by ids so the same input always produces the same table.
//
// Also home to the only legal state change a persisted match can make.
// =============================================================================

use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::collections::HashMap;
use uuid::Uuid;

use crate::error::MatchError;
use crate::models::{MatchCandidate, MatchStatus, PersistedMatch};

/// Best-first ordering with deterministic tie-breaks.
pub fn compare(a: &MatchCandidate, b: &MatchCandidate) -> Ordering {
    b.score
        .cmp(&a.score)
        .then_with(|| a.breakdown.sailing_days.total_cmp(&b.breakdown.sailing_days))
        .then_with(|| b.breakdown.utilization.total_cmp(&a.breakdown.utilization))
        .then_with(|| a.cargo_id.cmp(&b.cargo_id))
        .then_with(|| a.vessel_id.cmp(&b.vessel_id))
}

/// Dedupe (later entries win), threshold, sort, truncate.
pub fn rank(candidates: Vec<MatchCandidate>, min_score: u8, limit: usize) -> Vec<MatchCandidate> {
    let mut by_pair: HashMap<(Uuid, Uuid), MatchCandidate> =
        HashMap::with_capacity(candidates.len());
    for candidate in candidates {
        by_pair.insert((candidate.cargo_id, candidate.vessel_id), candidate);
    }

    let mut ranked: Vec<MatchCandidate> =
        by_pair.into_values().filter(|c| c.score >= min_score).collect();
    ranked.sort_by(compare);
    ranked.truncate(limit);
    ranked
}

/// SUGGESTED -> ACCEPTED | REJECTED. Anything else is a conflict.
pub fn transition(
    record: &mut PersistedMatch,
    to: MatchStatus,
    decided_by: Option<&str>,
    at: DateTime<Utc>,
) -> Result<(), MatchError> {
    if record.status != MatchStatus::Suggested || to == MatchStatus::Suggested {
        return Err(MatchError::AlreadyDecided { id: record.id, status: record.status });
    }
    record.status = to;
    record.decided_by = decided_by.map(str::to_string);
    record.decided_at = Some(at);
    record.updated_at = at;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Recommendation, ScoreBreakdown};

    fn candidate(score: u8, days: f64, utilization: f64) -> MatchCandidate {
        MatchCandidate {
            cargo_id: Uuid::new_v4(),
            vessel_id: Uuid::new_v4(),
            score,
            reasons: vec![],
            breakdown: ScoreBreakdown { sailing_days: days, utilization, ..Default::default() },
            recommendation: Recommendation::for_score(score),
        }
    }

    fn suggested() -> PersistedMatch {
        let now = Utc::now();
        PersistedMatch {
            id: Uuid::new_v4(),
            cargo_id: Uuid::new_v4(),
            vessel_id: Uuid::new_v4(),
            score: 70,
            reasons: vec![],
            status: MatchStatus::Suggested,
            decided_by: None,
            decided_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_sorted_best_first_and_thresholded() {
        let ranked = rank(
            vec![candidate(60, 1.0, 0.8), candidate(90, 1.0, 0.8), candidate(49, 0.1, 1.0)],
            50,
            10,
        );
        let scores: Vec<u8> = ranked.iter().map(|c| c.score).collect();
        assert_eq!(scores, vec![90, 60]);
    }

    #[test]
    fn test_ties_prefer_shorter_voyage_then_fuller_ship() {
        let slow = candidate(80, 2.5, 0.95);
        let fast_light = candidate(80, 0.5, 0.60);
        let fast_full = candidate(80, 0.5, 0.90);
        let ranked = rank(vec![slow.clone(), fast_light.clone(), fast_full.clone()], 50, 10);
        assert_eq!(ranked[0].vessel_id, fast_full.vessel_id);
        assert_eq!(ranked[1].vessel_id, fast_light.vessel_id);
        assert_eq!(ranked[2].vessel_id, slow.vessel_id);
    }

    #[test]
    fn test_duplicate_pairs_keep_the_later_entry() {
        let first = candidate(70, 1.0, 0.9);
        let mut later = first.clone();
        later.score = 85;
        let ranked = rank(vec![first, later], 50, 10);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].score, 85);
    }

    #[test]
    fn test_limit_truncates() {
        let pile: Vec<_> = (0..30).map(|i| candidate(50 + i as u8, 1.0, 0.9)).collect();
        let ranked = rank(pile, 50, 5);
        assert_eq!(ranked.len(), 5);
        assert_eq!(ranked[0].score, 79);
    }

    #[test]
    fn test_transition_from_suggested() {
        let mut m = suggested();
        let now = Utc::now();
        transition(&mut m, MatchStatus::Accepted, Some("ops@desk"), now).unwrap();
        assert_eq!(m.status, MatchStatus::Accepted);
        assert_eq!(m.decided_by.as_deref(), Some("ops@desk"));
        assert_eq!(m.decided_at, Some(now));
    }

    #[test]
    fn test_deciding_twice_is_a_conflict() {
        let mut m = suggested();
        transition(&mut m, MatchStatus::Rejected, None, Utc::now()).unwrap();
        let err = transition(&mut m, MatchStatus::Accepted, None, Utc::now()).unwrap_err();
        assert_eq!(err, MatchError::AlreadyDecided { id: m.id, status: MatchStatus::Rejected });
    }

    #[test]
    fn test_cannot_go_back_to_suggested() {
        let mut m = suggested();
        assert!(transition(&mut m, MatchStatus::Suggested, None, Utc::now()).is_err());
    }
}
