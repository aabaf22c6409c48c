// =============================================================================
// error.rs — THE COMPLAINTS DEPARTMENT
// =============================================================================
//
// Most things in this engine are not allowed to fail. A broker email with no
// laycan is not an error, it is Tuesday. A port we have never heard of is not
// an error either, it gets a heuristic distance and we move on.
//
// What IS an error: asking for a cargo that does not exist, building a record
// without the fields it cannot live without, and trying to decide a match
// that somebody already decided.
// =============================================================================

use thiserror::Error;
use uuid::Uuid;

use crate::models::MatchStatus;

/// Errors surfaced by the match service and the store.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MatchError {
    #[error("cargo {0} not found")]
    CargoNotFound(Uuid),

    #[error("vessel {0} not found")]
    VesselNotFound(Uuid),

    #[error("match {0} not found")]
    MatchNotFound(Uuid),

    /// The only transition is SUGGESTED -> ACCEPTED | REJECTED. Anything
    /// else is a conflict and the caller has to hear about it.
    #[error("match {id} was already {status} and cannot be decided again")]
    AlreadyDecided { id: Uuid, status: MatchStatus },

    /// A cargo sails on one ship. A suggestion that showed up after the
    /// cargo was fixed cannot be accepted on top of it.
    #[error("cargo {cargo_id} is already fixed on match {accepted}")]
    CargoAlreadyFixed { cargo_id: Uuid, accepted: Uuid },

    #[error(transparent)]
    Record(#[from] RecordError),
}

/// Errors raised while building a cargo or vessel record.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RecordError {
    #[error("required field `{0}` is missing")]
    MissingField(&'static str),

    #[error("invalid record: {0}")]
    Invalid(String),
}

pub type Result<T> = std::result::Result<T, MatchError>;
