// =============================================================================
// models.rs — THE SACRED DATA STRUCTURES OF DRY BULK
// =============================================================================
//
// Cargoes, vessels, and the matches between them. A cargo wants to go from A
// to B inside a date window. A vessel is somewhere, empty, and would very much
// like to be paid. Everything in this file exists to describe those two facts
// precisely enough that a machine can marry them.
//
// Records are validated on construction. Once a CargoRecord exists, its
// quantity is positive and its laycan runs forwards in time. Nobody
// downstream has to check again.
// =============================================================================

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::RecordError;

/// Cubic feet in one cubic metre. Brokers quote stowage in both.
pub const CUFT_PER_CBM: f64 = 35.3147;

// =============================================================================
// CARGO SIDE
// =============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum QuantityUnit {
    /// Metric tons. What everybody means, whatever they write.
    #[serde(rename = "MT")]
    Mt,
    #[serde(rename = "tons")]
    Tons,
}

impl fmt::Display for QuantityUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuantityUnit::Mt => write!(f, "MT"),
            QuantityUnit::Tons => write!(f, "tons"),
        }
    }
}

/// A cargo quantity as the broker stated it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Quantity {
    pub value: f64,
    pub unit: QuantityUnit,
    /// Tolerance exactly as written ("1,250 MT", "10%"). Kept raw because
    /// "MOLOO 5%" and "± 1,250 MT" mean different things to different people.
    pub tolerance: Option<String>,
}

impl Quantity {
    pub fn new(value: f64, unit: QuantityUnit) -> Result<Self, RecordError> {
        if !(value > 0.0) || !value.is_finite() {
            return Err(RecordError::Invalid(format!(
                "quantity must be positive, got {value}"
            )));
        }
        Ok(Self { value, unit, tolerance: None })
    }

    pub fn with_tolerance(mut self, tolerance: impl Into<String>) -> Self {
        self.tolerance = Some(tolerance.into());
        self
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.tolerance {
            Some(tol) => write!(f, "{} {} ± {}", self.value, self.unit, tol),
            None => write!(f, "{} {}", self.value, self.unit),
        }
    }
}

/// The window in which the vessel must present itself ready to load.
/// Invariant: `start < end`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Laycan {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl Laycan {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, RecordError> {
        if start >= end {
            return Err(RecordError::Invalid(format!(
                "laycan start {start} must be before end {end}"
            )));
        }
        Ok(Self { start, end })
    }
}

impl fmt::Display for Laycan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} / {}", self.start.format("%d %b %Y"), self.end.format("%d %b %Y"))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum StowageUnit {
    #[serde(rename = "cuft/mt")]
    CuftPerTon,
    #[serde(rename = "m3/mt")]
    CbmPerTon,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StowageFactor {
    pub value: f64,
    pub unit: StowageUnit,
}

impl StowageFactor {
    /// Normalised to cubic feet per metric ton, which is what grain
    /// capacities are quoted in.
    pub fn cuft_per_ton(&self) -> f64 {
        match self.unit {
            StowageUnit::CuftPerTon => self.value,
            StowageUnit::CbmPerTon => self.value * CUFT_PER_CBM,
        }
    }
}

/// A cargo looking for a ship.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CargoRecord {
    pub id: Uuid,
    pub commodity: String,
    pub quantity: Quantity,
    pub load_port: String,
    pub discharge_port: String,
    pub laycan: Option<Laycan>,
    pub stowage_factor: Option<StowageFactor>,
    /// Broken-stowage allowance in percent. The scorer assumes 5% when absent.
    pub broken_stowage_pct: Option<f64>,
    pub constraints: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl CargoRecord {
    pub fn new(
        commodity: impl Into<String>,
        quantity: Quantity,
        load_port: impl Into<String>,
        discharge_port: impl Into<String>,
    ) -> Result<Self, RecordError> {
        let commodity = commodity.into();
        if commodity.trim().is_empty() {
            return Err(RecordError::MissingField("commodity"));
        }
        if !(quantity.value > 0.0) {
            return Err(RecordError::Invalid("quantity must be positive".into()));
        }
        Ok(Self {
            id: Uuid::new_v4(),
            commodity,
            quantity,
            load_port: load_port.into(),
            discharge_port: discharge_port.into(),
            laycan: None,
            stowage_factor: None,
            broken_stowage_pct: None,
            constraints: Vec::new(),
            created_at: Utc::now(),
        })
    }

    pub fn with_laycan(mut self, laycan: Laycan) -> Self {
        self.laycan = Some(laycan);
        self
    }

    pub fn with_stowage(mut self, stowage_factor: StowageFactor) -> Self {
        self.stowage_factor = Some(stowage_factor);
        self
    }

    pub fn with_constraints(mut self, constraints: Vec<String>) -> Self {
        self.constraints = constraints;
        self
    }
}

// =============================================================================
// VESSEL SIDE
// =============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Gear {
    Geared,
    Gearless,
}

impl fmt::Display for Gear {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Gear::Geared => write!(f, "geared"),
            Gear::Gearless => write!(f, "gearless"),
        }
    }
}

/// A ship that is (or soon will be) empty somewhere.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VesselRecord {
    pub id: Uuid,
    pub name: String,
    pub dwt: f64,
    pub grain_cuft: Option<f64>,
    pub bale_cuft: Option<f64>,
    /// Where she opens. Free text, resolved through the gazetteer at scoring time.
    pub current_port: String,
    pub current_area: Option<String>,
    pub available_from: Option<NaiveDate>,
    pub gear: Option<Gear>,
    pub speed_knots: Option<f64>,
    pub vessel_type: Option<String>,
    /// Free-form tags ("bulk", "geared", "box-shaped", ...).
    pub features: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl VesselRecord {
    pub fn new(
        name: impl Into<String>,
        dwt: f64,
        current_port: impl Into<String>,
    ) -> Result<Self, RecordError> {
        if !(dwt > 0.0) || !dwt.is_finite() {
            return Err(RecordError::Invalid(format!("dwt must be positive, got {dwt}")));
        }
        Ok(Self {
            id: Uuid::new_v4(),
            name: name.into(),
            dwt,
            grain_cuft: None,
            bale_cuft: None,
            current_port: current_port.into(),
            current_area: None,
            available_from: None,
            gear: None,
            speed_knots: None,
            vessel_type: None,
            features: Vec::new(),
            created_at: Utc::now(),
        })
    }

    pub fn with_grain(mut self, grain_cuft: f64) -> Self {
        self.grain_cuft = Some(grain_cuft);
        self
    }

    pub fn with_available_from(mut self, date: NaiveDate) -> Self {
        self.available_from = Some(date);
        self
    }

    pub fn with_gear(mut self, gear: Gear) -> Self {
        self.gear = Some(gear);
        self
    }

    pub fn with_features<I, S>(mut self, features: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.features = features.into_iter().map(Into::into).collect();
        self
    }

    /// Case-insensitive substring check over the feature tags and the vessel type.
    pub fn has_feature(&self, needle: &str) -> bool {
        let needle = needle.to_lowercase();
        self.features
            .iter()
            .chain(self.vessel_type.iter())
            .any(|f| f.to_lowercase().contains(&needle))
    }
}

// =============================================================================
// MATCHES
// =============================================================================

/// Per-criterion contributions. `None` means the criterion was not evaluated
/// (volume is skipped when either side lacks the numbers).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScoreBreakdown {
    pub tonnage: i32,
    pub volume: Option<i32>,
    pub laycan: i32,
    pub route: i32,
    pub commodity: i32,
    /// cargo quantity / vessel dwt
    pub utilization: f64,
    pub distance_nm: f64,
    pub sailing_days: f64,
}

impl ScoreBreakdown {
    pub fn raw_total(&self) -> i32 {
        self.tonnage + self.volume.unwrap_or(0) + self.laycan + self.route + self.commodity
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Recommendation {
    Excellent,
    VeryGood,
    Good,
    Acceptable,
}

impl Recommendation {
    pub fn for_score(score: u8) -> Self {
        match score {
            90..=u8::MAX => Recommendation::Excellent,
            80..=89 => Recommendation::VeryGood,
            70..=79 => Recommendation::Good,
            _ => Recommendation::Acceptable,
        }
    }
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Recommendation::Excellent => write!(f, "Excellent"),
            Recommendation::VeryGood => write!(f, "Very good"),
            Recommendation::Good => write!(f, "Good"),
            Recommendation::Acceptable => write!(f, "Acceptable"),
        }
    }
}

/// A scored cargo/vessel pair. Ephemeral: computed on demand, persisted
/// only through `MatchStore::upsert_match`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MatchCandidate {
    pub cargo_id: Uuid,
    pub vessel_id: Uuid,
    /// 0..=100
    pub score: u8,
    pub reasons: Vec<String>,
    pub breakdown: ScoreBreakdown,
    pub recommendation: Recommendation,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchStatus {
    Suggested,
    Accepted,
    Rejected,
}

impl fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchStatus::Suggested => write!(f, "SUGGESTED"),
            MatchStatus::Accepted => write!(f, "ACCEPTED"),
            MatchStatus::Rejected => write!(f, "REJECTED"),
        }
    }
}

/// A match as the store keeps it. Never deleted; the audit trail is the point.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PersistedMatch {
    pub id: Uuid,
    pub cargo_id: Uuid,
    pub vessel_id: Uuid,
    pub score: u8,
    pub reasons: Vec<String>,
    pub status: MatchStatus,
    pub decided_by: Option<String>,
    pub decided_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// WIRE TYPES
// =============================================================================

/// One inbound email as the ingestion collaborator hands it over.
/// Only `body` matters to the core; the rest rides along.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EmailMessage {
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub from: String,
    pub body: String,
    #[serde(default)]
    pub received_at: Option<DateTime<Utc>>,
}

impl EmailMessage {
    /// Dedup key. The same circular forwarded twice carries the same sender,
    /// subject and body; the timestamp is left out on purpose since forwards
    /// restamp it.
    pub fn fingerprint(&self) -> String {
        let body: String = self.body.split_whitespace().collect::<Vec<_>>().join(" ");
        format!(
            "{}:{}:{}",
            self.from.trim().to_lowercase(),
            self.subject.trim().to_lowercase(),
            body.to_lowercase()
        )
    }
}

/// What goes out to Redis when a match is suggested.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchEvent {
    pub match_id: Uuid,
    pub cargo_id: Uuid,
    pub vessel_id: Uuid,
    pub score: u8,
    pub recommendation: Recommendation,
    pub reasons: Vec<String>,
    pub emitted_at: DateTime<Utc>,
}

impl fmt::Display for MatchEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] cargo {} <-> vessel {} scored {} ({})",
            self.match_id, self.cargo_id, self.vessel_id, self.score, self.recommendation
        )
    }
}
