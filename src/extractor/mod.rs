// =============================================================================
// extractor/ — READING BROKER EMAILS SO YOU DON'T HAVE TO
// =============================================================================
//
// "PLS OFFER FIRM 21,400 MT ± 1,250 MT WHEAT CONSTANTA / ALEXANDRIA 10-15 MAR
// 5000 PDPR SHINC / 3000 PWWD 3.75 TTL COMM". Somewhere in there is a cargo.
//
// The extractor runs an ordered list of regex rules per field, keeps the first
// one that parses, and scores itself on how much of the picture it managed to
// fill in. It never fails. An email it cannot read produces an empty result
// with zero confidence, and the pipeline decides what to do about that.
//
// Layout:
//   grammar.rs: the rule machinery (ordered rules, first valid hit wins)
//   fields.rs : the actual rule tables, one per field
//   records.rs: turning a result into a CargoRecord / VesselRecord
// =============================================================================

mod fields;
pub(crate) mod grammar;
mod records;

use chrono::{Datelike, NaiveDate, Utc};
use serde::Serialize;
use std::fmt;
use tracing::debug;

use crate::models::{Gear, Laycan, Quantity, StowageFactor};
use grammar::{Context, Hit};

/// A value plus the exact text it was read from. The raw text goes to the
/// UI so a human can check the machine's homework.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Extracted<T> {
    pub value: T,
    pub raw: String,
}

impl<T> Extracted<T> {
    pub fn new(value: T, raw: impl Into<String>) -> Self {
        Self { value, raw: raw.into() }
    }
}

impl<T> From<Hit<T>> for Extracted<T> {
    fn from(hit: Hit<T>) -> Self {
        Self { value: hit.value, raw: hit.raw }
    }
}

/// Deadweight requirement or capability. "need 30k+ dwt" has only a minimum.
#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
pub struct DwtRange {
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl DwtRange {
    pub fn exact(dwt: f64) -> Self {
        Self { min: Some(dwt), max: Some(dwt) }
    }

    /// The figure a vessel record uses: max if known, else min.
    pub fn best(&self) -> Option<f64> {
        self.max.or(self.min)
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
pub struct CraneCapacity {
    pub swl_tons: f64,
    pub count: Option<u32>,
}

/// Everything the rules can find. Sparse: most emails fill a handful.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedFields {
    pub commodity: Option<Extracted<String>>,
    pub quantity: Option<Extracted<Quantity>>,
    pub load_port: Option<Extracted<String>>,
    pub discharge_port: Option<Extracted<String>>,
    pub laycan: Option<Extracted<Laycan>>,
    pub dwt: Option<Extracted<DwtRange>>,
    /// Tons per day.
    pub loading_rate: Option<Extracted<f64>>,
    pub discharging_rate: Option<Extracted<f64>>,
    /// Percent.
    pub commission: Option<Extracted<f64>>,
    pub charterer: Option<Extracted<String>>,
    /// Per metric ton, currency as quoted (nearly always USD).
    pub freight_idea: Option<Extracted<f64>>,
    pub constraints: Vec<Extracted<String>>,
    /// Maximum vessel age in years.
    pub vessel_age: Option<Extracted<u32>>,
    pub exclude_flags: Option<Extracted<Vec<String>>>,
    pub crane_cap: Option<Extracted<CraneCapacity>>,

    // Vessel particulars. These never move the confidence needle.
    pub vessel_name: Option<Extracted<String>>,
    pub vessel_type: Option<Extracted<String>>,
    pub grain_cuft: Option<Extracted<f64>>,
    pub bale_cuft: Option<Extracted<f64>>,
    pub gear: Option<Extracted<Gear>>,
    pub speed_knots: Option<Extracted<f64>>,
    pub open_port: Option<Extracted<String>>,
    pub open_date: Option<Extracted<NaiveDate>>,
    pub stowage_factor: Option<Extracted<StowageFactor>>,
    pub broken_stowage_pct: Option<Extracted<f64>>,
}

/// Field names as reported in `matched_patterns` / `unmatched`.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum FieldName {
    Commodity,
    Quantity,
    LoadPort,
    DischargePort,
    Laycan,
    Dwt,
    LoadingRate,
    DischargingRate,
    Commission,
    Charterer,
    FreightIdea,
    Constraints,
    VesselAge,
    CraneCap,
    ExcludeFlags,
    VesselName,
    VesselType,
    GrainCapacity,
    BaleCapacity,
    Gear,
    Speed,
    OpenPort,
    OpenDate,
    StowageFactor,
    BrokenStowage,
}

impl FieldName {
    /// Every field, in reporting order.
    pub const ALL: [FieldName; 25] = [
        FieldName::Commodity,
        FieldName::Quantity,
        FieldName::LoadPort,
        FieldName::DischargePort,
        FieldName::Laycan,
        FieldName::Dwt,
        FieldName::LoadingRate,
        FieldName::DischargingRate,
        FieldName::Commission,
        FieldName::Charterer,
        FieldName::FreightIdea,
        FieldName::Constraints,
        FieldName::VesselAge,
        FieldName::CraneCap,
        FieldName::ExcludeFlags,
        FieldName::VesselName,
        FieldName::VesselType,
        FieldName::GrainCapacity,
        FieldName::BaleCapacity,
        FieldName::Gear,
        FieldName::Speed,
        FieldName::OpenPort,
        FieldName::OpenDate,
        FieldName::StowageFactor,
        FieldName::BrokenStowage,
    ];

    /// Contribution to confidence. Core fields carry the weight; vessel
    /// particulars carry none.
    pub fn weight(self) -> u32 {
        match self {
            FieldName::Commodity | FieldName::Quantity => 15,
            FieldName::LoadPort | FieldName::DischargePort => 12,
            FieldName::Laycan => 10,
            FieldName::Dwt => 8,
            FieldName::LoadingRate | FieldName::DischargingRate => 6,
            FieldName::Commission => 5,
            FieldName::Constraints => 4,
            FieldName::Charterer | FieldName::FreightIdea => 3,
            FieldName::VesselAge | FieldName::CraneCap => 2,
            _ => 0,
        }
    }

    pub fn is_weighted(self) -> bool {
        self.weight() > 0
    }

    pub fn total_weight() -> u32 {
        Self::ALL.iter().map(|f| f.weight()).sum()
    }
}

impl fmt::Display for FieldName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Same spelling as the serialized form.
        let name = match self {
            FieldName::Commodity => "commodity",
            FieldName::Quantity => "quantity",
            FieldName::LoadPort => "loadPort",
            FieldName::DischargePort => "dischargePort",
            FieldName::Laycan => "laycan",
            FieldName::Dwt => "dwt",
            FieldName::LoadingRate => "loadingRate",
            FieldName::DischargingRate => "dischargingRate",
            FieldName::Commission => "commission",
            FieldName::Charterer => "charterer",
            FieldName::FreightIdea => "freightIdea",
            FieldName::Constraints => "constraints",
            FieldName::VesselAge => "vesselAge",
            FieldName::CraneCap => "craneCap",
            FieldName::ExcludeFlags => "excludeFlags",
            FieldName::VesselName => "vesselName",
            FieldName::VesselType => "vesselType",
            FieldName::GrainCapacity => "grainCapacity",
            FieldName::BaleCapacity => "baleCapacity",
            FieldName::Gear => "gear",
            FieldName::Speed => "speed",
            FieldName::OpenPort => "openPort",
            FieldName::OpenDate => "openDate",
            FieldName::StowageFactor => "stowageFactor",
            FieldName::BrokenStowage => "brokenStowage",
        };
        write!(f, "{name}")
    }
}

impl ExtractedFields {
    pub fn has(&self, field: FieldName) -> bool {
        match field {
            FieldName::Commodity => self.commodity.is_some(),
            FieldName::Quantity => self.quantity.is_some(),
            FieldName::LoadPort => self.load_port.is_some(),
            FieldName::DischargePort => self.discharge_port.is_some(),
            FieldName::Laycan => self.laycan.is_some(),
            FieldName::Dwt => self.dwt.is_some(),
            FieldName::LoadingRate => self.loading_rate.is_some(),
            FieldName::DischargingRate => self.discharging_rate.is_some(),
            FieldName::Commission => self.commission.is_some(),
            FieldName::Charterer => self.charterer.is_some(),
            FieldName::FreightIdea => self.freight_idea.is_some(),
            FieldName::Constraints => !self.constraints.is_empty(),
            FieldName::VesselAge => self.vessel_age.is_some(),
            FieldName::CraneCap => self.crane_cap.is_some(),
            FieldName::ExcludeFlags => self.exclude_flags.is_some(),
            FieldName::VesselName => self.vessel_name.is_some(),
            FieldName::VesselType => self.vessel_type.is_some(),
            FieldName::GrainCapacity => self.grain_cuft.is_some(),
            FieldName::BaleCapacity => self.bale_cuft.is_some(),
            FieldName::Gear => self.gear.is_some(),
            FieldName::Speed => self.speed_knots.is_some(),
            FieldName::OpenPort => self.open_port.is_some(),
            FieldName::OpenDate => self.open_date.is_some(),
            FieldName::StowageFactor => self.stowage_factor.is_some(),
            FieldName::BrokenStowage => self.broken_stowage_pct.is_some(),
        }
    }

    /// Keep everything we have, borrow what we lack from `other`.
    fn fill_from(self, other: ExtractedFields) -> ExtractedFields {
        ExtractedFields {
            commodity: self.commodity.or(other.commodity),
            quantity: self.quantity.or(other.quantity),
            load_port: self.load_port.or(other.load_port),
            discharge_port: self.discharge_port.or(other.discharge_port),
            laycan: self.laycan.or(other.laycan),
            dwt: self.dwt.or(other.dwt),
            loading_rate: self.loading_rate.or(other.loading_rate),
            discharging_rate: self.discharging_rate.or(other.discharging_rate),
            commission: self.commission.or(other.commission),
            charterer: self.charterer.or(other.charterer),
            freight_idea: self.freight_idea.or(other.freight_idea),
            constraints: if self.constraints.is_empty() {
                other.constraints
            } else {
                self.constraints
            },
            vessel_age: self.vessel_age.or(other.vessel_age),
            exclude_flags: self.exclude_flags.or(other.exclude_flags),
            crane_cap: self.crane_cap.or(other.crane_cap),
            vessel_name: self.vessel_name.or(other.vessel_name),
            vessel_type: self.vessel_type.or(other.vessel_type),
            grain_cuft: self.grain_cuft.or(other.grain_cuft),
            bale_cuft: self.bale_cuft.or(other.bale_cuft),
            gear: self.gear.or(other.gear),
            speed_knots: self.speed_knots.or(other.speed_knots),
            open_port: self.open_port.or(other.open_port),
            open_date: self.open_date.or(other.open_date),
            stowage_factor: self.stowage_factor.or(other.stowage_factor),
            broken_stowage_pct: self.broken_stowage_pct.or(other.broken_stowage_pct),
        }
    }
}

/// What the extractor hands back for one email.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionResult {
    /// 0.0..=1.0, the weighted share of fields that were found.
    pub confidence: f64,
    pub fields: ExtractedFields,
    /// Every field that was parsed, weighted or not.
    pub matched_patterns: Vec<FieldName>,
    /// Weighted fields we looked for and did not find.
    pub unmatched: Vec<FieldName>,
}

impl ExtractionResult {
    /// Derive bookkeeping and confidence from a set of fields.
    pub fn from_fields(fields: ExtractedFields) -> Self {
        let matched_patterns: Vec<FieldName> =
            FieldName::ALL.iter().copied().filter(|f| fields.has(*f)).collect();
        let unmatched: Vec<FieldName> = FieldName::ALL
            .iter()
            .copied()
            .filter(|f| f.is_weighted() && !fields.has(*f))
            .collect();

        let found: u32 = matched_patterns.iter().map(|f| f.weight()).sum();
        let confidence = (f64::from(found) / f64::from(FieldName::total_weight())).clamp(0.0, 1.0);

        Self { confidence, fields, matched_patterns, unmatched }
    }

    pub fn empty() -> Self {
        Self::from_fields(ExtractedFields::default())
    }

    /// Primary wins every field it has; the secondary fills the gaps.
    /// Confidence is recomputed, never averaged.
    pub fn merge(primary: ExtractionResult, secondary: ExtractionResult) -> ExtractionResult {
        Self::from_fields(primary.fields.fill_from(secondary.fields))
    }

    pub fn has(&self, field: FieldName) -> bool {
        self.fields.has(field)
    }
}

/// Anything that can turn email text into fields. The pattern extractor is
/// the one we ship; a model-backed one plugs in here and gets merged.
pub trait FieldExtractor: Send + Sync {
    fn extract(&self, text: &str) -> ExtractionResult;
}

/// The rule-based extractor.
#[derive(Debug, Clone, Default)]
pub struct PatternExtractor {
    reference_year: Option<i32>,
}

impl PatternExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pin the year assumed for dates that omit one. Without this, the
    /// current calendar year is used, which makes tests age badly.
    pub fn with_reference_year(year: i32) -> Self {
        Self { reference_year: Some(year) }
    }

    fn context(&self) -> Context {
        Context { year: self.reference_year.unwrap_or_else(|| Utc::now().year()) }
    }
}

impl FieldExtractor for PatternExtractor {
    fn extract(&self, text: &str) -> ExtractionResult {
        let fields = fields::extract_all(text, &self.context());
        let result = ExtractionResult::from_fields(fields);
        debug!(
            confidence = format!("{:.2}", result.confidence),
            matched = result.matched_patterns.len(),
            missing = result.unmatched.len(),
            "Extraction complete"
        );
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::QuantityUnit;

    fn extract(text: &str) -> ExtractionResult {
        PatternExtractor::with_reference_year(2025).extract(text)
    }

    #[test]
    fn test_weights_total() {
        assert_eq!(FieldName::total_weight(), 103);
        assert_eq!(FieldName::Gear.weight(), 0);
    }

    #[test]
    fn test_quantity_with_absolute_tolerance() {
        let r = extract("21,400 MT ± 1,250 MT wheat");
        let qty = &r.fields.quantity.as_ref().unwrap().value;
        assert_eq!(qty.value, 21_400.0);
        assert_eq!(qty.unit, QuantityUnit::Mt);
        assert!(qty.tolerance.as_deref().unwrap().contains("1,250"));
        assert_eq!(r.fields.commodity.as_ref().unwrap().value, "wheat");
    }

    #[test]
    fn test_dwt_en_dash_range() {
        let r = extract("27,000 – 47,000 DWT");
        let dwt = r.fields.dwt.unwrap().value;
        assert_eq!(dwt.min, Some(27_000.0));
        assert_eq!(dwt.max, Some(47_000.0));
    }

    #[test]
    fn test_empty_text_is_zero_confidence() {
        let r = extract("");
        assert_eq!(r.confidence, 0.0);
        assert!(r.matched_patterns.is_empty());
        assert_eq!(r.unmatched.len(), 14);
    }

    #[test]
    fn test_full_cargo_order() {
        let text = "Cargo: wheat\n\
                    21,400 MT ± 1,250 MT\n\
                    load: Constanta\n\
                    disch: Alexandria\n\
                    laycan 10-15 March\n\
                    loading rate 5,000 mt pdpr / discharging 3,000 mt pwwd\n\
                    3.75% ttl comm\n\
                    Charterers: Black Sea Grain Trading\n\
                    freight idea usd 28 pmt\n\
                    need 25k dwt, max age 20 yrs, no Iran/Iraq flag, solo cargo";
        let r = extract(text);
        let f = &r.fields;
        assert_eq!(f.load_port.as_ref().unwrap().value, "Constanta");
        assert_eq!(f.discharge_port.as_ref().unwrap().value, "Alexandria");
        let laycan = f.laycan.as_ref().unwrap().value;
        assert_eq!(laycan.start, NaiveDate::from_ymd_opt(2025, 3, 10).unwrap());
        assert_eq!(laycan.end, NaiveDate::from_ymd_opt(2025, 3, 15).unwrap());
        assert_eq!(f.loading_rate.as_ref().unwrap().value, 5_000.0);
        assert_eq!(f.discharging_rate.as_ref().unwrap().value, 3_000.0);
        assert_eq!(f.commission.as_ref().unwrap().value, 3.75);
        assert_eq!(f.charterer.as_ref().unwrap().value, "Black Sea Grain Trading");
        assert_eq!(f.freight_idea.as_ref().unwrap().value, 28.0);
        assert_eq!(f.vessel_age.as_ref().unwrap().value, 20);
        assert_eq!(f.dwt.as_ref().unwrap().value.min, Some(25_000.0));
        assert_eq!(
            f.exclude_flags.as_ref().unwrap().value,
            vec!["Iran".to_string(), "Iraq".to_string()]
        );
        // Everything except crane capacity.
        assert_eq!(r.unmatched, vec![FieldName::CraneCap]);
        assert!((r.confidence - 101.0 / 103.0).abs() < 1e-9);
    }

    #[test]
    fn test_confidence_never_drops_as_fields_are_added() {
        let lines = [
            "wheat",
            "25,000 mt",
            "load: Constanta",
            "disch: Alexandria",
            "10-15 Mar",
            "need 30k dwt",
            "load 5,000 mt pdpr",
            "2.5% comm",
        ];
        let mut text = String::new();
        let mut last = 0.0;
        for line in lines {
            text.push_str(line);
            text.push('\n');
            let c = extract(&text).confidence;
            assert!(c >= last, "confidence dropped from {last} to {c} after {line:?}");
            last = c;
        }
        assert!(last > 0.5);
    }

    #[test]
    fn test_merge_prefers_primary_and_recomputes() {
        let primary = extract("wheat 25,000 mt");
        let secondary = extract("corn load: Odessa disch: Izmir");
        let merged = ExtractionResult::merge(primary.clone(), secondary);
        assert_eq!(merged.fields.commodity.as_ref().unwrap().value, "wheat");
        assert_eq!(merged.fields.load_port.as_ref().unwrap().value, "Odessa");
        assert!(merged.confidence > primary.confidence);
        assert!(!merged.unmatched.contains(&FieldName::LoadPort));
    }

    #[test]
    fn test_serializes_field_names_in_camel_case() {
        let r = extract("load: Constanta");
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json["matchedPatterns"][0], "loadPort");
        assert_eq!(json["fields"]["loadPort"]["value"], "Constanta");
    }
}
