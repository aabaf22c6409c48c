//! From extraction results to records.
//!
//! A cargo needs four things before it is worth storing: what, how much,
//! from where, to where. A vessel needs a size and a place to open.
//! Everything else is optional and copied across when present.

use crate::error::RecordError;
use crate::gazetteer::Gazetteer;
use crate::models::{CargoRecord, VesselRecord};

use super::ExtractionResult;

/// Vessel types that are bulk carriers whether or not anyone says "bulk".
const BULKER_TYPES: &[&str] = &[
    "handysize",
    "handymax",
    "supramax",
    "ultramax",
    "panamax",
    "kamsarmax",
    "post-panamax",
    "post panamax",
    "postpanamax",
    "capesize",
    "mini bulker",
    "mini-bulker",
    "minibulker",
    "bulker",
    "bulk carrier",
];

impl CargoRecord {
    pub fn from_extraction(result: &ExtractionResult) -> Result<Self, RecordError> {
        let f = &result.fields;
        let commodity = f.commodity.as_ref().ok_or(RecordError::MissingField("commodity"))?;
        let quantity = f.quantity.as_ref().ok_or(RecordError::MissingField("quantity"))?;
        let load = f.load_port.as_ref().ok_or(RecordError::MissingField("loadPort"))?;
        let discharge =
            f.discharge_port.as_ref().ok_or(RecordError::MissingField("dischargePort"))?;

        let mut cargo = CargoRecord::new(
            commodity.value.clone(),
            quantity.value.clone(),
            load.value.clone(),
            discharge.value.clone(),
        )?;
        if let Some(laycan) = &f.laycan {
            cargo = cargo.with_laycan(laycan.value);
        }
        if let Some(sf) = &f.stowage_factor {
            cargo = cargo.with_stowage(sf.value);
        }
        cargo.broken_stowage_pct = f.broken_stowage_pct.as_ref().map(|b| b.value);
        Ok(cargo.with_constraints(f.constraints.iter().map(|c| c.value.clone()).collect()))
    }
}

impl VesselRecord {
    pub fn from_extraction(result: &ExtractionResult) -> Result<Self, RecordError> {
        let f = &result.fields;
        let dwt = f
            .dwt
            .as_ref()
            .and_then(|d| d.value.best())
            .ok_or(RecordError::MissingField("dwt"))?;
        let port = f
            .open_port
            .as_ref()
            .or(f.load_port.as_ref())
            .ok_or(RecordError::MissingField("openPort"))?;
        let name = f
            .vessel_name
            .as_ref()
            .map_or_else(|| "TBN".to_string(), |n| n.value.clone());

        let mut vessel = VesselRecord::new(name, dwt, port.value.clone())?;
        vessel.current_area =
            Gazetteer::global().find_port(&port.value).map(|p| p.region.to_string());
        vessel.grain_cuft = f.grain_cuft.as_ref().map(|g| g.value);
        vessel.bale_cuft = f.bale_cuft.as_ref().map(|b| b.value);
        vessel.available_from = f.open_date.as_ref().map(|d| d.value);
        vessel.gear = f.gear.as_ref().map(|g| g.value);
        vessel.speed_knots = f.speed_knots.as_ref().map(|s| s.value);
        vessel.vessel_type = f.vessel_type.as_ref().map(|t| t.value.clone());

        let mut features: Vec<String> = Vec::new();
        if let Some(t) = &vessel.vessel_type {
            if t.contains("bulk") || BULKER_TYPES.contains(&t.as_str()) {
                features.push("bulk".into());
            }
        }
        if let Some(gear) = vessel.gear {
            features.push(gear.to_string());
        }
        features.extend(
            f.constraints
                .iter()
                .filter(|c| c.value == "box-shaped")
                .map(|c| c.value.clone()),
        );
        vessel.features = features;
        Ok(vessel)
    }
}
