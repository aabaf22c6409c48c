// =============================================================================
// scorer.rs — WILL IT FLOAT, WILL IT FIT, WILL IT GET THERE IN TIME
// =============================================================================
//
// One cargo, one vessel, five questions, always in this order:
//
//   1. Tonnage  : does the cargo fit on the ship, and does it fill enough of
//                  her to be worth the voyage? (hard gate)
//   2. Volume   : light cargo runs out of cubic before it runs out of tons.
//   3. Laycan   : do we know enough about dates to line them up?
//   4. Route    : how far is the ship from the load port?
//   5. Affinity : grain wants a bulker, steel wants cranes.
//
// Every contribution gets a sentence in `reasons`, so whoever reads the match
// can disagree with the machine on specifics rather than on vibes.
//
// The scorer is pure: same records in, same score out. No store, no clock.
// =============================================================================

use serde::Serialize;
use tracing::debug;

use crate::geo::{estimate_route, DistanceSource};
use crate::models::{
    CargoRecord, Gear, MatchCandidate, Recommendation, ScoreBreakdown, VesselRecord,
};

/// Pairs scoring below this never leave the ranker.
pub const MIN_MATCH_SCORE: u8 = 50;
/// Assumed broken-stowage allowance when the cargo does not state one.
pub const DEFAULT_BROKEN_STOWAGE_PCT: f64 = 5.0;

const GRAIN_TERMS: &[&str] = &["grain", "corn", "wheat", "seed"];
const STEEL_TERMS: &[&str] = &["steel", "coil"];

/// A pair that survived the tonnage gate.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CompatibilityScore {
    /// 0..=100
    pub score: u8,
    pub reasons: Vec<String>,
    pub breakdown: ScoreBreakdown,
}

impl CompatibilityScore {
    pub fn recommendation(&self) -> Recommendation {
        Recommendation::for_score(self.score)
    }

    pub fn into_candidate(self, cargo: &CargoRecord, vessel: &VesselRecord) -> MatchCandidate {
        let recommendation = self.recommendation();
        MatchCandidate {
            cargo_id: cargo.id,
            vessel_id: vessel.id,
            score: self.score,
            reasons: self.reasons,
            breakdown: self.breakdown,
            recommendation,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub enum Evaluation {
    /// Failed a hard gate. Never ranked, never persisted.
    Rejected { reason: String },
    Scored(CompatibilityScore),
}

impl Evaluation {
    pub fn score(&self) -> Option<u8> {
        match self {
            Evaluation::Scored(s) => Some(s.score),
            Evaluation::Rejected { .. } => None,
        }
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, Evaluation::Rejected { .. })
    }
}

/// A second opinion from outside the rule set (a model, a broker's gut).
/// Returns a 0..=100 score or `None` to abstain.
pub trait CompatibilityEstimator: Send + Sync {
    fn estimate(&self, cargo: &CargoRecord, vessel: &VesselRecord) -> Option<u8>;
}

/// Score a pair with the rules alone.
pub fn evaluate(cargo: &CargoRecord, vessel: &VesselRecord) -> Evaluation {
    let qty = cargo.quantity.value;
    let dwt = vessel.dwt;
    let utilization = qty / dwt;
    let mut reasons = Vec::with_capacity(5);
    let mut breakdown = ScoreBreakdown { utilization, ..ScoreBreakdown::default() };

    // 1. Tonnage
    if qty > dwt {
        return reject(cargo, vessel, format!("Cargo {qty:.0} MT exceeds vessel DWT {dwt:.0}"));
    }
    breakdown.tonnage = match utilization {
        u if u >= 0.90 => 30,
        u if u >= 0.70 => 20,
        u if u >= 0.50 => 10,
        _ => {
            return reject(
                cargo,
                vessel,
                format!("Utilization {:.0}% is below 50%, vessel too large", utilization * 100.0),
            )
        }
    };
    reasons.push(format!(
        "Tonnage: {qty:.0} MT on {dwt:.0} DWT ({:.0}% utilization) {:+}",
        utilization * 100.0,
        breakdown.tonnage
    ));

    // 2. Volume
    if let (Some(sf), Some(grain)) = (cargo.stowage_factor, vessel.grain_cuft) {
        let broken = cargo.broken_stowage_pct.unwrap_or(DEFAULT_BROKEN_STOWAGE_PCT);
        let required = qty * sf.cuft_per_ton() * (1.0 + broken / 100.0);
        let points = if required <= grain { 25 } else { -15 };
        breakdown.volume = Some(points);
        reasons.push(if points > 0 {
            format!("Volume: needs {required:.0} cuft of {grain:.0} grain capacity {points:+}")
        } else {
            format!("Volume: needs {required:.0} cuft but grain capacity is {grain:.0} {points:+}")
        });
    }

    // 3. Laycan
    breakdown.laycan = match (cargo.laycan, vessel.available_from) {
        (Some(_), Some(_)) => 20,
        (Some(_), None) | (None, Some(_)) => 10,
        (None, None) => 0,
    };
    reasons.push(match breakdown.laycan {
        20 => "Laycan: cargo window and vessel open date both known +20".to_string(),
        10 => "Laycan: only one side states dates +10".to_string(),
        _ => "Laycan: no dates on either side +0".to_string(),
    });

    // 4. Route
    let route = estimate_route(&vessel.current_port, &cargo.load_port);
    breakdown.distance_nm = route.distance_nm;
    breakdown.sailing_days = route.sailing_days;
    breakdown.route = match route.sailing_days {
        d if d <= 2.0 => 20,
        d if d <= 3.0 => 10,
        _ => -15,
    };
    let estimated = if route.source == DistanceSource::GreatCircle { "" } else { " (estimated)" };
    reasons.push(format!(
        "Route: {:.0} NM{} from {} to {}, {:.1} days ballast {:+}",
        route.distance_nm,
        estimated,
        vessel.current_port,
        cargo.load_port,
        route.sailing_days,
        breakdown.route
    ));

    // 5. Affinity
    let commodity = cargo.commodity.to_lowercase();
    if GRAIN_TERMS.iter().any(|t| commodity.contains(t))
        && (vessel.has_feature("bulk") || dwt > 10_000.0)
    {
        breakdown.commodity = 10;
        reasons.push(format!("Commodity: {} suits a bulk carrier +10", cargo.commodity));
    } else if STEEL_TERMS.iter().any(|t| commodity.contains(t))
        && (vessel.has_feature("geared") || vessel.gear == Some(Gear::Geared) || dwt < 15_000.0)
    {
        breakdown.commodity = 10;
        reasons.push(format!("Commodity: {} suits a geared or handy vessel +10", cargo.commodity));
    }

    let score = breakdown.raw_total().clamp(0, 100) as u8;
    debug!(
        cargo_id = %cargo.id,
        vessel_id = %vessel.id,
        raw = breakdown.raw_total(),
        score = score,
        "Pair scored"
    );
    Evaluation::Scored(CompatibilityScore { score, reasons, breakdown })
}

/// Score a pair and, when an estimator has an opinion, average the two.
pub fn evaluate_with(
    cargo: &CargoRecord,
    vessel: &VesselRecord,
    estimator: Option<&dyn CompatibilityEstimator>,
) -> Evaluation {
    let evaluation = evaluate(cargo, vessel);
    let (Evaluation::Scored(mut scored), Some(estimator)) = (evaluation.clone(), estimator) else {
        return evaluation;
    };
    if let Some(external) = estimator.estimate(cargo, vessel) {
        let external = external.min(100);
        let blended = ((u16::from(scored.score) + u16::from(external) + 1) / 2) as u8;
        scored.reasons.push(format!(
            "Blended rule score {} with external estimate {} -> {}",
            scored.score, external, blended
        ));
        scored.score = blended;
    }
    Evaluation::Scored(scored)
}

fn reject(cargo: &CargoRecord, vessel: &VesselRecord, reason: String) -> Evaluation {
    debug!(cargo_id = %cargo.id, vessel_id = %vessel.id, reason = %reason, "Pair rejected");
    Evaluation::Rejected { reason }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Laycan, Quantity, QuantityUnit, StowageFactor, StowageUnit};
    use chrono::NaiveDate;

    fn cargo(qty: f64, commodity: &str, load: &str) -> CargoRecord {
        let quantity = Quantity::new(qty, QuantityUnit::Mt).unwrap();
        CargoRecord::new(commodity, quantity, load, "Alexandria").unwrap()
    }

    fn vessel(dwt: f64, port: &str) -> VesselRecord {
        VesselRecord::new("MV Test", dwt, port).unwrap()
    }

    fn scored(e: Evaluation) -> CompatibilityScore {
        match e {
            Evaluation::Scored(s) => s,
            Evaluation::Rejected { reason } => panic!("unexpected rejection: {reason}"),
        }
    }

    #[test]
    fn test_high_utilization_gets_full_tonnage_points() {
        let s = scored(evaluate(
            &cargo(9_000.0, "cement", "Constanta"),
            &vessel(10_000.0, "Istanbul"),
        ));
        assert_eq!(s.breakdown.tonnage, 30);
        assert!((s.breakdown.utilization - 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_overweight_cargo_is_rejected() {
        let e = evaluate(&cargo(11_000.0, "cement", "Constanta"), &vessel(10_000.0, "Istanbul"));
        assert!(e.is_rejected());
        assert_eq!(e.score(), None);
    }

    #[test]
    fn test_oversized_vessel_is_rejected() {
        let e = evaluate(&cargo(4_500.0, "cement", "Constanta"), &vessel(10_000.0, "Istanbul"));
        assert!(e.is_rejected());
    }

    #[test]
    fn test_tonnage_bands() {
        let v = vessel(10_000.0, "Istanbul");
        let t = |q| scored(evaluate(&cargo(q, "cement", "Constanta"), &v)).breakdown.tonnage;
        assert_eq!(t(10_000.0), 30);
        assert_eq!(t(8_000.0), 20);
        assert_eq!(t(5_000.0), 10);
    }

    #[test]
    fn test_volume_fit_and_shortfall() {
        let sf = StowageFactor { value: 50.0, unit: StowageUnit::CuftPerTon };
        let c = cargo(9_000.0, "cement", "Constanta").with_stowage(sf);
        // 9,000 × 50 × 1.05 = 472,500 cuft
        let roomy = vessel(10_000.0, "Istanbul").with_grain(500_000.0);
        let tight = vessel(10_000.0, "Istanbul").with_grain(450_000.0);
        assert_eq!(scored(evaluate(&c, &roomy)).breakdown.volume, Some(25));
        assert_eq!(scored(evaluate(&c, &tight)).breakdown.volume, Some(-15));

        let mut no_broken = c.clone();
        no_broken.broken_stowage_pct = Some(0.0);
        assert_eq!(scored(evaluate(&no_broken, &tight)).breakdown.volume, Some(25));
    }

    #[test]
    fn test_volume_skipped_without_numbers() {
        let s = scored(evaluate(
            &cargo(9_000.0, "cement", "Constanta"),
            &vessel(10_000.0, "Istanbul"),
        ));
        assert_eq!(s.breakdown.volume, None);
    }

    #[test]
    fn test_laycan_presence() {
        let d = |day| NaiveDate::from_ymd_opt(2025, 3, day).unwrap();
        let c = cargo(9_000.0, "cement", "Constanta")
            .with_laycan(Laycan::new(d(10), d(15)).unwrap());
        let v = vessel(10_000.0, "Istanbul");
        assert_eq!(scored(evaluate(&c, &v)).breakdown.laycan, 10);
        let v = v.with_available_from(d(12));
        assert_eq!(scored(evaluate(&c, &v)).breakdown.laycan, 20);
    }

    #[test]
    fn test_route_bands() {
        let near = scored(evaluate(
            &cargo(9_000.0, "cement", "Constanta"),
            &vessel(10_000.0, "Istanbul"),
        ));
        assert_eq!(near.breakdown.route, 20);
        assert!(near.breakdown.sailing_days < 1.0);

        let far = scored(evaluate(
            &cargo(9_000.0, "cement", "Constanta"),
            &vessel(10_000.0, "Rotterdam"),
        ));
        assert_eq!(far.breakdown.route, -15);
    }

    #[test]
    fn test_commodity_affinity() {
        let grain = scored(evaluate(
            &cargo(27_000.0, "Wheat", "Constanta"),
            &vessel(30_000.0, "Varna"),
        ));
        assert_eq!(grain.breakdown.commodity, 10);

        let mut small_bulker = vessel(9_500.0, "Varna");
        small_bulker.features = vec!["bulk".into()];
        let s = scored(evaluate(&cargo(9_000.0, "corn", "Constanta"), &small_bulker));
        assert_eq!(s.breakdown.commodity, 10);

        let geared = vessel(30_000.0, "Varna").with_gear(Gear::Geared);
        let s = scored(evaluate(&cargo(27_000.0, "steel coils", "Constanta"), &geared));
        assert_eq!(s.breakdown.commodity, 10);

        let gearless = vessel(30_000.0, "Varna").with_gear(Gear::Gearless);
        let s = scored(evaluate(&cargo(27_000.0, "steel coils", "Constanta"), &gearless));
        assert_eq!(s.breakdown.commodity, 0);
    }

    #[test]
    fn test_score_is_clamped_at_both_ends() {
        let sf = StowageFactor { value: 80.0, unit: StowageUnit::CuftPerTon };
        let low = cargo(5_500.0, "cement", "Constanta").with_stowage(sf);
        let v = vessel(10_000.0, "Rotterdam").with_grain(100_000.0);
        // +10 tonnage, -15 volume, 0 laycan, -15 route = -20
        let s = scored(evaluate(&low, &v));
        assert_eq!(s.breakdown.raw_total(), -20);
        assert_eq!(s.score, 0);

        let d = |day| NaiveDate::from_ymd_opt(2025, 3, day).unwrap();
        let sf = StowageFactor { value: 45.0, unit: StowageUnit::CuftPerTon };
        let best = cargo(29_000.0, "wheat", "Constanta")
            .with_stowage(sf)
            .with_laycan(Laycan::new(d(10), d(15)).unwrap());
        let v = vessel(30_000.0, "Varna").with_grain(1_500_000.0).with_available_from(d(9));
        // 30 + 25 + 20 + 20 + 10 = 105
        let s = scored(evaluate(&best, &v));
        assert_eq!(s.breakdown.raw_total(), 105);
        assert_eq!(s.score, 100);
        assert_eq!(s.recommendation(), Recommendation::Excellent);
        assert_eq!(s.reasons.len(), 5);
    }

    struct Flat(u8);

    impl CompatibilityEstimator for Flat {
        fn estimate(&self, _: &CargoRecord, _: &VesselRecord) -> Option<u8> {
            Some(self.0)
        }
    }

    #[test]
    fn test_external_estimate_is_averaged() {
        let c = cargo(9_000.0, "cement", "Constanta");
        let v = vessel(10_000.0, "Istanbul");
        let rules = evaluate(&c, &v).score().unwrap();
        let blended = evaluate_with(&c, &v, Some(&Flat(20))).score().unwrap();
        assert_eq!(u16::from(blended), (u16::from(rules) + 20 + 1) / 2);
    }

    #[test]
    fn test_estimator_cannot_rescue_a_rejection() {
        let c = cargo(11_000.0, "cement", "Constanta");
        let v = vessel(10_000.0, "Istanbul");
        assert!(evaluate_with(&c, &v, Some(&Flat(100))).is_rejected());
    }
}
