// =============================================================================
// geo.rs — HOW FAR IS IT, ROUGHLY, IF YOU SQUINT
// =============================================================================
//
// Great-circle distance between two named ports, plus the sailing-time rule
// of thumb the desk uses: 10 knots, 20% extra for the fact that ships do not
// sail through Anatolia.
//
// This never fails. A port we cannot place gets a heuristic distance:
// 240 NM if it smells like the Black Sea or Marmara, 600 NM otherwise.
// =============================================================================

use serde::Serialize;
use tracing::debug;

use crate::gazetteer::Gazetteer;

pub const EARTH_RADIUS_NM: f64 = 3440.065;
pub const ASSUMED_SPEED_KNOTS: f64 = 10.0;
pub const ROUTE_DEVIATION_FACTOR: f64 = 1.20;
pub const BLACK_SEA_FALLBACK_NM: f64 = 240.0;
pub const UNKNOWN_FALLBACK_NM: f64 = 600.0;

/// How a distance was obtained. Shows up in match reasons so nobody mistakes
/// a guess for a measurement.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub enum DistanceSource {
    GreatCircle,
    RegionalFallback,
    UnknownFallback,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
pub struct RouteEstimate {
    pub distance_nm: f64,
    pub sailing_days: f64,
    pub source: DistanceSource,
}

/// Haversine distance in nautical miles.
pub fn haversine_nm(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let (phi1, phi2) = (lat1.to_radians(), lat2.to_radians());
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lon2 - lon1).to_radians();

    let a = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_NM * c
}

/// `distance × 1.20 / 10 / 24`
pub fn sailing_days(distance_nm: f64) -> f64 {
    distance_nm * ROUTE_DEVIATION_FACTOR / ASSUMED_SPEED_KNOTS / 24.0
}

/// Distance between two free-text port names.
pub fn port_distance_nm(from: &str, to: &str) -> (f64, DistanceSource) {
    let gazetteer = Gazetteer::global();
    let from_port = gazetteer.find_port(from);
    let to_port = gazetteer.find_port(to);

    if let (Some(a), Some(b)) = (
        from_port.and_then(|p| p.coordinates()),
        to_port.and_then(|p| p.coordinates()),
    ) {
        return (haversine_nm(a.0, a.1, b.0, b.1), DistanceSource::GreatCircle);
    }

    let smells_regional = [from, to].iter().any(|name| {
        let lower = name.to_lowercase();
        lower.contains("black") || lower.contains("marmara")
    });
    let both_in_black_sea_area = matches!(
        (from_port, to_port),
        (Some(a), Some(b)) if a.region.is_black_sea_area() && b.region.is_black_sea_area()
    );

    if smells_regional || both_in_black_sea_area {
        debug!(from = from, to = to, "Port coordinates missing, Black Sea area fallback");
        (BLACK_SEA_FALLBACK_NM, DistanceSource::RegionalFallback)
    } else {
        debug!(from = from, to = to, "Port coordinates missing, generic fallback");
        (UNKNOWN_FALLBACK_NM, DistanceSource::UnknownFallback)
    }
}

/// Distance plus sailing time, the thing the scorer actually wants.
pub fn estimate_route(from: &str, to: &str) -> RouteEstimate {
    let (distance_nm, source) = port_distance_nm(from, to);
    RouteEstimate { distance_nm, sailing_days: sailing_days(distance_nm), source }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_istanbul_constanta_great_circle() {
        let (d, source) = port_distance_nm("Istanbul", "Constanta");
        assert_eq!(source, DistanceSource::GreatCircle);
        // Straight-line across the western Black Sea is a touch under 190 NM.
        assert!((d - 190.0).abs() < 19.0, "got {d}");
    }

    #[test]
    fn test_sailing_days_formula() {
        let est = estimate_route("Istanbul", "Constanta");
        assert!((est.sailing_days - est.distance_nm * 1.2 / 10.0 / 24.0).abs() < 1e-12);
        assert!((sailing_days(600.0) - 3.0).abs() < 1e-12);
        assert!((sailing_days(240.0) - 1.2).abs() < 1e-12);
    }

    #[test]
    fn test_same_port_is_zero_distance() {
        let (d, _) = port_distance_nm("varna", "Port of Varna");
        assert!(d.abs() < 1e-9);
    }

    #[test]
    fn test_black_sea_name_heuristic() {
        let (d, source) = port_distance_nm("Black Sea anchorage", "Nowhere Bay");
        assert_eq!(d, BLACK_SEA_FALLBACK_NM);
        assert_eq!(source, DistanceSource::RegionalFallback);

        let (d, _) = port_distance_nm("Marmara roads", "Constanta");
        assert_eq!(d, BLACK_SEA_FALLBACK_NM);
    }

    #[test]
    fn test_uncharted_black_sea_ports_use_regional_fallback() {
        let (d, source) = port_distance_nm("kavkaz", "yeysk");
        assert_eq!(d, BLACK_SEA_FALLBACK_NM);
        assert_eq!(source, DistanceSource::RegionalFallback);
    }

    #[test]
    fn test_unknown_ports_use_generic_fallback() {
        let (d, source) = port_distance_nm("Atlantis", "El Dorado");
        assert_eq!(d, UNKNOWN_FALLBACK_NM);
        assert_eq!(source, DistanceSource::UnknownFallback);
    }

    #[test]
    fn test_haversine_is_symmetric() {
        let ab = haversine_nm(41.0, 29.0, 31.2, 29.9);
        let ba = haversine_nm(31.2, 29.9, 41.0, 29.0);
        assert!((ab - ba).abs() < 1e-9);
    }
}
