// =============================================================================
// gazetteer.rs — THE ATLAS OF PLACES SHIPS ACTUALLY GO
// =============================================================================
//
// A static, immutable list of ports (with coordinates where we have them) and
// commodities. Built once on first use, never mutated afterwards.
//
// Iteration order is part of the contract. When a fuzzy lookup has several
// candidates, the first one in insertion order wins, and when an email
// mentions three ports the full-text scan reports them in gazetteer order.
// Reorder the tables and you change which port becomes "load". Don't.
//
// Full-text scans use Aho-Corasick, the same automaton we used to hunt
// bankrupt trucking companies, now pointed at Constanta and Novorossiysk.
// =============================================================================

use aho_corasick::{AhoCorasick, MatchKind};
use serde::Serialize;
use std::fmt;
use std::sync::LazyLock;
use tracing::debug;

/// Sea areas. Used by the distance fallback when coordinates are missing.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Hash)]
pub enum Region {
    BlackSea,
    AzovSea,
    Marmara,
    Aegean,
    EastMed,
    CentralMed,
    WestMed,
    RedSea,
    NorthEurope,
    FarEast,
    Americas,
}

impl Region {
    /// Black Sea, Azov and Marmara ports are all a short hop from each other.
    pub fn is_black_sea_area(self) -> bool {
        matches!(self, Region::BlackSea | Region::AzovSea | Region::Marmara)
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Region::BlackSea => "Black Sea",
            Region::AzovSea => "Sea of Azov",
            Region::Marmara => "Marmara",
            Region::Aegean => "Aegean",
            Region::EastMed => "East Med",
            Region::CentralMed => "Central Med",
            Region::WestMed => "West Med",
            Region::RedSea => "Red Sea",
            Region::NorthEurope => "North Europe",
            Region::FarEast => "Far East",
            Region::Americas => "Americas",
        };
        write!(f, "{name}")
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
pub struct Port {
    /// Lowercase canonical name.
    pub name: &'static str,
    pub region: Region,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub country: Option<&'static str>,
}

impl Port {
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        Some((self.lat?, self.lon?))
    }
}

const fn port(
    name: &'static str,
    region: Region,
    lat: f64,
    lon: f64,
    country: &'static str,
) -> Port {
    Port { name, region, lat: Some(lat), lon: Some(lon), country: Some(country) }
}

/// Ports we know exist but have never bothered to look up on a chart.
const fn uncharted(name: &'static str, region: Region, country: &'static str) -> Port {
    Port { name, region, lat: None, lon: None, country: Some(country) }
}

static PORTS: &[Port] = &[
    // Black Sea
    port("constanta", Region::BlackSea, 44.1598, 28.6348, "RO"),
    port("novorossiysk", Region::BlackSea, 44.7167, 37.7833, "RU"),
    port("odessa", Region::BlackSea, 46.4825, 30.7233, "UA"),
    port("chornomorsk", Region::BlackSea, 46.3000, 30.6500, "UA"),
    port("izmail", Region::BlackSea, 45.3500, 28.8500, "UA"),
    port("reni", Region::BlackSea, 45.4500, 28.2833, "UA"),
    port("varna", Region::BlackSea, 43.1900, 27.9100, "BG"),
    port("burgas", Region::BlackSea, 42.4900, 27.4800, "BG"),
    port("samsun", Region::BlackSea, 41.2928, 36.3313, "TR"),
    port("tuapse", Region::BlackSea, 44.1000, 39.0667, "RU"),
    port("poti", Region::BlackSea, 42.1500, 41.6667, "GE"),
    port("batumi", Region::BlackSea, 41.6500, 41.6333, "GE"),
    uncharted("kavkaz", Region::BlackSea, "RU"),
    // Azov
    uncharted("yeysk", Region::AzovSea, "RU"),
    uncharted("azov", Region::AzovSea, "RU"),
    port("rostov", Region::AzovSea, 47.2357, 39.7015, "RU"),
    // Marmara
    port("istanbul", Region::Marmara, 41.0082, 28.9784, "TR"),
    port("ambarli", Region::Marmara, 40.9667, 28.6833, "TR"),
    port("tekirdag", Region::Marmara, 40.9833, 27.5167, "TR"),
    port("marmara ereglisi", Region::Marmara, 40.9667, 27.9500, "TR"),
    port("bandirma", Region::Marmara, 40.3500, 27.9667, "TR"),
    port("gemlik", Region::Marmara, 40.4333, 29.1500, "TR"),
    port("derince", Region::Marmara, 40.7500, 29.8167, "TR"),
    port("tuzla", Region::Marmara, 40.8167, 29.3000, "TR"),
    // Aegean
    port("izmir", Region::Aegean, 38.4237, 27.1428, "TR"),
    port("aliaga", Region::Aegean, 38.8000, 26.9667, "TR"),
    port("piraeus", Region::Aegean, 37.9420, 23.6465, "GR"),
    port("thessaloniki", Region::Aegean, 40.6401, 22.9444, "GR"),
    port("volos", Region::Aegean, 39.3600, 22.9400, "GR"),
    // East Med
    port("mersin", Region::EastMed, 36.8000, 34.6333, "TR"),
    port("iskenderun", Region::EastMed, 36.5872, 36.1735, "TR"),
    port("alexandria", Region::EastMed, 31.2001, 29.9187, "EG"),
    port("damietta", Region::EastMed, 31.4165, 31.8133, "EG"),
    port("port said", Region::EastMed, 31.2653, 32.3019, "EG"),
    port("beirut", Region::EastMed, 33.9000, 35.5167, "LB"),
    port("limassol", Region::EastMed, 34.6786, 33.0413, "CY"),
    port("ashdod", Region::EastMed, 31.8167, 34.6500, "IL"),
    // Central / West Med
    port("ravenna", Region::CentralMed, 44.4184, 12.1990, "IT"),
    port("koper", Region::CentralMed, 45.5481, 13.7302, "SI"),
    port("genoa", Region::WestMed, 44.4056, 8.9463, "IT"),
    port("barcelona", Region::WestMed, 41.3851, 2.1734, "ES"),
    port("tarragona", Region::WestMed, 41.1189, 1.2445, "ES"),
    port("valencia", Region::WestMed, 39.4699, -0.3763, "ES"),
    port("algeciras", Region::WestMed, 36.1408, -5.4562, "ES"),
    port("casablanca", Region::WestMed, 33.5731, -7.5898, "MA"),
    // Red Sea
    port("jeddah", Region::RedSea, 21.4858, 39.1925, "SA"),
    port("aqaba", Region::RedSea, 29.5320, 35.0063, "JO"),
    // North Europe
    port("rotterdam", Region::NorthEurope, 51.9244, 4.4777, "NL"),
    port("antwerp", Region::NorthEurope, 51.2194, 4.4025, "BE"),
    port("hamburg", Region::NorthEurope, 53.5511, 9.9937, "DE"),
    port("gdansk", Region::NorthEurope, 54.3520, 18.6466, "PL"),
    // Far East
    port("singapore", Region::FarEast, 1.2903, 103.8520, "SG"),
    port("shanghai", Region::FarEast, 31.2304, 121.4737, "CN"),
    port("yokohama", Region::FarEast, 35.4437, 139.6380, "JP"),
    // Americas
    port("santos", Region::Americas, -23.9608, -46.3336, "BR"),
    port("houston", Region::Americas, 29.7604, -95.3698, "US"),
    port("new orleans", Region::Americas, 29.9511, -90.0715, "US"),
];

/// Specific before generic: "steel coils" has to win over "steel".
static COMMODITIES: &[&str] = &[
    "sunflower seeds",
    "sunflower meal",
    "rapeseed",
    "soybean meal",
    "soybeans",
    "wheat",
    "corn",
    "maize",
    "barley",
    "rice",
    "sugar",
    "grain",
    "hot rolled coils",
    "steel coils",
    "steel pipes",
    "steel billets",
    "steel slabs",
    "wire rods",
    "rebars",
    "steel",
    "scrap",
    "pig iron",
    "iron ore",
    "coal",
    "petcoke",
    "ammonium nitrate",
    "urea",
    "fertilizer",
    "cement",
    "clinker",
    "salt",
    "sulphur",
    "bauxite",
    "alumina",
    "feldspar",
    "marble blocks",
    "timber",
    "logs",
];

/// The lookup interface over the static tables.
pub struct Gazetteer {
    ports: &'static [Port],
    commodities: &'static [&'static str],
    port_automaton: AhoCorasick,
    commodity_automaton: AhoCorasick,
}

static GLOBAL: LazyLock<Gazetteer> = LazyLock::new(|| {
    Gazetteer::build(PORTS, COMMODITIES)
        .expect("static gazetteer tables must compile into an automaton")
});

impl Gazetteer {
    /// The process-wide gazetteer.
    pub fn global() -> &'static Gazetteer {
        &GLOBAL
    }

    fn build(
        ports: &'static [Port],
        commodities: &'static [&'static str],
    ) -> Result<Self, aho_corasick::BuildError> {
        let port_automaton = AhoCorasick::builder()
            .ascii_case_insensitive(true)
            .match_kind(MatchKind::Standard)
            .build(ports.iter().map(|p| p.name))?;
        let commodity_automaton = AhoCorasick::builder()
            .ascii_case_insensitive(true)
            .match_kind(MatchKind::Standard)
            .build(commodities)?;
        debug!(
            ports = ports.len(),
            commodities = commodities.len(),
            "Gazetteer automatons built"
        );
        Ok(Self { ports, commodities, port_automaton, commodity_automaton })
    }

    pub fn ports(&self) -> &[Port] {
        self.ports
    }

    pub fn commodities(&self) -> &[&'static str] {
        self.commodities
    }

    /// Resolve a free-text port name.
    ///
    /// Exact (trimmed, case-insensitive) match first. Otherwise the first port
    /// in insertion order where either string contains the other, so
    /// "Port of Istanbul" and "istanbul" land on the same entry.
    pub fn find_port(&self, text: &str) -> Option<&Port> {
        let needle = text.trim().to_lowercase();
        if needle.is_empty() {
            return None;
        }
        self.ports
            .iter()
            .find(|p| p.name == needle)
            .or_else(|| {
                self.ports
                    .iter()
                    .find(|p| needle.contains(p.name) || p.name.contains(needle.as_str()))
            })
    }

    /// Same lookup rules as `find_port`, over the commodity table.
    pub fn find_commodity(&self, text: &str) -> Option<&'static str> {
        let needle = text.trim().to_lowercase();
        if needle.is_empty() {
            return None;
        }
        self.commodities
            .iter()
            .copied()
            .find(|c| *c == needle)
            .or_else(|| {
                self.commodities
                    .iter()
                    .copied()
                    .find(|c| needle.contains(c) || c.contains(needle.as_str()))
            })
    }

    /// Every port mentioned as a whole word in `text`, in gazetteer order.
    pub fn ports_in(&self, text: &str) -> Vec<&Port> {
        scan_in_table_order(&self.port_automaton, text)
            .into_iter()
            .map(|idx| &self.ports[idx])
            .collect()
    }

    /// Every commodity mentioned as a whole word in `text`, in gazetteer order.
    pub fn commodities_in(&self, text: &str) -> Vec<&'static str> {
        scan_in_table_order(&self.commodity_automaton, text)
            .into_iter()
            .map(|idx| self.commodities[idx])
            .collect()
    }
}

/// One overlapping pass; returns the distinct pattern indices that matched on
/// word boundaries, sorted by table position.
fn scan_in_table_order(automaton: &AhoCorasick, text: &str) -> Vec<usize> {
    let mut hits: Vec<usize> = automaton
        .find_overlapping_iter(text)
        .filter(|m| on_word_boundary(text, m.start(), m.end()))
        .map(|m| m.pattern().as_usize())
        .collect();
    hits.sort_unstable();
    hits.dedup();
    hits
}

fn on_word_boundary(text: &str, start: usize, end: usize) -> bool {
    let bytes = text.as_bytes();
    let before_ok = start == 0 || !bytes[start - 1].is_ascii_alphanumeric();
    let after_ok = end >= bytes.len() || !bytes[end].is_ascii_alphanumeric();
    before_ok && after_ok
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fuzzy_port_lookup_matches_exact() {
        let g = Gazetteer::global();
        let fuzzy = g.find_port("Port of Istanbul").unwrap();
        let exact = g.find_port("istanbul").unwrap();
        assert_eq!(fuzzy.name, exact.name);
        assert_eq!(fuzzy.coordinates(), exact.coordinates());
    }

    #[test]
    fn test_port_lookup_is_case_insensitive_and_trimmed() {
        let g = Gazetteer::global();
        assert_eq!(g.find_port("  CONSTANTA ").unwrap().name, "constanta");
    }

    #[test]
    fn test_partial_name_resolves_through_containment() {
        let g = Gazetteer::global();
        assert_eq!(g.find_port("Eregli").unwrap().name, "marmara ereglisi");
    }

    #[test]
    fn test_unknown_and_empty_ports_do_not_resolve() {
        let g = Gazetteer::global();
        assert!(g.find_port("Timbuktu").is_none());
        assert!(g.find_port("   ").is_none());
    }

    #[test]
    fn test_ports_in_reports_gazetteer_order() {
        let g = Gazetteer::global();
        // Text order is Alexandria then Constanta; gazetteer order is the reverse.
        let hits = g.ports_in("Alexandria discharge, load Constanta");
        let names: Vec<_> = hits.iter().map(|p| p.name).collect();
        assert_eq!(names, vec!["constanta", "alexandria"]);
    }

    #[test]
    fn test_ports_in_respects_word_boundaries() {
        let g = Gazetteer::global();
        assert!(g.ports_in("serenity and potions").is_empty());
    }

    #[test]
    fn test_commodity_scan_prefers_specific_entries() {
        let g = Gazetteer::global();
        let hits = g.commodities_in("5,000 mt Steel Coils");
        assert_eq!(hits.first().copied(), Some("steel coils"));
        assert!(hits.contains(&"steel"));
    }

    #[test]
    fn test_uncharted_ports_have_no_coordinates() {
        let g = Gazetteer::global();
        let kavkaz = g.find_port("kavkaz").unwrap();
        assert!(kavkaz.coordinates().is_none());
        assert!(kavkaz.region.is_black_sea_area());
    }
}
