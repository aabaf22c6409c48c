// =============================================================================
// classifier.rs — IS THIS EMAIL SELLING A SHIP OR BUYING ONE?
// =============================================================================
//
// Every broker email is one of two things: somebody has a cargo and wants a
// ship, or somebody has a ship and wants a cargo. Occasionally it is a lunch
// invitation. We need to know which before deciding whether the extraction
// result becomes a CargoRecord or a VesselRecord.
//
// Two opinions, one referee:
//
// 1. KeywordClassifier: Aho-Corasick over two keyword lists, counting
//    distinct hits. "laycan", "wheat", "need vessel" on one side; "m/v",
//    "dwt", "open", "geared" on the other.
//
// 2. PatternClassifier: structural signals. A tonnage with MT, a laycan
//    window and "looking for a vessel" look like a cargo. A ship name, an
//    open position and grain capacity look like a vessel.
//
// 3. CombinedClassifier: if they agree, average the confidence. If they
//    disagree, the more confident one wins. If one shrugs, ask the other.
// =============================================================================

use aho_corasick::{AhoCorasick, MatchKind};
use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::sync::LazyLock;
use tracing::debug;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EmailLabel {
    Cargo,
    Vessel,
    Unknown,
}

impl fmt::Display for EmailLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EmailLabel::Cargo => write!(f, "CARGO"),
            EmailLabel::Vessel => write!(f, "VESSEL"),
            EmailLabel::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
pub struct Classification {
    pub label: EmailLabel,
    /// 0.0..=1.0
    pub confidence: f64,
}

impl Classification {
    pub fn unknown() -> Self {
        Self { label: EmailLabel::Unknown, confidence: 0.0 }
    }

    /// Winner takes the label, confidence is its share of the total.
    fn from_tally(cargo: f64, vessel: f64) -> Self {
        let total = cargo + vessel;
        if total <= 0.0 || (cargo - vessel).abs() < f64::EPSILON {
            return Self::unknown();
        }
        if cargo > vessel {
            Self { label: EmailLabel::Cargo, confidence: cargo / total }
        } else {
            Self { label: EmailLabel::Vessel, confidence: vessel / total }
        }
    }
}

pub trait EmailClassifier: Send + Sync {
    fn classify(&self, text: &str) -> Classification;
}

// =============================================================================
// KEYWORDS
// =============================================================================

static CARGO_KEYWORDS: &[&str] = &[
    "cargo", "shipment", "loading", "discharge", "commodity", "mt", "metric tons",
    "teu", "container", "bulk", "breakbulk", "project cargo", "reefer",
    "grain", "coal", "iron ore", "steel", "chemical", "oil", "lng", "cement",
    "timber", "logs", "rice", "wheat", "sugar", "fertilizer", "bauxite",
    "alumina", "copper", "nickel", "scrap", "metal", "frozen", "food",
    "electronics", "automotive", "parts", "machinery", "equipment",
    "need vessel", "looking for vessel", "require vessel", "booking",
    "freight rate", "laycan", "load port", "discharge port", "destination",
];

static VESSEL_KEYWORDS: &[&str] = &[
    "vessel", "ship", "mv", "m/v", "dwt", "draft", "loa", "beam", "open",
    "available", "position", "charter", "hire", "tc", "time charter",
    "voyage charter", "spot", "panamax", "capesize", "handymax", "handysize",
    "supramax", "ultramax", "vlcc", "suezmax", "aframax", "tanker",
    "bulk carrier", "container vessel", "general cargo", "multipurpose",
    "mpp", "heavy lift", "chemical tanker", "product tanker", "lng carrier",
    "lpg carrier", "car carrier", "pctc", "roro", "reefer vessel",
    "crane", "gear", "geared", "gearless", "holds", "hatches",
    "ice class", "double hull", "certificates", "class", "flag",
];

fn build_automaton(keywords: &[&str]) -> AhoCorasick {
    AhoCorasick::builder()
        .ascii_case_insensitive(true)
        .match_kind(MatchKind::Standard)
        .build(keywords)
        .expect("keyword lists are plain ASCII and always compile")
}

static CARGO_AUTOMATON: LazyLock<AhoCorasick> = LazyLock::new(|| build_automaton(CARGO_KEYWORDS));
static VESSEL_AUTOMATON: LazyLock<AhoCorasick> =
    LazyLock::new(|| build_automaton(VESSEL_KEYWORDS));

/// Distinct keywords found as whole words. "mt" inside "shipment" does not count.
fn distinct_hits(automaton: &AhoCorasick, text: &str) -> usize {
    let bytes = text.as_bytes();
    let mut seen: Vec<usize> = automaton
        .find_overlapping_iter(text)
        .filter(|m| {
            let before_ok = m.start() == 0 || !bytes[m.start() - 1].is_ascii_alphanumeric();
            let after_ok = m.end() >= bytes.len() || !bytes[m.end()].is_ascii_alphanumeric();
            before_ok && after_ok
        })
        .map(|m| m.pattern().as_usize())
        .collect();
    seen.sort_unstable();
    seen.dedup();
    seen.len()
}

/// Counts distinct cargo vs vessel vocabulary.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordClassifier;

impl KeywordClassifier {
    /// `(cargo_hits, vessel_hits)`
    pub fn tally(&self, text: &str) -> (usize, usize) {
        (distinct_hits(&CARGO_AUTOMATON, text), distinct_hits(&VESSEL_AUTOMATON, text))
    }
}

impl EmailClassifier for KeywordClassifier {
    fn classify(&self, text: &str) -> Classification {
        let (cargo, vessel) = self.tally(text);
        let result = Classification::from_tally(cargo as f64, vessel as f64);
        debug!(
            cargo_hits = cargo,
            vessel_hits = vessel,
            label = %result.label,
            "Keyword classification"
        );
        result
    }
}

// =============================================================================
// STRUCTURE
// =============================================================================

struct Signal {
    name: &'static str,
    pattern: Regex,
    weight: f64,
    label: EmailLabel,
}

fn signal(name: &'static str, pattern: &str, weight: f64, label: EmailLabel) -> Signal {
    Signal {
        name,
        pattern: Regex::new(pattern).expect("valid regex"),
        weight,
        label,
    }
}

static SIGNALS: LazyLock<Vec<Signal>> = LazyLock::new(|| {
    use EmailLabel::{Cargo, Vessel};
    vec![
        signal(
            "tonnage",
            r"(?i)\b\d[\d,]*(?:\.\d+)?\s*(?:mts?|metric\s+tons?|tons?)\b(?:\s*(?:±|\+/-))?",
            2.0,
            Cargo,
        ),
        signal(
            "laycan",
            r"(?i)\blaycan\b|\b\d{1,2}\s*[-/–]\s*\d{1,2}\s+(?:jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)",
            1.0,
            Cargo,
        ),
        signal(
            "seeking-tonnage",
            r"(?i)\b(?:need|needs|require|requires|looking\s+for)\s+(?:a\s+|suitable\s+)?(?:vessel|ship|tonnage)\b|\bpls\s+offer\b",
            3.0,
            Cargo,
        ),
        signal("port-prefix", r"(?i)\b(?:load|pol|disch(?:arge)?|pod)\s*[:=]", 1.0, Cargo),
        signal("vessel-name", r"(?i)\bm\s*/?\s*v\.?\s+[a-z0-9]", 2.0, Vessel),
        signal("dwt", r"(?i)\b\d[\d,]*\s*k?\s*dwt\b", 1.0, Vessel),
        signal("open-position", r"(?i)\bopen(?:ing)?\s*[:=]?\s+(?:at\s+|in\s+)?[a-z]", 3.0, Vessel),
        signal("capacity", r"(?i)\b(?:grain|bale)\b[^\n]{0,20}\b(?:cbft|cuft|cbm)\b", 1.0, Vessel),
        signal("gear", r"(?i)\bgear(?:ed|less)\b", 1.0, Vessel),
        signal("availability", r"(?i)\b(?:prompt|spot|available|position)\b", 1.0, Vessel),
    ]
});

/// Weighs structural signals.
#[derive(Debug, Clone, Copy, Default)]
pub struct PatternClassifier;

impl EmailClassifier for PatternClassifier {
    fn classify(&self, text: &str) -> Classification {
        let (mut cargo, mut vessel) = (0.0, 0.0);
        let mut fired: Vec<&'static str> = Vec::new();
        for s in SIGNALS.iter().filter(|s| s.pattern.is_match(text)) {
            match s.label {
                EmailLabel::Cargo => cargo += s.weight,
                EmailLabel::Vessel => vessel += s.weight,
                EmailLabel::Unknown => {}
            }
            fired.push(s.name);
        }
        let result = Classification::from_tally(cargo, vessel);
        debug!(signals = ?fired, label = %result.label, "Pattern classification");
        result
    }
}

// =============================================================================
// REFEREE
// =============================================================================

/// Two classifiers, one answer.
#[derive(Debug, Clone, Default)]
pub struct CombinedClassifier<A, B> {
    primary: A,
    secondary: B,
}

/// Keywords first, structure second.
pub type DefaultClassifier = CombinedClassifier<KeywordClassifier, PatternClassifier>;

impl<A: EmailClassifier, B: EmailClassifier> CombinedClassifier<A, B> {
    pub fn new(primary: A, secondary: B) -> Self {
        Self { primary, secondary }
    }

    /// The combination rule on its own, so it can be tested without text.
    pub fn combine(a: Classification, b: Classification) -> Classification {
        match (a.label, b.label) {
            (EmailLabel::Unknown, EmailLabel::Unknown) => Classification::unknown(),
            (EmailLabel::Unknown, _) => b,
            (_, EmailLabel::Unknown) => a,
            (x, y) if x == y => Classification {
                label: x,
                confidence: (a.confidence + b.confidence) / 2.0,
            },
            // Disagreement: the louder voice wins, the primary on a dead heat.
            _ if b.confidence > a.confidence => b,
            _ => a,
        }
    }
}

impl<A: EmailClassifier, B: EmailClassifier> EmailClassifier for CombinedClassifier<A, B> {
    fn classify(&self, text: &str) -> Classification {
        Self::combine(self.primary.classify(text), self.secondary.classify(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CARGO_EMAIL: &str = "Pls offer suitable vessel for 25,000 mt wheat\n\
                               load: Constanta / disch: Alexandria\n\
                               laycan 10-15 March";

    const VESSEL_EMAIL: &str = "MV STAR EAGLE 55,000 dwt supramax geared\n\
                                open Constanta 15-20 March\n\
                                grain 2,400,000 cbft";

    struct Fixed(Classification);

    impl EmailClassifier for Fixed {
        fn classify(&self, _: &str) -> Classification {
            self.0
        }
    }

    fn c(label: EmailLabel, confidence: f64) -> Classification {
        Classification { label, confidence }
    }

    #[test]
    fn test_keyword_classifier_reads_cargo_vocabulary() {
        let result = KeywordClassifier.classify(CARGO_EMAIL);
        assert_eq!(result.label, EmailLabel::Cargo);
        assert!(result.confidence > 0.5 && result.confidence <= 1.0);
    }

    #[test]
    fn test_keyword_hits_respect_word_boundaries() {
        // "shipment" contains "ship" and "mt" but only "shipment" counts.
        assert_eq!(KeywordClassifier.tally("shipment"), (1, 0));
    }

    #[test]
    fn test_pattern_classifier_spots_a_position_list() {
        let result = PatternClassifier.classify(VESSEL_EMAIL);
        assert_eq!(result.label, EmailLabel::Vessel);
    }

    #[test]
    fn test_default_classifier_on_both_kinds() {
        let classifier = DefaultClassifier::default();
        assert_eq!(classifier.classify(CARGO_EMAIL).label, EmailLabel::Cargo);
        assert_eq!(classifier.classify(VESSEL_EMAIL).label, EmailLabel::Vessel);
        assert_eq!(classifier.classify("lunch on friday?").label, EmailLabel::Unknown);
    }

    #[test]
    fn test_agreement_averages_confidence() {
        let combined = CombinedClassifier::new(
            Fixed(c(EmailLabel::Cargo, 0.6)),
            Fixed(c(EmailLabel::Cargo, 1.0)),
        );
        let r = combined.classify("");
        assert_eq!(r.label, EmailLabel::Cargo);
        assert!((r.confidence - 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_disagreement_picks_the_more_confident() {
        let r = CombinedClassifier::<Fixed, Fixed>::combine(
            c(EmailLabel::Cargo, 0.55),
            c(EmailLabel::Vessel, 0.9),
        );
        assert_eq!(r, c(EmailLabel::Vessel, 0.9));

        let tie = CombinedClassifier::<Fixed, Fixed>::combine(
            c(EmailLabel::Cargo, 0.7),
            c(EmailLabel::Vessel, 0.7),
        );
        assert_eq!(tie.label, EmailLabel::Cargo);
    }

    #[test]
    fn test_unknown_defers_to_the_other_side() {
        let r = CombinedClassifier::<Fixed, Fixed>::combine(
            Classification::unknown(),
            c(EmailLabel::Vessel, 0.6),
        );
        assert_eq!(r, c(EmailLabel::Vessel, 0.6));
        let r = CombinedClassifier::<Fixed, Fixed>::combine(
            Classification::unknown(),
            Classification::unknown(),
        );
        assert_eq!(r.label, EmailLabel::Unknown);
    }
}
