//! Ordered pattern grammars.
//!
//! Each field owns a list of rules. Rules are tried in order and the first
//! one that both matches and parses wins; later rules are never consulted.
//! A rule whose parser rejects its match (day 42, month "Foo") simply yields
//! nothing and the next rule gets its turn.

use regex::{Captures, Regex};
use std::ops::Range;
use tracing::trace;

/// Things a parser may need beyond the captures themselves.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Context {
    /// Year assumed when a date omits it.
    pub(crate) year: i32,
}

pub(crate) type Parser<T> = fn(&Captures<'_>, &Context) -> Option<T>;

pub(crate) struct Rule<T> {
    pub(crate) name: &'static str,
    pattern: Regex,
    parse: Parser<T>,
    /// `false`: only the leftmost regex match is offered to the parser.
    /// `true`: every match is offered in text order until one parses.
    scan_all: bool,
}

/// A successful rule application.
#[derive(Debug, Clone)]
pub(crate) struct Hit<T> {
    pub(crate) value: T,
    /// The matched substring (or the `raw` named group when the pattern has one).
    pub(crate) raw: String,
    pub(crate) span: Range<usize>,
}

impl<T> Rule<T> {
    /// Leftmost match only. If it does not parse, the rule is done.
    pub(crate) fn first(name: &'static str, pattern: &str, parse: Parser<T>) -> Self {
        Self::build(name, pattern, parse, false)
    }

    /// Walks every match until one parses.
    pub(crate) fn any(name: &'static str, pattern: &str, parse: Parser<T>) -> Self {
        Self::build(name, pattern, parse, true)
    }

    fn build(name: &'static str, pattern: &str, parse: Parser<T>, scan_all: bool) -> Self {
        let pattern = Regex::new(pattern)
            .unwrap_or_else(|e| panic!("extraction rule `{name}` has an invalid pattern: {e}"));
        Self { name, pattern, parse, scan_all }
    }

    pub(crate) fn apply(&self, text: &str, ctx: &Context) -> Option<Hit<T>> {
        if self.scan_all {
            self.pattern.captures_iter(text).find_map(|caps| self.parse_hit(&caps, ctx))
        } else {
            let caps = self.pattern.captures(text)?;
            self.parse_hit(&caps, ctx)
        }
    }

    /// Every parseable match, in text order.
    pub(crate) fn apply_all(&self, text: &str, ctx: &Context) -> Vec<Hit<T>> {
        self.pattern
            .captures_iter(text)
            .filter_map(|caps| self.parse_hit(&caps, ctx))
            .collect()
    }

    fn parse_hit(&self, caps: &Captures<'_>, ctx: &Context) -> Option<Hit<T>> {
        let value = (self.parse)(caps, ctx)?;
        let raw = caps.name("raw").or_else(|| caps.get(0))?;
        trace!(rule = self.name, raw = raw.as_str(), "Extraction rule matched");
        Some(Hit { value, raw: raw.as_str().trim().to_string(), span: raw.range() })
    }
}

/// First rule in `rules` that produces a value.
pub(crate) fn first_match<T>(rules: &[Rule<T>], text: &str, ctx: &Context) -> Option<Hit<T>> {
    rules.iter().find_map(|rule| rule.apply(text, ctx))
}

/// `"21,400"` -> `21400.0`
pub(crate) fn parse_number(s: &str) -> Option<f64> {
    let cleaned: String = s.chars().filter(|c| *c != ',' && !c.is_whitespace()).collect();
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

const MONTHS: [&str; 12] = [
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];

/// Month index 0..=11 from the first three letters, any case.
pub(crate) fn month_index(name: &str) -> Option<u32> {
    let prefix: String = name.chars().take(3).collect::<String>().to_lowercase();
    MONTHS.iter().position(|m| *m == prefix).map(|i| i as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> Context {
        Context { year: 2025 }
    }

    #[test]
    fn test_parse_number_strips_separators() {
        assert_eq!(parse_number("21,400"), Some(21_400.0));
        assert_eq!(parse_number("3.5"), Some(3.5));
        assert_eq!(parse_number("abc"), None);
    }

    #[test]
    fn test_month_index() {
        assert_eq!(month_index("Jan"), Some(0));
        assert_eq!(month_index("DECEMBER"), Some(11));
        assert_eq!(month_index("sept"), Some(8));
        assert_eq!(month_index("Foo"), None);
        assert_eq!(month_index("ma"), None);
    }

    #[test]
    fn test_first_rule_rejecting_falls_through() {
        let rules: Vec<Rule<u32>> = vec![
            Rule::first("too-big", r"(\d+)", |c, _| c[1].parse().ok().filter(|n: &u32| *n < 10)),
            Rule::first("anything", r"(\d+)", |c, _| c[1].parse().ok()),
        ];
        let hit = first_match(&rules, "42 and 7", &ctx()).unwrap();
        assert_eq!(hit.value, 42);
    }

    #[test]
    fn test_first_only_stops_at_leftmost_match() {
        let rule: Rule<u32> =
            Rule::first("small", r"(\d+)", |c, _| c[1].parse().ok().filter(|n: &u32| *n < 10));
        assert!(rule.apply("42 and 7", &ctx()).is_none());
    }

    #[test]
    fn test_any_walks_matches_until_one_parses() {
        let rule: Rule<u32> =
            Rule::any("small", r"(\d+)", |c, _| c[1].parse().ok().filter(|n: &u32| *n < 10));
        let hit = rule.apply("42 and 7", &ctx()).unwrap();
        assert_eq!(hit.value, 7);
        assert_eq!(hit.raw, "7");
        assert_eq!(hit.span, 7..8);
    }
}
