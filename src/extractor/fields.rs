// =============================================================================
// fields.rs — THE RULEBOOK
// =============================================================================
//
// One ordered rule table per field. The order inside a table is the priority:
// the more specific spelling goes first ("21,400 MT ± 1,250 MT" before a bare
// "21,400 MT"), because the first rule that parses wins.
//
// Patterns are written with three placeholders spliced in at build time:
//   <NUM>  a number with optional thousands separators and decimals
//   <MON>  a month name (named group `mon`)
//   <PORT> a port-ish run of letters up to the end of the phrase (group `port`)
// =============================================================================

use chrono::NaiveDate;
use regex::Captures;
use std::ops::Range;
use std::sync::LazyLock;

use super::grammar::{first_match, month_index, parse_number, Context, Hit, Rule};
use super::{CraneCapacity, DwtRange, Extracted, ExtractedFields};
use crate::gazetteer::Gazetteer;
use crate::models::{
    Gear, Laycan, Quantity, QuantityUnit, StowageFactor, StowageUnit, CUFT_PER_CBM,
};

const NUM: &str = r"\d{1,3}(?:,\d{3})+(?:\.\d+)?|\d+(?:\.\d+)?";
const MON: &str = r"(?P<mon>jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)[a-z]*\.?";
const PORT: &str = r"(?P<port>[a-z][a-z .'-]{1,40})";
const QUNIT: &str = r"metric\s+tonnes?|metric\s+tons?|mts?|tonnes?|tons?";
const PER_DAY: &str = r"(?:/\s*d(?:ay)?\b|per\s+day|pdpr|pwwd|pd\b)";

fn pat(template: &str) -> String {
    template
        .replace("<NUM>", NUM)
        .replace("<MON>", MON)
        .replace("<PORT>", PORT)
        .replace("<QUNIT>", QUNIT)
        .replace("<PER_DAY>", PER_DAY)
}

fn group<'t>(caps: &Captures<'t>, name: &str) -> Option<&'t str> {
    caps.name(name).map(|m| m.as_str())
}

// =============================================================================
// LAYCAN
// =============================================================================

fn laycan_from(caps: &Captures<'_>, ctx: &Context) -> Option<Laycan> {
    let d1: u32 = group(caps, "d1")?.parse().ok()?;
    let d2: u32 = group(caps, "d2")?.parse().ok()?;
    if !(1..=31).contains(&d1) || !(1..=31).contains(&d2) {
        return None;
    }
    let month = month_index(group(caps, "mon")?)? + 1;
    let year = match group(caps, "year") {
        Some(y) => y.parse().ok()?,
        None => ctx.year,
    };
    let start = NaiveDate::from_ymd_opt(year, month, d1)?;
    let end = NaiveDate::from_ymd_opt(year, month, d2)?;
    Laycan::new(start, end).ok()
}

static LAYCAN_RULES: LazyLock<Vec<Rule<Laycan>>> = LazyLock::new(|| {
    vec![
        Rule::first(
            "day-range-month",
            &pat(r"(?i)\b(?P<d1>\d{1,2})\s*-\s*(?P<d2>\d{1,2})\s+<MON>(?:\s+(?P<year>\d{4})\b)?"),
            laycan_from,
        ),
        Rule::first(
            "month-day-range",
            &pat(r"(?i)\b<MON>\s+(?P<d1>\d{1,2})\s*[-–—]\s*(?P<d2>\d{1,2})\b(?:\s*,?\s*(?P<year>\d{4})\b)?"),
            laycan_from,
        ),
        Rule::first(
            "day-slash-month",
            &pat(r"(?i)\b(?P<d1>\d{1,2})\s*/\s*(?P<d2>\d{1,2})\s+<MON>(?:\s+(?P<year>\d{4})\b)?"),
            laycan_from,
        ),
        Rule::first(
            "day-dash-month",
            &pat(r"(?i)\b(?P<d1>\d{1,2})\s*[–—]\s*(?P<d2>\d{1,2})\s+<MON>(?:\s+(?P<year>\d{4})\b)?"),
            laycan_from,
        ),
    ]
});

// =============================================================================
// QUANTITY
// =============================================================================

fn quantity_unit(raw: &str) -> QuantityUnit {
    if raw.trim_start().to_lowercase().starts_with('m') {
        QuantityUnit::Mt
    } else {
        QuantityUnit::Tons
    }
}

fn quantity_from(caps: &Captures<'_>, _: &Context) -> Option<Quantity> {
    // A rate ("5,000 mt pdpr") or a ship size ("35,000 mt dwt") is not a cargo.
    if caps.name("skip").is_some() {
        return None;
    }
    let value = parse_number(group(caps, "qty")?)?;
    let quantity = Quantity::new(value, quantity_unit(group(caps, "unit")?)).ok()?;
    Some(match group(caps, "tol") {
        Some(tol) => quantity.with_tolerance(tol.trim()),
        None => quantity,
    })
}

static QUANTITY_RULES: LazyLock<Vec<Rule<Quantity>>> = LazyLock::new(|| {
    vec![
        Rule::first(
            "absolute-tolerance",
            &pat(r"(?i)\b(?P<qty><NUM>)\s*(?P<unit><QUNIT>)\s*(?:±|\+/-|\+-)\s*(?P<tol>(?:<NUM>)\s*(?:<QUNIT>))\b"),
            quantity_from,
        ),
        Rule::first(
            "percent-tolerance",
            &pat(r"(?i)\b(?P<qty><NUM>)\s*(?P<unit><QUNIT>)\s*(?:±|\+/-|\+-)\s*(?P<tol>\d{1,2}(?:\.\d+)?\s*%)"),
            quantity_from,
        ),
        Rule::any(
            "plain",
            &pat(r"(?i)\b(?P<qty><NUM>)\s*(?P<unit><QUNIT>)\b(?P<skip>\s*(?:<PER_DAY>|dwt\b|dwcc\b))?"),
            quantity_from,
        ),
    ]
});

// =============================================================================
// DWT
// =============================================================================

fn scaled(number: &str, k: bool) -> Option<f64> {
    let v = parse_number(number)?;
    Some(if k { v * 1000.0 } else { v })
}

/// "25/30k": the k on the second number covers a bare small first number too.
fn dwt_pair(caps: &Captures<'_>, _: &Context) -> Option<DwtRange> {
    let (ak, bk) = (caps.name("ak").is_some(), caps.name("bk").is_some());
    let mut a = scaled(group(caps, "a")?, ak)?;
    let b = scaled(group(caps, "b")?, bk)?;
    if bk && !ak && a < 1000.0 {
        a *= 1000.0;
    }
    Some(DwtRange { min: Some(a.min(b)), max: Some(a.max(b)) })
}

fn dwt_minimum(caps: &Captures<'_>, _: &Context) -> Option<DwtRange> {
    let a = scaled(group(caps, "a")?, caps.name("ak").is_some())?;
    Some(DwtRange { min: Some(a), max: None })
}

fn dwt_single(caps: &Captures<'_>, ctx: &Context) -> Option<DwtRange> {
    if caps.name("plus").is_some() {
        return dwt_minimum(caps, ctx);
    }
    let a = scaled(group(caps, "a")?, caps.name("ak").is_some())?;
    Some(DwtRange::exact(a))
}

static DWT_RULES: LazyLock<Vec<Rule<DwtRange>>> = LazyLock::new(|| {
    vec![
        Rule::first(
            "dash-range",
            &pat(r"(?i)\b(?P<a><NUM>)\s*(?P<ak>k)?\s*[-–—]\s*(?P<b><NUM>)\s*(?P<bk>k)?\s*(?:mt\s*)?dwt\b"),
            dwt_pair,
        ),
        Rule::first(
            "need-require",
            &pat(r"(?i)\b(?:need(?:s|ed|ing)?|requir(?:e|es|ed|ing))\b[^\n\d]{0,30}?(?P<a><NUM>)\s*(?P<ak>k)?\s*\+?\s*(?:mt\s*)?dwt\b"),
            dwt_minimum,
        ),
        Rule::first(
            "slash-range",
            &pat(r"(?i)\b(?P<a><NUM>)\s*(?P<ak>k)?\s*/\s*(?P<b><NUM>)\s*(?P<bk>k)?\s*(?:mt\s*)?dwt\b"),
            dwt_pair,
        ),
        // The leading guard stops a slash range whose left side failed to parse
        // from being read as its right side alone.
        Rule::first(
            "plain",
            &pat(r"(?i)(?:^|[^/\d,.])(?P<raw>(?P<a><NUM>)\s*(?P<ak>k)?\s*(?P<plus>\+)?\s*(?:mt\s*)?dwt\b)"),
            dwt_single,
        ),
    ]
});

// =============================================================================
// PORTS
// =============================================================================

/// Words that end a port phrase: whatever follows is not part of the name.
const PORT_STOPS: &[&str] = &[
    " to ", " - ", " disch", " laycan", " load", " on ", " from ", " for ", " via ", " or ",
    " and ", " next ", " end ", " early ", " mid ", " abt ", " about ", " around ", " spot",
    " ppt", " prompt", " dely", " eta ", " basis", " range", " area", " with ",
];

fn clean_port(raw: &str) -> Option<String> {
    let mut lower = format!("{} ", raw.to_lowercase());
    if let Some(cut) = PORT_STOPS.iter().filter_map(|stop| lower.find(stop)).min() {
        lower.truncate(cut);
    }
    let trimmed = lower.trim().trim_matches(|c: char| c == '-' || c == '.' || c == '\'').trim();
    let trimmed = trimmed.strip_prefix("port of ").unwrap_or(trimmed);
    let trimmed = trimmed.strip_suffix(" port").unwrap_or(trimmed);
    let words: Vec<&str> = trimmed.split_whitespace().take(3).collect();
    let cleaned = words.join(" ");
    (cleaned.len() >= 3).then_some(cleaned)
}

pub(crate) fn title_case(s: &str) -> String {
    s.split_whitespace()
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// A captured name, canonicalised to the gazetteer spelling when it resolves.
fn canonical_port(raw: &str) -> Option<String> {
    let cleaned = clean_port(raw)?;
    Some(match Gazetteer::global().find_port(&cleaned) {
        Some(port) => title_case(port.name),
        None => title_case(&cleaned),
    })
}

fn port_from(caps: &Captures<'_>, _: &Context) -> Option<String> {
    canonical_port(group(caps, "port")?)
}

/// "Constanta / Alexandria". Only counts when the left side names a real port
/// as a whole word, otherwise "and/or" would become a load port.
fn shorthand_port(caps: &Captures<'_>, _: &Context) -> Option<String> {
    let left = group(caps, "port")?;
    Gazetteer::global().ports_in(left).first().map(|p| title_case(p.name))
}

static LOAD_PORT_RULES: LazyLock<Vec<Rule<String>>> = LazyLock::new(|| {
    vec![
        Rule::first(
            "load-prefix",
            &pat(r"(?i)\b(?:load(?:ing)?(?:\s+port)?|pol)\s*[:=]\s*(?:port\s+of\s+)?<PORT>"),
            port_from,
        ),
        Rule::first("from-prefix", &pat(r"(?i)\bfrom\s*:\s*<PORT>"), port_from),
        Rule::first("ex-prefix", &pat(r"(?i)\bex[:\s]\s*<PORT>"), port_from),
        Rule::any(
            "slash-shorthand",
            r"(?i)\b(?P<port>[a-z]{3,}(?:\s[a-z]{3,})?)\s*/\s*(?P<other>[a-z]{3,}(?:\s[a-z]{3,})?)\b",
            shorthand_port,
        ),
    ]
});

static DISCHARGE_PORT_RULES: LazyLock<Vec<Rule<String>>> = LazyLock::new(|| {
    vec![
        Rule::first(
            "disch-prefix",
            &pat(r"(?i)\b(?:disch(?:arge|arging)?(?:\s+port)?|pod)\s*[:=]\s*(?:port\s+of\s+)?<PORT>"),
            port_from,
        ),
        Rule::first("to-prefix", &pat(r"(?i)\bto\s*:\s*<PORT>"), port_from),
    ]
});

fn same_port(a: &str, b: &str) -> bool {
    let g = Gazetteer::global();
    match (g.find_port(a), g.find_port(b)) {
        (Some(x), Some(y)) => x.name == y.name,
        _ => a.eq_ignore_ascii_case(b),
    }
}

/// Prefix rules first, then whatever the gazetteer spots in the text fills
/// the gaps: first hit to load, next distinct hit to discharge. A port
/// already taken by the other side is never reused.
fn extract_ports(
    text: &str,
    ctx: &Context,
) -> (Option<Extracted<String>>, Option<Extracted<String>>) {
    let mut load: Option<Extracted<String>> =
        first_match(&LOAD_PORT_RULES, text, ctx).map(Into::into);
    let mut discharge: Option<Extracted<String>> =
        first_match(&DISCHARGE_PORT_RULES, text, ctx).map(Into::into);

    if load.is_some() && discharge.is_some() {
        return (load, discharge);
    }

    for port in Gazetteer::global().ports_in(text) {
        let name = title_case(port.name);
        if load.is_none() {
            if discharge.as_ref().is_some_and(|d| same_port(&d.value, &name)) {
                continue;
            }
            load = Some(Extracted::new(name, port.name));
        } else if discharge.is_none()
            && load.as_ref().is_some_and(|l| !same_port(&l.value, &name))
        {
            discharge = Some(Extracted::new(name, port.name));
        }
        if load.is_some() && discharge.is_some() {
            break;
        }
    }
    (load, discharge)
}

// =============================================================================
// RATES
// =============================================================================

fn rate_from(caps: &Captures<'_>, _: &Context) -> Option<f64> {
    scaled(group(caps, "rate")?, caps.name("k").is_some()).filter(|v| *v >= 1.0)
}

const RATE_TAIL: &str = r"(?P<rate><NUM>)\s*(?P<k>k)?\s*(?:metric\s+tons?|mts?|tons?|t)?\s*<PER_DAY>";

static LOAD_RATE_RULES: LazyLock<Vec<Rule<f64>>> = LazyLock::new(|| {
    vec![Rule::first(
        "load-rate",
        &pat(&format!(r"(?i)\bload(?:ing)?(?:\s+rate)?\s*[:=]?\s*(?:at\s+)?{RATE_TAIL}")),
        rate_from,
    )]
});

static DISCHARGE_RATE_RULES: LazyLock<Vec<Rule<f64>>> = LazyLock::new(|| {
    vec![Rule::first(
        "discharge-rate",
        &pat(&format!(r"(?i)\bdisch(?:arge|arging)?(?:\s+rate)?\s*[:=]?\s*(?:at\s+)?{RATE_TAIL}")),
        rate_from,
    )]
});

static ANY_RATE: LazyLock<Rule<f64>> =
    LazyLock::new(|| Rule::any("unprefixed-rate", &pat(&format!(r"(?i)\b{RATE_TAIL}")), rate_from));

fn overlaps(a: &Range<usize>, b: &Range<usize>) -> bool {
    a.start < b.end && b.start < a.end
}

fn extract_rates(text: &str, ctx: &Context) -> (Option<Hit<f64>>, Option<Hit<f64>>) {
    let mut loading = first_match(&LOAD_RATE_RULES, text, ctx);
    let mut discharging = first_match(&DISCHARGE_RATE_RULES, text, ctx);

    let taken: Vec<Range<usize>> =
        loading.iter().chain(discharging.iter()).map(|h| h.span.clone()).collect();
    let free = ANY_RATE
        .apply_all(text, ctx)
        .into_iter()
        .filter(|hit| !taken.iter().any(|t| overlaps(t, &hit.span)));

    for hit in free {
        if loading.is_none() {
            loading = Some(hit);
        } else if discharging.is_none() {
            discharging = Some(hit);
        } else {
            break;
        }
    }
    (loading, discharging)
}

// =============================================================================
// COMMODITY
// =============================================================================

const COMPOUND_STOPWORDS: &[&str] =
    &["of", "and", "the", "in", "with", "for", "mt", "mts", "tons", "no"];

fn labelled_commodity(caps: &Captures<'_>, _: &Context) -> Option<String> {
    let c = group(caps, "c")?.trim().trim_end_matches(['-', '/', '&']).trim().to_lowercase();
    (c.len() >= 3).then_some(c)
}

fn compound_commodity(caps: &Captures<'_>, _: &Context) -> Option<String> {
    let first = group(caps, "w")?.to_lowercase();
    if COMPOUND_STOPWORDS.contains(&first.as_str()) {
        return None;
    }
    Some(group(caps, "c")?.to_lowercase())
}

static COMMODITY_RULES: LazyLock<Vec<Rule<String>>> = LazyLock::new(|| {
    vec![
        Rule::first(
            "cargo-label",
            r"(?i)\b(?:cargo|commodity)\s*:\s*(?P<c>[a-z][a-z /&-]{2,40})",
            labelled_commodity,
        ),
        Rule::any(
            "compound",
            r"(?i)\b(?P<c>(?P<w>[a-z]+)\s+(?:pipes|coils|billets|plates|bars|beams|slabs|sheets|tubes|bags|bales|blocks|rods))\b",
            compound_commodity,
        ),
    ]
});

fn extract_commodity(text: &str, ctx: &Context) -> Option<Extracted<String>> {
    if let Some(hit) = Gazetteer::global().commodities_in(text).first() {
        return Some(Extracted::new(hit.to_string(), *hit));
    }
    first_match(&COMMODITY_RULES, text, ctx).map(Into::into)
}

// =============================================================================
// CONSTRAINTS
// =============================================================================

static SIMPLE_CONSTRAINTS: LazyLock<Vec<Rule<&'static str>>> = LazyLock::new(|| {
    vec![
        Rule::first("no-transshipment", r"(?i)\bno\s+trans-?s?hipments?\b", |_, _| {
            Some("no transshipment")
        }),
        Rule::first("solo-cargo", r"(?i)\bsolo\s+cargo\b", |_, _| Some("solo cargo")),
        Rule::first("box-shaped", r"(?i)\bbox[\s-]?shaped\b", |_, _| Some("box-shaped")),
    ]
});

fn age_from(caps: &Captures<'_>, _: &Context) -> Option<u32> {
    group(caps, "n")?.parse().ok().filter(|n| (1..=40).contains(n))
}

static VESSEL_AGE_RULES: LazyLock<Vec<Rule<u32>>> = LazyLock::new(|| {
    vec![
        Rule::first(
            "max-n-years",
            r"(?i)\bmax(?:imum)?\.?\s*(?:age\s*)?[:=]?\s*(?P<n>\d{1,2})\s*(?:years?|yrs?|y\.?o\.?|y\b)",
            age_from,
        ),
        Rule::first(
            "age-max-n",
            r"(?i)\bage\s*(?:max(?:imum)?\.?|<=?|below|under|up\s+to)\s*:?\s*(?P<n>\d{1,2})\b",
            age_from,
        ),
        Rule::first("not-older-than", r"(?i)\bnot\s+older\s+than\s+(?P<n>\d{1,2})\b", age_from),
        Rule::first("n-years-max", r"(?i)\b(?P<n>\d{1,2})\s*(?:years?|yrs?)\s+max\b", age_from),
    ]
});

/// Things that follow "no" and contain a slash but are not countries.
const NOT_FLAGS: &[&str] =
    &["transshipment", "transhipment", "lightering", "lighterage", "or", "and"];

fn flags_from(caps: &Captures<'_>, _: &Context) -> Option<Vec<String>> {
    let flags: Vec<String> = group(caps, "f")?
        .split('/')
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .map(title_case)
        .collect();
    let bogus = flags.iter().any(|f| NOT_FLAGS.contains(&f.to_lowercase().as_str()));
    (!flags.is_empty() && !bogus).then_some(flags)
}

static FLAG_RULES: LazyLock<Vec<Rule<Vec<String>>>> = LazyLock::new(|| {
    vec![
        Rule::first(
            "no-x-flag",
            r"(?i)\bno\s+(?P<f>[a-z]+(?:\s*/\s*[a-z]+)*)\s+flag(?:s|ged)?\b",
            flags_from,
        ),
        Rule::first(
            "excl-flags",
            r"(?i)\bexcl(?:uding|ude|\.)?\s+(?P<f>[a-z]+(?:\s*/\s*[a-z]+)*)\s+flags?\b",
            flags_from,
        ),
        Rule::first("no-list", r"(?i)\bno\s+(?P<f>[a-z]+(?:\s*/\s*[a-z]+)+)", flags_from),
    ]
});

fn crane_from(caps: &Captures<'_>, _: &Context) -> Option<CraneCapacity> {
    let swl_tons = parse_number(group(caps, "swl")?).filter(|v| *v > 0.0)?;
    let count = group(caps, "count").and_then(|c| c.parse().ok());
    Some(CraneCapacity { swl_tons, count })
}

static CRANE_RULES: LazyLock<Vec<Rule<CraneCapacity>>> = LazyLock::new(|| {
    vec![
        Rule::first(
            "count-x-swl",
            r"(?i)\b(?P<count>\d)\s*x\s*(?P<swl>\d{1,3}(?:\.\d+)?)\s*(?:mt|t|tons?)\b\s*(?:swl\s*)?(?:cranes?|derricks?|swl)\b",
            crane_from,
        ),
        Rule::first(
            "cranes-swl",
            r"(?i)\b(?:cranes?|derricks?)\s*(?:of\s+|:\s*|swl\s*)*(?:min\.?\s*)?(?P<swl>\d{1,3}(?:\.\d+)?)\s*(?:mt|t|tons?)\b",
            crane_from,
        ),
        Rule::first(
            "swl",
            r"(?i)\bswl\s*:?\s*(?:min\.?\s*)?(?P<swl>\d{1,3}(?:\.\d+)?)\s*(?:mt|t|tons?)\b",
            crane_from,
        ),
        Rule::first(
            "swl-cranes",
            r"(?i)\b(?P<swl>\d{1,3}(?:\.\d+)?)\s*(?:mt|t|tons?)\s*(?:swl\s+)?cranes?\b",
            crane_from,
        ),
    ]
});

fn extract_constraints(text: &str, ctx: &Context, fields: &mut ExtractedFields) {
    let mut constraints: Vec<Extracted<String>> = SIMPLE_CONSTRAINTS
        .iter()
        .filter_map(|rule| rule.apply(text, ctx))
        .map(|hit| Extracted::new(hit.value.to_string(), hit.raw))
        .collect();

    if let Some(hit) = first_match(&VESSEL_AGE_RULES, text, ctx) {
        constraints.push(Extracted::new(format!("max age {} years", hit.value), hit.raw.clone()));
        fields.vessel_age = Some(hit.into());
    }
    if let Some(hit) = first_match(&FLAG_RULES, text, ctx) {
        constraints.push(Extracted::new(
            format!("excluded flags: {}", hit.value.join(", ")),
            hit.raw.clone(),
        ));
        fields.exclude_flags = Some(hit.into());
    }
    if let Some(hit) = first_match(&CRANE_RULES, text, ctx) {
        let label = match hit.value.count {
            Some(n) => format!("{} x {} t cranes", n, hit.value.swl_tons),
            None => format!("cranes min {} t SWL", hit.value.swl_tons),
        };
        constraints.push(Extracted::new(label, hit.raw.clone()));
        fields.crane_cap = Some(hit.into());
    }

    fields.constraints = constraints;
}

// =============================================================================
// COMMERCIAL TERMS
// =============================================================================

fn percent_from(caps: &Captures<'_>, _: &Context) -> Option<f64> {
    parse_number(group(caps, "pct")?).filter(|p| *p > 0.0 && *p <= 10.0)
}

static COMMISSION_RULES: LazyLock<Vec<Rule<f64>>> = LazyLock::new(|| {
    vec![
        Rule::first(
            "pct-comm",
            r"(?i)(?P<pct>\d{1,2}(?:\.\d{1,2})?)\s*%\s*(?:ttl\s+|total\s+|add(?:ress)?\s+)?(?:comm(?:ission)?|adcom|brokerage)\b",
            percent_from,
        ),
        Rule::first(
            "comm-pct",
            r"(?i)\b(?:comm(?:ission)?|adcom|brokerage)\s*[:=]?\s*(?P<pct>\d{1,2}(?:\.\d{1,2})?)\s*%",
            percent_from,
        ),
    ]
});

fn charterer_from(caps: &Captures<'_>, _: &Context) -> Option<String> {
    let name = group(caps, "name")?.trim().trim_end_matches(['.', '-']).trim();
    (3..=50).contains(&name.chars().count()).then(|| name.to_string())
}

static CHARTERER_RULES: LazyLock<Vec<Rule<String>>> = LazyLock::new(|| {
    vec![
        Rule::first(
            "charterers",
            r"(?i)\b(?:charterers?|chrtrs?|chtrs?)\s*[:=-]\s*(?P<name>[^\n,;]{1,80})",
            charterer_from,
        ),
        Rule::first(
            "account",
            r"(?i)\b(?:account|acct)\s*:\s*(?P<name>[^\n,;]{1,80})",
            charterer_from,
        ),
    ]
});

fn amount_from(caps: &Captures<'_>, _: &Context) -> Option<f64> {
    parse_number(group(caps, "amt")?).filter(|v| *v > 0.0)
}

static FREIGHT_IDEA_RULES: LazyLock<Vec<Rule<f64>>> = LazyLock::new(|| {
    vec![
        Rule::first(
            "freight-idea",
            r"(?i)\b(?:freight\s+idea|frt\s+idea|idea|freight)\s*[:=-]?\s*(?:(?:abt\.?|about|around|usd|us\$|\$)\s*)*(?P<amt>\d{1,4}(?:\.\d{1,2})?)\s*(?:usd|\$)?\s*(?:pmt|/\s*mt|per\s+mt|fio\w*|lumpsum|ls)\b",
            amount_from,
        ),
        Rule::first(
            "usd-per-mt",
            r"(?i)(?:\busd|\bus\$|\$)\s*(?P<amt>\d{1,4}(?:\.\d{1,2})?)\s*(?:pmt|/\s*mt|per\s+mt)\b",
            amount_from,
        ),
    ]
});

// =============================================================================
// VESSEL PARTICULARS
// =============================================================================

static VESSEL_TYPE_RULES: LazyLock<Vec<Rule<String>>> = LazyLock::new(|| {
    vec![Rule::first(
        "vessel-type",
        r"(?i)\b(?P<t>handysize|handymax|supramax|ultramax|kamsarmax|post[\s-]?panamax|panamax|capesize|mini[\s-]?bulker|bulk\s+carrier|bulker|general\s+cargo|multi[\s-]?purpose|mpp|tween[\s-]?decker|coaster)\b",
        |caps, _| {
            let t = group(caps, "t")?;
            Some(t.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase())
        },
    )]
});

static VESSEL_NAME_RULES: LazyLock<Vec<Rule<String>>> = LazyLock::new(|| {
    vec![Rule::first(
        "m-v-name",
        r#"(?im)\bm\s*/?\s*v\.?\s+["']?(?P<name>[a-z0-9][a-z0-9 .'-]{1,30}?)["']?\s*(?:[,(;]|\s(?:\d|open|dwt|built|blt|geared|gearless|bulk|handy|supra|ultra|pana|kamsar|flag)|$)"#,
        |caps, _| {
            let name = group(caps, "name")?.trim().trim_end_matches('.').trim();
            (name.len() >= 2).then(|| name.to_string())
        },
    )]
});

fn cuft_from(caps: &Captures<'_>, _: &Context) -> Option<f64> {
    let n = parse_number(group(caps, "n")?).filter(|v| *v > 0.0)?;
    let unit = group(caps, "u")?.to_lowercase();
    Some(if unit == "cbm" || unit == "m3" { n * CUFT_PER_CBM } else { n })
}

const CAPACITY_UNIT: &str = r"(?P<u>cbft|cuft|cbf|cft|cbm|m3)";

static GRAIN_RULES: LazyLock<Vec<Rule<f64>>> = LazyLock::new(|| {
    vec![
        Rule::first(
            "grain-first",
            &pat(&format!(r"(?i)\bgrain\s*(?:cap(?:acity)?\.?\s*)?[:=]?\s*(?P<n><NUM>)\s*{CAPACITY_UNIT}\b")),
            cuft_from,
        ),
        Rule::first(
            "grain-last",
            &pat(&format!(r"(?i)\b(?P<n><NUM>)\s*{CAPACITY_UNIT}\s*grain\b")),
            cuft_from,
        ),
    ]
});

static BALE_RULES: LazyLock<Vec<Rule<f64>>> = LazyLock::new(|| {
    vec![
        Rule::first(
            "bale-first",
            &pat(&format!(r"(?i)\bbale\s*(?:cap(?:acity)?\.?\s*)?[:=]?\s*(?P<n><NUM>)\s*{CAPACITY_UNIT}\b")),
            cuft_from,
        ),
        Rule::first(
            "bale-last",
            &pat(&format!(r"(?i)\b(?P<n><NUM>)\s*{CAPACITY_UNIT}\s*bale\b")),
            cuft_from,
        ),
    ]
});

static GEAR_RULES: LazyLock<Vec<Rule<Gear>>> = LazyLock::new(|| {
    vec![
        Rule::first("gearless", r"(?i)\bgearless\b", |_, _| Some(Gear::Gearless)),
        Rule::first("geared", r"(?i)\bgeared\b", |_, _| Some(Gear::Geared)),
        Rule::first("cranes", r"(?i)\b(?:cranes?|derricks?)\b", |_, _| Some(Gear::Geared)),
    ]
});

static SPEED_RULES: LazyLock<Vec<Rule<f64>>> = LazyLock::new(|| {
    vec![Rule::first(
        "knots",
        r"(?i)\b(?P<n>\d{1,2}(?:\.\d{1,2})?)\s*(?:kn|kns|kts|knots)\b",
        |caps, _| parse_number(group(caps, "n")?).filter(|v| (4.0..=25.0).contains(v)),
    )]
});

static OPEN_PORT_RULES: LazyLock<Vec<Rule<String>>> = LazyLock::new(|| {
    vec![Rule::first(
        "open-port",
        &pat(r"(?i)\bopen(?:ing)?\s*[:=]?\s+(?:at\s+|in\s+|spot\s+)?<PORT>"),
        port_from,
    )]
});

static OPEN_DATE_RULES: LazyLock<Vec<Rule<NaiveDate>>> = LazyLock::new(|| {
    vec![Rule::first(
        "open-date",
        &pat(r"(?i)\bopen\b[^\n]*?\b(?P<d>\d{1,2})(?:\s*[-–/]\s*\d{1,2})?(?:st|nd|rd|th)?\s+<MON>(?:\s+(?P<year>\d{4})\b)?"),
        |caps, ctx| {
            let day: u32 = group(caps, "d")?.parse().ok()?;
            let month = month_index(group(caps, "mon")?)? + 1;
            let year = match group(caps, "year") {
                Some(y) => y.parse().ok()?,
                None => ctx.year,
            };
            NaiveDate::from_ymd_opt(year, month, day)
        },
    )]
});

/// Without a unit, anything over 10 is cuft/t and anything under is m3/t.
/// Nobody quotes 8 cuft/t, and nobody quotes 45 m3/t.
fn stowage_from(caps: &Captures<'_>, _: &Context) -> Option<StowageFactor> {
    let value = parse_number(group(caps, "n")?).filter(|v| *v > 0.0)?;
    let unit = match group(caps, "u").map(str::to_lowercase).as_deref() {
        Some("m3") | Some("cbm") => StowageUnit::CbmPerTon,
        Some(_) => StowageUnit::CuftPerTon,
        None if value > 10.0 => StowageUnit::CuftPerTon,
        None => StowageUnit::CbmPerTon,
    };
    Some(StowageFactor { value, unit })
}

static STOWAGE_RULES: LazyLock<Vec<Rule<StowageFactor>>> = LazyLock::new(|| {
    vec![Rule::first(
        "stowage-factor",
        r"(?i)\b(?:s\.?f\.?|stowage(?:\s+factor)?)\s*[:=]?\s*(?:abt\.?\s*|about\s*|approx\.?\s*)?(?P<n>\d{1,3}(?:\.\d{1,2})?)\s*(?P<u>cuft|cbft|cft|cbf|m3|cbm)?",
        stowage_from,
    )]
});

static BROKEN_STOWAGE_RULES: LazyLock<Vec<Rule<f64>>> = LazyLock::new(|| {
    vec![
        Rule::first(
            "broken-stowage-first",
            r"(?i)\b(?:broken\s+stowage|bss)\s*[:=]?\s*(?P<pct>\d{1,2}(?:\.\d+)?)\s*%",
            |caps, _| parse_number(group(caps, "pct")?).filter(|p| *p >= 0.0),
        ),
        Rule::first(
            "broken-stowage-last",
            r"(?i)(?P<pct>\d{1,2}(?:\.\d+)?)\s*%\s*broken\s+stowage\b",
            |caps, _| parse_number(group(caps, "pct")?).filter(|p| *p >= 0.0),
        ),
    ]
});

// =============================================================================
// ENTRY POINT
// =============================================================================

fn take<T>(rules: &[Rule<T>], text: &str, ctx: &Context) -> Option<Extracted<T>> {
    first_match(rules, text, ctx).map(Into::into)
}

/// Run every rule table over `text`.
pub(crate) fn extract_all(text: &str, ctx: &Context) -> ExtractedFields {
    let (load_port, discharge_port) = extract_ports(text, ctx);
    let (loading_rate, discharging_rate) = extract_rates(text, ctx);

    let mut fields = ExtractedFields {
        commodity: extract_commodity(text, ctx),
        quantity: take(&QUANTITY_RULES, text, ctx),
        load_port,
        discharge_port,
        laycan: take(&LAYCAN_RULES, text, ctx),
        dwt: take(&DWT_RULES, text, ctx),
        loading_rate: loading_rate.map(Into::into),
        discharging_rate: discharging_rate.map(Into::into),
        commission: take(&COMMISSION_RULES, text, ctx),
        charterer: take(&CHARTERER_RULES, text, ctx),
        freight_idea: take(&FREIGHT_IDEA_RULES, text, ctx),
        vessel_name: take(&VESSEL_NAME_RULES, text, ctx),
        vessel_type: take(&VESSEL_TYPE_RULES, text, ctx),
        grain_cuft: take(&GRAIN_RULES, text, ctx),
        bale_cuft: take(&BALE_RULES, text, ctx),
        gear: take(&GEAR_RULES, text, ctx),
        speed_knots: take(&SPEED_RULES, text, ctx),
        open_port: take(&OPEN_PORT_RULES, text, ctx),
        open_date: take(&OPEN_DATE_RULES, text, ctx),
        stowage_factor: take(&STOWAGE_RULES, text, ctx),
        broken_stowage_pct: take(&BROKEN_STOWAGE_RULES, text, ctx),
        ..ExtractedFields::default()
    };
    extract_constraints(text, ctx, &mut fields);
    fields
}
