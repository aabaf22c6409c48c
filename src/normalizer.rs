// =============================================================================
// normalizer.rs — THE EMAIL DECLUTTERER
// =============================================================================
//
// Broker emails arrive wrapped in HTML, quoted four replies deep, and
// followed by a legal disclaimer longer than the charter party. This module
// peels all of that off before the extractor sees the text.
//
// Line structure survives normalisation: the extractor's captures stop at
// line ends, so flattening everything into one line would make "load:
// Constanta" swallow the rest of the email.
//
// Nothing in here can fail. Garbage in, shorter garbage out.
// =============================================================================

use regex::Regex;
use std::sync::LazyLock;

static BLOCK_BREAK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)<\s*br\s*/?\s*>|<\s*/\s*(?:p|div|tr|li|h[1-6])\s*>").expect("valid regex")
});

static HTML_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").expect("valid regex"));

static HTML_ENTITY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"&(?:nbsp|amp|lt|gt|quot|#39|apos);").expect("valid regex"));

/// Everything after one of these is somebody else's email.
static REPLY_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^-{2,}\s*(?:original|forwarded)\s+message\s*-{2,}|^on\s.+\swrote:$")
        .expect("valid regex")
});

/// Header lines echoed into a quoted reply. `From:` only counts when it
/// carries an address, because "From: Constanta" is a load port.
static ECHO_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:sent|subject)\s*:|^from\s*:.*(?:@|<|mailto)").expect("valid regex")
});

/// First line that mentions one of these ends the useful part.
static SIGNATURE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:regards|disclaimer|confidential)\b").expect("valid regex")
});

/// "with regards to the laycan" is body text, not a sign-off.
fn opens_signature(line: &str) -> bool {
    SIGNATURE.find_iter(line).any(|m| {
        !(m.as_str().eq_ignore_ascii_case("regards")
            && line[m.end()..].trim_start().to_ascii_lowercase().starts_with("to "))
    })
}

static INLINE_SPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t\u{a0}\u{2007}\u{202f}]+").expect("valid regex"));

/// Clean raw email text for extraction.
pub fn normalize(raw: &str) -> String {
    let mut text = raw.replace("\r\n", "\n").replace('\r', "\n");

    // Only pay for the HTML passes when there is something that looks like markup.
    if memchr::memchr(b'<', text.as_bytes()).is_some() {
        text = BLOCK_BREAK.replace_all(&text, "\n").into_owned();
        text = HTML_TAG.replace_all(&text, " ").into_owned();
    }
    if memchr::memchr(b'&', text.as_bytes()).is_some() {
        text = HTML_ENTITY
            .replace_all(&text, |caps: &regex::Captures| match &caps[0] {
                "&nbsp;" => " ",
                "&amp;" => "&",
                "&lt;" => "<",
                "&gt;" => ">",
                "&quot;" => "\"",
                _ => "'",
            })
            .into_owned();
    }

    let mut lines: Vec<String> = Vec::new();
    for line in text.lines() {
        let line = INLINE_SPACE.replace_all(line, " ");
        let line = line.trim();

        if REPLY_MARKER.is_match(line) || opens_signature(line) {
            break;
        }
        if line.starts_with('>') || ECHO_HEADER.is_match(line) {
            continue;
        }
        if line.is_empty() && lines.last().map_or(true, |l| l.is_empty()) {
            continue;
        }
        lines.push(line.to_string());
    }

    while lines.last().is_some_and(|l| l.is_empty()) {
        lines.pop();
    }
    lines.join("\n")
}
