//! Reply parser module
//!
//! Turns the bot's freeform reply text into a deduplicated, typed sequence of
//! per-vendor results plus an optional free-text note. The bot repeats itself
//! across output sections and across edits, so the first occurrence of a
//! vendor name always wins. Parsing never fails: malformed input degrades to
//! a best-effort, possibly empty, result set.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Verdict state for one vendor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlatformStatus {
    Blocked,
    Unblocked,
    Loading,
    Error,
    Unknown,
}

/// One vendor's verdict for a URL
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformResult {
    /// Vendor name, unique per reply
    pub name: String,

    pub status: PlatformStatus,

    /// Vendor-reported category (e.g. "Malware")
    pub category: String,

    /// Verbatim verdict text the status was classified from
    pub detail: String,

    /// Vendor-reported check duration, when present
    pub elapsed_ms: Option<u64>,
}

/// Parsed reply: ordered results plus an optional trailing note
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedReply {
    pub results: Vec<PlatformResult>,
    pub note: Option<String>,
}

/// `<category> - <detail> (took <N>ms)`
static VALUE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?P<category>[^-]+?)\s*-\s*(?P<detail>.+?)\s*\(took\s*(?P<ms>\d+)\s*ms\)\s*$")
        .unwrap()
});

/// Timing suffix anywhere in a line
static TOOK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\(took\s*(?P<ms>\d+)\s*ms\)").unwrap());

/// Bare vendor-name line
static NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9 .&+/'_-]{0,63}$").unwrap());

/// Still-working marker, no timing suffix
static LOADING_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(loading|checking|pending|queued|in progress)\b").unwrap());

/// Failure marker, no timing suffix
static ERROR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(error|failed|failure|warning|unavailable|timed out)\b").unwrap());

/// Section header the bot prints above result blocks
static HEADER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^results?\s+for\b").unwrap());

/// Fixed disclaimer the bot appends once all checkers finish
static NOTE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^all checkers\b.*default settings\.?\s*$").unwrap());

/// Classify a verdict detail string.
///
/// "unblocked" must be tested before "blocked" since it contains it.
fn classify(detail: &str) -> PlatformStatus {
    let lower = detail.to_ascii_lowercase();
    if lower.contains("unblocked") {
        PlatformStatus::Unblocked
    } else if lower.contains("blocked") {
        PlatformStatus::Blocked
    } else {
        PlatformStatus::Unknown
    }
}

fn is_bare_name(line: &str) -> bool {
    NAME_RE.is_match(line) && !line.contains(" - ") && !TOOK_RE.is_match(line)
}

/// First occurrence of a name wins; repeats are discarded.
fn push_unique(reply: &mut ParsedReply, seen: &mut HashSet<String>, result: PlatformResult) {
    if seen.insert(result.name.to_ascii_lowercase()) {
        reply.results.push(result);
    }
}

/// Parse a `<category> - <detail> (took <N>ms)` value line.
fn parse_value(line: &str) -> Option<(String, String, u64)> {
    let captures = VALUE_RE.captures(line)?;
    let ms = captures.name("ms")?.as_str().parse().ok()?;
    Some((
        captures.name("category")?.as_str().trim().to_string(),
        captures.name("detail")?.as_str().trim().to_string(),
        ms,
    ))
}

/// Parse a compact `<name>: <category> - <detail> (took <N>ms)` line.
/// The separator between name and value varies across bot versions.
fn parse_compact(line: &str) -> Option<PlatformResult> {
    for separator in [": ", " — ", " -> "] {
        if let Some((name, rest)) = line.split_once(separator) {
            let name = name.trim();
            if name.is_empty() || !NAME_RE.is_match(name) {
                continue;
            }
            if let Some((category, detail, ms)) = parse_value(rest.trim()) {
                return Some(PlatformResult {
                    name: name.to_string(),
                    status: classify(&detail),
                    category,
                    detail,
                    elapsed_ms: Some(ms),
                });
            }
        }
    }
    None
}

/// Loosest recognizer: any timed line split on " - ".
///
/// Requires name, category, and detail segments, so a two-segment value line
/// already consumed by the two-line form never resurfaces under its category.
fn parse_loose(line: &str) -> Option<PlatformResult> {
    let ms: u64 = TOOK_RE
        .captures(line)?
        .name("ms")?
        .as_str()
        .parse()
        .ok()?;
    let stripped = TOOK_RE.replace(line, "");
    let segments: Vec<&str> = stripped.split(" - ").map(str::trim).collect();
    if segments.len() < 3 || segments[0].is_empty() {
        return None;
    }

    let detail = segments[2..].join(" - ");

    Some(PlatformResult {
        name: segments[0].trim_end_matches(':').to_string(),
        status: classify(&detail),
        category: segments[1].to_string(),
        detail,
        elapsed_ms: Some(ms),
    })
}

/// Parse the bot's reply into per-vendor results and an optional note.
///
/// `text` comes first, then the rendered rich-content fragments, matching the
/// order the session renders them.
pub fn parse_reply(text: &str, fragments: &[String]) -> ParsedReply {
    let mut combined = text.to_string();
    for fragment in fragments {
        if !combined.is_empty() {
            combined.push('\n');
        }
        combined.push_str(fragment);
    }

    let lines: Vec<&str> = combined.lines().map(str::trim).collect();
    let mut reply = ParsedReply::default();
    let mut seen: HashSet<String> = HashSet::new();

    let mut i = 0;
    while i < lines.len() {
        let line = lines[i];
        if line.is_empty() || HEADER_RE.is_match(line) {
            i += 1;
            continue;
        }
        if NOTE_RE.is_match(line) {
            reply.note.get_or_insert_with(|| line.to_string());
            i += 1;
            continue;
        }
        if let Some(result) = parse_compact(line) {
            push_unique(&mut reply, &mut seen, result);
            i += 1;
            continue;
        }

        // Two-line form: bare vendor name, then its value or marker line.
        if is_bare_name(line) {
            if let Some(&next) = lines.get(i + 1) {
                if let Some((category, detail, ms)) = parse_value(next) {
                    push_unique(
                        &mut reply,
                        &mut seen,
                        PlatformResult {
                            name: line.to_string(),
                            status: classify(&detail),
                            category,
                            detail,
                            elapsed_ms: Some(ms),
                        },
                    );
                    i += 2;
                    continue;
                }
                if !TOOK_RE.is_match(next) {
                    let marker = if LOADING_RE.is_match(next) {
                        Some(PlatformStatus::Loading)
                    } else if ERROR_RE.is_match(next) {
                        Some(PlatformStatus::Error)
                    } else {
                        None
                    };
                    if let Some(status) = marker {
                        push_unique(
                            &mut reply,
                            &mut seen,
                            PlatformResult {
                                name: line.to_string(),
                                status,
                                category: String::new(),
                                detail: next.to_string(),
                                elapsed_ms: None,
                            },
                        );
                        i += 2;
                        continue;
                    }
                }
            }
        }

        i += 1;
    }

    // The structured scan misses replies whose layout drifted. When it came up
    // short, sweep every timed line again with progressively looser patterns.
    let non_loading = reply
        .results
        .iter()
        .filter(|r| r.status != PlatformStatus::Loading)
        .count();
    if non_loading < 5 {
        let swept = lines
            .iter()
            .filter(|line| TOOK_RE.is_match(line))
            .filter_map(|line| parse_compact(line).or_else(|| parse_loose(line)))
            .collect::<Vec<_>>();
        if !swept.is_empty() {
            tracing::debug!(count = swept.len(), "loose sweep recovered timed lines");
        }
        for result in swept {
            push_unique(&mut reply, &mut seen, result);
        }
    }

    reply
}
