//! Line record parser.
//!
//! Turns one raw log line into an ordered [`Record`]:
//!
//! ```text
//! 2024-03-01 12:00:01 ALERT storage check disk=/dev/sda1 issue=Disk nearly full (severity: critical).
//! └────── timestamp ─┘ └type┘ └svc─┘ └act┘ └──────────────── key=value tail ────────────────────┘
//! ```
//!
//! Lines with fewer than [`MIN_TOKENS`] whitespace-separated tokens are
//! discarded (`None`); they never fail the run.

use regex::Regex;
use std::sync::LazyLock;

use crate::models::{FieldValue, Record};

/// Minimum number of whitespace tokens for a line to be parsed.
pub const MIN_TOKENS: usize = 6;

static SEVERITY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\(severity:\s*([^)]+)\)").expect("severity pattern is valid")
});

/// Tail scanner state: either waiting for a `key=value` token, or
/// accumulating continuation tokens into the value of `key`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TailState {
    AwaitingKey,
    Accumulating(String),
}

/// Scan the tail tokens of a line into raw `(key, value)` pairs.
///
/// Pairs come back in first-seen key order. A repeated key replaces the
/// earlier raw value without moving it. A token with an empty key (`=x`)
/// still records its value, but the tokens after it are dropped rather than
/// continued onto the empty key.
pub fn scan_tail<'a, I>(tokens: I) -> Vec<(String, String)>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut fields: Vec<(String, String)> = Vec::new();
    let mut state = TailState::AwaitingKey;

    for token in tokens {
        state = match (state, token.split_once('=')) {
            (_, Some((key, value))) => {
                match fields.iter_mut().find(|(k, _)| k == key) {
                    Some(existing) => existing.1 = value.to_string(),
                    None => fields.push((key.to_string(), value.to_string())),
                }
                if key.is_empty() {
                    TailState::AwaitingKey
                } else {
                    TailState::Accumulating(key.to_string())
                }
            }
            (TailState::Accumulating(key), None) => {
                if let Some(existing) = fields.iter_mut().find(|(k, _)| *k == key) {
                    existing.1.push(' ');
                    existing.1.push_str(token);
                }
                TailState::Accumulating(key)
            }
            (TailState::AwaitingKey, None) => TailState::AwaitingKey,
        };
    }

    fields
}

/// Normalize a raw value: strip surrounding quotes, then coerce plain
/// numerals (digits with at most one `.`) to integers or floats.
pub fn normalize_value(raw: &str) -> FieldValue {
    let mut value = raw.trim();
    if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
        value = &value[1..value.len() - 1];
    } else if value == "\"" {
        value = "";
    }

    if is_numeral(value) {
        if value.contains('.') {
            if let Ok(f) = value.parse::<f64>() {
                return FieldValue::Float(f);
            }
        } else if let Ok(i) = value.parse::<i64>() {
            return FieldValue::Int(i);
        }
    }

    FieldValue::Str(value.to_string())
}

fn is_numeral(value: &str) -> bool {
    let mut digits = 0usize;
    let mut dots = 0usize;
    for c in value.chars() {
        match c {
            '0'..='9' => digits += 1,
            '.' => dots += 1,
            _ => return false,
        }
    }
    digits > 0 && dots <= 1
}

/// Parse a raw log line. Returns `None` for lines that are too short.
pub fn parse_line(line: &str) -> Option<Record> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    if tokens.len() < MIN_TOKENS {
        return None;
    }

    let mut record = Record::new();
    record.insert(
        "timestamp".to_string(),
        FieldValue::Str(format!("{} {}", tokens[0], tokens[1])),
    );
    record.insert("message_type".to_string(), FieldValue::from(tokens[2]));
    record.insert("service".to_string(), FieldValue::from(tokens[3]));
    record.insert("action".to_string(), FieldValue::from(tokens[4]));

    for (key, raw) in scan_tail(tokens[5..].iter().copied()) {
        record.insert(key, normalize_value(&raw));
    }

    extract_severity(&mut record);
    Some(record)
}

/// Split a `(severity: X)` annotation out of the `issue` field.
fn extract_severity(record: &mut Record) {
    let Some(issue) = record.get("issue").and_then(FieldValue::as_str) else {
        return;
    };
    let Some(caps) = SEVERITY_RE.captures(issue) else {
        return;
    };

    let severity = caps[1].trim().to_string();
    let stripped = SEVERITY_RE.replace_all(issue, "");
    let mut cleaned = stripped.trim();
    if let Some(rest) = cleaned.strip_suffix('.') {
        cleaned = rest;
    }
    let cleaned = cleaned.trim().to_string();

    record.insert("issue".to_string(), FieldValue::Str(cleaned));
    match record.get_mut("severity") {
        Some(existing) => *existing = FieldValue::Str(severity),
        // Placed right after `issue` rather than at the end of the record, so
        // fields following `issue` on the line keep their relative position.
        None => {
            let at = record.get_index_of("issue").map_or(record.len(), |i| i + 1);
            record.shift_insert(at, "severity".to_string(), FieldValue::Str(severity));
        }
    }
}
