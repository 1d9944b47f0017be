//! Coercion of loosely typed backend values into canonical numeric form,
//! plus the normalized lookup key used to match the same segment across
//! differently shaped payloads.

use std::sync::OnceLock;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use regex::Regex;
use serde_json::Value;

fn numeric_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(-?(?:\d+(?:\.\d+)?|\.\d+))\s*(%)?").expect("valid regex"))
}

/// Parses a string that may carry currency symbols or thousands separators.
/// Everything outside `[0-9.-]` is stripped before parsing.
pub(crate) fn parse_loose_number(s: &str) -> Option<f64> {
    let cleaned: String = s
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();
    let parsed = cleaned.parse::<f64>().ok()?;
    parsed.is_finite().then_some(parsed)
}

/// Total conversion of a raw JSON scalar into a finite number.
///
/// Accepts numbers, numeric strings (optionally with currency symbols or
/// thousands separators) and booleans. Null, missing, or unparseable input
/// becomes `0.0`.
pub(crate) fn normalize_number(value: Option<&Value>) -> f64 {
    match value {
        Some(Value::Number(n)) => n.as_f64().filter(|f| f.is_finite()).unwrap_or(0.0),
        Some(Value::String(s)) => parse_loose_number(s).unwrap_or(0.0),
        Some(Value::Bool(b)) => {
            if *b {
                1.0
            } else {
                0.0
            }
        }
        _ => 0.0,
    }
}

/// Converts a raw rate into a 0-100 percentage.
///
/// Numbers in `[-1, 1]` are read as fractional rates and scaled by 100;
/// anything outside that range is taken as already a percentage. Strings are
/// scanned for their first numeric substring; a trailing `%` forces the
/// already-percentage reading regardless of magnitude. Returns `None` when no
/// numeric content exists, so callers can tell "unknown" apart from "zero".
pub(crate) fn normalize_percentage(value: Option<&Value>) -> Option<f64> {
    match value {
        Some(Value::Number(n)) => {
            let f = n.as_f64().filter(|f| f.is_finite())?;
            Some(scale_fraction(f))
        }
        Some(Value::String(s)) => {
            let caps = numeric_re().captures(s)?;
            let f = caps.get(1)?.as_str().parse::<f64>().ok()?;
            if caps.get(2).is_some() {
                Some(f)
            } else {
                Some(scale_fraction(f))
            }
        }
        _ => None,
    }
}

fn scale_fraction(f: f64) -> f64 {
    if (-1.0..=1.0).contains(&f) {
        f * 100.0
    } else {
        f
    }
}

/// Picks the first candidate that normalizes to a percentage; when every
/// candidate is unknown, falls back to `orders / members * 100` if the
/// segment has members, and `0` otherwise.
pub(crate) fn derive_conversion_rate(
    candidates: &[Option<&Value>],
    orders_count: f64,
    member_count: f64,
) -> f64 {
    for candidate in candidates {
        if let Some(rate) = normalize_percentage(*candidate) {
            return rate;
        }
    }
    if member_count > 0.0 {
        (orders_count / member_count) * 100.0
    } else {
        0.0
    }
}

/// Lower-cased, trimmed segment identifier. Two records describe the same
/// segment iff their normalized keys are equal and non-empty.
pub(crate) fn normalize_key(value: Option<&str>) -> String {
    value.map(|s| s.trim().to_lowercase()).unwrap_or_default()
}

/// Lenient ISO-ish timestamp parsing for backend date strings. Accepts
/// RFC 3339, `YYYY-MM-DD HH:MM:SS`, and bare dates; anything else is `None`.
pub(crate) fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc());
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(date.and_hms_opt(0, 0, 0)?.and_utc());
    }
    None
}
