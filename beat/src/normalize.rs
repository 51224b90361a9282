//! Normalizer - raw `(name, value)` rows to typed events
//!
//! Pure and deterministic: the same rows always yield the same fields. Values
//! are typed integer first, then float, then left as strings. Nothing is
//! ever dropped for being malformed.

use chrono::{DateTime, Utc};
use mysqlbeat_core::{Event, MetricValue};

/// One untyped `(name, value)` pair from a result set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRow {
    pub name: String,
    pub value: String,
}

impl RawRow {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Build an event from a batch of raw rows
///
/// A later row with the same name replaces an earlier one.
pub fn normalize(rows: &[RawRow], source_tag: &str, timestamp: DateTime<Utc>) -> Event {
    let mut builder = Event::builder(source_tag, timestamp);
    for row in rows {
        builder.insert(row.name.clone(), parse_value(&row.value));
    }
    builder.build()
}

/// Type a raw value: integer, then finite float, then string
pub fn parse_value(text: &str) -> MetricValue {
    if let Some(v) = parse_int(text) {
        return MetricValue::Int(v);
    }
    match text.parse::<f64>() {
        Ok(v) if v.is_finite() => MetricValue::Float(v),
        _ => MetricValue::Str(text.to_string()),
    }
}

/// Parse an integer literal with base detection
///
/// Accepts an optional sign, then `0x`/`0o`/`0b` prefixes, a bare leading
/// `0` for octal, or plain decimal.
pub fn parse_int(text: &str) -> Option<i64> {
    let (negative, body) = match text.as_bytes().first()? {
        b'-' => (true, &text[1..]),
        b'+' => (false, &text[1..]),
        _ => (false, text),
    };

    let (radix, digits) = if let Some(d) = strip_radix_prefix(body, 'x') {
        (16, d)
    } else if let Some(d) = strip_radix_prefix(body, 'o') {
        (8, d)
    } else if let Some(d) = strip_radix_prefix(body, 'b') {
        (2, d)
    } else if body.len() > 1 && body.starts_with('0') {
        (8, &body[1..])
    } else {
        (10, body)
    };

    // from_str_radix would take a second sign
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_alphanumeric()) {
        return None;
    }

    let magnitude = u64::from_str_radix(digits, radix).ok()?;
    if negative {
        if magnitude > i64::MAX as u64 + 1 {
            return None;
        }
        Some((magnitude as i64).wrapping_neg())
    } else {
        i64::try_from(magnitude).ok()
    }
}

fn strip_radix_prefix(body: &str, marker: char) -> Option<&str> {
    let mut chars = body.chars();
    match (chars.next(), chars.next()) {
        (Some('0'), Some(c)) if c.eq_ignore_ascii_case(&marker) => Some(&body[2..]),
        _ => None,
    }
}
