//! Normalization of loosely-shaped JSON payloads.
//!
//! The history and news endpoints do not commit to a single row shape:
//! history rows may be full OHLC records or single prices under one of
//! several field names, wrapped or not in an envelope object. Everything is
//! mapped onto [`HistoryRow`] (or a headline string) here, so aggregation
//! never looks up fields itself.

use crate::candle::HistoryRow;
use serde_json::{Map, Value};

/// Envelope keys that may wrap a history list, in priority order.
pub const ENVELOPE_FIELDS: [&str; 2] = ["history", "data"];

/// Position field aliases, in priority order.
pub const POSITION_FIELDS: [&str; 3] = ["tick", "timestamp", "time"];

/// Scalar price field aliases, in priority order.
pub const PRICE_FIELDS: [&str; 4] = ["close", "last", "price", "value"];

/// Headline field aliases, in priority order.
pub const HEADLINE_FIELDS: [&str; 4] = ["headline", "title", "text", "body"];

/// History rows after normalization, sorted ascending by position.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedHistory {
    /// Usable rows, stable-sorted by position
    pub rows: Vec<HistoryRow>,
    /// Rows dropped as malformed
    pub skipped: usize,
}

impl NormalizedHistory {
    /// The last row by position, if any.
    #[must_use]
    pub fn last(&self) -> Option<&HistoryRow> {
        self.rows.last()
    }
}

/// Normalizes a raw history payload.
///
/// Accepts a bare list or an object wrapping the list under one of
/// [`ENVELOPE_FIELDS`]. Any other payload yields no rows. Malformed rows are
/// skipped and counted. The result is stable-sorted by position since the
/// feed gives no ordering guarantee.
#[must_use]
pub fn normalize_history(payload: &Value) -> NormalizedHistory {
    let Some(items) = unwrap_envelope(payload) else {
        tracing::debug!("history payload is neither a list nor a known envelope");
        return NormalizedHistory::default();
    };

    let mut normalized = NormalizedHistory::default();
    for item in items {
        match normalize_row(item) {
            Some(row) => normalized.rows.push(row),
            None => {
                normalized.skipped += 1;
                tracing::debug!("skipping malformed history row: {}", item);
            }
        }
    }

    normalized
        .rows
        .sort_by(|a, b| a.position().total_cmp(&b.position()));

    normalized
}

fn unwrap_envelope(payload: &Value) -> Option<&Vec<Value>> {
    match payload {
        Value::Array(items) => Some(items),
        Value::Object(map) => ENVELOPE_FIELDS
            .iter()
            .find_map(|key| map.get(*key).and_then(Value::as_array)),
        _ => None,
    }
}

/// Normalizes a single history row.
///
/// Returns `None` when the row has no parsable position, no parsable price,
/// or carries OHLC fields that are unparsable or inconsistent.
#[must_use]
pub fn normalize_row(row: &Value) -> Option<HistoryRow> {
    let map = row.as_object()?;
    let position = first_number(map, &POSITION_FIELDS)?;

    let has_ohlc = ["open", "high", "low", "close"]
        .iter()
        .all(|key| map.get(*key).is_some_and(|v| !v.is_null()));

    let normalized = if has_ohlc {
        HistoryRow::Ohlc {
            position,
            open: parse_number(&map["open"])?,
            high: parse_number(&map["high"])?,
            low: parse_number(&map["low"])?,
            close: parse_number(&map["close"])?,
        }
    } else {
        HistoryRow::Scalar {
            position,
            price: first_number(map, &PRICE_FIELDS)?,
        }
    };

    normalized.validate().ok()?;
    Some(normalized)
}

/// Returns the first alias whose value parses as a finite number.
fn first_number(map: &Map<String, Value>, fields: &[&str]) -> Option<f64> {
    fields
        .iter()
        .filter_map(|key| map.get(*key))
        .find_map(parse_number)
}

/// Parses a JSON number or numeric string. Non-finite values are rejected.
#[must_use]
pub fn parse_number(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    parsed.is_finite().then_some(parsed)
}

/// Extracts a headline from a news item.
///
/// Strings are used as-is. Objects are searched with [`HEADLINE_FIELDS`]; if
/// no alias holds a string the whole item is converted to its JSON text.
/// `null` yields `None`.
#[must_use]
pub fn extract_headline(item: &Value) -> Option<String> {
    match item {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Object(map) => HEADLINE_FIELDS
            .iter()
            .find_map(|key| map.get(*key).and_then(Value::as_str))
            .map(str::to_string)
            .or_else(|| Some(item.to_string())),
        other => Some(other.to_string()),
    }
}
