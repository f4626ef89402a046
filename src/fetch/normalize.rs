//! Defensive normalization of upstream payload fields.
//!
//! Upstream documents mix numeric literals, localized strings with embedded
//! non-ASCII group separators, and plain nulls. Normalization never fails:
//! anything that cannot be read as a number becomes 0.0, so one malformed
//! field cannot abort a fetch cycle.

use regex::Regex;
use serde_json::Value;

/// Find the first element of a named sub-array whose identifier field
/// matches the expected pattern. Returns `None` when the collection is
/// missing, not an array, or has no matching element.
pub fn pick_entry<'a>(
    collection: Option<&'a Value>,
    id_field: &str,
    pattern: &Regex,
) -> Option<&'a Value> {
    collection?.as_array()?.iter().find(|item| {
        item.get(id_field)
            .and_then(Value::as_str)
            .is_some_and(|id| pattern.is_match(id))
    })
}

/// Coerce an upstream value to f64.
///
/// `None`/null become 0.0; numbers are cast; strings are stripped of
/// non-ASCII characters (upstream uses non-breaking group separators),
/// trimmed and parsed, with 0.0 for anything left unparseable.
pub fn parse_value(value: Option<&Value>) -> f64 {
    match value {
        None | Some(Value::Null) => 0.0,
        Some(Value::String(s)) => {
            let cleaned: String = s.chars().filter(|c| c.is_ascii()).collect();
            let cleaned = cleaned.trim();
            if cleaned.is_empty() {
                0.0
            } else {
                cleaned.parse().unwrap_or(0.0)
            }
        }
        Some(other) => other.as_f64().unwrap_or(0.0),
    }
}

/// Raw upstream power values are kW-equivalent; canonical storage is MW.
pub fn kw_to_mw(value: f64) -> f64 {
    value / 1000.0
}

/// Split a raw net-exchange figure into non-negative import and export MW.
/// At most one of the two is non-zero for a given reading.
pub fn split_net_exchange(net_kw: f64) -> (f64, f64) {
    if net_kw >= 0.0 {
        (kw_to_mw(net_kw), 0.0)
    } else {
        (0.0, kw_to_mw(net_kw.abs()))
    }
}
