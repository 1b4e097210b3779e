//! Value comparison rules
//!
//! One ordering is used everywhere a record value meets a filter value: the
//! in-memory filter engine, min/max aggregation, and the `lens_compare` SQL
//! function registered by storage.
//!
//! 1. Absent (missing or JSON null) sorts before any present value.
//! 2. If both sides coerce to finite numbers, compare numerically.
//! 3. Otherwise compare the stringified values byte-wise.

use serde_json::Value;
use std::cmp::Ordering;

/// Numeric view of a value: JSON numbers and strings holding a finite number
pub fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_number(s),
        _ => None,
    }
}

/// Parse a string as a finite number
pub fn parse_number(s: &str) -> Option<f64> {
    s.parse::<f64>().ok().filter(|n| n.is_finite())
}

/// String form used for lexicographic comparison and substring matching
pub fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn present(value: Option<&Value>) -> Option<&Value> {
    value.filter(|v| !v.is_null())
}

/// Three-way comparison of two optional values
pub fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    let (a, b) = match (present(a), present(b)) {
        (None, None) => return Ordering::Equal,
        (None, Some(_)) => return Ordering::Less,
        (Some(_), None) => return Ordering::Greater,
        (Some(a), Some(b)) => (a, b),
    };

    if let (Some(x), Some(y)) = (as_number(a), as_number(b)) {
        return x.partial_cmp(&y).unwrap_or(Ordering::Equal);
    }

    stringify(a).cmp(&stringify(b))
}
