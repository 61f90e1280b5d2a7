//! Operator kernel: deterministic, total functions from resolved values to
//! booleans.

use crate::regex_cache::RegexCache;
use crate::types::OperatorType;
use crate::value::Value;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use std::cmp::Ordering;
use std::time::Duration;

/// Total ordering over two resolved [`Value`]s, used by comparison
/// operators and by set membership.
///
/// Order of preference: both-null, null-vs-non-null, numeric, chronological,
/// boolean, then lexicographic text fallback. The kernel never panics on a
/// type mismatch — it always falls through to the next rule.
pub fn compare(left: &Value, right: &Value) -> Ordering {
    match (left, right) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Less,
        (_, Value::Null) => Ordering::Greater,
        _ => {
            if let (Some(a), Some(b)) = (left.as_f64(), right.as_f64()) {
                return a.partial_cmp(&b).unwrap_or(Ordering::Equal);
            }
            if let (Some(a), Some(b)) = (parse_time(left), parse_time(right)) {
                return a.cmp(&b);
            }
            if let (Value::Bool(a), Value::Bool(b)) = (left, right) {
                return a.cmp(b);
            }
            // Text rendering is only a meaningful comparison between values
            // of the same kind (two strings, two arrays, ...). A numeric
            // value and a string never numerically coerced above, so they
            // must not be treated as equal just because their renderings
            // happen to match — `42` and `"42"` are different values.
            let (lk, rk) = (kind_rank(left), kind_rank(right));
            if lk != rk {
                return lk.cmp(&rk);
            }
            left.render().cmp(&right.render())
        }
    }
}

fn kind_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Int(_) | Value::Float(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Map(_) => 5,
    }
}

/// Parse a value as one of the supported time formats: RFC 3339 with/without
/// nanoseconds, date-only, time-only, and `YYYY-MM-DD HH:MM:SS`. Returns a
/// comparable nanosecond timestamp.
fn parse_time(value: &Value) -> Option<i64> {
    let Value::String(s) = value else {
        return None;
    };

    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(s) {
        return Some(dt.timestamp_nanos_opt().unwrap_or(dt.timestamp() * 1_000_000_000));
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(dt.and_utc().timestamp_nanos_opt().unwrap_or_default());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(dt.and_utc().timestamp_nanos_opt().unwrap_or_default());
    }
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(d.and_hms_opt(0, 0, 0)?.and_utc().timestamp_nanos_opt().unwrap_or_default());
    }
    if let Ok(t) = NaiveTime::parse_from_str(s, "%H:%M:%S") {
        use chrono::Timelike;
        return Some(t.num_seconds_from_midnight() as i64 * 1_000_000_000);
    }
    None
}

/// `equal` / `not_equal`.
pub fn equal(left: &Value, right: &Value) -> bool {
    compare(left, right) == Ordering::Equal
}

/// `less`, `less_or_equal`, `greater`, `greater_or_equal`.
pub fn order(left: &Value, right: &Value, op: OperatorType) -> bool {
    let ord = compare(left, right);
    match op {
        OperatorType::Less => ord == Ordering::Less,
        OperatorType::LessOrEqual => ord != Ordering::Greater,
        OperatorType::Greater => ord == Ordering::Greater,
        OperatorType::GreaterOrEqual => ord != Ordering::Less,
        _ => false,
    }
}

/// `between` (inclusive) / `not_between` (strict complement).
pub fn between(value: &Value, low: &Value, high: &Value, negate: bool) -> bool {
    let within = compare(value, low) != Ordering::Less && compare(value, high) != Ordering::Greater;
    within != negate
}

/// `contains` / `not_contains`. If `left` is a sequence, succeeds if any
/// element's text rendering contains the needle's rendering. `null` on
/// either side yields `false`.
pub fn contains(left: &Value, needle: &Value) -> bool {
    if matches!(left, Value::Null) || matches!(needle, Value::Null) {
        return false;
    }
    let needle_text = needle.render();
    match left.as_array() {
        Some(items) => items.iter().any(|item| item.render().contains(&needle_text)),
        None => left.render().contains(&needle_text),
    }
}

/// `starts_with`.
pub fn starts_with(left: &Value, prefix: &Value) -> bool {
    if matches!(left, Value::Null) || matches!(prefix, Value::Null) {
        return false;
    }
    left.render().starts_with(&prefix.render())
}

/// `ends_with`.
pub fn ends_with(left: &Value, suffix: &Value) -> bool {
    if matches!(left, Value::Null) || matches!(suffix, Value::Null) {
        return false;
    }
    left.render().ends_with(&suffix.render())
}

/// `select_any_in` / `select_not_any_in`. Membership by value-equality
/// (via [`compare`]), not identity. An empty right-hand set yields `false`.
pub fn select_any_in(value: &Value, set: &[Value], negate: bool) -> bool {
    if set.is_empty() {
        return false;
    }
    let found = set.iter().any(|candidate| equal(value, candidate));
    found != negate
}

/// `is_empty` / `is_not_empty`.
pub fn is_empty(value: &Value, negate: bool) -> bool {
    value.is_empty_value() != negate
}

/// `match_regexp`, delegating to the bounded regex cache for compilation,
/// caching, and ReDoS-resistant timeout enforcement.
pub fn match_regexp(
    cache: &RegexCache,
    left: &Value,
    pattern: &Value,
    budget: Duration,
) -> crate::error::Result<bool> {
    if matches!(left, Value::Null) {
        return Ok(false);
    }
    let pattern_str = match pattern {
        Value::String(s) => s.clone(),
        other => other.render(),
    };
    cache.is_match(&pattern_str, &left.render(), budget)
}
