//! Value conversion for type-cast transforms

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::{Number, Value};

use super::error::{TransformError, TransformResult};
use super::types::{CastStrategy, FieldType};

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d.%m.%Y", "%m/%d/%Y", "%d/%m/%Y", "%Y/%m/%d"];
const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%d.%m.%Y %H:%M"];

/// Convert `value` at `field` from `from` to `to` under `strategy`
///
/// Null passes through unchanged. A value already of the target type is
/// returned as is.
pub fn cast_value(
    field: &str,
    value: &Value,
    from: FieldType,
    to: FieldType,
    strategy: CastStrategy,
) -> TransformResult<Value> {
    if value.is_null() {
        return Ok(Value::Null);
    }
    let actual = FieldType::of(value);
    if to != FieldType::Date && to.accepts(actual) {
        return Ok(value.clone());
    }

    let fail = |reason: &str| TransformError::CastFailed {
        field: field.to_string(),
        from,
        to,
        reason: reason.to_string(),
    };

    match strategy {
        CastStrategy::Reject => {
            if to == FieldType::Date && value.as_str().is_some_and(|s| parse_date(s).is_some()) {
                return Ok(value.clone());
            }
            Err(TransformError::TypeMismatch {
                field: field.to_string(),
                expected: to,
                found: actual,
            })
        }
        CastStrategy::Parse => {
            if !from.accepts(actual) && actual != FieldType::String {
                return Err(TransformError::TypeMismatch {
                    field: field.to_string(),
                    expected: from,
                    found: actual,
                });
            }
            parse(value, to).ok_or_else(|| fail("value could not be parsed"))
        }
        CastStrategy::Cast => coerce(value, to).ok_or_else(|| fail("value could not be coerced")),
    }
}

fn parse(value: &Value, to: FieldType) -> Option<Value> {
    match (value, to) {
        (Value::String(s), FieldType::Number) => parse_number(s),
        (Value::String(s), FieldType::Integer) => parse_integer(s),
        (Value::String(s), FieldType::Boolean) => parse_bool(s).map(Value::Bool),
        (Value::String(s), FieldType::Date) => parse_date(s).map(Value::String),
        (Value::String(s), FieldType::Array | FieldType::Object) => {
            serde_json::from_str::<Value>(s)
                .ok()
                .filter(|v| FieldType::of(v) == to)
        }
        (Value::Number(_) | Value::Bool(_), FieldType::String) => {
            Some(Value::String(value.to_string()))
        }
        (Value::Number(n), FieldType::Integer) => n
            .as_f64()
            .filter(|f| f.fract() == 0.0)
            .and_then(integer_value),
        _ => None,
    }
}

fn coerce(value: &Value, to: FieldType) -> Option<Value> {
    if let Some(parsed) = parse(value, to) {
        return Some(parsed);
    }
    match (value, to) {
        (Value::Array(_) | Value::Object(_), FieldType::String) => {
            Some(Value::String(value.to_string()))
        }
        (Value::Bool(b), FieldType::Number | FieldType::Integer) => {
            Some(Value::Number(Number::from(u8::from(*b))))
        }
        (Value::Number(n), FieldType::Boolean) => n.as_f64().map(|f| Value::Bool(f != 0.0)),
        (Value::Number(n), FieldType::Integer) => n.as_f64().and_then(|f| integer_value(f.trunc())),
        (Value::String(s), FieldType::Integer) => s
            .trim()
            .parse::<f64>()
            .ok()
            .and_then(|f| integer_value(f.trunc())),
        _ => None,
    }
}

fn integer_value(f: f64) -> Option<Value> {
    if f.is_finite() && f.abs() < i64::MAX as f64 {
        Some(Value::Number(Number::from(f as i64)))
    } else {
        None
    }
}

fn parse_number(s: &str) -> Option<Value> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return None;
    }
    let normalized = normalize_decimal(trimmed)?;
    if let Ok(i) = normalized.parse::<i64>() {
        return Some(Value::Number(Number::from(i)));
    }
    normalized
        .parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
}

/// Rewrite a number with `,`/`.` separators to plain `1234.5` form
///
/// The rightmost separator is the decimal mark when both appear. A lone comma
/// followed by exactly three digits (`1,000`) could be either, so it is
/// refused rather than guessed.
fn normalize_decimal(s: &str) -> Option<String> {
    let commas = s.matches(',').count();
    let dots = s.matches('.').count();

    let (decimal, grouping) = match (s.rfind(','), s.rfind('.')) {
        (None, None) => return Some(s.to_string()),
        (Some(comma), Some(dot)) if comma > dot => (Some(','), '.'),
        (Some(_), Some(_)) => (Some('.'), ','),
        (Some(comma), None) if commas == 1 => {
            if s.len() - comma - 1 == 3 {
                return None;
            }
            (Some(','), '.')
        }
        (Some(_), None) => (None, ','),
        (None, Some(_)) if dots == 1 => return Some(s.to_string()),
        (None, Some(_)) => (None, '.'),
    };

    let (integer, fraction) = match decimal.and_then(|mark| s.rsplit_once(mark)) {
        Some((integer, fraction)) => (integer, Some(fraction)),
        None => (s, None),
    };
    if fraction.is_some_and(|f| f.contains([',', '.'])) {
        return None;
    }

    let (sign, digits) = match integer.strip_prefix(['-', '+']) {
        Some(rest) => (&integer[..1], rest),
        None => ("", integer),
    };
    if digits.contains(grouping) && !is_grouped(digits, grouping) {
        return None;
    }
    let digits = digits.replace(grouping, "");

    Some(match fraction {
        Some(fraction) => format!("{}{}.{}", sign, digits, fraction),
        None => format!("{}{}", sign, digits),
    })
}

/// `1,234,567`: a 1-3 digit lead group, then groups of exactly three
fn is_grouped(digits: &str, separator: char) -> bool {
    let mut groups = digits.split(separator);
    let lead_ok = groups
        .next()
        .is_some_and(|g| (1..=3).contains(&g.len()) && g.bytes().all(|b| b.is_ascii_digit()));
    lead_ok && groups.all(|g| g.len() == 3 && g.bytes().all(|b| b.is_ascii_digit()))
}

fn parse_integer(s: &str) -> Option<Value> {
    match parse_number(s)? {
        Value::Number(n) if n.is_i64() || n.is_u64() => Some(Value::Number(n)),
        Value::Number(n) => n
            .as_f64()
            .filter(|f| f.fract() == 0.0)
            .and_then(integer_value),
        _ => None,
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_lowercase().as_str() {
        "true" | "yes" | "y" | "1" | "ja" | "oui" | "si" | "sí" => Some(true),
        "false" | "no" | "n" | "0" | "nein" | "non" => Some(false),
        _ => None,
    }
}

/// Normalize a textual date to RFC 3339 (datetimes) or `YYYY-MM-DD` (dates)
pub(crate) fn parse_date(s: &str) -> Option<String> {
    let trimmed = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.to_rfc3339());
    }
    for format in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Some(dt.and_utc().to_rfc3339());
        }
    }
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, format) {
            return Some(date.format("%Y-%m-%d").to_string());
        }
    }
    None
}
