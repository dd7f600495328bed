// SPDX-License-Identifier: PMPL-1.0-or-later
//! Client literal coercion.
//!
//! Criteria literals arrive loosely typed (numbers as strings, dates as
//! strings, enums by name). Before a typed comparison is built, the literal is
//! converted to the accessor's type. A failed conversion is reported as
//! [`CoercionFailure`]; the filter compiler turns that into a constant-false
//! clause rather than an error.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeDelta};
use thiserror::Error;
use uuid::Uuid;

use crate::shape::ValueType;
use crate::value::Value;

/// A literal that cannot be represented in the target type.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("cannot convert {literal} to {target}")]
pub struct CoercionFailure {
    pub literal: String,
    pub target: String,
}

impl CoercionFailure {
    fn new(literal: &Value, target: &ValueType) -> Self {
        Self {
            literal: literal.to_string(),
            target: target.type_name(),
        }
    }
}

const DATE_TIME_FORMATS: &[&str] = &[
    "%Y/%m/%d %H:%M:%S%.f",
    "%Y/%m/%d %H:%M",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y/%m/%d", "%Y-%m-%d"];

/// Converts `literal` to a value of type `target`. Null converts to null.
pub fn coerce_literal(literal: &Value, target: &ValueType) -> Result<Value, CoercionFailure> {
    if literal.is_null() {
        return Ok(Value::Null);
    }
    let fail = || CoercionFailure::new(literal, target);

    match target {
        ValueType::Dynamic => Ok(literal.clone()),
        ValueType::Bool => match literal {
            Value::Bool(b) => Ok(Value::Bool(*b)),
            Value::Int(i) => Ok(Value::Bool(*i != 0)),
            Value::String(s) if s.trim().eq_ignore_ascii_case("true") => Ok(Value::Bool(true)),
            Value::String(s) if s.trim().eq_ignore_ascii_case("false") => Ok(Value::Bool(false)),
            _ => Err(fail()),
        },
        ValueType::Int32 => {
            let wide = to_integer(literal).ok_or_else(fail)?;
            i32::try_from(wide).map(|i| Value::Int(i64::from(i))).map_err(|_| fail())
        }
        ValueType::Int64 => to_integer(literal).map(Value::Int).ok_or_else(fail),
        // Float32 members are read back as f64, so the literal keeps full width.
        ValueType::Float32 | ValueType::Float64 => to_float(literal).map(Value::Float).ok_or_else(fail),
        ValueType::String => match literal {
            Value::Array(_) | Value::Object(_) => Err(fail()),
            other => Ok(Value::String(other.display_text())),
        },
        ValueType::DateTime => match literal {
            Value::DateTime(dt) => Ok(Value::DateTime(*dt)),
            Value::String(s) => parse_date_time(s).map(Value::DateTime).ok_or_else(fail),
            _ => Err(fail()),
        },
        ValueType::Duration => match literal {
            Value::Duration(d) => Ok(Value::Duration(*d)),
            Value::String(s) => parse_duration(s).map(Value::Duration).ok_or_else(fail),
            _ => Err(fail()),
        },
        ValueType::Uuid => match literal {
            Value::Uuid(u) => Ok(Value::Uuid(*u)),
            Value::String(s) => Uuid::parse_str(s.trim()).map(Value::Uuid).map_err(|_| fail()),
            _ => Err(fail()),
        },
        ValueType::Enum(enum_type) => match literal {
            Value::Int(i) => Ok(Value::Int(*i)),
            Value::String(s) => {
                let name = s.trim();
                enum_type
                    .value_of(name)
                    .or_else(|| name.parse::<i64>().ok())
                    .map(Value::Int)
                    .ok_or_else(fail)
            }
            _ => Err(fail()),
        },
        ValueType::Object(_) => Err(fail()),
        ValueType::Custom(custom) => match custom.coerce {
            Some(coerce) => coerce(literal).ok_or_else(fail),
            None => Ok(literal.clone()),
        },
    }
}

fn to_integer(literal: &Value) -> Option<i64> {
    match literal {
        Value::Int(i) => Some(*i),
        Value::Float(f) if f.is_finite() => {
            let rounded = f.round_ties_even();
            if rounded >= i64::MIN as f64 && rounded <= i64::MAX as f64 {
                Some(rounded as i64)
            } else {
                None
            }
        }
        Value::Bool(b) => Some(i64::from(*b)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

fn to_float(literal: &Value) -> Option<f64> {
    match literal {
        Value::Int(i) => Some(*i as f64),
        Value::Float(f) => Some(*f),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// Parses the date/time spellings data-grid clients send: `yyyy/MM/dd`,
/// `yyyy/MM/dd HH:mm:ss`, ISO-8601 and RFC 3339 (converted to UTC).
pub fn parse_date_time(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    if let Ok(with_offset) = DateTime::parse_from_rfc3339(text) {
        return Some(with_offset.naive_utc());
    }
    if let Some(naive) = DATE_TIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
    {
        return Some(naive);
    }
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
        .and_then(|date| date.and_hms_opt(0, 0, 0))
}

/// Parses `[-][d.]hh:mm[:ss[.fffffff]]`.
pub fn parse_duration(text: &str) -> Option<TimeDelta> {
    let text = text.trim();
    let (negative, body) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };

    let (days, clock) = match body.split_once(':') {
        Some((head, tail)) => match head.split_once('.') {
            Some((days, hours)) => (days.parse::<i64>().ok()?, format!("{hours}:{tail}")),
            None => (0, body.to_string()),
        },
        None => return None,
    };

    let mut parts = clock.split(':');
    let hours: i64 = parts.next()?.parse().ok()?;
    let minutes: i64 = parts.next()?.parse().ok()?;
    let (seconds, nanos) = match parts.next() {
        Some(sec) => match sec.split_once('.') {
            Some((whole, fraction)) => {
                let digits: String = fraction.chars().take(9).collect();
                let scale = 10_i64.pow(9 - digits.len() as u32);
                (whole.parse::<i64>().ok()?, digits.parse::<i64>().ok()? * scale)
            }
            None => (sec.parse::<i64>().ok()?, 0),
        },
        None => (0, 0),
    };
    if parts.next().is_some() || hours > 23 || minutes > 59 || seconds > 59 {
        return None;
    }

    let total = TimeDelta::try_days(days)?
        .checked_add(&TimeDelta::try_hours(hours)?)?
        .checked_add(&TimeDelta::try_minutes(minutes)?)?
        .checked_add(&TimeDelta::try_seconds(seconds)?)?
        .checked_add(&TimeDelta::nanoseconds(nanos))?;
    Some(if negative { -total } else { total })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shape::EnumType;

    #[test]
    fn test_numeric_strings_convert() {
        assert_eq!(coerce_literal(&Value::from("42"), &ValueType::Int32), Ok(Value::Int(42)));
        assert_eq!(
            coerce_literal(&Value::from(" 2.5 "), &ValueType::Float64),
            Ok(Value::Float(2.5))
        );
    }

    #[test]
    fn test_non_numeric_string_fails() {
        assert!(coerce_literal(&Value::from("not-a-number"), &ValueType::Int32).is_err());
    }

    #[test]
    fn test_int32_overflow_fails() {
        assert!(coerce_literal(&Value::Int(i64::from(i32::MAX) + 1), &ValueType::Int32).is_err());
        assert!(coerce_literal(&Value::Int(i64::from(i32::MAX) + 1), &ValueType::Int64).is_ok());
    }

    #[test]
    fn test_float_to_int_rounds_half_to_even() {
        assert_eq!(coerce_literal(&Value::Float(2.5), &ValueType::Int64), Ok(Value::Int(2)));
        assert_eq!(coerce_literal(&Value::Float(3.5), &ValueType::Int64), Ok(Value::Int(4)));
    }

    #[test]
    fn test_null_passes_through() {
        assert_eq!(coerce_literal(&Value::Null, &ValueType::Int32), Ok(Value::Null));
    }

    #[test]
    fn test_enum_by_name_or_number() {
        let ty = ValueType::enumeration(EnumType::new("Status", [("Open", 1), ("Closed", 2)]));
        assert_eq!(coerce_literal(&Value::from("Closed"), &ty), Ok(Value::Int(2)));
        assert_eq!(coerce_literal(&Value::from("1"), &ty), Ok(Value::Int(1)));
        assert_eq!(coerce_literal(&Value::Int(7), &ty), Ok(Value::Int(7)));
        assert!(coerce_literal(&Value::from("Pending"), &ty).is_err());
    }

    #[test]
    fn test_date_time_spellings() {
        let expected = NaiveDate::from_ymd_opt(2017, 1, 5)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        assert_eq!(parse_date_time("2017/1/5"), Some(expected));
        assert_eq!(parse_date_time("2017-01-05"), Some(expected));
        assert_eq!(parse_date_time("2017-01-05T00:00:00"), Some(expected));
        assert_eq!(parse_date_time("2017-01-05T02:00:00+02:00"), Some(expected));
        assert_eq!(parse_date_time("yesterday"), None);
    }

    #[test]
    fn test_duration_spellings() {
        assert_eq!(parse_duration("01:30:00"), Some(TimeDelta::minutes(90)));
        assert_eq!(
            parse_duration("2.00:00:01"),
            Some(TimeDelta::days(2) + TimeDelta::seconds(1))
        );
        assert_eq!(parse_duration("-00:00:05.5"), Some(-TimeDelta::milliseconds(5500)));
        assert_eq!(parse_duration("25:00:00"), None);
        assert_eq!(parse_duration("abc"), None);
    }

    #[test]
    fn test_uuid_literal() {
        let id = Uuid::new_v4();
        assert_eq!(
            coerce_literal(&Value::from(id.to_string()), &ValueType::Uuid),
            Ok(Value::Uuid(id))
        );
    }
}
