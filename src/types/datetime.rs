//! Date and timestamp text formats (ISO `DateStyle`).

use chrono::{DateTime, NaiveDate, NaiveDateTime};

use crate::error::{Error, Result};

use super::Value;

/// `infinity` and `-infinity` have no chrono representation and stay text.
fn special(s: &str) -> Option<Value> {
    matches!(s, "infinity" | "-infinity").then(|| Value::Text(s.to_string()))
}

/// `date`: `2024-01-15`
pub fn decode_date(s: &str) -> Result<Value> {
    if let Some(v) = special(s) {
        return Ok(v);
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map(Value::Date)
        .map_err(|e| Error::Value(format!("invalid date {:?}: {}", s, e)))
}

/// `timestamp`: `2024-01-15 10:30:00.123456`
///
/// The value is kept as the literal wall-clock time; no local offset is applied.
pub fn decode_timestamp(s: &str) -> Result<Value> {
    if let Some(v) = special(s) {
        return Ok(v);
    }
    // Try with microseconds first, then without
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S"))
        .map(Value::Timestamp)
        .map_err(|e| Error::Value(format!("invalid timestamp {:?}: {}", s, e)))
}

/// `timestamptz`: `2024-01-15 10:30:00+00`, `2024-01-15 10:30:00.5+05:30`
pub fn decode_timestamptz(s: &str) -> Result<Value> {
    if let Some(v) = special(s) {
        return Ok(v);
    }
    DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f%#z")
        .or_else(|_| DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%#z"))
        .map(Value::TimestampTz)
        .map_err(|e| Error::Value(format!("invalid timestamptz {:?}: {}", s, e)))
}

#[cfg(test)]
mod tests {
    use chrono::{Datelike, FixedOffset, NaiveTime, Timelike};

    use super::*;

    #[test]
    fn test_date() {
        let Value::Date(d) = decode_date("2024-02-29").unwrap() else {
            panic!("expected date");
        };
        assert_eq!((d.year(), d.month(), d.day()), (2024, 2, 29));
        assert!(decode_date("2024-02-30").is_err());
    }

    #[test]
    fn test_timestamp_is_wall_clock() {
        let Value::Timestamp(ts) = decode_timestamp("2024-01-15 23:30:00").unwrap() else {
            panic!("expected timestamp");
        };
        assert_eq!(ts.date(), NaiveDate::from_ymd_opt(2024, 1, 15).unwrap());
        assert_eq!(ts.time(), NaiveTime::from_hms_opt(23, 30, 0).unwrap());

        let Value::Timestamp(ts) = decode_timestamp("2024-01-15 10:30:00.123456").unwrap() else {
            panic!("expected timestamp");
        };
        assert_eq!(ts.nanosecond(), 123_456_000);
    }

    #[test]
    fn test_timestamptz() {
        let Value::TimestampTz(ts) = decode_timestamptz("2024-01-15 10:30:00+05:30").unwrap() else {
            panic!("expected timestamptz");
        };
        assert_eq!(ts.offset(), &FixedOffset::east_opt(5 * 3600 + 1800).unwrap());
        assert_eq!(ts.hour(), 10);

        let Value::TimestampTz(ts) = decode_timestamptz("2024-01-15 10:30:00.25+00").unwrap() else {
            panic!("expected timestamptz");
        };
        assert_eq!(ts.offset().local_minus_utc(), 0);
        assert_eq!(ts.nanosecond(), 250_000_000);
    }

    #[test]
    fn test_infinity() {
        assert_eq!(decode_date("infinity").unwrap(), Value::Text("infinity".into()));
        assert_eq!(
            decode_timestamptz("-infinity").unwrap(),
            Value::Text("-infinity".into())
        );
    }
}
