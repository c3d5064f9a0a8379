//! Call records read from the source collections.
//!
//! A record is kept close to its source shape so that it can be written back
//! verbatim (e.g. into the no-recording collection).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One call session read from an input collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallRecord {
    /// Unique call session id
    #[serde(rename = "CallSid")]
    pub call_sid: String,

    /// Every other field of the source object, `CallDuration` and
    /// `Timestamp` included, exactly as exported
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

const DURATION_FIELD: &str = "CallDuration";
const TIMESTAMP_FIELD: &str = "Timestamp";

impl CallRecord {
    /// Parse a record from a single JSON value of an input collection
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }

    /// Duration as exported: a number or a numeric string
    pub fn duration(&self) -> Option<&Value> {
        self.extra.get(DURATION_FIELD)
    }

    /// Start timestamp as exported
    pub fn timestamp(&self) -> Option<&Value> {
        self.extra.get(TIMESTAMP_FIELD)
    }

    /// Duration parsed as an integer number of seconds.
    ///
    /// Strings are parsed leniently: leading whitespace and sign are accepted
    /// and parsing stops at the first non-digit, so `"75.4"` is 75 and
    /// `"12abc"` is 12. Anything without leading digits yields `None`, and
    /// digit runs too long for an `i64` saturate.
    pub fn duration_seconds(&self) -> Option<i64> {
        match self.duration()? {
            Value::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64)),
            Value::String(s) => parse_leading_int(s),
            _ => None,
        }
    }

    /// Whether this record passes the duration filter (strictly greater)
    pub fn exceeds_duration(&self, min_seconds: i64) -> bool {
        self.duration_seconds()
            .map(|secs| secs > min_seconds)
            .unwrap_or(false)
    }
}

fn parse_leading_int(s: &str) -> Option<i64> {
    let trimmed = s.trim_start();
    let (negative, rest) = match trimmed.as_bytes().first() {
        Some(b'-') => (true, &trimmed[1..]),
        Some(b'+') => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };

    let digits: &str = {
        let end = rest
            .bytes()
            .position(|b| !b.is_ascii_digit())
            .unwrap_or(rest.len());
        &rest[..end]
    };

    if digits.is_empty() {
        return None;
    }

    // Only overflow can fail here
    Some(match (digits.parse::<i64>(), negative) {
        (Ok(value), true) => -value,
        (Ok(value), false) => value,
        (Err(_), true) => i64::MIN,
        (Err(_), false) => i64::MAX,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(duration: Value) -> CallRecord {
        CallRecord::from_value(json!({
            "CallSid": "CA123",
            "CallDuration": duration,
            "Timestamp": "2023-07-01T10:00:00Z",
        }))
        .unwrap()
    }

    #[test]
    fn test_duration_from_string_and_number() {
        assert_eq!(record(json!("75")).duration_seconds(), Some(75));
        assert_eq!(record(json!(75)).duration_seconds(), Some(75));
        assert_eq!(record(json!(75.9)).duration_seconds(), Some(75));
        assert_eq!(record(json!("  61s")).duration_seconds(), Some(61));
        assert_eq!(record(json!("-5")).duration_seconds(), Some(-5));
    }

    #[test]
    fn test_non_numeric_duration_fails_filter() {
        assert_eq!(record(json!("abc")).duration_seconds(), None);
        assert_eq!(record(json!(null)).duration_seconds(), None);
        assert!(!record(json!("abc")).exceeds_duration(60));
        assert!(!record(json!(true)).exceeds_duration(60));
    }

    #[test]
    fn test_duration_threshold_is_strict() {
        assert!(!record(json!("60")).exceeds_duration(60));
        assert!(record(json!("61")).exceeds_duration(60));
        assert!(!record(json!(59)).exceeds_duration(60));
    }

    #[test]
    fn test_missing_duration_is_excluded() {
        let rec = CallRecord::from_value(json!({ "CallSid": "CA1" })).unwrap();
        assert!(rec.duration().is_none());
        assert!(!rec.exceeds_duration(60));
    }

    #[test]
    fn test_round_trip_keeps_extra_fields() {
        let source = json!({
            "CallSid": "CA9",
            "CallDuration": "120",
            "Timestamp": "2023-07-01",
            "RecordingUrl": "https://example.test/rec",
            "Direction": "outbound-api",
        });
        let rec = CallRecord::from_value(source.clone()).unwrap();
        assert_eq!(serde_json::to_value(&rec).unwrap(), source);
    }

    #[test]
    fn test_round_trip_keeps_null_fields() {
        let source = json!({
            "CallSid": "CA1",
            "CallDuration": "75",
            "Timestamp": null,
        });
        let rec = CallRecord::from_value(source.clone()).unwrap();

        assert_eq!(rec.timestamp(), Some(&Value::Null));
        assert_eq!(rec.duration_seconds(), Some(75));
        assert_eq!(serde_json::to_value(&rec).unwrap(), source);
    }

    #[test]
    fn test_oversized_duration_saturates() {
        let rec = record(json!("99999999999999999999"));
        assert_eq!(rec.duration_seconds(), Some(i64::MAX));
        assert!(rec.exceeds_duration(60));

        assert_eq!(record(json!("-99999999999999999999")).duration_seconds(), Some(i64::MIN));
    }
}
