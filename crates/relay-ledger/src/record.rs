//! Telemetry record model.
//!
//! Records carry two distinct timestamps:
//! - `recorded_at` (`recordedTime` on the wire): seconds since the epoch,
//!   stamped by the relay at ingestion. Drives pruning.
//! - the application time: the `"time"` entry inside `values`, set by the
//!   device. Together with `source_id` it identifies an event when
//!   reconciling acknowledgments.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;
use std::time::Duration;

/// Name of the value entry holding the application time.
pub const TIME_VALUE_NAME: &str = "time";

/// Delivery status of a stored record, persisted as `cloudStatus`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "i64", into = "i64")]
pub enum DeliveryStatus {
    /// Written to the ledger, not yet confirmed by the endpoint (`0`).
    Unacknowledged,
    /// Waiting in the outbound queue (`1`).
    PendingSend,
    /// Any other persisted code, kept as-is.
    Unrecognized(i64),
}

impl From<i64> for DeliveryStatus {
    fn from(code: i64) -> Self {
        match code {
            0 => Self::Unacknowledged,
            1 => Self::PendingSend,
            other => Self::Unrecognized(other),
        }
    }
}

impl From<DeliveryStatus> for i64 {
    fn from(status: DeliveryStatus) -> Self {
        match status {
            DeliveryStatus::Unacknowledged => 0,
            DeliveryStatus::PendingSend => 1,
            DeliveryStatus::Unrecognized(code) => code,
        }
    }
}

/// One flattened `{name, value}` pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedValue {
    pub name: String,
    #[serde(default)]
    pub value: Value,
}

impl NamedValue {
    pub fn new(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Application timestamp reported by the device.
///
/// Integer and decimal forms compare numerically, so `100` matches `100.0`.
/// A decimal only equals an integer when it is integral and converts back
/// exactly; rounding through `f64` never makes two integers equal.
#[derive(Debug, Clone)]
pub enum ApplicationTime {
    Integer(i64),
    /// Integers above `i64::MAX`.
    Unsigned(u64),
    Decimal(f64),
    Text(String),
}

impl ApplicationTime {
    /// Interpret a JSON value as an application time.
    ///
    /// Returns None for null, booleans, arrays, and objects.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Some(Self::Integer(i))
                } else if let Some(u) = n.as_u64() {
                    Some(Self::Unsigned(u))
                } else {
                    n.as_f64().map(Self::Decimal)
                }
            }
            Value::String(s) => Some(Self::Text(s.clone())),
            _ => None,
        }
    }

    /// Find the `"time"` entry in a value list.
    pub fn find_in(values: &[NamedValue]) -> Option<Self> {
        values
            .iter()
            .find(|v| v.name == TIME_VALUE_NAME)
            .and_then(|v| Self::from_value(&v.value))
    }

    /// Exact integer value, if this time is numeric and integral.
    fn exact_integer(&self) -> Option<i128> {
        // 2^127: every integral f64 below this magnitude fits an i128 exactly.
        const I128_BOUND: f64 = 170_141_183_460_469_231_731_687_303_715_884_105_728.0;
        match self {
            Self::Integer(i) => Some(i128::from(*i)),
            Self::Unsigned(u) => Some(i128::from(*u)),
            Self::Decimal(d) if d.fract() == 0.0 && d.abs() < I128_BOUND => Some(*d as i128),
            _ => None,
        }
    }
}

impl PartialEq for ApplicationTime {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Text(a), Self::Text(b)) => a == b,
            (Self::Text(_), _) | (_, Self::Text(_)) => false,
            (Self::Decimal(a), Self::Decimal(b)) => a == b,
            _ => match (self.exact_integer(), other.exact_integer()) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            },
        }
    }
}

impl fmt::Display for ApplicationTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(i) => write!(f, "{i}"),
            Self::Unsigned(u) => write!(f, "{u}"),
            Self::Decimal(d) => write!(f, "{d}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

/// Event identity used to match acknowledgments against the ledger.
///
/// Two distinct events from the same source reporting the same application
/// time share an identity. That collision is accepted.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordIdentity {
    pub source_id: String,
    pub time: ApplicationTime,
}

impl RecordIdentity {
    fn from_parts(source_id: &str, values: &[NamedValue]) -> Option<Self> {
        ApplicationTime::find_in(values).map(|time| Self {
            source_id: source_id.to_string(),
            time,
        })
    }
}

/// One telemetry record as persisted and transmitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Fixed tag identifying this relay instance.
    #[serde(rename = "consolidatorId", default)]
    pub producer_tag: String,
    /// Ingestion time in seconds since the epoch (not device time).
    #[serde(
        rename = "recordedTime",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub recorded_at: Option<i64>,
    /// Originating device ("machine").
    #[serde(rename = "machine", default, deserialize_with = "lenient_string")]
    pub source_id: String,
    /// Secondary device identifier, carried through unmodified.
    #[serde(rename = "mac", default)]
    pub network_address: Value,
    #[serde(rename = "cloudStatus")]
    pub delivery_status: DeliveryStatus,
    #[serde(rename = "valuesList", default)]
    pub values: Vec<NamedValue>,
}

impl Record {
    /// Copy of this record carrying `status`.
    pub fn with_status(&self, status: DeliveryStatus) -> Self {
        Self {
            delivery_status: status,
            ..self.clone()
        }
    }

    /// The device-reported `"time"` value, if present and scalar.
    pub fn application_time(&self) -> Option<ApplicationTime> {
        ApplicationTime::find_in(&self.values)
    }

    /// Identity for acknowledgment matching; None without an application time.
    pub fn identity(&self) -> Option<RecordIdentity> {
        RecordIdentity::from_parts(&self.source_id, &self.values)
    }

    /// Seconds elapsed since ingestion. Records without `recorded_at` are age 0.
    pub fn age_secs(&self, now: i64) -> i64 {
        now.saturating_sub(self.recorded_at.unwrap_or(now))
    }

    /// Whether the record's age has reached `stale_after`.
    pub fn is_stale(&self, now: i64, stale_after: Duration) -> bool {
        let threshold = i64::try_from(stale_after.as_secs()).unwrap_or(i64::MAX);
        self.age_secs(now) >= threshold
    }
}

/// Minimal record summary returned by the endpoint in `stored`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StoredSummary {
    #[serde(rename = "machine", default, deserialize_with = "lenient_string")]
    pub source_id: String,
    #[serde(rename = "valuesList", default)]
    pub values: Vec<NamedValue>,
}

impl StoredSummary {
    pub fn identity(&self) -> Option<RecordIdentity> {
        RecordIdentity::from_parts(&self.source_id, &self.values)
    }
}

/// Accept any scalar as a string; null becomes empty.
pub(crate) fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(scalar_to_string(&Value::deserialize(deserializer)?))
}

pub(crate) fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(source: &str, time: Value) -> Record {
        Record {
            producer_tag: "string".to_string(),
            recorded_at: Some(1_000),
            source_id: source.to_string(),
            network_address: json!("aa:bb"),
            delivery_status: DeliveryStatus::Unacknowledged,
            values: vec![NamedValue::new("time", time), NamedValue::new("temp", 5)],
        }
    }

    #[test]
    fn test_record_wire_format() {
        let json = serde_json::to_value(record("M1", json!(100))).unwrap();
        assert_eq!(
            json,
            json!({
                "consolidatorId": "string",
                "recordedTime": 1000,
                "machine": "M1",
                "mac": "aa:bb",
                "cloudStatus": 0,
                "valuesList": [
                    {"name": "time", "value": 100},
                    {"name": "temp", "value": 5}
                ]
            })
        );
    }

    #[test]
    fn test_record_field_order_follows_wire_layout() {
        let line = serde_json::to_string(&record("M1", json!(100))).unwrap();
        let tag = line.find("consolidatorId").unwrap();
        let machine = line.find("machine").unwrap();
        let values = line.find("valuesList").unwrap();
        assert!(tag < machine && machine < values);
    }

    #[test]
    fn test_delivery_status_codes() {
        assert_eq!(DeliveryStatus::from(0), DeliveryStatus::Unacknowledged);
        assert_eq!(DeliveryStatus::from(1), DeliveryStatus::PendingSend);
        assert_eq!(DeliveryStatus::from(7), DeliveryStatus::Unrecognized(7));
        assert_eq!(i64::from(DeliveryStatus::Unrecognized(7)), 7);
    }

    #[test]
    fn test_unrecognized_status_survives_parse() {
        let parsed: Record = serde_json::from_value(json!({
            "machine": "M1",
            "cloudStatus": 2,
            "valuesList": []
        }))
        .unwrap();
        assert_eq!(parsed.delivery_status, DeliveryStatus::Unrecognized(2));
        assert_eq!(parsed.recorded_at, None);
        assert_eq!(parsed.network_address, Value::Null);
    }

    #[test]
    fn test_numeric_machine_is_stringified() {
        let summary: StoredSummary = serde_json::from_value(json!({
            "machine": 42,
            "valuesList": [{"name": "time", "value": 1}]
        }))
        .unwrap();
        assert_eq!(summary.source_id, "42");
    }

    #[test]
    fn test_application_time_numeric_equality() {
        assert_eq!(ApplicationTime::Integer(100), ApplicationTime::Decimal(100.0));
        assert_ne!(ApplicationTime::Integer(100), ApplicationTime::Integer(101));
        assert_ne!(
            ApplicationTime::Integer(100),
            ApplicationTime::Text("100".to_string())
        );
    }

    #[test]
    fn test_application_time_large_integers_stay_distinct() {
        let two_53: i64 = 1 << 53;
        assert_ne!(
            ApplicationTime::Integer(two_53 + 1),
            ApplicationTime::Decimal(two_53 as f64)
        );
        assert_eq!(
            ApplicationTime::Integer(two_53),
            ApplicationTime::Decimal(two_53 as f64)
        );
        assert_ne!(ApplicationTime::Integer(100), ApplicationTime::Decimal(100.5));

        let big = ApplicationTime::from_value(&json!(u64::MAX)).unwrap();
        let below_max = ApplicationTime::from_value(&json!(u64::MAX - 1)).unwrap();
        assert!(matches!(big, ApplicationTime::Unsigned(u64::MAX)));
        assert_ne!(big, below_max);
        assert_eq!(big.to_string(), u64::MAX.to_string());
    }

    #[test]
    fn test_application_time_rejects_non_scalars() {
        assert!(ApplicationTime::from_value(&Value::Null).is_none());
        assert!(ApplicationTime::from_value(&json!(true)).is_none());
        assert!(ApplicationTime::from_value(&json!({"t": 1})).is_none());
    }

    #[test]
    fn test_identity_matches_summary() {
        let summary: StoredSummary = serde_json::from_value(json!({
            "machine": "M1",
            "valuesList": [{"name": "time", "value": 100}]
        }))
        .unwrap();

        assert_eq!(record("M1", json!(100)).identity(), summary.identity());
        assert_ne!(record("M2", json!(100)).identity(), summary.identity());
        assert_ne!(record("M1", json!(101)).identity(), summary.identity());
    }

    #[test]
    fn test_identity_absent_without_time() {
        let mut r = record("M1", json!(100));
        r.values.retain(|v| v.name != TIME_VALUE_NAME);
        assert!(r.identity().is_none());
    }

    #[test]
    fn test_age_and_staleness() {
        let r = record("M1", json!(100));
        assert_eq!(r.age_secs(4_600), 3_600);
        assert!(r.is_stale(4_600, Duration::from_secs(3_600)));
        assert!(!r.is_stale(4_599, Duration::from_secs(3_600)));

        let undated = Record {
            recorded_at: None,
            ..r
        };
        assert_eq!(undated.age_secs(1_000_000), 0);
        assert!(!undated.is_stale(1_000_000, Duration::from_secs(3_600)));
    }

    #[test]
    fn test_with_status_keeps_content() {
        let r = record("M1", json!(100));
        let queued = r.with_status(DeliveryStatus::PendingSend);
        assert_eq!(queued.delivery_status, DeliveryStatus::PendingSend);
        assert_eq!(queued.values, r.values);
        assert_eq!(queued.source_id, r.source_id);
    }
}
