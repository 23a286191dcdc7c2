//! Raw payload → Record mapping.

use relay_ledger::{DeliveryStatus, NamedValue, Record};
use serde_json::Value;

/// Build a Record from a raw sensor payload.
///
/// Field mapping:
/// - `machine` → `source_id` (scalars stringified, missing → empty)
/// - `mac` → `network_address`, unmodified (missing → null)
/// - `valuesList`: every key of every object entry becomes one `{name, value}`
///   pair, in the payload's key order. Non-object entries are ignored.
///
/// Missing or mistyped fields never fail the transform.
pub fn transform_payload(
    payload: &Value,
    status: DeliveryStatus,
    producer_tag: &str,
    recorded_at: i64,
) -> Record {
    let source_id = match payload.get("machine") {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    };

    let values = payload
        .get("valuesList")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_object)
                .flat_map(|entry| entry.iter())
                .map(|(name, value)| NamedValue::new(name.clone(), value.clone()))
                .collect()
        })
        .unwrap_or_default();

    Record {
        producer_tag: producer_tag.to_string(),
        recorded_at: Some(recorded_at),
        source_id,
        network_address: payload.get("mac").cloned().unwrap_or(Value::Null),
        delivery_status: status,
        values,
    }
}
