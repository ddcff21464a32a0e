//! Decoding of live sensor payloads.
//!
//! Payloads are JSON objects such as
//! `{"temperature": 24.3, "humidity": 61, "moisture": "38.5", "light": 540}`.
//! All four metric fields are required. An optional numeric `timestamp`
//! (Unix seconds or milliseconds) is honoured when present and not too far
//! ahead of the receiver's clock; otherwise the reading is stamped with the
//! time of decoding.

use std::time::Duration;

use serde::Deserialize;

use crate::data::reading::NumberLike;
use crate::data::{Metric, SensorReading, Timestamp};
use crate::error::DecodeError;

/// Payload timestamps further ahead of the receiver than this are ignored.
pub const MAX_CLOCK_SKEW: Duration = Duration::from_secs(60);

#[derive(Debug, Deserialize)]
struct RawPayload {
    temperature: Option<NumberLike>,
    humidity: Option<NumberLike>,
    moisture: Option<NumberLike>,
    light: Option<NumberLike>,
    timestamp: Option<NumberLike>,
}

/// Decode a raw payload into a reading.
pub fn decode(payload: &[u8]) -> Result<SensorReading, DecodeError> {
    decode_at(payload, Timestamp::now())
}

/// Decode a raw payload, stamping it with `received` unless it carries its
/// own timestamp.
pub fn decode_at(payload: &[u8], received: Timestamp) -> Result<SensorReading, DecodeError> {
    let value: serde_json::Value = serde_json::from_slice(payload)
        .map_err(|e| DecodeError::InvalidPayload(e.to_string()))?;
    if !value.is_object() {
        return Err(DecodeError::InvalidPayload("expected a JSON object".to_string()));
    }
    let raw = RawPayload::deserialize(value)
        .map_err(|e| DecodeError::InvalidPayload(e.to_string()))?;

    let temperature = required(Metric::Temperature, raw.temperature.as_ref())?;
    let humidity = required(Metric::Humidity, raw.humidity.as_ref())?;
    let moisture = required(Metric::Moisture, raw.moisture.as_ref())?;
    let light = required(Metric::Light, raw.light.as_ref())?;

    let horizon = received
        .as_millis()
        .saturating_add(MAX_CLOCK_SKEW.as_millis() as u64);
    let timestamp = raw
        .timestamp
        .as_ref()
        .and_then(|t| t.to_finite().ok())
        .and_then(Timestamp::from_epoch)
        .filter(|t| t.as_millis() <= horizon)
        .unwrap_or(received);

    Ok(SensorReading::new(
        timestamp,
        temperature,
        humidity,
        moisture,
        light,
    ))
}

fn required(metric: Metric, value: Option<&NumberLike>) -> Result<f64, DecodeError> {
    let field = metric.field();
    let value = value.ok_or(DecodeError::MissingField(field))?;
    value
        .to_finite()
        .map_err(|value| DecodeError::NotNumeric { field, value })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::HistoryStore;

    #[test]
    fn test_decode_numeric_payload() {
        let payload = br#"{"temperature": 24.3, "humidity": 61, "moisture": 38.5, "light": 540}"#;
        let reading = decode_at(payload, Timestamp(7)).unwrap();

        assert_eq!(reading.timestamp(), Timestamp(7));
        assert_eq!(reading.temperature(), 24.3);
        assert_eq!(reading.humidity(), 61.0);
        assert_eq!(reading.moisture(), 38.5);
        assert_eq!(reading.light(), 540.0);
    }

    #[test]
    fn test_decode_coerces_numeric_strings() {
        let payload = br#"{"temperature": "24.30", "humidity": "61", "moisture": 38, "light": "540.0"}"#;
        let reading = decode(payload).unwrap();
        assert_eq!(reading.temperature(), 24.3);
        assert_eq!(reading.light(), 540.0);
    }

    #[test]
    fn test_decode_honours_payload_timestamp() {
        let received = Timestamp(1_700_000_005_000);
        let payload =
            br#"{"temperature": 1, "humidity": 2, "moisture": 3, "light": 4, "timestamp": 1700000000000}"#;
        let reading = decode_at(payload, received).unwrap();
        assert_eq!(reading.timestamp(), Timestamp(1_700_000_000_000));

        // Seconds are read the same way as bootstrap records.
        let payload =
            br#"{"temperature": 1, "humidity": 2, "moisture": 3, "light": 4, "timestamp": 1700000000}"#;
        let reading = decode_at(payload, received).unwrap();
        assert_eq!(reading.timestamp(), Timestamp(1_700_000_000_000));
    }

    #[test]
    fn test_decode_ignores_future_timestamp() {
        let received = Timestamp(1_700_000_000_000);
        for ts in ["1e30", "1800000000000", "-5"] {
            let payload = format!(
                r#"{{"temperature": 1, "humidity": 2, "moisture": 3, "light": 4, "timestamp": {}}}"#,
                ts
            );
            let reading = decode_at(payload.as_bytes(), received).unwrap();
            assert_eq!(reading.timestamp(), received, "timestamp {}", ts);
        }
    }

    #[test]
    fn test_far_future_payload_keeps_history_keys_unique() {
        let store = HistoryStore::new();
        let now = Timestamp::now();
        let skewed =
            br#"{"temperature": 1, "humidity": 2, "moisture": 3, "light": 4, "timestamp": 1e30}"#;
        let normal = br#"{"temperature": 5, "humidity": 6, "moisture": 7, "light": 8}"#;

        store.append(&decode_at(skewed, now).unwrap());
        store.append(&decode_at(normal, now).unwrap());

        let keys: Vec<Timestamp> = store.snapshot().temperature.iter().map(|(k, _)| k).collect();
        assert_eq!(keys.len(), 2);
        assert!(keys[0] < keys[1]);
        assert!(keys[1].as_millis() < u64::MAX / 2);
    }

    #[test]
    fn test_decode_ignores_unknown_fields() {
        let payload =
            br#"{"temperature": 1, "humidity": 2, "moisture": 3, "light": 4, "device": "node-7"}"#;
        assert!(decode(payload).is_ok());
    }

    #[test]
    fn test_rejects_non_numeric_field() {
        let err = decode(br#"{"temperature": "abc"}"#).unwrap_err();
        assert_eq!(
            err,
            DecodeError::NotNumeric {
                field: "temperature",
                value: "abc".to_string()
            }
        );
    }

    #[test]
    fn test_rejects_missing_field() {
        let err = decode(br#"{"temperature": 20, "humidity": 50, "moisture": 40}"#).unwrap_err();
        assert_eq!(err, DecodeError::MissingField("light"));
    }

    #[test]
    fn test_rejects_null_and_non_finite_values() {
        let err = decode(br#"{"temperature": null, "humidity": 1, "moisture": 1, "light": 1}"#)
            .unwrap_err();
        assert_eq!(err, DecodeError::MissingField("temperature"));

        let err = decode(br#"{"temperature": "inf", "humidity": 1, "moisture": 1, "light": 1}"#)
            .unwrap_err();
        assert!(matches!(err, DecodeError::NotNumeric { field: "temperature", .. }));
    }

    #[test]
    fn test_rejects_invalid_json() {
        assert!(matches!(
            decode(b"not valid json"),
            Err(DecodeError::InvalidPayload(_))
        ));
        assert!(matches!(decode(b"[1, 2, 3, 4, 5]"), Err(DecodeError::InvalidPayload(_))));
        assert!(matches!(decode(b""), Err(DecodeError::InvalidPayload(_))));
    }
}
