//! Historical bootstrap fetch.
//!
//! The sensor gateway keeps a short history and serves it over HTTP at
//! `GET <endpoint>/data`. The response is fetched once when the pipeline
//! starts and used to seed the history before live data arrives.
//!
//! ## Response format
//!
//! ```json
//! { "data": [[1718000000, 24.1, 60.2, 41.0, 512.0], ...] }
//! ```
//!
//! Each tuple is `[timestamp, temperature, humidity, moisture, light]`.
//! Records may also be objects with those field names, and the `data`
//! wrapper may be omitted.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::data::reading::NumberLike;
use crate::data::{SensorReading, TelemetrySnapshot, Timestamp};
use crate::error::LoadError;

/// Date-time layouts accepted for string timestamps, besides RFC 3339.
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
];

/// A one-shot source of historical readings.
#[async_trait]
pub trait BootstrapSource: Send + Sync {
    /// Fetch the history.
    async fn load(&self) -> Result<TelemetrySnapshot, LoadError>;

    /// Returns a human-readable description of the source.
    fn description(&self) -> &str;
}

/// Bootstrap loader backed by the gateway's HTTP endpoint.
#[derive(Debug, Clone)]
pub struct HttpBootstrap {
    client: Client,
    url: String,
}

impl HttpBootstrap {
    /// Create a new builder for configuring the loader.
    pub fn builder() -> HttpBootstrapBuilder {
        HttpBootstrapBuilder::default()
    }

    /// Full URL that will be requested.
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl BootstrapSource for HttpBootstrap {
    async fn load(&self) -> Result<TelemetrySnapshot, LoadError> {
        let response = self.client.get(&self.url).send().await?;

        if !response.status().is_success() {
            return Err(LoadError::Status(response.status().as_u16()));
        }

        let body = response.bytes().await?;
        let snapshot = parse_history(&body)?;
        info!(
            "Fetched {} historical points from {}",
            snapshot.len(),
            self.url
        );
        Ok(snapshot)
    }

    fn description(&self) -> &str {
        &self.url
    }
}

/// Builder for HttpBootstrap.
#[derive(Debug, Default)]
pub struct HttpBootstrapBuilder {
    endpoint: Option<String>,
    timeout: Option<Duration>,
}

impl HttpBootstrapBuilder {
    /// Set the gateway base URL (default: "http://localhost:8001").
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Set the request timeout (default: 10 seconds).
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Build the loader.
    pub fn build(self) -> Result<HttpBootstrap, LoadError> {
        let timeout = self.timeout.unwrap_or(Duration::from_secs(10));
        let client = Client::builder().timeout(timeout).build()?;

        let endpoint = self
            .endpoint
            .unwrap_or_else(|| "http://localhost:8001".to_string());
        let url = format!("{}/data", endpoint.trim_end_matches('/'));

        Ok(HttpBootstrap { client, url })
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum HistoryResponse {
    // Bare first: a one-record bare list would otherwise parse as the wrapper.
    Bare(Vec<Value>),
    Wrapped { data: Vec<Value> },
}

/// Parse a bootstrap response body into a snapshot.
///
/// Records that cannot be converted are skipped with a warning; only a body
/// that is not a list of records at all is an error.
pub fn parse_history(body: &[u8]) -> Result<TelemetrySnapshot, LoadError> {
    let records = match serde_json::from_slice::<HistoryResponse>(body)? {
        HistoryResponse::Bare(data) => data,
        HistoryResponse::Wrapped { data } => data,
    };

    let mut readings = Vec::with_capacity(records.len());
    let mut skipped = 0usize;
    for record in &records {
        match record_to_reading(record) {
            Some(reading) => readings.push(reading),
            None => skipped += 1,
        }
    }

    if skipped > 0 {
        warn!(
            "Skipped {} of {} malformed historical records",
            skipped,
            records.len()
        );
    }

    Ok(TelemetrySnapshot::from_readings(&readings))
}

fn record_to_reading(record: &Value) -> Option<SensorReading> {
    let (timestamp, values) = match record {
        Value::Array(items) if items.len() >= 5 => {
            (&items[0], [&items[1], &items[2], &items[3], &items[4]])
        }
        Value::Object(map) => (
            map.get("timestamp")?,
            [
                map.get("temperature")?,
                map.get("humidity")?,
                map.get("moisture")?,
                map.get("light")?,
            ],
        ),
        _ => return None,
    };

    let timestamp = parse_timestamp(timestamp)?;
    let [temperature, humidity, moisture, light] = values.map(number);
    Some(SensorReading::new(
        timestamp,
        temperature?,
        humidity?,
        moisture?,
        light?,
    ))
}

fn number(value: &Value) -> Option<f64> {
    NumberLike::deserialize(value).ok()?.to_finite().ok()
}

/// Interpret a historical timestamp.
///
/// Numbers are Unix seconds, or milliseconds when large enough to be
/// unambiguous. Strings may be numeric, RFC 3339, or a naive
/// `YYYY-MM-DD HH:MM:SS` date-time taken as UTC.
pub fn parse_timestamp(value: &Value) -> Option<Timestamp> {
    if let Some(n) = number(value) {
        return Timestamp::from_epoch(n);
    }

    let text = value.as_str()?.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return u64::try_from(dt.timestamp_millis()).ok().map(Timestamp);
    }
    DATETIME_FORMATS.iter().find_map(|format| {
        let naive = NaiveDateTime::parse_from_str(text, format).ok()?;
        u64::try_from(naive.and_utc().timestamp_millis()).ok().map(Timestamp)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Metric;
    use serde_json::json;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve a single canned HTTP response on a local port.
    async fn serve_once(status: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4096];
            let _ = socket.read(&mut buf).await;
            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            let _ = socket.write_all(response.as_bytes()).await;
            let _ = socket.shutdown().await;
        });

        format!("http://{}", addr)
    }

    #[test]
    fn test_parse_wrapped_tuples() {
        let body = br#"{"data": [
            [1718000000, 24.1, 60.2, 41.0, 512.0],
            [1718000060, "24.5", "60.0", "40.5", "515"]
        ]}"#;

        let snapshot = parse_history(body).unwrap();
        assert_eq!(snapshot.temperature.len(), 2);

        let entries: Vec<_> = snapshot.temperature.iter().collect();
        assert_eq!(entries[0], (Timestamp(1_718_000_000_000), 24.1));
        assert_eq!(entries[1], (Timestamp(1_718_000_060_000), 24.5));
        assert_eq!(snapshot.series(Metric::Light).last().map(|(_, v)| v), Some(515.0));
    }

    #[test]
    fn test_parse_bare_objects() {
        let body = br#"[
            {"timestamp": "2024-06-10 08:00:00", "temperature": 21, "humidity": 55, "moisture": 33, "light": 300},
            {"timestamp": "2024-06-10T08:01:00Z", "temperature": 22, "humidity": 56, "moisture": 34, "light": 310}
        ]"#;

        let snapshot = parse_history(body).unwrap();
        let keys: Vec<Timestamp> = snapshot.humidity.iter().map(|(k, _)| k).collect();
        assert_eq!(keys.len(), 2);
        assert_eq!(keys[1].as_millis() - keys[0].as_millis(), 60_000);
    }

    #[test]
    fn test_parse_newest_first_body() {
        let records: Vec<String> = (0..25u64)
            .rev()
            .map(|i| format!("[{}, {}, 60, 40, 500]", 1_718_000_000 + i * 60, i))
            .collect();
        let body = format!(r#"{{"data": [{}]}}"#, records.join(","));

        let snapshot = parse_history(body.as_bytes()).unwrap();
        let values: Vec<f64> = snapshot.temperature.values().collect();
        let expected: Vec<f64> = (5..25).map(|i| i as f64).collect();
        assert_eq!(values, expected);
    }

    #[test]
    fn test_parse_skips_malformed_records() {
        let body = br#"{"data": [
            [1, 2, 3],
            [1718000000, "abc", 60, 40, 500],
            "garbage",
            [1718000060, 24, 60, 40, 500]
        ]}"#;

        let snapshot = parse_history(body).unwrap();
        assert_eq!(snapshot.temperature.len(), 1);
        assert_eq!(snapshot.moisture.len(), 1);
    }

    #[test]
    fn test_parse_empty_history() {
        assert!(parse_history(br#"{"data": []}"#).unwrap().is_empty());
    }

    #[test]
    fn test_parse_rejects_non_list_body() {
        assert!(matches!(
            parse_history(br#"{"status": "ok"}"#),
            Err(LoadError::Parse(_))
        ));
        assert!(matches!(parse_history(b"<html>"), Err(LoadError::Parse(_))));
    }

    #[test]
    fn test_parse_timestamp_variants() {
        assert_eq!(parse_timestamp(&json!(1718000000)), Some(Timestamp(1_718_000_000_000)));
        assert_eq!(parse_timestamp(&json!(1718000000123u64)), Some(Timestamp(1_718_000_000_123)));
        assert_eq!(parse_timestamp(&json!("1718000000")), Some(Timestamp(1_718_000_000_000)));
        assert_eq!(
            parse_timestamp(&json!("1970-01-01 00:00:01")),
            Some(Timestamp(1_000))
        );
        assert_eq!(
            parse_timestamp(&json!("1970-01-01T00:00:02+00:00")),
            Some(Timestamp(2_000))
        );
        assert_eq!(parse_timestamp(&json!("yesterday")), None);
        assert_eq!(parse_timestamp(&json!(-5)), None);
    }

    #[test]
    fn test_builder_defaults() {
        let loader = HttpBootstrap::builder().build().unwrap();
        assert_eq!(loader.url(), "http://localhost:8001/data");

        let loader = HttpBootstrap::builder()
            .endpoint("http://gateway.local:9000/")
            .build()
            .unwrap();
        assert_eq!(loader.url(), "http://gateway.local:9000/data");
    }

    #[tokio::test]
    async fn test_http_load_success() {
        let base = serve_once("200 OK", r#"{"data": [[1718000000, 24, 60, 40, 500]]}"#).await;
        let loader = HttpBootstrap::builder().endpoint(base).build().unwrap();

        let snapshot = loader.load().await.unwrap();
        assert_eq!(snapshot.light.len(), 1);
    }

    #[tokio::test]
    async fn test_http_load_error_status() {
        let base = serve_once("500 Internal Server Error", "{}").await;
        let loader = HttpBootstrap::builder().endpoint(base).build().unwrap();

        assert!(matches!(loader.load().await, Err(LoadError::Status(500))));
    }

    #[tokio::test]
    async fn test_http_load_unreachable() {
        // Bind then drop to get a port nobody listens on.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let loader = HttpBootstrap::builder()
            .endpoint(format!("http://{}", addr))
            .timeout(Duration::from_secs(2))
            .build()
            .unwrap();

        assert!(loader.load().await.is_err());
    }
}
