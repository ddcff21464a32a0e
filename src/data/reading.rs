//! Sensor readings and the metrics they carry.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// One of the four measured quantities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    Temperature,
    Humidity,
    Moisture,
    Light,
}

impl Metric {
    /// All metrics in display order.
    pub const ALL: [Metric; 4] = [
        Metric::Temperature,
        Metric::Humidity,
        Metric::Moisture,
        Metric::Light,
    ];

    /// Field name used in live payloads and bootstrap records.
    pub fn field(&self) -> &'static str {
        match self {
            Metric::Temperature => "temperature",
            Metric::Humidity => "humidity",
            Metric::Moisture => "moisture",
            Metric::Light => "light",
        }
    }

    /// Returns the display label for this metric.
    pub fn label(&self) -> &'static str {
        match self {
            Metric::Temperature => "Temperature",
            Metric::Humidity => "Humidity",
            Metric::Moisture => "Moisture",
            Metric::Light => "Light",
        }
    }

    /// Returns the display unit for this metric.
    pub fn unit(&self) -> &'static str {
        match self {
            Metric::Temperature => "°C",
            Metric::Humidity | Metric::Moisture => "%",
            Metric::Light => "lux",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Epoch numbers at or above this are milliseconds, below are seconds.
const MILLIS_CUTOFF: f64 = 1e12;

/// 9999-12-31T23:59:59.999Z in milliseconds.
const MAX_MILLIS: u64 = 253_402_300_799_999;

/// Milliseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(pub u64);

impl Timestamp {
    /// Wall-clock time right now.
    pub fn now() -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;
        Timestamp(millis)
    }

    /// Milliseconds since the Unix epoch.
    pub fn as_millis(&self) -> u64 {
        self.0
    }

    /// Interpret a Unix epoch number.
    ///
    /// Values below 1e12 are seconds, larger ones milliseconds. Negative,
    /// non-finite and post-9999 values yield `None`.
    pub fn from_epoch(n: f64) -> Option<Self> {
        if !n.is_finite() || n < 0.0 {
            return None;
        }
        let millis = if n >= MILLIS_CUTOFF { n } else { n * 1000.0 };
        if millis > MAX_MILLIS as f64 {
            return None;
        }
        Some(Timestamp(millis as u64))
    }

    /// The smallest timestamp strictly after this one.
    pub fn next(&self) -> Self {
        Timestamp(self.0.saturating_add(1))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match chrono::DateTime::from_timestamp_millis(self.0 as i64) {
            Some(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M:%S%.3f")),
            None => write!(f, "{}ms", self.0),
        }
    }
}

/// A single set of measurements taken at one instant.
///
/// Readings are only built by the message decoder and the bootstrap loader,
/// and never change afterwards. Every value is finite.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SensorReading {
    timestamp: Timestamp,
    temperature: f64,
    humidity: f64,
    moisture: f64,
    light: f64,
}

impl SensorReading {
    pub(crate) fn new(
        timestamp: Timestamp,
        temperature: f64,
        humidity: f64,
        moisture: f64,
        light: f64,
    ) -> Self {
        debug_assert!([temperature, humidity, moisture, light]
            .iter()
            .all(|v| v.is_finite()));
        Self {
            timestamp,
            temperature,
            humidity,
            moisture,
            light,
        }
    }

    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    /// Temperature in °C.
    pub fn temperature(&self) -> f64 {
        self.temperature
    }

    /// Relative humidity in %.
    pub fn humidity(&self) -> f64 {
        self.humidity
    }

    /// Soil moisture in %.
    pub fn moisture(&self) -> f64 {
        self.moisture
    }

    /// Light intensity in lux.
    pub fn light(&self) -> f64 {
        self.light
    }

    /// Value of the given metric.
    pub fn value(&self, metric: Metric) -> f64 {
        match metric {
            Metric::Temperature => self.temperature,
            Metric::Humidity => self.humidity,
            Metric::Moisture => self.moisture,
            Metric::Light => self.light,
        }
    }

    /// Iterate over `(metric, value)` pairs in display order.
    pub fn values(&self) -> impl Iterator<Item = (Metric, f64)> + '_ {
        Metric::ALL.into_iter().map(move |m| (m, self.value(m)))
    }
}

/// A JSON value that may hold a number, either as a number or as text.
///
/// Sensor firmware and the bootstrap server are inconsistent about quoting,
/// so `23.5` and `"23.5"` are both accepted.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum NumberLike {
    Number(f64),
    Text(String),
    Other(serde_json::Value),
}

impl NumberLike {
    /// The finite numeric value, or the raw text for error reporting.
    pub(crate) fn to_finite(&self) -> Result<f64, String> {
        let value = match self {
            NumberLike::Number(n) => *n,
            NumberLike::Text(s) => s.trim().parse::<f64>().map_err(|_| s.clone())?,
            NumberLike::Other(v) => return Err(v.to_string()),
        };
        if value.is_finite() {
            Ok(value)
        } else {
            Err(value.to_string())
        }
    }
}
