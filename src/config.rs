//! Layered runtime configuration.
//!
//! Sources are merged in this order, later ones winning:
//!
//! 1. Built-in defaults
//! 2. An optional TOML file
//! 3. Environment variables prefixed with `AGRISENSE__`, using `__` between
//!    nested keys (e.g. `AGRISENSE__BROKER__HOST=localhost`)
//!
//! Command-line flags are applied on top by the binary.
//!
//! # Example
//!
//! ```toml
//! [broker]
//! host = "broker.hivemq.com"
//! port = 1883
//! topic = "agrisense/farm/sensors"
//! retry_interval = "1s"
//!
//! [bootstrap]
//! url = "http://localhost:8001"
//! timeout = "10s"
//!
//! [display.padding]
//! light = 25
//!
//! [thresholds.moisture]
//! low = 35
//! rules = [{ when = { below = 25 }, text = "Enable Irrigation System" }]
//! ```

use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::data::duration::serde_str;
use crate::data::{Metric, Padding, Rule, Thresholds};
use crate::pipeline::{PipelineOptions, DEFAULT_TOPIC};
use crate::source::mqtt::DEFAULT_CLIENT_ID_PREFIX;
use crate::source::ConnectionOptions;

const ENV_PREFIX: &str = "AGRISENSE";
const ENV_SEPARATOR: &str = "__";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerSettings {
    pub host: String,
    pub port: u16,
    pub topic: String,
    pub client_id_prefix: String,
    #[serde(with = "serde_str")]
    pub keep_alive: Duration,
    #[serde(with = "serde_str")]
    pub connect_timeout: Duration,
    #[serde(with = "serde_str")]
    pub retry_interval: Duration,
}

impl Default for BrokerSettings {
    fn default() -> Self {
        Self {
            host: "broker.hivemq.com".to_string(),
            port: 1883,
            topic: DEFAULT_TOPIC.to_string(),
            client_id_prefix: DEFAULT_CLIENT_ID_PREFIX.to_string(),
            keep_alive: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(4),
            retry_interval: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BootstrapSettings {
    pub enabled: bool,
    pub url: String,
    #[serde(with = "serde_str")]
    pub timeout: Duration,
}

impl Default for BootstrapSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            url: "http://localhost:8001".to_string(),
            timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplaySettings {
    pub padding: Padding,
    /// How often the binary logs a status report.
    #[serde(with = "serde_str")]
    pub refresh: Duration,
}

impl Default for DisplaySettings {
    fn default() -> Self {
        Self {
            padding: Padding::default(),
            refresh: Duration::from_secs(5),
        }
    }
}

/// Partial override of one metric's threshold.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdOverride {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub low: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub high: Option<f64>,
    /// Replaces the default rules entirely when present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rules: Option<Vec<Rule>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdOverrides {
    pub temperature: ThresholdOverride,
    pub humidity: ThresholdOverride,
    pub moisture: ThresholdOverride,
    pub light: ThresholdOverride,
}

impl ThresholdOverrides {
    fn for_metric(&self, metric: Metric) -> &ThresholdOverride {
        match metric {
            Metric::Temperature => &self.temperature,
            Metric::Humidity => &self.humidity,
            Metric::Moisture => &self.moisture,
            Metric::Light => &self.light,
        }
    }

    /// Apply the overrides on top of the built-in thresholds.
    pub fn resolve(&self) -> Thresholds {
        let mut thresholds = Thresholds::default();
        for metric in Metric::ALL {
            let overrides = self.for_metric(metric);
            let threshold = thresholds.get_mut(metric);
            if let Some(low) = overrides.low {
                threshold.low = low;
            }
            if let Some(high) = overrides.high {
                threshold.high = high;
            }
            if let Some(rules) = &overrides.rules {
                threshold.rules = rules.clone();
            }
        }
        thresholds
    }
}

/// All runtime settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub broker: BrokerSettings,
    pub bootstrap: BootstrapSettings,
    pub display: DisplaySettings,
    pub thresholds: ThresholdOverrides,
}

impl Settings {
    /// Load settings from defaults, an optional file and the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder().add_source(
            Config::try_from(&Settings::default()).context("Failed to encode default settings")?,
        );
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }
        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator(ENV_SEPARATOR)
                .separator(ENV_SEPARATOR)
                .try_parsing(true),
        );

        let settings: Settings = builder
            .build()
            .context("Failed to read configuration")?
            .try_deserialize()
            .context("Invalid configuration")?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reject settings the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.broker.host.trim().is_empty() {
            bail!("broker.host must not be empty");
        }
        if self.broker.topic.trim().is_empty() {
            bail!("broker.topic must not be empty");
        }
        if self.broker.retry_interval.is_zero() {
            bail!("broker.retry_interval must be greater than zero");
        }
        if self.broker.connect_timeout.is_zero() {
            bail!("broker.connect_timeout must be greater than zero");
        }
        if self.broker.keep_alive < Duration::from_secs(5) {
            bail!("broker.keep_alive must be at least 5s");
        }
        if self.display.refresh.is_zero() {
            bail!("display.refresh must be greater than zero");
        }

        let thresholds = self.thresholds.resolve();
        for metric in Metric::ALL {
            let threshold = thresholds.get(metric);
            if !(threshold.low <= threshold.high) {
                bail!(
                    "thresholds.{}: low ({}) must not exceed high ({})",
                    metric.field(),
                    threshold.low,
                    threshold.high
                );
            }
            if padding_invalid(self.display.padding.for_metric(metric)) {
                bail!(
                    "display.padding.{} must be a positive number",
                    metric.field()
                );
            }
        }
        Ok(())
    }

    pub fn connection_options(&self) -> ConnectionOptions {
        ConnectionOptions {
            retry_interval: self.broker.retry_interval,
            connect_timeout: self.broker.connect_timeout,
        }
    }

    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            topic: self.broker.topic.clone(),
            connection: self.connection_options(),
            thresholds: self.thresholds.resolve(),
            padding: self.display.padding,
        }
    }
}

/// Zero padding would collapse a flat series into a zero-height range.
fn padding_invalid(pad: f64) -> bool {
    !pad.is_finite() || pad <= 0.0
}
