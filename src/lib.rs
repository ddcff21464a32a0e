//! # agrisense-telemetry
//!
//! Live sensor telemetry for greenhouse and field monitoring.
//!
//! Sensor nodes publish JSON readings (temperature, humidity, soil moisture
//! and light) to an MQTT topic. This crate keeps a connection to the broker
//! alive, decodes each reading, maintains a short rolling history per metric,
//! and answers the questions a dashboard asks: what are the chart bounds,
//! is this value healthy, and what should the grower do about it.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                          Pipeline                            │
//! │  ┌───────────┐   ┌─────────┐   ┌──────────────┐              │
//! │  │ Transport │──▶│ decode  │──▶│ HistoryStore │──▶ snapshot  │
//! │  │  (MQTT)   │   └─────────┘   └──────▲───────┘    range_for │
//! │  └───────────┘                        │            classify  │
//! │  ┌───────────────┐                    │            recommend │
//! │  │BootstrapSource│────── seed ────────┘                      │
//! │  │    (HTTP)     │                                           │
//! │  └───────────────┘                                           │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! - **[`source`]**: Inbound paths. The reconnecting [`connect`] loop over a
//!   [`Transport`], the payload [`decode`]r and the [`BootstrapSource`]
//!   history fetch.
//! - **[`data`]**: Readings, the bounded [`HistoryStore`], display ranges and
//!   [`Thresholds`].
//! - **[`pipeline`]**: Wires the sources into the store and exposes the read
//!   API.
//! - **[`config`]**: Layered [`Settings`] from defaults, TOML and environment.
//!
//! ## Usage
//!
//! ### As a CLI tool
//!
//! ```bash
//! # Public broker, local history server
//! agrisense
//!
//! # Private broker, no history, export a report on exit
//! agrisense --broker-host mqtt.farm.local --no-bootstrap --export report.json
//! ```
//!
//! ### As a library
//!
//! ```no_run
//! use std::sync::Arc;
//! use agrisense_telemetry::{HttpBootstrap, Metric, MqttTransport, Pipeline, PipelineOptions};
//!
//! # tokio_test::block_on(async {
//! let transport = MqttTransport::new("broker.hivemq.com", 1883);
//! let bootstrap = HttpBootstrap::builder()
//!     .endpoint("http://localhost:8001")
//!     .build()
//!     .unwrap();
//!
//! let mut pipeline = Pipeline::start(transport, Some(Arc::new(bootstrap)), PipelineOptions::default());
//! let range = pipeline.range_for(Metric::Temperature);
//! println!("temperature axis: {}..{}", range.min, range.max);
//! pipeline.shutdown().await;
//! # });
//! ```
//!
//! ### Working with the history directly
//!
//! ```
//! use agrisense_telemetry::{decode, range_for, HistoryStore, Metric, Padding, Thresholds};
//!
//! let store = HistoryStore::new();
//! let reading = decode(br#"{"temperature": 24, "humidity": 55, "moisture": 20, "light": 600}"#).unwrap();
//! store.append(&reading);
//!
//! let snapshot = store.snapshot();
//! let range = range_for(Metric::Temperature, snapshot.series(Metric::Temperature), &Padding::default());
//! assert_eq!((range.min, range.max), (23.0, 25.0));
//!
//! let thresholds = Thresholds::default();
//! assert_eq!(thresholds.recommend(Metric::Moisture, 20.0), "Enable Irrigation System");
//! ```

pub mod config;
pub mod data;
pub mod error;
pub mod pipeline;
pub mod source;

pub use config::Settings;
pub use data::{
    range_for, Assessment, DisplayRange, HealthStatus, HistoryStore, Metric, MetricSeries,
    Padding, SensorReading, TelemetrySnapshot, Thresholds, Timestamp,
};
pub use error::{DecodeError, LoadError, TransportError};
pub use pipeline::{BootstrapStatus, Pipeline, PipelineOptions, Report};
pub use source::{
    connect, decode, BootstrapSource, ConnectionHandle, ConnectionState, HttpBootstrap,
    MqttTransport, Transport,
};
