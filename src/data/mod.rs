//! Data models and processing for sensor telemetry.
//!
//! This module holds everything that runs synchronously on the ingestion or
//! read path: typed readings, the rolling history, display ranges and
//! threshold evaluation.
//!
//! ## Submodules
//!
//! - [`duration`]: Parsing and formatting of duration strings (e.g., "1s", "500ms")
//! - [`history`]: Bounded per-metric history ([`HistoryStore`], [`TelemetrySnapshot`])
//! - [`range`]: Padded display ranges for charts
//! - [`reading`]: Core data models ([`SensorReading`], [`Metric`], [`Timestamp`])
//! - [`threshold`]: Health classification and recommendations ([`Thresholds`])
//!
//! ## Data Flow
//!
//! ```text
//! SensorReading (decoded or bootstrapped)
//!        │
//!        ▼
//! HistoryStore::seed() / append()
//!        │
//!        ▼
//! HistoryStore::snapshot() ──▶ range_for()      (chart bounds)
//!                          └─▶ Thresholds       (status + advice)
//! ```

pub mod duration;
pub mod history;
pub mod range;
pub mod reading;
pub mod threshold;

pub use history::{HistoryStore, MetricSeries, SeedOutcome, TelemetrySnapshot, WINDOW_CAPACITY};
pub use range::{range_for, DisplayRange, Padding, DEFAULT_RANGE};
pub use reading::{Metric, SensorReading, Timestamp};
pub use threshold::{
    Assessment, Condition, HealthStatus, Rule, Threshold, Thresholds, NEUTRAL_RECOMMENDATION,
};
