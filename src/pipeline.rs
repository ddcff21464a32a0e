//! The running telemetry pipeline.
//!
//! A [`Pipeline`] owns the history store and wires both inbound paths into it:
//!
//! ```text
//! BootstrapSource::load() ──────────────┐ (once)
//!                                       ▼
//! Transport ─▶ connect() ─▶ decode() ─▶ gate ─▶ HistoryStore ─▶ read API
//!                              │
//!                              └─ DecodeError: counted, dropped
//! ```
//!
//! The gate holds live readings back while the bootstrap is in flight, so
//! historical points always precede live ones. Once the bootstrap settles,
//! successfully or not, the buffered readings are flushed in arrival order
//! and the gate stays open for good.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::data::{
    range_for, Assessment, DisplayRange, HealthStatus, HistoryStore, Metric, Padding,
    SeedOutcome, SensorReading, TelemetrySnapshot, Thresholds, Timestamp, WINDOW_CAPACITY,
};
use crate::error::LoadError;
use crate::source::{
    connect, decode, BootstrapSource, ConnectionHandle, ConnectionOptions, ConnectionState,
    Transport,
};

/// Default topic the sensor nodes publish on.
pub const DEFAULT_TOPIC: &str = "agrisense/farm/sensors";

/// Progress of the one-shot history bootstrap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "detail", rename_all = "lowercase")]
pub enum BootstrapStatus {
    /// The fetch is still in flight.
    Pending,
    /// History was seeded with this many points per metric.
    Seeded(usize),
    /// The fetch failed; the pipeline runs on live data only.
    Failed(String),
    /// No bootstrap source was configured.
    Skipped,
}

impl fmt::Display for BootstrapStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BootstrapStatus::Pending => f.write_str("pending"),
            BootstrapStatus::Seeded(points) => write!(f, "seeded ({} points)", points),
            BootstrapStatus::Failed(reason) => write!(f, "failed: {}", reason),
            BootstrapStatus::Skipped => f.write_str("skipped"),
        }
    }
}

/// Everything a pipeline needs besides its two sources.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub topic: String,
    pub connection: ConnectionOptions,
    pub thresholds: Thresholds,
    pub padding: Padding,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            topic: DEFAULT_TOPIC.to_string(),
            connection: ConnectionOptions::default(),
            thresholds: Thresholds::default(),
            padding: Padding::default(),
        }
    }
}

enum Gate {
    Pending(VecDeque<SensorReading>),
    Open,
}

/// State shared between the delivery task, the bootstrap task and readers.
struct Ingest {
    store: HistoryStore,
    gate: Mutex<Gate>,
    bootstrap: RwLock<BootstrapStatus>,
    decode_errors: AtomicU64,
}

impl Ingest {
    fn new(bootstrapping: bool) -> Self {
        let (gate, status) = if bootstrapping {
            (Gate::Pending(VecDeque::new()), BootstrapStatus::Pending)
        } else {
            (Gate::Open, BootstrapStatus::Skipped)
        };
        Self {
            store: HistoryStore::new(),
            gate: Mutex::new(gate),
            bootstrap: RwLock::new(status),
            decode_errors: AtomicU64::new(0),
        }
    }

    fn accept(&self, payload: &[u8]) {
        let reading = match decode(payload) {
            Ok(reading) => reading,
            Err(e) => {
                self.decode_errors.fetch_add(1, Ordering::Relaxed);
                debug!("Dropping payload: {}", e);
                return;
            }
        };

        let mut gate = self.gate.lock();
        match &mut *gate {
            Gate::Pending(buffered) => {
                if buffered.len() == WINDOW_CAPACITY {
                    buffered.pop_front();
                }
                buffered.push_back(reading);
            }
            Gate::Open => {
                self.store.append(&reading);
            }
        }
    }

    /// Seed from the bootstrap result and open the gate. Runs at most once.
    fn settle(&self, result: Result<TelemetrySnapshot, LoadError>) {
        let mut gate = self.gate.lock();
        if matches!(*gate, Gate::Open) {
            return;
        }

        let status = match result {
            Ok(history) => match self.store.seed(history) {
                SeedOutcome::Seeded(points) => {
                    info!("Bootstrap seeded {} points per metric", points);
                    BootstrapStatus::Seeded(points)
                }
                SeedOutcome::Rejected => {
                    BootstrapStatus::Failed("live data already present".to_string())
                }
            },
            Err(e) => {
                warn!("Bootstrap failed, continuing with live data only: {}", e);
                BootstrapStatus::Failed(e.to_string())
            }
        };
        *self.bootstrap.write() = status;

        if let Gate::Pending(buffered) = std::mem::replace(&mut *gate, Gate::Open) {
            if !buffered.is_empty() {
                debug!("Flushing {} buffered readings", buffered.len());
            }
            for reading in &buffered {
                self.store.append(reading);
            }
        }
    }
}

/// A point-in-time summary of the pipeline, suitable for export.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub generated_at: Timestamp,
    pub connection: String,
    pub bootstrap: BootstrapStatus,
    pub decode_errors: u64,
    pub latest: Option<SensorReading>,
    pub assessments: Vec<Assessment>,
    pub ranges: Vec<(Metric, DisplayRange)>,
    pub history: TelemetrySnapshot,
}

/// A running pipeline: one live stream, one optional bootstrap, one store.
pub struct Pipeline {
    ingest: Arc<Ingest>,
    options: PipelineOptions,
    connection: ConnectionHandle,
    bootstrap_task: Option<JoinHandle<()>>,
}

impl Pipeline {
    /// Start the bootstrap (if any) and the live stream concurrently.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start<T>(
        transport: T,
        bootstrap: Option<Arc<dyn BootstrapSource>>,
        options: PipelineOptions,
    ) -> Self
    where
        T: Transport + 'static,
    {
        let ingest = Arc::new(Ingest::new(bootstrap.is_some()));

        let bootstrap_task = bootstrap.map(|source| {
            let ingest = ingest.clone();
            info!("Loading history from {}", source.description());
            tokio::spawn(async move {
                let result = source.load().await;
                ingest.settle(result);
            })
        });

        let sink = ingest.clone();
        let connection = connect(
            transport,
            options.topic.clone(),
            options.connection,
            move |payload| sink.accept(payload),
        );

        Self {
            ingest,
            options,
            connection,
            bootstrap_task,
        }
    }

    /// Consistent copy of the current history.
    pub fn snapshot(&self) -> TelemetrySnapshot {
        self.ingest.store.snapshot()
    }

    /// The most recent reading, if any.
    pub fn latest(&self) -> Option<SensorReading> {
        self.ingest.store.latest()
    }

    /// Padded chart bounds for a metric's current series.
    pub fn range_for(&self, metric: Metric) -> DisplayRange {
        let snapshot = self.ingest.store.snapshot();
        range_for(metric, snapshot.series(metric), &self.options.padding)
    }

    pub fn classify(&self, metric: Metric, value: f64) -> HealthStatus {
        self.options.thresholds.classify(metric, value)
    }

    pub fn recommend(&self, metric: Metric, value: f64) -> &str {
        self.options.thresholds.recommend(metric, value)
    }

    /// Status and advice for the latest reading.
    pub fn assess_latest(&self) -> Vec<Assessment> {
        self.latest()
            .map(|reading| self.options.thresholds.assess(&reading))
            .unwrap_or_default()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    /// A receiver for observing connection state transitions.
    pub fn watch_connection(&self) -> watch::Receiver<ConnectionState> {
        self.connection.watch_state()
    }

    pub fn bootstrap_status(&self) -> BootstrapStatus {
        self.ingest.bootstrap.read().clone()
    }

    /// Number of payloads dropped because they failed to decode.
    pub fn decode_errors(&self) -> u64 {
        self.ingest.decode_errors.load(Ordering::Relaxed)
    }

    pub fn report(&self) -> Report {
        let history = self.snapshot();
        let ranges = Metric::ALL
            .iter()
            .map(|&metric| {
                (
                    metric,
                    range_for(metric, history.series(metric), &self.options.padding),
                )
            })
            .collect();

        Report {
            generated_at: Timestamp::now(),
            connection: self.connection_state().to_string(),
            bootstrap: self.bootstrap_status(),
            decode_errors: self.decode_errors(),
            latest: self.latest(),
            assessments: self.assess_latest(),
            ranges,
            history,
        }
    }

    /// Cancel an in-flight bootstrap and close the live stream.
    ///
    /// Safe to call more than once.
    pub async fn shutdown(&mut self) {
        if let Some(task) = self.bootstrap_task.take() {
            task.abort();
            let _ = task.await;
            self.ingest.settle(Err(LoadError::Cancelled));
        }
        self.connection.shutdown().await;
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        if let Some(task) = self.bootstrap_task.take() {
            task.abort();
        }
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("topic", &self.options.topic)
            .field("connection", &self.connection_state())
            .field("bootstrap", &self.bootstrap_status())
            .finish()
    }
}
