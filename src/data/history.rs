//! Bounded rolling history of sensor values per metric.

use std::collections::VecDeque;

use parking_lot::RwLock;
use serde::Serialize;
use tracing::{debug, warn};

use super::reading::{Metric, SensorReading, Timestamp};

/// Maximum number of values kept per metric.
pub const WINDOW_CAPACITY: usize = 20;

/// Ordered `timestamp -> value` entries for one metric.
///
/// Insertion order is chronological order. Holds at most
/// [`WINDOW_CAPACITY`] entries; once full, the oldest entry is evicted
/// first regardless of its value.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct MetricSeries {
    entries: VecDeque<(Timestamp, f64)>,
}

impl MetricSeries {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = (Timestamp, f64)> + '_ {
        self.entries.iter().copied()
    }

    /// Values from oldest to newest.
    pub fn values(&self) -> impl Iterator<Item = f64> + '_ {
        self.entries.iter().map(|(_, v)| *v)
    }

    /// Most recent entry.
    pub fn last(&self) -> Option<(Timestamp, f64)> {
        self.entries.back().copied()
    }

    pub fn get(&self, key: Timestamp) -> Option<f64> {
        self.entries.iter().find(|(k, _)| *k == key).map(|(_, v)| *v)
    }

    /// Insert a value under `key`.
    ///
    /// An existing key keeps its position and takes the new value, so
    /// duplicate timestamps in historical data collapse into one entry.
    fn insert(&mut self, key: Timestamp, value: f64) {
        if let Some(entry) = self.entries.iter_mut().find(|(k, _)| *k == key) {
            entry.1 = value;
            return;
        }
        self.push(key, value);
    }

    /// Push a new newest entry, evicting the oldest when full.
    fn push(&mut self, key: Timestamp, value: f64) {
        while self.entries.len() >= WINDOW_CAPACITY {
            self.entries.pop_front();
        }
        self.entries.push_back((key, value));
    }
}

impl FromIterator<(Timestamp, f64)> for MetricSeries {
    fn from_iter<I: IntoIterator<Item = (Timestamp, f64)>>(iter: I) -> Self {
        let mut series = MetricSeries::new();
        for (key, value) in iter {
            series.insert(key, value);
        }
        series
    }
}

/// The four metric series together.
///
/// Returned by [`HistoryStore::snapshot`] as an owned copy, so holding one
/// never blocks the ingestion path.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TelemetrySnapshot {
    pub temperature: MetricSeries,
    pub humidity: MetricSeries,
    pub moisture: MetricSeries,
    pub light: MetricSeries,
}

impl TelemetrySnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a snapshot from readings in any order.
    ///
    /// Readings are ordered by timestamp first, so the window keeps the
    /// newest entries even when the source lists them newest-first.
    pub fn from_readings<'a, I>(readings: I) -> Self
    where
        I: IntoIterator<Item = &'a SensorReading>,
    {
        let mut ordered: Vec<&SensorReading> = readings.into_iter().collect();
        ordered.sort_by_key(|reading| reading.timestamp());

        let mut snapshot = Self::new();
        for reading in ordered {
            for (metric, value) in reading.values() {
                snapshot.series_mut(metric).insert(reading.timestamp(), value);
            }
        }
        snapshot
    }

    pub fn series(&self, metric: Metric) -> &MetricSeries {
        match metric {
            Metric::Temperature => &self.temperature,
            Metric::Humidity => &self.humidity,
            Metric::Moisture => &self.moisture,
            Metric::Light => &self.light,
        }
    }

    fn series_mut(&mut self, metric: Metric) -> &mut MetricSeries {
        match metric {
            Metric::Temperature => &mut self.temperature,
            Metric::Humidity => &mut self.humidity,
            Metric::Moisture => &mut self.moisture,
            Metric::Light => &mut self.light,
        }
    }

    /// True when no metric holds any value.
    pub fn is_empty(&self) -> bool {
        Metric::ALL.iter().all(|m| self.series(*m).is_empty())
    }

    /// Length of the longest series.
    pub fn len(&self) -> usize {
        Metric::ALL.iter().map(|m| self.series(*m).len()).max().unwrap_or(0)
    }

    /// Newest key held by any series.
    fn newest_key(&self) -> Option<Timestamp> {
        Metric::ALL
            .iter()
            .filter_map(|m| self.series(*m).last().map(|(k, _)| k))
            .max()
    }
}

/// Outcome of a [`HistoryStore::seed`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedOutcome {
    /// Content was replaced; carries the number of points per metric.
    Seeded(usize),
    /// Live data had already been appended, so the seed was ignored.
    Rejected,
}

#[derive(Debug, Default)]
struct Inner {
    snapshot: TelemetrySnapshot,
    latest: Option<SensorReading>,
    live_started: bool,
}

/// Owner of the rolling telemetry history.
///
/// One writer (the ingestion path) and any number of readers. Readers only
/// ever see whole snapshots: every mutation happens under the write lock and
/// [`snapshot`](Self::snapshot) hands out a copy.
#[derive(Debug, Default)]
pub struct HistoryStore {
    inner: RwLock<Inner>,
}

impl HistoryStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole history with bootstrap data.
    ///
    /// Valid until the first [`append`](Self::append). Repeating it before
    /// then simply replaces the content again; afterwards it is a logged
    /// no-op so historical points can never land behind live ones.
    pub fn seed(&self, initial: TelemetrySnapshot) -> SeedOutcome {
        let mut inner = self.inner.write();
        if inner.live_started {
            warn!("Ignoring history seed: live readings already appended");
            return SeedOutcome::Rejected;
        }

        let mut seeded = TelemetrySnapshot::new();
        for metric in Metric::ALL {
            // FromIterator enforces the window, keeping the newest entries.
            *seeded.series_mut(metric) = initial.series(metric).iter().collect();
        }
        let points = seeded.len();
        inner.latest = Self::latest_from(&seeded);
        inner.snapshot = seeded;

        debug!("Seeded history with {} points per metric", points);
        SeedOutcome::Seeded(points)
    }

    /// Append a live reading to every metric series.
    ///
    /// The reading's timestamp is used as the key unless it would not be
    /// strictly newer than what the store already holds, in which case the
    /// next free key is used instead. Arrival order is therefore preserved.
    pub fn append(&self, reading: &SensorReading) -> Timestamp {
        let mut inner = self.inner.write();
        inner.live_started = true;

        let key = match inner.snapshot.newest_key() {
            Some(newest) if reading.timestamp() <= newest => newest.next(),
            _ => reading.timestamp(),
        };
        for (metric, value) in reading.values() {
            inner.snapshot.series_mut(metric).push(key, value);
        }
        inner.latest = Some(*reading);
        key
    }

    /// Consistent copy of the current history.
    pub fn snapshot(&self) -> TelemetrySnapshot {
        self.inner.read().snapshot.clone()
    }

    /// The most recent reading, live or seeded.
    pub fn latest(&self) -> Option<SensorReading> {
        self.inner.read().latest
    }

    /// Whether any live reading has been appended yet.
    pub fn is_live(&self) -> bool {
        self.inner.read().live_started
    }

    fn latest_from(snapshot: &TelemetrySnapshot) -> Option<SensorReading> {
        let (timestamp, temperature) = snapshot.temperature.last()?;
        let humidity = snapshot.humidity.get(timestamp)?;
        let moisture = snapshot.moisture.get(timestamp)?;
        let light = snapshot.light.get(timestamp)?;
        Some(SensorReading::new(
            timestamp,
            temperature,
            humidity,
            moisture,
            light,
        ))
    }
}
