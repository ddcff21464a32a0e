//! Operating thresholds and recommendations per metric.
//!
//! Each metric has a closed healthy interval used for status colouring and
//! an ordered list of rules that produce an actionable recommendation. The
//! two are evaluated independently: a value can be out of range while no
//! rule fires, and vice versa.

use serde::{Deserialize, Serialize};

use super::reading::{Metric, SensorReading};

/// Recommendation returned when no rule matches.
pub const NEUTRAL_RECOMMENDATION: &str = "System running optimally";

/// Health classification of a single value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum HealthStatus {
    Healthy,
    OutOfRange,
}

impl HealthStatus {
    /// Returns a short symbol for display.
    pub fn symbol(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "OK",
            HealthStatus::OutOfRange => "OUT",
        }
    }
}

/// Predicate of a recommendation rule.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Condition {
    /// Strictly greater than the limit.
    Above(f64),
    /// Strictly less than the limit.
    Below(f64),
}

impl Condition {
    pub fn matches(&self, value: f64) -> bool {
        match *self {
            Condition::Above(limit) => value > limit,
            Condition::Below(limit) => value < limit,
        }
    }
}

/// A predicate and the advice to show when it holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub when: Condition,
    pub text: String,
}

impl Rule {
    pub fn above(limit: f64, text: &str) -> Self {
        Self {
            when: Condition::Above(limit),
            text: text.to_string(),
        }
    }

    pub fn below(limit: f64, text: &str) -> Self {
        Self {
            when: Condition::Below(limit),
            text: text.to_string(),
        }
    }
}

/// Healthy interval and recommendation rules for one metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Threshold {
    /// Inclusive lower bound of the healthy interval.
    pub low: f64,
    /// Inclusive upper bound of the healthy interval.
    pub high: f64,
    /// Checked in order; the first match wins.
    #[serde(default)]
    pub rules: Vec<Rule>,
}

impl Threshold {
    pub fn new(low: f64, high: f64, rules: Vec<Rule>) -> Self {
        Self { low, high, rules }
    }

    /// NaN is never inside the interval.
    pub fn classify(&self, value: f64) -> HealthStatus {
        if (self.low..=self.high).contains(&value) {
            HealthStatus::Healthy
        } else {
            HealthStatus::OutOfRange
        }
    }

    pub fn recommend(&self, value: f64) -> &str {
        self.rules
            .iter()
            .find(|rule| rule.when.matches(value))
            .map(|rule| rule.text.as_str())
            .unwrap_or(NEUTRAL_RECOMMENDATION)
    }
}

/// Thresholds for all four metrics.
///
/// Defaults are calibrated for standard vegetable crops.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    pub temperature: Threshold,
    pub humidity: Threshold,
    pub moisture: Threshold,
    pub light: Threshold,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            temperature: Threshold::new(
                20.0,
                30.0,
                vec![
                    Rule::above(35.0, "Turn on ventilation/cooling"),
                    Rule::below(15.0, "Ensure Greenhouse heating"),
                ],
            ),
            humidity: Threshold::new(40.0, 70.0, Vec::new()),
            moisture: Threshold::new(
                30.0,
                60.0,
                vec![
                    Rule::below(30.0, "Enable Irrigation System"),
                    Rule::above(80.0, "Stop Irrigation immediately"),
                ],
            ),
            light: Threshold::new(
                200.0,
                800.0,
                vec![Rule::below(100.0, "Check for shading issues")],
            ),
        }
    }
}

/// Status and advice for one metric of a reading.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Assessment {
    pub metric: Metric,
    pub value: f64,
    pub status: HealthStatus,
    pub recommendation: String,
}

impl Thresholds {
    pub fn get(&self, metric: Metric) -> &Threshold {
        match metric {
            Metric::Temperature => &self.temperature,
            Metric::Humidity => &self.humidity,
            Metric::Moisture => &self.moisture,
            Metric::Light => &self.light,
        }
    }

    pub fn get_mut(&mut self, metric: Metric) -> &mut Threshold {
        match metric {
            Metric::Temperature => &mut self.temperature,
            Metric::Humidity => &mut self.humidity,
            Metric::Moisture => &mut self.moisture,
            Metric::Light => &mut self.light,
        }
    }

    /// Classify `value` against the metric's healthy interval.
    pub fn classify(&self, metric: Metric, value: f64) -> HealthStatus {
        self.get(metric).classify(value)
    }

    /// First matching recommendation for `value`, or the neutral message.
    pub fn recommend(&self, metric: Metric, value: f64) -> &str {
        self.get(metric).recommend(value)
    }

    /// Evaluate every metric of a reading.
    pub fn assess(&self, reading: &SensorReading) -> Vec<Assessment> {
        reading
            .values()
            .map(|(metric, value)| Assessment {
                metric,
                value,
                status: self.classify(metric, value),
                recommendation: self.recommend(metric, value).to_string(),
            })
            .collect()
    }
}
