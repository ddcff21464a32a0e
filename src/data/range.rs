//! Display ranges for charting a metric series.

use serde::{Deserialize, Serialize};

use super::history::MetricSeries;
use super::reading::Metric;

/// Range used when a series holds no values yet.
pub const DEFAULT_RANGE: DisplayRange = DisplayRange {
    min: 0.0,
    max: 100.0,
};

/// Vertical bounds for a chart.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DisplayRange {
    pub min: f64,
    pub max: f64,
}

impl DisplayRange {
    pub fn span(&self) -> f64 {
        self.max - self.min
    }
}

/// Padding added on both sides of a metric's observed values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Padding {
    pub temperature: f64,
    pub humidity: f64,
    pub moisture: f64,
    pub light: f64,
}

impl Default for Padding {
    fn default() -> Self {
        Self {
            temperature: 1.0,
            humidity: 2.0,
            moisture: 5.0,
            light: 10.0,
        }
    }
}

impl Padding {
    pub fn for_metric(&self, metric: Metric) -> f64 {
        match metric {
            Metric::Temperature => self.temperature,
            Metric::Humidity => self.humidity,
            Metric::Moisture => self.moisture,
            Metric::Light => self.light,
        }
    }
}

/// Compute the display range of `series` for `metric`.
///
/// An empty series yields [`DEFAULT_RANGE`]. Otherwise the observed
/// minimum and maximum are widened by the metric's padding, which also keeps
/// a flat series from collapsing into a zero-height scale.
///
/// Always computed from the series passed in; callers should not cache the
/// result since the history keeps moving.
pub fn range_for(metric: Metric, series: &MetricSeries, padding: &Padding) -> DisplayRange {
    let mut values = series.values();
    let Some(first) = values.next() else {
        return DEFAULT_RANGE;
    };

    let (min, max) = values.fold((first, first), |(lo, hi), v| (lo.min(v), hi.max(v)));
    let pad = padding.for_metric(metric);

    DisplayRange {
        min: min - pad,
        max: max + pad,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::reading::Timestamp;

    fn series(values: &[f64]) -> MetricSeries {
        values
            .iter()
            .enumerate()
            .map(|(i, v)| (Timestamp(i as u64), *v))
            .collect()
    }

    #[test]
    fn test_empty_series_uses_default() {
        let range = range_for(Metric::Light, &MetricSeries::new(), &Padding::default());
        assert_eq!(range, DisplayRange { min: 0.0, max: 100.0 });
    }

    #[test]
    fn test_single_value_is_padded() {
        let padding = Padding::default();
        for (metric, pad) in [
            (Metric::Temperature, 1.0),
            (Metric::Humidity, 2.0),
            (Metric::Moisture, 5.0),
            (Metric::Light, 10.0),
        ] {
            let range = range_for(metric, &series(&[50.0]), &padding);
            assert_eq!(range, DisplayRange { min: 50.0 - pad, max: 50.0 + pad });
        }
    }

    #[test]
    fn test_flat_series_never_degenerate() {
        let range = range_for(Metric::Temperature, &series(&[22.0, 22.0, 22.0]), &Padding::default());
        assert_eq!(range, DisplayRange { min: 21.0, max: 23.0 });
        assert!(range.span() > 0.0);
    }

    #[test]
    fn test_spread_series_pads_extremes() {
        let range = range_for(
            Metric::Moisture,
            &series(&[40.0, 35.5, 61.0, 48.0]),
            &Padding::default(),
        );
        assert_eq!(range, DisplayRange { min: 30.5, max: 66.0 });
    }

    #[test]
    fn test_custom_padding() {
        let padding = Padding {
            light: 0.5,
            ..Padding::default()
        };
        let range = range_for(Metric::Light, &series(&[300.0, 310.0]), &padding);
        assert_eq!(range, DisplayRange { min: 299.5, max: 310.5 });
    }
}
