//! Lagged feature construction
//!
//! Lags are positional within one location's chronological sequence: the
//! value of lag `L` for row `t` is the reading at row `t - L` of the same
//! location. Rows for which any lag would fall before the start of the
//! sequence are not produced.

use crate::types::{calendar_fields, Feature, HistoricalRecord};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// Lag offsets, in rows
pub const LAGS: [usize; 4] = [1, 2, 3, 24];

/// Largest entry of [`LAGS`]: the history a row needs behind it
pub const MAX_LAG: usize = 24;

/// Calendar columns leading every feature vector
pub const CALENDAR_COLUMNS: [&str; 2] = ["hour_of_day", "day_of_year"];

/// Column names of the feature vector, in order
pub fn feature_names() -> Vec<String> {
    let mut names: Vec<String> = CALENDAR_COLUMNS.iter().map(|c| c.to_string()).collect();
    for lag in LAGS {
        for feature in Feature::ALL {
            names.push(format!("{}_lag_{}", feature.name(), lag));
        }
    }
    names
}

/// Number of columns in the feature vector
pub fn feature_count() -> usize {
    CALENDAR_COLUMNS.len() + LAGS.len() * Feature::ALL.len()
}

/// Position of `{feature}_lag_{lag}` in the feature vector
pub fn lag_column(lag: usize, feature: Feature) -> Option<usize> {
    let lag_index = LAGS.iter().position(|&l| l == lag)?;
    let feature_index = Feature::ALL.iter().position(|&f| f == feature)?;
    Some(CALENDAR_COLUMNS.len() + lag_index * Feature::ALL.len() + feature_index)
}

/// One supervised-learning row
#[derive(Debug, Clone, PartialEq)]
pub struct LaggedRow {
    pub location: String,
    pub timestamp: DateTime<Utc>,
    pub features: Vec<f64>,
    pub target: f64,
}

/// Split records per location, each sequence sorted by timestamp
pub fn group_by_location(records: &[HistoricalRecord]) -> BTreeMap<&str, Vec<&HistoricalRecord>> {
    let mut groups: BTreeMap<&str, Vec<&HistoricalRecord>> = BTreeMap::new();
    for record in records {
        groups.entry(record.location.as_str()).or_default().push(record);
    }
    for sequence in groups.values_mut() {
        sequence.sort_by_key(|r| r.timestamp);
    }
    groups
}

/// Feature vector for a row at `at`, given the rows strictly before it.
///
/// `preceding` must be one location's sequence in chronological order.
/// Returns `None` when it holds fewer than [`MAX_LAG`] rows.
///
/// The readings of the row at `at` itself (humidity, wind, pressure and the
/// rest) are deliberately not inputs: only its calendar fields and the
/// lagged readings are, so a step that has not been observed yet can be
/// forecast from history alone.
pub fn lagged_features(preceding: &[&HistoricalRecord], at: DateTime<Utc>) -> Option<Vec<f64>> {
    let n = preceding.len();
    if n < MAX_LAG {
        return None;
    }

    let (hour_of_day, day_of_year) = calendar_fields(at);
    let mut features = Vec::with_capacity(feature_count());
    features.push(hour_of_day as f64);
    features.push(day_of_year as f64);

    for lag in LAGS {
        let source = preceding[n - lag];
        for feature in Feature::ALL {
            features.push(source.value(feature));
        }
    }
    Some(features)
}

/// Build lagged rows for every location in `records`.
///
/// Rows are emitted per location in chronological order; the first
/// [`MAX_LAG`] rows of each location are dropped.
pub fn build_lagged_rows(records: &[HistoricalRecord]) -> Vec<LaggedRow> {
    let mut rows = Vec::new();
    for (location, sequence) in group_by_location(records) {
        for (i, record) in sequence.iter().enumerate().skip(MAX_LAG) {
            if let Some(features) = lagged_features(&sequence[..i], record.timestamp) {
                rows.push(LaggedRow {
                    location: location.to_string(),
                    timestamp: record.timestamp,
                    features,
                    target: record.value(Feature::TARGET),
                });
            }
        }
    }
    rows
}
