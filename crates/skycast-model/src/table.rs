//! Supervised-learning table and its chronological split.

use crate::error::{ModelError, ModelResult};
use skycast_core::{build_lagged_rows, feature_names, HistoricalRecord, LaggedRow};

/// Lagged rows pooled across locations, ordered by (timestamp, location).
#[derive(Debug, Clone)]
pub struct TrainingTable {
    pub feature_names: Vec<String>,
    pub rows: Vec<LaggedRow>,
}

/// Borrowed train/held-out partition of a [`TrainingTable`].
///
/// Every held-out row is at or after every training row in time.
#[derive(Debug, Clone, Copy)]
pub struct TrainingSplit<'a> {
    pub train: &'a [LaggedRow],
    pub holdout: &'a [LaggedRow],
}

impl TrainingTable {
    pub fn from_history(history: &[HistoricalRecord]) -> Self {
        let mut rows = build_lagged_rows(history);
        rows.sort_by(|a, b| {
            a.timestamp
                .cmp(&b.timestamp)
                .then_with(|| a.location.cmp(&b.location))
        });
        Self {
            feature_names: feature_names(),
            rows,
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Earliest rows train, the latest `holdout_fraction` (rounded up) are held out.
    ///
    /// No shuffling: shuffling would leak future observations into training.
    pub fn split(&self, holdout_fraction: f64) -> ModelResult<TrainingSplit<'_>> {
        if !(holdout_fraction > 0.0 && holdout_fraction < 1.0) {
            return Err(ModelError::InvalidParameter(format!(
                "holdout fraction must be in (0, 1), got {}",
                holdout_fraction
            )));
        }

        let n = self.rows.len();
        // tolerance keeps e.g. 0.2 * 10 from rounding up to 3
        let n_holdout = (holdout_fraction * n as f64 - 1e-9).ceil() as usize;
        if n < 2 || n_holdout >= n {
            return Err(ModelError::InsufficientData { needed: 2, got: n });
        }

        let (train, holdout) = self.rows.split_at(n - n_holdout);
        Ok(TrainingSplit { train, holdout })
    }
}

impl<'a> TrainingSplit<'a> {
    pub fn train_features(&self) -> Vec<Vec<f64>> {
        self.train.iter().map(|r| r.features.clone()).collect()
    }

    pub fn train_targets(&self) -> Vec<f64> {
        self.train.iter().map(|r| r.target).collect()
    }

    pub fn holdout_features(&self) -> Vec<Vec<f64>> {
        self.holdout.iter().map(|r| r.features.clone()).collect()
    }

    pub fn holdout_targets(&self) -> Vec<f64> {
        self.holdout.iter().map(|r| r.target).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use skycast_core::calendar_fields;

    fn history(location: &str, len: usize, offset_hours: i64) -> Vec<HistoricalRecord> {
        let start = Utc.with_ymd_and_hms(2024, 7, 1, 0, 0, 0).unwrap() + Duration::hours(offset_hours);
        (0..len)
            .map(|i| {
                let timestamp = start + Duration::hours(i as i64);
                let (hour_of_day, day_of_year) = calendar_fields(timestamp);
                HistoricalRecord {
                    location: location.to_string(),
                    timestamp,
                    temperature: 15.0 + (i % 24) as f64 * 0.5,
                    humidity: 60.0,
                    wind_speed: 3.0,
                    wind_direction: 180.0,
                    pressure: 1012.0,
                    precipitation: 0.0,
                    cloud_coverage: 30.0,
                    weather_condition: None,
                    hour_of_day,
                    day_of_year,
                }
            })
            .collect()
    }

    #[test]
    fn test_split_sizes() {
        let table = TrainingTable::from_history(&history("NY", 34, 0));
        assert_eq!(table.len(), 10);

        let split = table.split(0.2).unwrap();
        assert_eq!(split.train.len(), 8);
        assert_eq!(split.holdout.len(), 2);
        assert_eq!(split.train_features().len(), split.train_targets().len());
    }

    #[test]
    fn test_holdout_never_precedes_training() {
        let mut records = history("NY", 60, 0);
        records.extend(history("London", 50, 5));
        records.extend(history("Tokyo", 40, -3));
        let table = TrainingTable::from_history(&records);

        let split = table.split(0.2).unwrap();

        let latest_train = split.train.iter().map(|r| r.timestamp).max().unwrap();
        let earliest_holdout = split.holdout.iter().map(|r| r.timestamp).min().unwrap();
        assert!(earliest_holdout >= latest_train);
    }

    #[test]
    fn test_split_needs_two_rows() {
        let table = TrainingTable::from_history(&history("NY", 25, 0));
        assert_eq!(table.len(), 1);
        assert!(matches!(
            table.split(0.2),
            Err(ModelError::InsufficientData { needed: 2, got: 1 })
        ));

        let empty = TrainingTable::from_history(&history("NY", 2, 0));
        assert!(empty.is_empty());
        assert!(empty.split(0.2).is_err());
    }

    #[test]
    fn test_split_rejects_bad_fraction() {
        let table = TrainingTable::from_history(&history("NY", 40, 0));
        assert!(matches!(table.split(0.0), Err(ModelError::InvalidParameter(_))));
        assert!(matches!(table.split(1.0), Err(ModelError::InvalidParameter(_))));
    }
}
