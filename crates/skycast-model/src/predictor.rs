//! Next-step forecasts from the published model.

use crate::error::{ModelError, ModelResult};
use crate::regression::RegressionModel;
use crate::store::PublishedModel;
use chrono::{DateTime, Duration, Utc};
use skycast_core::{
    feature_names, group_by_location, lagged_features, Feature, HistoricalRecord, Location,
    Prediction, MAX_LAG,
};
use std::collections::BTreeMap;
use std::fmt;
use tracing::{info, instrument, warn};

/// Why a location got no prediction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    NoHistory,
    InsufficientHistory { needed: usize, got: usize },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::NoHistory => write!(f, "no history"),
            SkipReason::InsufficientHistory { needed, got } => {
                write!(f, "insufficient history: need {} rows, got {}", needed, got)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SkippedLocation {
    pub location: String,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, Default)]
pub struct PredictionBatch {
    pub predictions: Vec<Prediction>,
    pub skipped: Vec<SkippedLocation>,
}

/// Trailing window of each configured location, oldest first.
///
/// Every location in `locations` gets an entry, empty when the history has
/// no records for it. Records of unconfigured locations are ignored.
pub fn latest_windows(
    history: &[HistoricalRecord],
    locations: &[Location],
) -> BTreeMap<String, Vec<HistoricalRecord>> {
    let groups = group_by_location(history);
    locations
        .iter()
        .map(|location| {
            let window = groups
                .get(location.name.as_str())
                .map(|sequence| {
                    let start = sequence.len().saturating_sub(MAX_LAG);
                    sequence[start..].iter().map(|r| (*r).clone()).collect()
                })
                .unwrap_or_default();
            (location.name.clone(), window)
        })
        .collect()
}

#[derive(Debug, Clone)]
pub struct Predictor {
    metric_name: String,
}

impl Default for Predictor {
    fn default() -> Self {
        Self {
            metric_name: Feature::TARGET.name().to_string(),
        }
    }
}

impl Predictor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forecast the step after each window.
    ///
    /// The target time is the last observation plus the window's most recent
    /// sampling interval (one hour when that cannot be determined).
    #[instrument(skip_all, fields(version = published.version, locations = windows.len()))]
    pub fn predict<M: RegressionModel>(
        &self,
        published: &PublishedModel<M>,
        windows: &BTreeMap<String, Vec<HistoricalRecord>>,
        now: DateTime<Utc>,
    ) -> ModelResult<PredictionBatch> {
        let fitted = &published.fitted;
        if fitted.feature_names != feature_names() {
            return Err(ModelError::DimensionMismatch {
                expected: feature_names().len(),
                got: fitted.feature_names.len(),
            });
        }

        let mut batch = PredictionBatch::default();
        for (location, window) in windows {
            let mut sequence: Vec<&HistoricalRecord> = window.iter().collect();
            sequence.sort_by_key(|r| r.timestamp);

            let Some(last) = sequence.last() else {
                warn!(location = %location, "Skipping location without history");
                batch.skipped.push(SkippedLocation {
                    location: location.clone(),
                    reason: SkipReason::NoHistory,
                });
                continue;
            };

            let step = match sequence.len() {
                n if n >= 2 => last.timestamp - sequence[n - 2].timestamp,
                _ => Duration::hours(1),
            };
            let step = if step > Duration::zero() {
                step
            } else {
                Duration::hours(1)
            };
            let target = last.timestamp + step;

            let Some(features) = lagged_features(&sequence, target) else {
                warn!(
                    location = %location,
                    rows = sequence.len(),
                    "Skipping location with insufficient history"
                );
                batch.skipped.push(SkippedLocation {
                    location: location.clone(),
                    reason: SkipReason::InsufficientHistory {
                        needed: MAX_LAG,
                        got: sequence.len(),
                    },
                });
                continue;
            };

            let scaled = fitted.scaler.transform_row(&features)?;
            let forecast_value = fitted.model.predict_row(&scaled)?;

            batch.predictions.push(Prediction {
                location: location.clone(),
                prediction_timestamp: target,
                forecast_value,
                forecast_metric_name: self.metric_name.clone(),
                generated_at: now,
                model_version: published.version,
            });
        }

        info!(
            predicted = batch.predictions.len(),
            skipped = batch.skipped.len(),
            "Prediction run finished"
        );
        Ok(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::regression::LinearModel;
    use crate::scaler::StandardScaler;
    use crate::trainer::FittedModel;
    use chrono::TimeZone;
    use skycast_core::{calendar_fields, feature_count, lag_column};

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 8, 1, 0, 0, 0).unwrap()
    }

    fn sequence(location: &str, len: usize, step_hours: i64) -> Vec<HistoricalRecord> {
        (0..len)
            .map(|i| {
                let timestamp = start() + Duration::hours(step_hours * i as i64);
                let (hour_of_day, day_of_year) = calendar_fields(timestamp);
                HistoricalRecord {
                    location: location.to_string(),
                    timestamp,
                    temperature: 10.0 + i as f64,
                    humidity: 50.0,
                    wind_speed: 2.0,
                    wind_direction: 90.0,
                    pressure: 1010.0,
                    precipitation: 0.0,
                    cloud_coverage: 10.0,
                    weather_condition: None,
                    hour_of_day,
                    day_of_year,
                }
            })
            .collect()
    }

    /// Identity scaler and a model returning the temperature at lag 1
    fn persistence_model() -> PublishedModel<LinearModel> {
        let width = feature_count();
        let mut coefficients = vec![0.0; width];
        coefficients[lag_column(1, Feature::Temperature).unwrap()] = 1.0;
        PublishedModel {
            version: 7,
            published_at: start(),
            fitted: FittedModel {
                model: LinearModel {
                    intercept: 0.0,
                    coefficients,
                },
                scaler: StandardScaler {
                    means: vec![0.0; width],
                    scales: vec![1.0; width],
                },
                feature_names: feature_names(),
                holdout_mae: 0.5,
                trained_at: start(),
                train_rows: 100,
                holdout_rows: 25,
            },
        }
    }

    fn locations(names: &[&str]) -> Vec<Location> {
        names.iter().map(|n| Location::new(*n, 0.0, 0.0)).collect()
    }

    #[test]
    fn test_latest_windows_keep_trailing_rows() {
        let mut history = sequence("New York", 40, 1);
        history.extend(sequence("Paris", 30, 1));

        let windows = latest_windows(&history, &locations(&["New York", "London"]));

        assert_eq!(windows.len(), 2);
        let ny = &windows["New York"];
        assert_eq!(ny.len(), MAX_LAG);
        assert_eq!(ny.last().unwrap().timestamp, start() + Duration::hours(39));
        assert!(windows["London"].is_empty());
    }

    #[test]
    fn test_predicts_next_step_per_location() {
        let mut history = sequence("New York", 30, 1);
        history.extend(sequence("London", 30, 3));
        let windows = latest_windows(&history, &locations(&["New York", "London"]));
        let now = start() + Duration::days(10);

        let batch = Predictor::new()
            .predict(&persistence_model(), &windows, now)
            .unwrap();

        assert!(batch.skipped.is_empty());
        assert_eq!(batch.predictions.len(), 2);

        let london = &batch.predictions[0];
        assert_eq!(london.location, "London");
        assert_eq!(london.prediction_timestamp, start() + Duration::hours(90));
        assert_eq!(london.forecast_value, 39.0);
        assert_eq!(london.forecast_metric_name, "temperature");
        assert_eq!(london.generated_at, now);
        assert_eq!(london.model_version, 7);

        let ny = &batch.predictions[1];
        assert_eq!(ny.prediction_timestamp, start() + Duration::hours(30));
        assert_eq!(ny.forecast_value, 39.0);
    }

    #[test]
    fn test_short_history_is_skipped_others_proceed() {
        let mut history = sequence("New York", 3, 1);
        history.extend(sequence("London", 48, 1));
        let windows = latest_windows(&history, &locations(&["New York", "London", "Tokyo"]));

        let batch = Predictor::new()
            .predict(&persistence_model(), &windows, start())
            .unwrap();

        assert_eq!(batch.predictions.len(), 1);
        assert_eq!(batch.predictions[0].location, "London");
        assert_eq!(
            batch.skipped,
            vec![
                SkippedLocation {
                    location: "New York".to_string(),
                    reason: SkipReason::InsufficientHistory { needed: 24, got: 3 },
                },
                SkippedLocation {
                    location: "Tokyo".to_string(),
                    reason: SkipReason::NoHistory,
                },
            ]
        );
    }

    #[test]
    fn test_feature_layout_mismatch_is_an_error() {
        let mut published = persistence_model();
        published.fitted.feature_names.pop();
        let windows = latest_windows(&sequence("New York", 30, 1), &locations(&["New York"]));

        let err = Predictor::new()
            .predict(&published, &windows, start())
            .unwrap_err();
        assert!(matches!(err, ModelError::DimensionMismatch { .. }));
    }

    #[test]
    fn test_skip_reason_display() {
        let reason = SkipReason::InsufficientHistory { needed: 24, got: 3 };
        assert_eq!(reason.to_string(), "insufficient history: need 24 rows, got 3");
    }
}
