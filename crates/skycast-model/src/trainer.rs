//! Fit a scaler and regression model on the historical dataset.

use crate::error::{ModelError, ModelResult};
use crate::metrics::mean_absolute_error;
use crate::regression::{RegressionModel, Regressor};
use crate::scaler::StandardScaler;
use crate::table::TrainingTable;
use chrono::{DateTime, Utc};
use skycast_core::{group_by_location, HistoricalRecord, MAX_LAG};
use tracing::{info, instrument};

/// Default share of the newest rows held out for evaluation
pub const DEFAULT_HOLDOUT_FRACTION: f64 = 0.2;

/// Outcome of one training run, not yet published.
#[derive(Debug, Clone)]
pub struct FittedModel<M> {
    pub model: M,
    pub scaler: StandardScaler,
    pub feature_names: Vec<String>,
    pub holdout_mae: f64,
    pub trained_at: DateTime<Utc>,
    pub train_rows: usize,
    pub holdout_rows: usize,
}

impl<M> FittedModel<M> {
    /// Publish gate: the held-out error must be finite and, when a ceiling
    /// is configured, not above it.
    pub fn check_publishable(&self, max_holdout_mae: Option<f64>) -> ModelResult<()> {
        if !self.holdout_mae.is_finite() {
            return Err(ModelError::Rejected(format!(
                "held-out MAE is not finite ({})",
                self.holdout_mae
            )));
        }
        if let Some(max) = max_holdout_mae {
            if self.holdout_mae > max {
                return Err(ModelError::Rejected(format!(
                    "held-out MAE {:.4} exceeds the configured maximum {:.4}",
                    self.holdout_mae, max
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct Trainer<R> {
    regressor: R,
    holdout_fraction: f64,
}

impl<R: Regressor> Trainer<R> {
    pub fn new(regressor: R) -> Self {
        Self {
            regressor,
            holdout_fraction: DEFAULT_HOLDOUT_FRACTION,
        }
    }

    pub fn with_holdout_fraction(mut self, fraction: f64) -> Self {
        self.holdout_fraction = fraction;
        self
    }

    pub fn holdout_fraction(&self) -> f64 {
        self.holdout_fraction
    }

    /// Train on `history`.
    ///
    /// Fails with [`ModelError::InsufficientData`] when no location has more
    /// than [`MAX_LAG`] rows, or when fewer than two lagged rows exist overall.
    #[instrument(skip(self, history), fields(records = history.len()))]
    pub fn train(
        &self,
        history: &[HistoricalRecord],
        now: DateTime<Utc>,
    ) -> ModelResult<FittedModel<R::Model>> {
        let table = TrainingTable::from_history(history);
        if table.is_empty() {
            let longest = group_by_location(history)
                .values()
                .map(Vec::len)
                .max()
                .unwrap_or(0);
            return Err(ModelError::InsufficientData {
                needed: MAX_LAG + 1,
                got: longest,
            });
        }

        let split = table.split(self.holdout_fraction)?;
        let train_x = split.train_features();
        let train_y = split.train_targets();
        let holdout_x = split.holdout_features();
        let holdout_y = split.holdout_targets();

        // held-out rows never influence the scaling statistics
        let scaler = StandardScaler::fit(&train_x)?;
        let train_x = scaler.transform(&train_x)?;
        let holdout_x = scaler.transform(&holdout_x)?;

        let model = self.regressor.fit(&train_x, &train_y)?;
        let predicted = model.predict(&holdout_x)?;
        let holdout_mae = mean_absolute_error(&holdout_y, &predicted)?;

        info!(
            train_rows = train_y.len(),
            holdout_rows = holdout_y.len(),
            holdout_mae,
            "Model trained"
        );

        Ok(FittedModel {
            model,
            scaler,
            feature_names: table.feature_names,
            holdout_mae,
            trained_at: now,
            train_rows: train_y.len(),
            holdout_rows: holdout_y.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::regression::RidgeRegressor;
    use chrono::{Duration, TimeZone};
    use skycast_core::{calendar_fields, feature_count};

    fn diurnal(location: &str, len: usize, base: f64) -> Vec<HistoricalRecord> {
        let start = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        (0..len)
            .map(|i| {
                let timestamp = start + Duration::hours(i as i64);
                let (hour_of_day, day_of_year) = calendar_fields(timestamp);
                let phase = (hour_of_day as f64 / 24.0) * std::f64::consts::TAU;
                HistoricalRecord {
                    location: location.to_string(),
                    timestamp,
                    temperature: base + 5.0 * phase.sin(),
                    humidity: 60.0 - 10.0 * phase.sin(),
                    wind_speed: 4.0,
                    wind_direction: 200.0,
                    pressure: 1013.0,
                    precipitation: 0.0,
                    cloud_coverage: 20.0,
                    weather_condition: None,
                    hour_of_day,
                    day_of_year,
                }
            })
            .collect()
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 2, 0, 0).unwrap()
    }

    #[test]
    fn test_train_learns_diurnal_cycle() {
        let mut history = diurnal("New York", 120, 15.0);
        history.extend(diurnal("London", 120, 10.0));

        let fitted = Trainer::new(RidgeRegressor::default())
            .train(&history, now())
            .unwrap();

        assert_eq!(fitted.train_rows + fitted.holdout_rows, 2 * (120 - MAX_LAG));
        assert_eq!(fitted.feature_names.len(), feature_count());
        assert_eq!(fitted.scaler.width(), feature_count());
        assert_eq!(fitted.trained_at, now());
        assert!(fitted.holdout_mae.is_finite());
        assert!(fitted.holdout_mae < 1.0, "mae = {}", fitted.holdout_mae);
    }

    #[test]
    fn test_scaler_is_fitted_on_training_rows_only() {
        let mut history = diurnal("New York", 60, 15.0);
        // a shifted tail only the held-out rows can see
        for record in history.iter_mut().skip(55) {
            record.pressure = 2000.0;
        }

        let fitted = Trainer::new(RidgeRegressor::default())
            .train(&history, now())
            .unwrap();

        let pressure_lag_1 = skycast_core::lag_column(1, skycast_core::Feature::Pressure).unwrap();
        assert_eq!(fitted.scaler.means[pressure_lag_1], 1013.0);
    }

    #[test]
    fn test_two_rows_is_insufficient() {
        let history = diurnal("New York", 2, 15.0);

        let err = Trainer::new(RidgeRegressor::default())
            .train(&history, now())
            .unwrap_err();

        assert!(matches!(
            err,
            ModelError::InsufficientData { needed: 25, got: 2 }
        ));
    }

    #[test]
    fn test_empty_history_is_insufficient() {
        let err = Trainer::new(RidgeRegressor::default())
            .train(&[], now())
            .unwrap_err();
        assert!(matches!(err, ModelError::InsufficientData { got: 0, .. }));
    }

    #[test]
    fn test_bad_holdout_fraction_is_rejected() {
        let history = diurnal("New York", 60, 15.0);
        let err = Trainer::new(RidgeRegressor::default())
            .with_holdout_fraction(1.5)
            .train(&history, now())
            .unwrap_err();
        assert!(matches!(err, ModelError::InvalidParameter(_)));
    }

    #[test]
    fn test_publish_gate() {
        let history = diurnal("New York", 80, 15.0);
        let mut fitted = Trainer::new(RidgeRegressor::default())
            .train(&history, now())
            .unwrap();

        assert!(fitted.check_publishable(None).is_ok());
        assert!(fitted.check_publishable(Some(1e6)).is_ok());

        fitted.holdout_mae = 3.0;
        assert!(matches!(
            fitted.check_publishable(Some(2.0)),
            Err(ModelError::Rejected(_))
        ));

        fitted.holdout_mae = f64::NAN;
        assert!(fitted.check_publishable(None).is_err());
    }
}
