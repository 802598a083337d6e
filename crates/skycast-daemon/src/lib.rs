//! Skycast daemon: wires configuration, sources, stores and the scheduler
//!
//! The binary (`skycastd`) only adds logging, sink selection and signal
//! handling on top of [`build_scheduler`].

pub mod config;
pub mod scheduler;
pub mod tasks;

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};

use skycast_archive::{HistoricalStore, RawArchive};
use skycast_config::{AppConfig, SourceKind};
use skycast_ingest::{Ingestor, OpenWeatherSource, SimulatorSource, WeatherSource};
use skycast_model::{LinearModel, ModelStore, RidgeRegressor, Trainer};

use crate::scheduler::{Scheduler, Trigger};
use crate::tasks::{IngestTask, PredictTask, SharedSinks, TrainTask};

/// Build the weather source selected by `[source] kind`
pub fn build_source(cfg: &AppConfig, api_key: Option<&str>) -> Result<Arc<dyn WeatherSource>> {
    let source: Arc<dyn WeatherSource> = match cfg.source.kind {
        SourceKind::OpenWeather => {
            let key = api_key.context("WEATHER_API_KEY must be set for the openweather source")?;
            Arc::new(
                OpenWeatherSource::new(&cfg.source.url, key, cfg.source.forecast_horizon)?
                    .with_units(&cfg.source.units),
            )
        }
        SourceKind::Simulator => Arc::new(SimulatorSource::new(cfg.source.forecast_horizon)),
    };
    Ok(source)
}

/// Assemble the scheduler with its three tasks:
/// ingestion every `ingest_every_minutes`, weekly training and daily prediction
pub fn build_scheduler(
    cfg: &AppConfig,
    source: Arc<dyn WeatherSource>,
    sinks: SharedSinks,
    started_at: DateTime<Utc>,
) -> Result<Scheduler> {
    let schedule = &cfg.schedule;
    let ingest_every = Duration::minutes(schedule.ingest_every_minutes as i64);
    let predict_at = schedule.predict_time()?;
    let train_day = schedule.train_weekday()?;
    let train_at = schedule.train_time()?;

    let historical = HistoricalStore::new(&cfg.paths.processed_file);
    let models = ModelStore::new(&cfg.paths.models_dir);

    let ingest = IngestTask::new(
        Ingestor::new(source, cfg.locations.clone()),
        RawArchive::new(&cfg.paths.raw_dir),
        historical.clone(),
        Arc::clone(&sinks),
    );
    let train = TrainTask::new(
        Trainer::new(RidgeRegressor::new(cfg.model.ridge_alpha))
            .with_holdout_fraction(cfg.model.validation_fraction),
        historical.clone(),
        models.clone(),
        cfg.model.max_holdout_mae,
    );
    let predict = PredictTask::<LinearModel>::new(models, historical, cfg.locations.clone(), sinks);

    let mut scheduler = Scheduler::new(
        started_at,
        std::time::Duration::from_secs(schedule.tick_seconds),
    );
    scheduler
        .add(Box::new(ingest), Trigger::Every(ingest_every))
        .add(Box::new(train), Trigger::WeeklyAt(train_day, train_at))
        .add(Box::new(predict), Trigger::DailyAt(predict_at));
    Ok(scheduler)
}
