//! The three scheduled pipeline tasks: ingest+merge, train, predict

use std::marker::PhantomData;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use skycast_archive::{HistoricalStore, RawArchive};
use skycast_core::{clean, merge, HistoricalRecord, Location, Prediction, Sink};
use skycast_ingest::Ingestor;
use skycast_model::{
    latest_windows, ModelStore, Predictor, RegressionModel, Regressor, Trainer,
};

/// A unit of scheduled work
#[async_trait::async_trait]
pub trait Task: Send {
    fn name(&self) -> &str;

    async fn run(&mut self, now: DateTime<Utc>) -> Result<()>;
}

/// Sinks shared by the ingest and predict tasks
pub type SharedSinks = Arc<Mutex<Vec<Box<dyn Sink>>>>;

pub fn shared_sinks(sinks: Vec<Box<dyn Sink>>) -> SharedSinks {
    Arc::new(Mutex::new(sinks))
}

/// Fetch, archive, clean, merge into the historical dataset, then notify sinks.
///
/// A sink that has not accepted a delivery since startup, or that failed the
/// previous one, receives the whole merged dataset instead of the new batch.
/// Stores upsert by (location, timestamp), so this brings them back in line
/// with the historical dataset.
pub struct IngestTask {
    ingestor: Ingestor,
    raw: RawArchive,
    historical: HistoricalStore,
    sinks: SharedSinks,
    /// Per sink, by position: whether it holds every merged record
    in_sync: Vec<bool>,
}

impl IngestTask {
    pub fn new(ingestor: Ingestor, raw: RawArchive, historical: HistoricalStore, sinks: SharedSinks) -> Self {
        Self {
            ingestor,
            raw,
            historical,
            sinks,
            in_sync: Vec::new(),
        }
    }

    async fn deliver(&mut self, merged: &[HistoricalRecord], fresh: &[HistoricalRecord]) -> Result<()> {
        let mut sinks = self.sinks.lock().await;
        self.in_sync.resize(sinks.len(), false);

        let mut failed = Vec::new();
        for (sink, in_sync) in sinks.iter_mut().zip(self.in_sync.iter_mut()) {
            let records = if *in_sync { fresh } else { merged };
            if !*in_sync {
                debug!("Resynchronising sink {} with {} records", sink.name(), records.len());
            }
            match sink.emit_records(records).await {
                Ok(()) => *in_sync = true,
                Err(e) => {
                    warn!("Sink {} rejected records: {:#}", sink.name(), e);
                    *in_sync = false;
                    failed.push(sink.name().to_string());
                }
            }
        }

        if failed.is_empty() {
            Ok(())
        } else {
            Err(anyhow!("sinks failed: {}", failed.join(", ")))
        }
    }
}

#[async_trait::async_trait]
impl Task for IngestTask {
    fn name(&self) -> &str {
        "ingest"
    }

    async fn run(&mut self, now: DateTime<Utc>) -> Result<()> {
        let batch = self.ingestor.fetch().await.context("Ingestion failed")?;
        if !batch.failures.is_empty() {
            warn!("Locations failed this run: {:?}", batch.failed_locations());
        }

        let entry = self
            .raw
            .archive(&batch.observations, now)
            .context("Failed to archive raw batch")?;
        info!("Raw batch archived as {}", entry.id);

        let cleaned = clean(&batch.observations);
        if cleaned.dropped > 0 {
            info!("Dropped {} incomplete records", cleaned.dropped);
        }
        if cleaned.is_empty() {
            info!("Nothing to merge");
            return Ok(());
        }

        let history = self
            .historical
            .load()
            .context("Failed to load historical dataset")?;
        let (merged, stats) = merge(history, &cleaned.records);
        self.historical
            .save(&merged)
            .context("Failed to save historical dataset")?;
        info!(
            added = stats.added,
            replaced = stats.replaced,
            total = stats.total,
            "Historical dataset updated"
        );

        self.deliver(&merged, &cleaned.records).await
    }
}

/// Retrain on the full history and publish when the result passes the gate
pub struct TrainTask<R> {
    trainer: Trainer<R>,
    historical: HistoricalStore,
    store: ModelStore,
    max_holdout_mae: Option<f64>,
}

impl<R> TrainTask<R> {
    pub fn new(
        trainer: Trainer<R>,
        historical: HistoricalStore,
        store: ModelStore,
        max_holdout_mae: Option<f64>,
    ) -> Self {
        Self {
            trainer,
            historical,
            store,
            max_holdout_mae,
        }
    }
}

#[async_trait::async_trait]
impl<R> Task for TrainTask<R>
where
    R: Regressor + Send + Sync,
    R::Model: Send + Sync,
{
    fn name(&self) -> &str {
        "train"
    }

    async fn run(&mut self, now: DateTime<Utc>) -> Result<()> {
        let history = self
            .historical
            .load()
            .context("Failed to load historical dataset")?;

        let fitted = self
            .trainer
            .train(&history, now)
            .context("Training failed, keeping the published model")?;
        fitted
            .check_publishable(self.max_holdout_mae)
            .context("Keeping the published model")?;

        let published = self
            .store
            .publish(&fitted, now)
            .context("Failed to publish model")?;
        info!(
            "Model v{} published (held-out MAE {:.3})",
            published.version, fitted.holdout_mae
        );
        Ok(())
    }
}

/// Forecast the next step for every configured location
pub struct PredictTask<M> {
    predictor: Predictor,
    store: ModelStore,
    historical: HistoricalStore,
    locations: Vec<Location>,
    sinks: SharedSinks,
    model: PhantomData<fn() -> M>,
}

impl<M> PredictTask<M> {
    pub fn new(
        store: ModelStore,
        historical: HistoricalStore,
        locations: Vec<Location>,
        sinks: SharedSinks,
    ) -> Self {
        Self {
            predictor: Predictor::new(),
            store,
            historical,
            locations,
            sinks,
            model: PhantomData,
        }
    }
}

#[async_trait::async_trait]
impl<M> Task for PredictTask<M>
where
    M: RegressionModel + DeserializeOwned + Send + Sync,
{
    fn name(&self) -> &str {
        "predict"
    }

    async fn run(&mut self, now: DateTime<Utc>) -> Result<()> {
        let published = self
            .store
            .current::<M>()
            .context("Failed to load the published model")?
            .ok_or_else(|| anyhow!("No model has been published yet"))?;

        let history = self
            .historical
            .load()
            .context("Failed to load historical dataset")?;
        let windows = latest_windows(&history, &self.locations);

        let batch = self.predictor.predict(&published, &windows, now)?;
        for skipped in &batch.skipped {
            warn!("No prediction for {}: {}", skipped.location, skipped.reason);
        }
        if batch.predictions.is_empty() {
            warn!("No location had enough history; previous predictions stay current");
            return Ok(());
        }

        emit_predictions(&self.sinks, &batch.predictions).await
    }
}

async fn emit_predictions(sinks: &SharedSinks, predictions: &[Prediction]) -> Result<()> {
    let mut sinks = sinks.lock().await;
    let mut failed = Vec::new();
    for sink in sinks.iter_mut() {
        if let Err(e) = sink.emit_predictions(predictions).await {
            warn!("Sink {} rejected predictions: {:#}", sink.name(), e);
            failed.push(sink.name().to_string());
        }
    }
    if failed.is_empty() {
        info!("{} predictions emitted", predictions.len());
        Ok(())
    } else {
        Err(anyhow!("sinks failed: {}", failed.join(", ")))
    }
}
