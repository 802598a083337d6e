//! Weather source adapters and the multi-location ingestor
//!
//! A [`WeatherSource`] fetches the observations for one location. The
//! [`Ingestor`] fans a fetch out over every configured location and keeps
//! going when individual locations fail.

pub mod openweather;
pub mod simulator;

pub use openweather::*;
pub use simulator::*;

use futures_util::future::join_all;
use skycast_core::{Location, Observation};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, instrument, warn};

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Request failed for {location}: {source}")]
    Http {
        location: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Upstream returned {status} for {location}")]
    HttpStatus {
        location: String,
        status: reqwest::StatusCode,
    },

    #[error("Invalid response for {location}: {message}")]
    Decode { location: String, message: String },

    #[error("Source error: {0}")]
    SourceError(String),

    #[error("No locations configured")]
    NoLocations,

    #[error("All {0} locations failed")]
    AllLocationsFailed(usize),
}

pub type IngestResult<T> = Result<T, IngestError>;

/// Trait for all upstream weather sources
#[async_trait::async_trait]
pub trait WeatherSource: Send + Sync {
    /// Source name/identifier
    fn name(&self) -> &str;

    /// Fetch the current forecast horizon for one location
    async fn fetch_location(&self, location: &Location) -> IngestResult<Vec<Observation>>;
}

/// A location whose fetch failed during an ingestion run
#[derive(Debug)]
pub struct LocationFailure {
    pub location: String,
    pub error: IngestError,
}

/// Result of one ingestion run: what succeeded, and separately what did not
#[derive(Debug, Default)]
pub struct IngestBatch {
    pub observations: Vec<Observation>,
    pub failures: Vec<LocationFailure>,
}

impl IngestBatch {
    pub fn failed_locations(&self) -> Vec<&str> {
        self.failures.iter().map(|f| f.location.as_str()).collect()
    }
}

/// Fetches every configured location from one source
pub struct Ingestor {
    source: Arc<dyn WeatherSource>,
    locations: Vec<Location>,
}

impl Ingestor {
    pub fn new(source: Arc<dyn WeatherSource>, locations: Vec<Location>) -> Self {
        Self { source, locations }
    }

    pub fn locations(&self) -> &[Location] {
        &self.locations
    }

    pub fn source_name(&self) -> &str {
        self.source.name()
    }

    /// Fetch all locations concurrently.
    ///
    /// Per-location failures are collected in [`IngestBatch::failures`]; only
    /// when every location fails is the run itself an error.
    #[instrument(skip(self), fields(source = %self.source.name()))]
    pub async fn fetch(&self) -> IngestResult<IngestBatch> {
        if self.locations.is_empty() {
            return Err(IngestError::NoLocations);
        }

        let results = join_all(
            self.locations
                .iter()
                .map(|location| self.source.fetch_location(location)),
        )
        .await;

        let mut batch = IngestBatch::default();
        for (location, result) in self.locations.iter().zip(results) {
            match result {
                Ok(mut observations) => {
                    info!(
                        "Fetched {} observations for {}",
                        observations.len(),
                        location.name
                    );
                    batch.observations.append(&mut observations);
                }
                Err(error) => {
                    warn!("Fetch failed for {}: {}", location.name, error);
                    batch.failures.push(LocationFailure {
                        location: location.name.clone(),
                        error,
                    });
                }
            }
        }

        if batch.failures.len() == self.locations.len() {
            return Err(IngestError::AllLocationsFailed(self.locations.len()));
        }

        Ok(batch)
    }
}
