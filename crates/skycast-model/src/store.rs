//! Versioned model artifact store.
//!
//! Each publish writes `weather_model-v{N}.json` and `scaler-v{N}.json`,
//! then atomically replaces `current.json`. Readers resolve the manifest
//! first and load exactly the files it names, so the model and scaler they
//! see always come from the same training run.

use crate::error::ModelResult;
use crate::scaler::StandardScaler;
use crate::trainer::FittedModel;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use skycast_archive::{read_json, write_json_atomic, ArchiveError};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};

const MANIFEST_FILE: &str = "current.json";

/// Contents of `current.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub version: u64,
    pub published_at: DateTime<Utc>,
    pub trained_at: DateTime<Utc>,
    pub holdout_mae: f64,
    pub train_rows: usize,
    pub holdout_rows: usize,
    pub feature_names: Vec<String>,
    pub model_file: String,
    pub scaler_file: String,
}

/// A model as published: the artifact reference handed to the predictor.
#[derive(Debug, Clone)]
pub struct PublishedModel<M> {
    pub version: u64,
    pub published_at: DateTime<Utc>,
    pub fitted: FittedModel<M>,
}

#[derive(Debug, Clone)]
pub struct ModelStore {
    dir: PathBuf,
}

impl ModelStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn manifest_path(&self) -> PathBuf {
        self.dir.join(MANIFEST_FILE)
    }

    /// The current manifest, `None` before the first publish
    pub fn manifest(&self) -> ModelResult<Option<Manifest>> {
        let path = self.manifest_path();
        match fs::metadata(&path) {
            Ok(_) => Ok(Some(read_json(&path)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ArchiveError::io(&path, e).into()),
        }
    }

    /// Load the currently published model and its scaler
    #[instrument(skip(self), fields(dir = %self.dir.display()))]
    pub fn current<M: DeserializeOwned>(&self) -> ModelResult<Option<PublishedModel<M>>> {
        let Some(manifest) = self.manifest()? else {
            debug!("No model published yet");
            return Ok(None);
        };

        let model: M = read_json(&self.dir.join(&manifest.model_file))?;
        let scaler: StandardScaler = read_json(&self.dir.join(&manifest.scaler_file))?;

        Ok(Some(PublishedModel {
            version: manifest.version,
            published_at: manifest.published_at,
            fitted: FittedModel {
                model,
                scaler,
                feature_names: manifest.feature_names,
                holdout_mae: manifest.holdout_mae,
                trained_at: manifest.trained_at,
                train_rows: manifest.train_rows,
                holdout_rows: manifest.holdout_rows,
            },
        }))
    }

    /// Publish `fitted` as the next version.
    ///
    /// Nothing becomes visible until the manifest is replaced; a failure
    /// before that leaves the previous version current.
    #[instrument(skip(self, fitted), fields(dir = %self.dir.display()))]
    pub fn publish<M: Serialize + Clone>(
        &self,
        fitted: &FittedModel<M>,
        now: DateTime<Utc>,
    ) -> ModelResult<PublishedModel<M>> {
        let version = self.manifest()?.map_or(1, |m| m.version + 1);
        let model_file = format!("weather_model-v{}.json", version);
        let scaler_file = format!("scaler-v{}.json", version);

        write_json_atomic(&self.dir.join(&model_file), &fitted.model)?;
        write_json_atomic(&self.dir.join(&scaler_file), &fitted.scaler)?;

        let manifest = Manifest {
            version,
            published_at: now,
            trained_at: fitted.trained_at,
            holdout_mae: fitted.holdout_mae,
            train_rows: fitted.train_rows,
            holdout_rows: fitted.holdout_rows,
            feature_names: fitted.feature_names.clone(),
            model_file,
            scaler_file,
        };
        write_json_atomic(&self.manifest_path(), &manifest)?;

        info!(version, holdout_mae = fitted.holdout_mae, "Model published");
        Ok(PublishedModel {
            version,
            published_at: now,
            fitted: fitted.clone(),
        })
    }
}
