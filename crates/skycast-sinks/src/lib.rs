use anyhow::Result;
#[cfg(feature = "postgres")]
pub mod postgres;
#[cfg(feature = "sqlite")]
pub mod sqlite;

use skycast_archive::{write_atomic, ArchiveError};
use skycast_core::{Prediction, Sink};
use std::fs::{create_dir_all, File, OpenOptions};
use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

pub const LATEST_FILE: &str = "latest_predictions.csv";
pub const HISTORY_FILE: &str = "predictions.jsonl";

pub type SinkResult<T> = std::result::Result<T, SinkError>;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON in {path} line {line}: {source}")]
    Json {
        path: PathBuf,
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[cfg(feature = "sqlite")]
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[cfg(feature = "postgres")]
    #[error("postgres error: {0}")]
    Postgres(#[from] sqlx::Error),

    #[error("store connection poisoned")]
    Poisoned,
}

/// Prediction table on the filesystem.
///
/// `latest_predictions.csv` holds the newest batch and is replaced
/// atomically; `predictions.jsonl` accumulates every prediction ever made.
pub struct FsSink {
    latest: PathBuf,
    history: PathBuf,
}

impl FsSink {
    pub fn new<P: AsRef<Path>>(dir: P) -> SinkResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        create_dir_all(&dir).map_err(|source| SinkError::Io {
            path: dir.clone(),
            source,
        })?;
        Ok(Self {
            latest: dir.join(LATEST_FILE),
            history: dir.join(HISTORY_FILE),
        })
    }

    pub fn write_latest(&self, predictions: &[Prediction]) -> SinkResult<()> {
        write_atomic(&self.latest, |w| {
            let mut writer = csv::Writer::from_writer(w);
            for prediction in predictions {
                writer
                    .serialize(prediction)
                    .map_err(|e| ArchiveError::csv(&self.latest, e))?;
            }
            writer.flush().map_err(|e| ArchiveError::io(&self.latest, e))
        })?;
        Ok(())
    }

    pub fn append_history(&self, predictions: &[Prediction]) -> SinkResult<()> {
        let io_err = |source: std::io::Error| SinkError::Io {
            path: self.history.clone(),
            source,
        };
        let mut buf = Vec::new();
        for prediction in predictions {
            serde_json::to_writer(&mut buf, prediction).map_err(|source| SinkError::Json {
                path: self.history.clone(),
                line: 0,
                source,
            })?;
            buf.push(b'\n');
        }
        // one write per batch keeps lines whole
        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.history)
            .map_err(io_err)?;
        f.write_all(&buf).map_err(io_err)?;
        Ok(())
    }

    /// The newest batch; empty before the first prediction run
    pub fn read_latest(&self) -> SinkResult<Vec<Prediction>> {
        match File::open(&self.latest) {
            Ok(file) => Ok(csv::Reader::from_reader(file)
                .deserialize()
                .collect::<std::result::Result<Vec<Prediction>, _>>()
                .map_err(|e| ArchiveError::csv(&self.latest, e))?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
            Err(source) => Err(SinkError::Io {
                path: self.latest.clone(),
                source,
            }),
        }
    }

    /// Every prediction in emission order
    pub fn read_history(&self) -> SinkResult<Vec<Prediction>> {
        let file = match File::open(&self.history) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(SinkError::Io {
                    path: self.history.clone(),
                    source,
                })
            }
        };

        let mut predictions = Vec::new();
        for (index, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(|source| SinkError::Io {
                path: self.history.clone(),
                source,
            })?;
            if line.trim().is_empty() {
                continue;
            }
            let prediction = serde_json::from_str(&line).map_err(|source| SinkError::Json {
                path: self.history.clone(),
                line: index + 1,
                source,
            })?;
            predictions.push(prediction);
        }
        Ok(predictions)
    }
}

#[async_trait::async_trait]
impl Sink for FsSink {
    fn name(&self) -> &str {
        "fs"
    }

    async fn emit_predictions(&mut self, predictions: &[Prediction]) -> Result<()> {
        self.write_latest(predictions)?;
        self.append_history(predictions)?;
        debug!(count = predictions.len(), "Predictions written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn batch(version: u64, values: &[(&str, f64)]) -> Vec<Prediction> {
        let generated_at = Utc.with_ymd_and_hms(2024, 6, 3, 6, 0, 0).unwrap() + Duration::days(version as i64);
        values
            .iter()
            .map(|(location, value)| Prediction {
                location: location.to_string(),
                prediction_timestamp: generated_at + Duration::hours(3),
                forecast_value: *value,
                forecast_metric_name: "temperature".to_string(),
                generated_at,
                model_version: version,
            })
            .collect()
    }

    #[tokio::test]
    async fn latest_is_replaced_history_is_appended() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = FsSink::new(dir.path().join("predictions")).unwrap();

        sink.emit_predictions(&batch(1, &[("London", 14.5), ("New York", 21.0)]))
            .await
            .unwrap();
        sink.emit_predictions(&batch(2, &[("London", 15.0)])).await.unwrap();

        assert_eq!(sink.read_latest().unwrap(), batch(2, &[("London", 15.0)]));

        let history = sink.read_history().unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].model_version, 1);
        assert_eq!(history[2], batch(2, &[("London", 15.0)])[0]);
    }

    #[test]
    fn empty_before_first_run() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FsSink::new(dir.path()).unwrap();

        assert!(sink.read_latest().unwrap().is_empty());
        assert!(sink.read_history().unwrap().is_empty());
    }

    #[test]
    fn corrupt_history_line_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FsSink::new(dir.path()).unwrap();
        sink.append_history(&batch(1, &[("London", 1.0)])).unwrap();
        std::fs::OpenOptions::new()
            .append(true)
            .open(dir.path().join(HISTORY_FILE))
            .unwrap()
            .write_all(b"{not json\n")
            .unwrap();

        assert!(matches!(
            sink.read_history(),
            Err(SinkError::Json { line: 2, .. })
        ));
    }
}
