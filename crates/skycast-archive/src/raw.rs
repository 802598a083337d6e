//! Immutable raw archive of ingestion batches

use crate::atomic::stage;
use crate::{ArchiveError, ArchiveResult};
use chrono::{DateTime, Utc};
use skycast_core::Observation;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{info, instrument};

const PREFIX: &str = "weather_data_";
const EXTENSION: &str = "csv";
const MAX_SUFFIX: u32 = 1000;

/// A written archive snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// File stem, unique within the archive directory
    pub id: String,
    pub path: PathBuf,
    pub records: usize,
}

/// Directory of write-once CSV snapshots, one per ingestion run
#[derive(Debug, Clone)]
pub struct RawArchive {
    dir: PathBuf,
}

impl RawArchive {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write `batch` as a new snapshot named after `ingested_at`.
    ///
    /// Existing snapshots are never replaced: if the name is taken, a numeric
    /// suffix is added.
    #[instrument(skip(self, batch), fields(records = batch.len()))]
    pub fn archive(&self, batch: &[Observation], ingested_at: DateTime<Utc>) -> ArchiveResult<ArchiveEntry> {
        let base = format!("{}{}", PREFIX, ingested_at.format("%Y%m%d_%H%M"));

        let mut tmp = stage(&self.dir, |w| {
            let mut writer = csv::Writer::from_writer(w);
            for obs in batch {
                writer
                    .serialize(obs)
                    .map_err(|e| ArchiveError::csv(&self.dir, e))?;
            }
            writer.flush().map_err(|e| ArchiveError::io(&self.dir, e))
        })?;

        for suffix in 0..MAX_SUFFIX {
            let id = if suffix == 0 {
                base.clone()
            } else {
                format!("{}_{}", base, suffix)
            };
            let path = self.dir.join(format!("{}.{}", id, EXTENSION));

            match tmp.persist_noclobber(&path) {
                Ok(_) => {
                    info!("Archived {} raw records to {}", batch.len(), path.display());
                    return Ok(ArchiveEntry {
                        id,
                        path,
                        records: batch.len(),
                    });
                }
                Err(e) if e.error.kind() == ErrorKind::AlreadyExists => tmp = e.file,
                Err(e) => return Err(ArchiveError::io(path, e.error)),
            }
        }

        Err(ArchiveError::NameExhausted(base))
    }

    /// Snapshot ids in chronological order
    pub fn list(&self) -> ArchiveResult<Vec<String>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(ArchiveError::io(&self.dir, e)),
        };

        let mut ids = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| ArchiveError::io(&self.dir, e))?.path();
            let is_snapshot = path.extension().is_some_and(|ext| ext == EXTENSION);
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                if is_snapshot && stem.starts_with(PREFIX) {
                    ids.push(stem.to_string());
                }
            }
        }
        // suffixed names sort after their base name; plain string order is not enough
        ids.sort_by_key(|id| sort_key(id));
        Ok(ids)
    }

    /// Read a snapshot back, for replay
    pub fn read(&self, id: &str) -> ArchiveResult<Vec<Observation>> {
        let path = self.dir.join(format!("{}.{}", id, EXTENSION));
        if !path.exists() {
            return Err(ArchiveError::NotFound(id.to_string()));
        }
        let mut reader = csv::Reader::from_path(&path).map_err(|e| ArchiveError::csv(&path, e))?;
        reader
            .deserialize()
            .collect::<Result<Vec<Observation>, _>>()
            .map_err(|e| ArchiveError::csv(&path, e))
    }
}

fn sort_key(id: &str) -> (String, u32) {
    let stamp = id.trim_start_matches(PREFIX);
    // weather_data_YYYYMMDD_HHMM[_N]
    match stamp.rsplit_once('_') {
        Some((head, n)) if head.contains('_') => (head.to_string(), n.parse().unwrap_or(0)),
        _ => (stamp.to_string(), 0),
    }
}
