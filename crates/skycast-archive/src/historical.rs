//! The cumulative historical dataset file

use crate::atomic::write_atomic;
use crate::{ArchiveError, ArchiveResult};
use skycast_core::HistoricalRecord;
use std::fs::File;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, instrument};

/// CSV file holding every merged record, rewritten whole on each merge.
///
/// The merge task is its only writer.
#[derive(Debug, Clone)]
pub struct HistoricalStore {
    path: PathBuf,
}

impl HistoricalStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the dataset; a missing file is an empty history
    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub fn load(&self) -> ArchiveResult<Vec<HistoricalRecord>> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No historical dataset yet");
                return Ok(Vec::new());
            }
            Err(e) => return Err(ArchiveError::io(&self.path, e)),
        };

        let records = csv::Reader::from_reader(file)
            .deserialize()
            .collect::<Result<Vec<HistoricalRecord>, _>>()
            .map_err(|e| ArchiveError::csv(&self.path, e))?;
        debug!("Loaded {} historical records", records.len());
        Ok(records)
    }

    /// Replace the dataset with `records`, atomically
    #[instrument(skip(self, records), fields(path = %self.path.display(), records = records.len()))]
    pub fn save(&self, records: &[HistoricalRecord]) -> ArchiveResult<()> {
        write_atomic(&self.path, |w| {
            let mut writer = csv::Writer::from_writer(w);
            for record in records {
                writer
                    .serialize(record)
                    .map_err(|e| ArchiveError::csv(&self.path, e))?;
            }
            writer.flush().map_err(|e| ArchiveError::io(&self.path, e))
        })
    }
}
