//! Validation, calendar derivation and ordering of raw ingestion batches

use crate::types::{HistoricalRecord, Observation, RecordKey};
use std::collections::BTreeMap;
use tracing::debug;

/// Output of [`clean`]: complete records sorted by (location, timestamp).
///
/// Lag features are not computed here; they are built at training time over
/// the full historical sequence so lags can reach back before this batch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CleanedTable {
    pub records: Vec<HistoricalRecord>,
    /// Records dropped for missing or non-finite readings
    pub dropped: usize,
    /// Records collapsed because the batch repeated a (location, timestamp)
    pub duplicates: usize,
}

impl CleanedTable {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Clean a raw batch.
///
/// Incomplete records are dropped rather than imputed. When the batch holds
/// the same key twice, the later entry wins. An empty result is not an error.
pub fn clean(batch: &[Observation]) -> CleanedTable {
    let mut dropped = 0;
    let mut by_key: BTreeMap<RecordKey, HistoricalRecord> = BTreeMap::new();
    let mut kept = 0;

    for obs in batch {
        match HistoricalRecord::from_observation(obs) {
            Some(record) => {
                kept += 1;
                by_key.insert(record.key(), record);
            }
            None => dropped += 1,
        }
    }

    let records: Vec<_> = by_key.into_values().collect();
    let duplicates = kept - records.len();

    debug!(
        "Cleaned batch: {} in, {} kept, {} dropped, {} duplicates",
        batch.len(),
        records.len(),
        dropped,
        duplicates
    );

    CleanedTable {
        records,
        dropped,
        duplicates,
    }
}
