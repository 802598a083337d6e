//! Incremental merge of cleaned batches into the cumulative historical dataset

use crate::types::{HistoricalRecord, RecordKey};
use std::collections::BTreeMap;

/// Summary of a merge, for logging
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    /// Keys that did not exist in the historical dataset
    pub added: usize,
    /// Existing keys whose record was replaced by the incoming one
    pub replaced: usize,
    pub total: usize,
}

/// Union `historical` and `incoming`, keeping one record per (location, timestamp).
///
/// On duplicate keys the incoming record wins. The result is sorted by
/// (location, timestamp), and merging the same batch twice gives the same
/// result as merging it once.
pub fn merge(
    historical: Vec<HistoricalRecord>,
    incoming: &[HistoricalRecord],
) -> (Vec<HistoricalRecord>, MergeStats) {
    let mut by_key: BTreeMap<RecordKey, HistoricalRecord> = historical
        .into_iter()
        .map(|record| (record.key(), record))
        .collect();

    let mut stats = MergeStats::default();
    for record in incoming {
        match by_key.insert(record.key(), record.clone()) {
            Some(_) => stats.replaced += 1,
            None => stats.added += 1,
        }
    }

    let merged: Vec<_> = by_key.into_values().collect();
    stats.total = merged.len();
    (merged, stats)
}
