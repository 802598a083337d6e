use anyhow::Result;

use crate::{HistoricalRecord, Prediction};

/// Downstream consumer of pipeline output (the persistent store collaborator)
#[async_trait::async_trait]
pub trait Sink: Send + Sync {
    fn name(&self) -> &str;

    /// Records added or replaced by a merge
    async fn emit_records(&mut self, _records: &[HistoricalRecord]) -> Result<()> {
        Ok(())
    }

    /// One prediction batch
    async fn emit_predictions(&mut self, predictions: &[Prediction]) -> Result<()>;
}
