//! File-backed stores for the pipeline
//!
//! - [`RawArchive`]: one immutable CSV snapshot per ingestion run
//! - [`HistoricalStore`]: the cumulative, deduplicated historical dataset
//!
//! Every write goes to a temporary file in the destination directory and is
//! then renamed into place, so readers only ever see complete files.

pub mod atomic;
pub mod historical;
pub mod raw;

pub use atomic::*;
pub use historical::*;
pub use raw::*;

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error on {}: {source}", path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("JSON error on {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("No free archive name for {0}")]
    NameExhausted(String),

    #[error("Archive not found: {0}")]
    NotFound(String),
}

pub type ArchiveResult<T> = Result<T, ArchiveError>;

impl ArchiveError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ArchiveError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn csv(path: impl Into<PathBuf>, source: csv::Error) -> Self {
        ArchiveError::Csv {
            path: path.into(),
            source,
        }
    }

    pub fn json(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        ArchiveError::Json {
            path: path.into(),
            source,
        }
    }
}
