//! Error types for training, prediction and model publishing.

use skycast_archive::ArchiveError;
use thiserror::Error;

/// Result type alias for model operations.
pub type ModelResult<T> = std::result::Result<T, ModelError>;

#[derive(Error, Debug)]
pub enum ModelError {
    /// Not enough history to build usable rows.
    #[error("insufficient data: need at least {needed} rows, got {got}")]
    InsufficientData { needed: usize, got: usize },

    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// Numerical failure while fitting.
    #[error("computation error: {0}")]
    ComputationError(String),

    /// A trained model failed the publish gate.
    #[error("model rejected: {0}")]
    Rejected(String),

    #[error("model store error: {0}")]
    Store(#[from] ArchiveError),
}
