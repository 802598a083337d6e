//! Core data types and the feature-construction layer for Skycast
//!
//! This crate turns raw time-stamped observations into a deduplicated,
//! time-ordered historical dataset and derives the lagged supervised-learning
//! table the forecasting model is trained on.

pub mod clean;
pub mod features;
pub mod merge;
pub mod pipeline;
pub mod types;

pub use clean::*;
pub use features::*;
pub use merge::*;
pub use pipeline::*;
pub use types::*;
