//! Training and prediction orchestration
//!
//! The regression model itself is opaque to this crate: anything that
//! implements [`Regressor`] can be trained, scaled, evaluated, published and
//! used for forecasting. [`RidgeRegressor`] is the built-in implementation.

pub mod error;
pub mod metrics;
pub mod predictor;
pub mod regression;
pub mod scaler;
pub mod store;
pub mod table;
pub mod trainer;

pub use error::*;
pub use metrics::*;
pub use predictor::*;
pub use regression::*;
pub use scaler::*;
pub use store::*;
pub use table::*;
pub use trainer::*;
