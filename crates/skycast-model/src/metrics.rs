//! Accuracy metrics for held-out evaluation.

use crate::error::{ModelError, ModelResult};

/// Mean absolute error between `actual` and `predicted`.
pub fn mean_absolute_error(actual: &[f64], predicted: &[f64]) -> ModelResult<f64> {
    if actual.is_empty() {
        return Err(ModelError::InsufficientData { needed: 1, got: 0 });
    }
    if actual.len() != predicted.len() {
        return Err(ModelError::DimensionMismatch {
            expected: actual.len(),
            got: predicted.len(),
        });
    }

    let total: f64 = actual
        .iter()
        .zip(predicted)
        .map(|(a, p)| (a - p).abs())
        .sum();
    Ok(total / actual.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mae() {
        let mae = mean_absolute_error(&[1.0, 2.0, 3.0], &[2.0, 2.0, 1.0]).unwrap();
        assert!((mae - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_mae_rejects_bad_input() {
        assert!(mean_absolute_error(&[], &[]).is_err());
        assert!(mean_absolute_error(&[1.0], &[1.0, 2.0]).is_err());
    }
}
