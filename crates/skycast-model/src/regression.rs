//! Regression capability used by the trainer and predictor.

use crate::error::{ModelError, ModelResult};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// A fitted model: maps one feature row to a value.
pub trait RegressionModel {
    fn predict_row(&self, x: &[f64]) -> ModelResult<f64>;

    fn predict(&self, rows: &[Vec<f64>]) -> ModelResult<Vec<f64>> {
        rows.iter().map(|row| self.predict_row(row)).collect()
    }
}

/// Fitting capability: `fit(X, y) -> model`.
pub trait Regressor {
    type Model: RegressionModel + Clone + Serialize + DeserializeOwned;

    fn fit(&self, x: &[Vec<f64>], y: &[f64]) -> ModelResult<Self::Model>;
}

/// Linear model: y = intercept + x · coefficients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearModel {
    pub intercept: f64,
    pub coefficients: Vec<f64>,
}

impl RegressionModel for LinearModel {
    fn predict_row(&self, x: &[f64]) -> ModelResult<f64> {
        if x.len() != self.coefficients.len() {
            return Err(ModelError::DimensionMismatch {
                expected: self.coefficients.len(),
                got: x.len(),
            });
        }
        Ok(self.intercept
            + x.iter()
                .zip(&self.coefficients)
                .map(|(xi, ci)| xi * ci)
                .sum::<f64>())
    }
}

/// Ridge regression solved through the normal equations.
///
/// The intercept is not penalized. With `alpha = 0` this is ordinary least
/// squares (plus a tiny diagonal jitter for numerical stability).
#[derive(Debug, Clone, Copy)]
pub struct RidgeRegressor {
    pub alpha: f64,
}

impl RidgeRegressor {
    pub fn new(alpha: f64) -> Self {
        Self { alpha }
    }
}

impl Default for RidgeRegressor {
    fn default() -> Self {
        Self { alpha: 1.0 }
    }
}

impl Regressor for RidgeRegressor {
    type Model = LinearModel;

    fn fit(&self, x: &[Vec<f64>], y: &[f64]) -> ModelResult<LinearModel> {
        let n = y.len();
        if n == 0 {
            return Err(ModelError::InsufficientData { needed: 1, got: 0 });
        }
        if x.len() != n {
            return Err(ModelError::DimensionMismatch {
                expected: n,
                got: x.len(),
            });
        }
        if !(self.alpha >= 0.0) {
            return Err(ModelError::InvalidParameter(format!(
                "ridge alpha must be non-negative, got {}",
                self.alpha
            )));
        }

        let k = x[0].len();
        let num_params = k + 1;

        // X'X and X'y over the design matrix [1, x1, x2, ...]
        let mut xtx = vec![vec![0.0; num_params]; num_params];
        let mut xty = vec![0.0; num_params];

        for (row, &target) in x.iter().zip(y) {
            if row.len() != k {
                return Err(ModelError::DimensionMismatch {
                    expected: k,
                    got: row.len(),
                });
            }
            xtx[0][0] += 1.0;
            xty[0] += target;
            for i in 0..k {
                xtx[0][i + 1] += row[i];
                xtx[i + 1][0] += row[i];
                xty[i + 1] += row[i] * target;
                for j in 0..k {
                    xtx[i + 1][j + 1] += row[i] * row[j];
                }
            }
        }

        for (i, diag) in xtx.iter_mut().enumerate() {
            diag[i] += 1e-8;
            if i > 0 {
                diag[i] += self.alpha;
            }
        }

        let beta = solve_symmetric(&xtx, &xty).ok_or_else(|| {
            ModelError::ComputationError("normal equations are not positive definite".into())
        })?;

        Ok(LinearModel {
            intercept: beta[0],
            coefficients: beta[1..].to_vec(),
        })
    }
}

/// Solve A x = b for symmetric positive definite A (Cholesky).
fn solve_symmetric(a: &[Vec<f64>], b: &[f64]) -> Option<Vec<f64>> {
    let n = b.len();
    if n == 0 || a.len() != n {
        return None;
    }

    let mut l = vec![vec![0.0; n]; n];
    for i in 0..n {
        for j in 0..=i {
            let mut sum = a[i][j];
            for k in 0..j {
                sum -= l[i][k] * l[j][k];
            }
            if i == j {
                if sum <= 0.0 {
                    return None;
                }
                l[i][j] = sum.sqrt();
            } else {
                l[i][j] = sum / l[j][j];
            }
        }
    }

    // L y = b
    let mut y = vec![0.0; n];
    for i in 0..n {
        let mut sum = b[i];
        for j in 0..i {
            sum -= l[i][j] * y[j];
        }
        y[i] = sum / l[i][i];
    }

    // L' x = y
    let mut x = vec![0.0; n];
    for i in (0..n).rev() {
        let mut sum = y[i];
        for j in (i + 1)..n {
            sum -= l[j][i] * x[j];
        }
        x[i] = sum / l[i][i];
    }

    if x.iter().all(|v| v.is_finite()) {
        Some(x)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ols_recovers_linear_relationship() {
        // y = 3 + 2 x1 - x2
        let x: Vec<Vec<f64>> = (0..20)
            .map(|i| vec![i as f64, ((i * 7) % 5) as f64])
            .collect();
        let y: Vec<f64> = x.iter().map(|r| 3.0 + 2.0 * r[0] - r[1]).collect();

        let model = RidgeRegressor::new(0.0).fit(&x, &y).unwrap();

        assert!((model.intercept - 3.0).abs() < 1e-5);
        assert!((model.coefficients[0] - 2.0).abs() < 1e-5);
        assert!((model.coefficients[1] + 1.0).abs() < 1e-5);
        assert!((model.predict_row(&[10.0, 1.0]).unwrap() - 22.0).abs() < 1e-4);
    }

    #[test]
    fn test_ridge_shrinks_coefficients() {
        let x: Vec<Vec<f64>> = (0..10).map(|i| vec![i as f64]).collect();
        let y: Vec<f64> = x.iter().map(|r| 5.0 * r[0]).collect();

        let ols = RidgeRegressor::new(0.0).fit(&x, &y).unwrap();
        let ridge = RidgeRegressor::new(100.0).fit(&x, &y).unwrap();

        assert!(ridge.coefficients[0].abs() < ols.coefficients[0].abs());
    }

    #[test]
    fn test_collinear_columns_fit_with_ridge() {
        let x: Vec<Vec<f64>> = (0..10).map(|i| vec![i as f64, i as f64]).collect();
        let y: Vec<f64> = (0..10).map(|i| i as f64).collect();

        let model = RidgeRegressor::default().fit(&x, &y).unwrap();
        assert!(model.predict_row(&[4.0, 4.0]).unwrap().is_finite());
    }

    #[test]
    fn test_fit_validates_input() {
        let regressor = RidgeRegressor::default();
        assert!(regressor.fit(&[], &[]).is_err());
        assert!(regressor.fit(&[vec![1.0]], &[1.0, 2.0]).is_err());
        assert!(regressor.fit(&[vec![1.0], vec![1.0, 2.0]], &[1.0, 2.0]).is_err());
        assert!(RidgeRegressor::new(-1.0).fit(&[vec![1.0]], &[1.0]).is_err());
    }

    #[test]
    fn test_predict_checks_width() {
        let model = LinearModel {
            intercept: 1.0,
            coefficients: vec![1.0, 1.0],
        };
        assert!(model.predict_row(&[1.0]).is_err());
        assert_eq!(model.predict(&[vec![1.0, 2.0]]).unwrap(), vec![4.0]);
    }
}
