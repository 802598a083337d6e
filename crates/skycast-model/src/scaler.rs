//! Column-wise standardization of feature rows.

use crate::error::{ModelError, ModelResult};
use serde::{Deserialize, Serialize};

/// Z-score scaler fitted per column.
///
/// x_scaled = (x - mean) / std, with population standard deviation.
/// Constant columns get a scale of 1 so they map to 0 instead of NaN.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    pub means: Vec<f64>,
    pub scales: Vec<f64>,
}

impl StandardScaler {
    /// Fit on `rows`. All rows must have the same width.
    pub fn fit(rows: &[Vec<f64>]) -> ModelResult<Self> {
        let first = rows
            .first()
            .ok_or(ModelError::InsufficientData { needed: 1, got: 0 })?;
        let width = first.len();
        let n = rows.len() as f64;

        let mut means = vec![0.0; width];
        for row in rows {
            check_width(row, width)?;
            for (mean, x) in means.iter_mut().zip(row) {
                *mean += x;
            }
        }
        for mean in &mut means {
            *mean /= n;
        }

        let mut variances = vec![0.0; width];
        for row in rows {
            for ((var, x), mean) in variances.iter_mut().zip(row).zip(&means) {
                *var += (x - mean).powi(2);
            }
        }
        let scales = variances
            .into_iter()
            .map(|v| {
                let std = (v / n).sqrt();
                if std < 1e-10 {
                    1.0
                } else {
                    std
                }
            })
            .collect();

        Ok(Self { means, scales })
    }

    pub fn width(&self) -> usize {
        self.means.len()
    }

    pub fn transform_row(&self, row: &[f64]) -> ModelResult<Vec<f64>> {
        check_width(row, self.width())?;
        Ok(row
            .iter()
            .zip(self.means.iter().zip(&self.scales))
            .map(|(x, (mean, scale))| (x - mean) / scale)
            .collect())
    }

    pub fn transform(&self, rows: &[Vec<f64>]) -> ModelResult<Vec<Vec<f64>>> {
        rows.iter().map(|row| self.transform_row(row)).collect()
    }
}

fn check_width(row: &[f64], width: usize) -> ModelResult<()> {
    if row.len() != width {
        return Err(ModelError::DimensionMismatch {
            expected: width,
            got: row.len(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fit_uses_population_statistics() {
        let rows = vec![vec![1.0, 10.0], vec![3.0, 10.0]];
        let scaler = StandardScaler::fit(&rows).unwrap();

        assert_eq!(scaler.means, vec![2.0, 10.0]);
        assert_eq!(scaler.scales, vec![1.0, 1.0]);
    }

    #[test]
    fn test_transform_centers_and_scales() {
        let rows = vec![vec![0.0], vec![4.0], vec![8.0]];
        let scaler = StandardScaler::fit(&rows).unwrap();
        let scaled = scaler.transform(&rows).unwrap();

        let mean: f64 = scaled.iter().map(|r| r[0]).sum::<f64>() / 3.0;
        let var: f64 = scaled.iter().map(|r| r[0].powi(2)).sum::<f64>() / 3.0;
        assert!(mean.abs() < 1e-12);
        assert!((var - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_constant_column_maps_to_zero() {
        let rows = vec![vec![5.0], vec![5.0]];
        let scaler = StandardScaler::fit(&rows).unwrap();

        assert_eq!(scaler.transform_row(&[5.0]).unwrap(), vec![0.0]);
        assert!(scaler.transform_row(&[7.0]).unwrap()[0].is_finite());
    }

    #[test]
    fn test_width_is_checked() {
        assert!(StandardScaler::fit(&[vec![1.0, 2.0], vec![1.0]]).is_err());
        assert!(StandardScaler::fit(&[]).is_err());

        let scaler = StandardScaler::fit(&[vec![1.0, 2.0]]).unwrap();
        assert!(matches!(
            scaler.transform_row(&[1.0]),
            Err(ModelError::DimensionMismatch { expected: 2, got: 1 })
        ));
    }
}
