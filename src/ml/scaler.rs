//! Z-score feature scaling

use anyhow::Result;
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

/// Per-column standardization fitted on training rows only.
///
/// Uses the population standard deviation; columns with zero variance get a
/// unit scale so they map to 0 after centering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    pub means: Vec<f64>,
    pub scales: Vec<f64>,
}

impl StandardScaler {
    pub fn fit(rows: &[Vec<f64>]) -> Result<Self> {
        if rows.is_empty() {
            anyhow::bail!("Cannot fit scaler on empty data");
        }
        let n_features = rows[0].len();

        let mut means = Vec::with_capacity(n_features);
        let mut scales = Vec::with_capacity(n_features);
        for col in 0..n_features {
            let column: Vec<f64> = rows.iter().map(|r| r[col]).collect();
            let mean = column.iter().mean();
            let std = column.iter().population_std_dev();
            means.push(mean);
            scales.push(if std.is_finite() && std > 1e-12 { std } else { 1.0 });
        }

        Ok(Self { means, scales })
    }

    pub fn n_features(&self) -> usize {
        self.means.len()
    }

    pub fn transform(&self, rows: &[Vec<f64>]) -> Result<Vec<Vec<f64>>> {
        rows.iter()
            .map(|row| {
                if row.len() != self.n_features() {
                    anyhow::bail!(
                        "Scaler expects {} features, got {}",
                        self.n_features(),
                        row.len()
                    );
                }
                Ok(row
                    .iter()
                    .zip(self.means.iter().zip(self.scales.iter()))
                    .map(|(v, (mean, scale))| (v - mean) / scale)
                    .collect())
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_fit_transform() {
        let rows = vec![vec![1.0, 10.0], vec![3.0, 10.0]];
        let scaler = StandardScaler::fit(&rows).unwrap();

        assert_eq!(scaler.means, vec![2.0, 10.0]);
        assert_eq!(scaler.scales, vec![1.0, 1.0]); // population std of [1, 3] is 1

        let scaled = scaler.transform(&rows).unwrap();
        assert_eq!(scaled[0], vec![-1.0, 0.0]);
        assert_eq!(scaled[1], vec![1.0, 0.0]);
    }

    #[test]
    fn test_transform_uses_training_statistics() {
        let scaler = StandardScaler::fit(&[vec![0.0], vec![2.0]]).unwrap();
        let scaled = scaler.transform(&[vec![5.0]]).unwrap();
        assert_eq!(scaled[0][0], 4.0);
    }

    #[test]
    fn test_width_mismatch() {
        let scaler = StandardScaler::fit(&[vec![0.0, 1.0]]).unwrap();
        assert!(scaler.transform(&[vec![1.0]]).is_err());
        assert!(StandardScaler::fit(&[]).is_err());
    }

    proptest! {
        #[test]
        fn scaled_columns_are_centered(values in prop::collection::vec(-1e3f64..1e3, 2..50)) {
            let rows: Vec<Vec<f64>> = values.iter().map(|v| vec![*v]).collect();
            let scaler = StandardScaler::fit(&rows).unwrap();
            let scaled = scaler.transform(&rows).unwrap();
            let mean = scaled.iter().map(|r| r[0]).sum::<f64>() / scaled.len() as f64;
            prop_assert!(mean.abs() < 1e-6);
        }
    }
}
