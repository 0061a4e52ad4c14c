//! Machine Learning Module
//!
//! Building blocks for the demand ensemble:
//! - Regressor wrappers around smartcore (random forest, gradient boosting)
//! - Standard scaling of feature matrices
//! - Chronological splitting, error metrics and permutation importance
//!
//! Feature matrices are row-major `Vec<Vec<f64>>`; conversion to smartcore's
//! `DenseMatrix` happens at the wrapper boundary.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use ::smartcore::linalg::basic::matrix::DenseMatrix;

pub mod scaler;
pub mod smartcore;
pub mod training;

pub use self::scaler::StandardScaler;
pub use self::smartcore::{
    GradientBoostingParameters, SmartcoreGradientBoosting, SmartcoreRandomForest,
};
pub use self::training::{calculate_metrics, chronological_split, permutation_importance};

/// ML Model Type
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ModelType {
    RandomForest,
    GradientBoosting,
}

/// Validation Metrics
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValidationMetrics {
    pub mae: f64,  // Mean Absolute Error
    pub rmse: f64, // Root Mean Square Error
    #[serde(rename = "r2_score")]
    pub r2: f64,   // R-squared
    pub mape: f64, // Mean Absolute Percentage Error
}

impl ValidationMetrics {
    pub fn new(mae: f64, rmse: f64, r2: f64, mape: f64) -> Self {
        Self { mae, rmse, r2, mape }
    }
}

/// A fitted regression model that scores row-major feature matrices
pub trait Regressor: Send + Sync {
    fn predict(&self, rows: &[Vec<f64>]) -> Result<Vec<f64>>;

    fn model_type(&self) -> ModelType;
}

/// Convert row-major feature rows into a smartcore matrix
pub(crate) fn to_dense_matrix(rows: &[Vec<f64>]) -> Result<DenseMatrix<f64>> {
    let n_samples = rows.len();
    if n_samples == 0 {
        anyhow::bail!("Cannot build a matrix from zero rows");
    }
    let n_features = rows[0].len();

    let mut flat_data = Vec::with_capacity(n_samples * n_features);
    for row in rows {
        if row.len() != n_features {
            anyhow::bail!("All feature vectors must have the same length");
        }
        flat_data.extend_from_slice(row);
    }

    Ok(DenseMatrix::new(n_samples, n_features, flat_data, false))
}
