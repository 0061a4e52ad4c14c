//! SmartCore Model Wrappers
//!
//! The demand ensemble pairs a random forest with a gradient-boosted tree
//! ensemble. SmartCore ships the forest directly; boosting is assembled here
//! from SmartCore decision trees fitted stage by stage on the residuals of
//! the running prediction (least-squares boosting).

use super::{to_dense_matrix, ModelType, Regressor};
use anyhow::Result;
use serde::{Deserialize, Serialize};

use smartcore::ensemble::random_forest_regressor::{RandomForestRegressor, RandomForestRegressorParameters};
use smartcore::linalg::basic::matrix::DenseMatrix;
use smartcore::tree::decision_tree_regressor::{DecisionTreeRegressor, DecisionTreeRegressorParameters};

type ForestModel = RandomForestRegressor<f64, f64, DenseMatrix<f64>, Vec<f64>>;
type TreeModel = DecisionTreeRegressor<f64, f64, DenseMatrix<f64>, Vec<f64>>;

fn check_training_shape(x: &[Vec<f64>], y: &[f64]) -> Result<()> {
    if x.is_empty() || y.is_empty() {
        anyhow::bail!("Cannot train on empty dataset");
    }

    if x.len() != y.len() {
        anyhow::bail!(
            "Feature and target count mismatch: {} features, {} targets",
            x.len(),
            y.len()
        );
    }
    Ok(())
}

/// SmartCore RandomForest Model Wrapper
#[derive(Debug, Serialize, Deserialize)]
pub struct SmartcoreRandomForest {
    model: ForestModel,
    pub n_trees: usize,
    pub max_depth: Option<usize>,
    pub n_features: usize,
}

impl SmartcoreRandomForest {
    /// 100 fully-featured trees capped at depth 10, seeded for reproducibility
    pub fn default_parameters() -> RandomForestRegressorParameters {
        Self::custom_parameters(100, Some(10), 2)
    }

    pub fn custom_parameters(
        n_trees: usize,
        max_depth: Option<usize>,
        min_samples_split: usize,
    ) -> RandomForestRegressorParameters {
        RandomForestRegressorParameters {
            max_depth: max_depth.map(|d| d as u16),
            min_samples_leaf: 1,
            min_samples_split,
            n_trees,
            m: None, // resolved to the full feature count at fit time
            keep_samples: false,
            seed: 42,
        }
    }

    pub fn train(
        x: &[Vec<f64>],
        y: &[f64],
        mut params: RandomForestRegressorParameters,
    ) -> Result<Self> {
        check_training_shape(x, y)?;

        let x_matrix = to_dense_matrix(x)?;
        let n_features = x[0].len();
        if params.m.is_none() {
            params.m = Some(n_features.max(1));
        }

        let n_trees = params.n_trees;
        let max_depth = params.max_depth.map(|d| d as usize);

        let model = RandomForestRegressor::fit(&x_matrix, &y.to_vec(), params)
            .map_err(|e| anyhow::anyhow!("RandomForest training failed: {:?}", e))?;

        Ok(Self {
            model,
            n_trees,
            max_depth,
            n_features,
        })
    }
}

impl Regressor for SmartcoreRandomForest {
    fn predict(&self, rows: &[Vec<f64>]) -> Result<Vec<f64>> {
        let x = to_dense_matrix(rows)?;
        self.model
            .predict(&x)
            .map_err(|e| anyhow::anyhow!("RandomForest prediction failed: {:?}", e))
    }

    fn model_type(&self) -> ModelType {
        ModelType::RandomForest
    }
}

/// Gradient boosting hyper-parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GradientBoostingParameters {
    pub n_estimators: usize,
    pub max_depth: u16,
    pub learning_rate: f64,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
}

impl Default for GradientBoostingParameters {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_depth: 6,
            learning_rate: 0.1,
            min_samples_split: 2,
            min_samples_leaf: 1,
        }
    }
}

/// Least-squares gradient boosting over SmartCore regression trees
#[derive(Debug, Serialize, Deserialize)]
pub struct SmartcoreGradientBoosting {
    pub params: GradientBoostingParameters,
    /// Initial prediction, the training target mean
    init: f64,
    stages: Vec<TreeModel>,
}

impl SmartcoreGradientBoosting {
    pub fn train(x: &[Vec<f64>], y: &[f64], params: GradientBoostingParameters) -> Result<Self> {
        check_training_shape(x, y)?;
        if !(params.learning_rate > 0.0 && params.learning_rate <= 1.0) {
            anyhow::bail!("Learning rate must be in (0, 1], got {}", params.learning_rate);
        }

        let x_matrix = to_dense_matrix(x)?;
        let tree_params = DecisionTreeRegressorParameters::default()
            .with_max_depth(params.max_depth)
            .with_min_samples_split(params.min_samples_split)
            .with_min_samples_leaf(params.min_samples_leaf);

        let init = y.iter().sum::<f64>() / y.len() as f64;
        let mut fitted = vec![init; y.len()];
        let mut stages = Vec::with_capacity(params.n_estimators);

        for stage in 0..params.n_estimators {
            let residuals: Vec<f64> = y.iter().zip(fitted.iter()).map(|(t, f)| t - f).collect();

            let tree = DecisionTreeRegressor::fit(&x_matrix, &residuals, tree_params.clone())
                .map_err(|e| anyhow::anyhow!("Boosting stage {} failed: {:?}", stage, e))?;
            let update = tree
                .predict(&x_matrix)
                .map_err(|e| anyhow::anyhow!("Boosting stage {} prediction failed: {:?}", stage, e))?;

            for (f, u) in fitted.iter_mut().zip(update.iter()) {
                *f += params.learning_rate * u;
            }
            stages.push(tree);
        }

        Ok(Self { params, init, stages })
    }

    pub fn n_stages(&self) -> usize {
        self.stages.len()
    }
}

impl Regressor for SmartcoreGradientBoosting {
    fn predict(&self, rows: &[Vec<f64>]) -> Result<Vec<f64>> {
        let x = to_dense_matrix(rows)?;
        let mut out = vec![self.init; rows.len()];
        for tree in &self.stages {
            let update = tree
                .predict(&x)
                .map_err(|e| anyhow::anyhow!("Boosting prediction failed: {:?}", e))?;
            for (o, u) in out.iter_mut().zip(update.iter()) {
                *o += self.params.learning_rate * u;
            }
        }
        Ok(out)
    }

    fn model_type(&self) -> ModelType {
        ModelType::GradientBoosting
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // y = 2*x1 + 3*x2
    fn linear_data() -> (Vec<Vec<f64>>, Vec<f64>) {
        let mut x = Vec::new();
        let mut y = Vec::new();
        for a in 0..8 {
            for b in 0..5 {
                let (x1, x2) = (a as f64, b as f64);
                x.push(vec![x1, x2]);
                y.push(2.0 * x1 + 3.0 * x2);
            }
        }
        (x, y)
    }

    #[test]
    fn test_random_forest_parameters() {
        let params = SmartcoreRandomForest::default_parameters();
        assert_eq!(params.n_trees, 100);
        assert_eq!(params.max_depth, Some(10));
        assert_eq!(params.seed, 42);
        assert!(!params.keep_samples);
    }

    #[test]
    fn test_train_random_forest() {
        let (x, y) = linear_data();
        let params = SmartcoreRandomForest::custom_parameters(10, Some(5), 2);

        let model = SmartcoreRandomForest::train(&x, &y, params).unwrap();
        assert_eq!(model.n_trees, 10);
        assert_eq!(model.n_features, 2);

        let pred = model.predict(&[vec![4.0, 2.0]]).unwrap();
        // 2*4 + 3*2 = 14
        assert!(pred[0] > 10.0 && pred[0] < 18.0);
    }

    #[test]
    fn test_random_forest_rejects_mismatched_targets() {
        let (x, _) = linear_data();
        let params = SmartcoreRandomForest::custom_parameters(5, Some(3), 2);
        assert!(SmartcoreRandomForest::train(&x, &[1.0, 2.0], params).is_err());
    }

    #[test]
    fn test_gradient_boosting_fits_training_data() {
        let (x, y) = linear_data();
        let params = GradientBoostingParameters {
            n_estimators: 50,
            max_depth: 3,
            ..Default::default()
        };

        let model = SmartcoreGradientBoosting::train(&x, &y, params).unwrap();
        assert_eq!(model.n_stages(), 50);

        let pred = model.predict(&x).unwrap();
        let mae = pred.iter().zip(y.iter()).map(|(p, t)| (p - t).abs()).sum::<f64>() / y.len() as f64;
        assert!(mae < 1.0, "mae was {mae}");
    }

    #[test]
    fn test_gradient_boosting_zero_stages_predicts_mean() {
        let (x, y) = linear_data();
        let params = GradientBoostingParameters {
            n_estimators: 0,
            ..Default::default()
        };
        let model = SmartcoreGradientBoosting::train(&x, &y, params).unwrap();
        let mean = y.iter().sum::<f64>() / y.len() as f64;
        let pred = model.predict(&[vec![0.0, 0.0]]).unwrap();
        assert!((pred[0] - mean).abs() < 1e-12);
    }

    #[test]
    fn test_gradient_boosting_rejects_bad_learning_rate() {
        let (x, y) = linear_data();
        let params = GradientBoostingParameters {
            learning_rate: 0.0,
            ..Default::default()
        };
        assert!(SmartcoreGradientBoosting::train(&x, &y, params).is_err());
    }
}
