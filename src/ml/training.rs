//! Training helpers: dataset splitting, error metrics, feature importance.

use super::{Regressor, ValidationMetrics};
use anyhow::Result;
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};

/// Split rows into leading train and trailing test partitions without
/// shuffling. The test partition holds `ceil(n * test_fraction)` rows.
pub fn chronological_split<T: Clone>(rows: &[T], test_fraction: f64) -> Result<(Vec<T>, Vec<T>)> {
    if test_fraction <= 0.0 || test_fraction >= 1.0 {
        anyhow::bail!("Test fraction must be between 0 and 1");
    }

    let n_test = (rows.len() as f64 * test_fraction).ceil() as usize;
    let split_idx = rows.len().saturating_sub(n_test);
    if split_idx == 0 || split_idx == rows.len() {
        anyhow::bail!("Not enough rows ({}) to split", rows.len());
    }

    Ok((rows[..split_idx].to_vec(), rows[split_idx..].to_vec()))
}

/// Calculate validation metrics. MAPE is averaged over non-zero targets only.
pub fn calculate_metrics(predictions: &[f64], targets: &[f64]) -> Result<ValidationMetrics> {
    if predictions.len() != targets.len() {
        anyhow::bail!("Prediction and target count mismatch");
    }

    if predictions.is_empty() {
        anyhow::bail!("No predictions to evaluate");
    }

    let n = predictions.len() as f64;

    // Mean Absolute Error
    let mae: f64 = predictions
        .iter()
        .zip(targets.iter())
        .map(|(p, t)| (p - t).abs())
        .sum::<f64>()
        / n;

    // Root Mean Square Error
    let mse: f64 = predictions
        .iter()
        .zip(targets.iter())
        .map(|(p, t)| (p - t).powi(2))
        .sum::<f64>()
        / n;
    let rmse = mse.sqrt();

    // Mean Absolute Percentage Error
    let pct_errors: Vec<f64> = predictions
        .iter()
        .zip(targets.iter())
        .filter(|(_, t)| t.abs() > 1e-10)
        .map(|(p, t)| ((t - p) / t).abs() * 100.0)
        .collect();
    let mape = if pct_errors.is_empty() {
        0.0
    } else {
        pct_errors.iter().sum::<f64>() / pct_errors.len() as f64
    };

    // R-squared
    let mean_target: f64 = targets.iter().sum::<f64>() / n;
    let ss_tot: f64 = targets.iter().map(|t| (t - mean_target).powi(2)).sum();
    let ss_res: f64 = predictions
        .iter()
        .zip(targets.iter())
        .map(|(p, t)| (t - p).powi(2))
        .sum();

    let r2 = if ss_tot.abs() < 1e-10 {
        0.0
    } else {
        1.0 - (ss_res / ss_tot)
    };

    Ok(ValidationMetrics::new(mae, rmse, r2, mape))
}

/// Permutation importance: increase in mean squared error when a single
/// column is shuffled, clipped at zero and normalized to sum to 1.
pub fn permutation_importance(
    model: &dyn Regressor,
    x: &[Vec<f64>],
    y: &[f64],
    seed: u64,
) -> Result<Vec<f64>> {
    if x.is_empty() || x.len() != y.len() {
        anyhow::bail!("Permutation importance needs matching, non-empty rows and targets");
    }
    let n_features = x[0].len();
    let mse = |pred: &[f64]| {
        pred.iter().zip(y.iter()).map(|(p, t)| (p - t).powi(2)).sum::<f64>() / y.len() as f64
    };

    let baseline = mse(&model.predict(x)?);
    let mut rng = StdRng::seed_from_u64(seed);
    let mut raw = Vec::with_capacity(n_features);

    for col in 0..n_features {
        let mut column: Vec<f64> = x.iter().map(|r| r[col]).collect();
        column.shuffle(&mut rng);

        let permuted: Vec<Vec<f64>> = x
            .iter()
            .zip(column.iter())
            .map(|(row, v)| {
                let mut row = row.clone();
                row[col] = *v;
                row
            })
            .collect();

        raw.push((mse(&model.predict(&permuted)?) - baseline).max(0.0));
    }

    let total: f64 = raw.iter().sum();
    if total <= f64::EPSILON {
        return Ok(vec![0.0; n_features]);
    }
    Ok(raw.into_iter().map(|v| v / total).collect())
}
