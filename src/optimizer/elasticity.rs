//! Price elasticity of demand from observed price/demand pairs

use serde::{Deserialize, Serialize};

use crate::domain::PriceObservation;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ElasticityEstimate {
    /// d ln(demand) / d ln(price)
    pub elasticity: f64,
    /// Goodness of fit of the log-log regression
    pub r2: f64,
    pub samples: usize,
}

/// Least-squares slope of ln(demand) on ln(price).
///
/// Returns `None` with fewer than `min_samples` usable pairs, no price
/// variation, or a non-negative slope.
pub fn estimate_elasticity(history: &[PriceObservation], min_samples: usize) -> Option<ElasticityEstimate> {
    let points: Vec<(f64, f64)> = history
        .iter()
        .filter(|o| o.price > 0.0 && o.demand > 0.0 && o.price.is_finite() && o.demand.is_finite())
        .map(|o| (o.price.ln(), o.demand.ln()))
        .collect();

    if points.len() < min_samples.max(2) {
        return None;
    }

    let n = points.len() as f64;
    let x_mean = points.iter().map(|(x, _)| x).sum::<f64>() / n;
    let y_mean = points.iter().map(|(_, y)| y).sum::<f64>() / n;

    let mut sxy = 0.0;
    let mut sxx = 0.0;
    let mut syy = 0.0;
    for (x, y) in &points {
        sxy += (x - x_mean) * (y - y_mean);
        sxx += (x - x_mean).powi(2);
        syy += (y - y_mean).powi(2);
    }

    if sxx < f64::EPSILON {
        return None;
    }
    let slope = sxy / sxx;
    if !slope.is_finite() || slope >= 0.0 {
        return None;
    }

    let r2 = if syy < f64::EPSILON {
        0.0
    } else {
        (sxy * sxy) / (sxx * syy)
    };

    Some(ElasticityEstimate {
        elasticity: slope,
        r2,
        samples: points.len(),
    })
}
