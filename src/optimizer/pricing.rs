//! Charging price optimization
//!
//! Demand responds to price with constant elasticity around the current
//! operating point and is penalized when undercut by competitors. The
//! optimizer grid-searches the configured price band for the highest margin,
//! then applies time-of-use adjustments.

use ordered_float::OrderedFloat;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

use super::elasticity::{estimate_elasticity, ElasticityEstimate};
use crate::config::PricingConfig;
use crate::domain::MarketSnapshot;

const PRICE_STEP: f64 = 0.005;
const ELASTICITY_BOUNDS: (f64, f64) = (-3.0, -0.1);
/// One week of hourly observations for full history confidence
const FULL_HISTORY_SAMPLES: f64 = 168.0;

#[derive(Debug, thiserror::Error)]
pub enum PricingError {
    #[error("Invalid pricing input: {0}")]
    InvalidInput(String),

    #[error("Invalid market data: {0}")]
    InvalidMarket(String),
}

/// Current conditions at the station
#[derive(Debug, Clone, PartialEq)]
pub struct PricingInput {
    pub current_demand: f64,
    pub competitor_prices: Vec<f64>,
    /// Hour of day (0-23)
    pub time_of_day: u32,
    /// Day of week (0=Monday, 6=Sunday)
    pub day_of_week: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElasticitySource {
    /// Fitted on this request's market history
    Market,
    /// Fitted during the last retrain
    Prior,
    /// Configured fallback
    Default,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevenueImpact {
    pub baseline_price: f64,
    pub baseline_revenue: f64,
    pub projected_revenue: f64,
    pub absolute_change: f64,
    pub change_percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricingDecision {
    pub optimal_price: f64,
    pub price_elasticity: f64,
    pub elasticity_source: ElasticitySource,
    pub revenue_impact: RevenueImpact,
    pub confidence_score: f64,
}

/// Demand curve around the current operating point
struct DemandCurve {
    base_demand: f64,
    base_price: f64,
    elasticity: f64,
    competitor_price: Option<f64>,
    competitor_sensitivity: f64,
}

impl DemandCurve {
    fn demand_at(&self, price: f64) -> f64 {
        let mut demand = self.base_demand * (price / self.base_price).powf(self.elasticity);
        if let Some(pc) = self.competitor_price {
            if price > pc && pc > 0.0 {
                demand *= (pc / price).powf(self.competitor_sensitivity);
            }
        }
        demand
    }
}

pub struct PricingOptimizer {
    cfg: PricingConfig,
    prior: RwLock<Option<ElasticityEstimate>>,
}

impl PricingOptimizer {
    pub fn new(cfg: PricingConfig) -> Self {
        Self {
            cfg,
            prior: RwLock::new(None),
        }
    }

    /// Elasticity fitted by the last retrain, if any
    pub fn price_elasticity(&self) -> Option<f64> {
        self.prior.read().map(|p| p.elasticity)
    }

    fn validate(&self, input: &PricingInput, market: &MarketSnapshot) -> Result<(), PricingError> {
        if input.time_of_day > 23 {
            return Err(PricingError::InvalidInput(format!(
                "time_of_day must be 0-23, got {}",
                input.time_of_day
            )));
        }
        if input.day_of_week > 6 {
            return Err(PricingError::InvalidInput(format!(
                "day_of_week must be 0-6, got {}",
                input.day_of_week
            )));
        }
        if !input.current_demand.is_finite() || input.current_demand < 0.0 {
            return Err(PricingError::InvalidInput("current_demand must be >= 0".to_string()));
        }
        if input.competitor_prices.iter().any(|p| !p.is_finite() || *p < 0.0) {
            return Err(PricingError::InvalidInput(
                "competitor prices must be non-negative".to_string(),
            ));
        }
        if !market.current_price.is_finite() || market.current_price <= 0.0 {
            return Err(PricingError::InvalidMarket(format!(
                "current price must be positive, got {}",
                market.current_price
            )));
        }
        Ok(())
    }

    fn resolve_elasticity(&self, market: &MarketSnapshot) -> (f64, ElasticitySource, Option<ElasticityEstimate>) {
        if let Some(est) = estimate_elasticity(&market.price_history, self.cfg.min_history) {
            return (est.elasticity, ElasticitySource::Market, Some(est));
        }
        if let Some(prior) = *self.prior.read() {
            return (prior.elasticity, ElasticitySource::Prior, Some(prior));
        }
        (self.cfg.default_elasticity, ElasticitySource::Default, None)
    }

    fn time_factor(&self, time_of_day: u32, day_of_week: u32) -> f64 {
        let mut factor = if self.cfg.peak_hours.contains(&time_of_day) {
            1.0 + self.cfg.peak_premium
        } else if time_of_day < 6 {
            1.0 - self.cfg.off_peak_discount
        } else {
            1.0
        };
        if day_of_week >= 5 {
            factor *= 1.0 - self.cfg.weekend_discount;
        }
        factor
    }

    pub fn optimize(
        &self,
        input: &PricingInput,
        market: &MarketSnapshot,
    ) -> Result<PricingDecision, PricingError> {
        self.validate(input, market)?;

        let (raw_elasticity, source, estimate) = self.resolve_elasticity(market);
        let elasticity = raw_elasticity.clamp(ELASTICITY_BOUNDS.0, ELASTICITY_BOUNDS.1);

        let competitor_price = if input.competitor_prices.is_empty() {
            None
        } else {
            Some(input.competitor_prices.iter().sum::<f64>() / input.competitor_prices.len() as f64)
        };

        let curve = DemandCurve {
            base_demand: input.current_demand,
            base_price: market.current_price,
            elasticity,
            competitor_price,
            competitor_sensitivity: self.cfg.competitor_sensitivity,
        };
        let margin = |price: f64| (price - market.energy_cost) * curve.demand_at(price);

        let (min_price, max_price) = (self.cfg.min_price, self.cfg.max_price);
        let best_price = if input.current_demand <= 0.0 {
            market.current_price.clamp(min_price, max_price)
        } else {
            let steps = ((max_price - min_price) / PRICE_STEP).round() as usize;
            (0..=steps)
                .map(|i| (min_price + i as f64 * PRICE_STEP).min(max_price))
                .max_by_key(|p| OrderedFloat(margin(*p)))
                .unwrap_or(market.current_price)
        };

        let factor = self.time_factor(input.time_of_day, input.day_of_week);
        let optimal_price = round_price((best_price * factor).clamp(min_price, max_price));

        let baseline_revenue = margin(market.current_price);
        let projected_revenue = margin(optimal_price);
        let absolute_change = projected_revenue - baseline_revenue;
        let change_percent = if baseline_revenue.abs() > 1e-9 {
            absolute_change / baseline_revenue.abs() * 100.0
        } else {
            0.0
        };

        let confidence_score = match (source, estimate) {
            (ElasticitySource::Default, _) | (_, None) => 0.35,
            (_, Some(est)) => (0.4
                + 0.3 * (est.samples as f64 / FULL_HISTORY_SAMPLES).min(1.0)
                + 0.3 * est.r2.max(0.0))
            .min(0.99),
        };

        debug!(
            station_id = %market.station_id,
            elasticity,
            ?source,
            best_price,
            time_factor = factor,
            optimal_price,
            "Pricing optimized"
        );

        Ok(PricingDecision {
            optimal_price,
            price_elasticity: elasticity,
            elasticity_source: source,
            revenue_impact: RevenueImpact {
                baseline_price: market.current_price,
                baseline_revenue,
                projected_revenue,
                absolute_change,
                change_percent,
            },
            confidence_score,
        })
    }

    /// Refit the elasticity prior from a market history
    pub fn retrain(&self, market: &MarketSnapshot) -> Result<BTreeMap<String, f64>, PricingError> {
        let estimate = estimate_elasticity(&market.price_history, self.cfg.min_history).ok_or_else(|| {
            PricingError::InvalidMarket(format!(
                "cannot estimate elasticity from {} observations",
                market.price_history.len()
            ))
        })?;

        *self.prior.write() = Some(estimate);
        info!(
            elasticity = estimate.elasticity,
            r2 = estimate.r2,
            samples = estimate.samples,
            "Pricing elasticity prior updated"
        );

        Ok(BTreeMap::from([
            ("elasticity".to_string(), estimate.elasticity),
            ("r2_score".to_string(), estimate.r2),
            ("samples".to_string(), estimate.samples as f64),
        ]))
    }
}

fn round_price(price: f64) -> f64 {
    (price * 1000.0).round() / 1000.0
}
