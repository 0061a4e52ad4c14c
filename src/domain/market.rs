use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Observed price and demand for one hour
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceObservation {
    pub timestamp: DateTime<Utc>,
    pub price: f64,
    pub demand: f64,
}

/// Market context for pricing a station
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub station_id: String,
    /// Price currently charged per kWh
    pub current_price: f64,
    /// Energy procurement cost per kWh
    pub energy_cost: f64,
    pub average_demand: f64,
    #[serde(default)]
    pub price_history: Vec<PriceObservation>,
}
