use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::{
    api::{error::ApiError, extract::ValidatedJson},
    controller::AppState,
    optimizer::{PricingDecision, PricingInput},
};

#[derive(Debug, Deserialize, Validate)]
pub struct OptimizePricingRequest {
    #[validate(length(min = 1, max = 128))]
    pub station_id: String,
    #[validate(range(min = 0.0))]
    pub current_demand: f64,
    #[serde(default)]
    pub competitor_prices: Vec<f64>,
    #[validate(range(max = 23))]
    pub time_of_day: u32,
    /// 0 = Monday
    #[validate(range(max = 6))]
    pub day_of_week: u32,
}

#[derive(Debug, Serialize)]
pub struct OptimizePricingResponse {
    station_id: String,
    #[serde(flatten)]
    decision: PricingDecision,
}

/// POST /optimize/pricing
pub async fn optimize_pricing(
    State(state): State<AppState>,
    ValidatedJson(request): ValidatedJson<OptimizePricingRequest>,
) -> Result<Json<OptimizePricingResponse>, ApiError> {
    let market = state
        .data
        .market_data(&request.station_id)
        .await
        .map_err(ApiError::internal("Optimization failed"))?;

    let input = PricingInput {
        current_demand: request.current_demand,
        competitor_prices: request.competitor_prices,
        time_of_day: request.time_of_day,
        day_of_week: request.day_of_week,
    };
    let decision = state
        .pricing
        .optimize(&input, &market)
        .map_err(ApiError::from_pricing)?;

    Ok(Json(OptimizePricingResponse {
        station_id: request.station_id,
        decision,
    }))
}
