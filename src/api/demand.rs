use axum::{extract::State, Json};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::{
    api::{error::ApiError, extract::flexible_datetime, extract::ValidatedJson},
    controller::AppState,
    forecast::DemandForecastPoint,
    ml::ValidationMetrics,
};

#[derive(Debug, Deserialize, Validate)]
pub struct PredictDemandRequest {
    #[validate(length(min = 1, max = 128))]
    pub station_id: String,
    #[serde(deserialize_with = "flexible_datetime::deserialize")]
    pub start_date: DateTime<Utc>,
    #[serde(deserialize_with = "flexible_datetime::deserialize")]
    pub end_date: DateTime<Utc>,
    /// Per-hour values to use instead of history, e.g. a temperature forecast
    #[serde(default)]
    pub features: Option<serde_json::Map<String, serde_json::Value>>,
}

#[derive(Debug, Serialize)]
pub struct PredictDemandResponse {
    station_id: String,
    predictions: Vec<DemandForecastPoint>,
    confidence_interval: (f64, f64),
    model_accuracy: Option<ValidationMetrics>,
}

/// POST /predict/demand
pub async fn predict_demand(
    State(state): State<AppState>,
    ValidatedJson(request): ValidatedJson<PredictDemandRequest>,
) -> Result<Json<PredictDemandResponse>, ApiError> {
    state
        .demand
        .validate_window(request.start_date, request.end_date)
        .map_err(ApiError::from_demand)?;

    let history_start = request.start_date - Duration::days(state.cfg.data.history_days);
    let history = state
        .data
        .station_data(&request.station_id, history_start, request.end_date)
        .await
        .map_err(ApiError::internal("Prediction failed"))?;

    if history.is_empty() {
        return Err(ApiError::NotFound("No historical data found".to_string()));
    }

    let demand = state.demand.clone();
    let (start, end, features) = (request.start_date, request.end_date, request.features);
    let predictions =
        tokio::task::spawn_blocking(move || demand.predict(&history, start, end, features.as_ref()))
            .await
            .map_err(|e| ApiError::internal("Prediction failed")(e.into()))?
            .map_err(ApiError::from_demand)?;

    tracing::debug!(
        station_id = %request.station_id,
        points = predictions.len(),
        "Demand predicted"
    );

    Ok(Json(PredictDemandResponse {
        station_id: request.station_id,
        predictions,
        confidence_interval: state.demand.confidence_interval(),
        model_accuracy: state.demand.model_accuracy(),
    }))
}
