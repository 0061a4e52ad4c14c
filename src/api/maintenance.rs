use axum::{extract::State, Json};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::{
    api::{error::ApiError, extract::ValidatedJson},
    controller::AppState,
    domain::TelemetryReading,
    maintenance::{BaselineSource, RiskFactor},
};

#[derive(Debug, Deserialize, Validate)]
pub struct PredictMaintenanceRequest {
    #[validate(length(min = 1, max = 128))]
    pub station_id: String,
    #[validate(length(min = 1, max = 128))]
    pub port_id: String,
    #[serde(default)]
    pub telemetry_data: TelemetryReading,
}

#[derive(Debug, Serialize)]
pub struct PredictMaintenanceResponse {
    port_id: String,
    maintenance_score: f64,
    predicted_failure_date: Option<DateTime<Utc>>,
    recommended_actions: Vec<String>,
    confidence: f64,
    risk_factors: Vec<RiskFactor>,
    baseline_source: BaselineSource,
}

/// POST /predict/maintenance
pub async fn predict_maintenance(
    State(state): State<AppState>,
    ValidatedJson(request): ValidatedJson<PredictMaintenanceRequest>,
) -> Result<Json<PredictMaintenanceResponse>, ApiError> {
    let now = Utc::now();
    let since = now - Duration::days(state.cfg.data.telemetry_days);
    let history = state
        .data
        .telemetry_data(&request.port_id, since)
        .await
        .map_err(ApiError::internal("Prediction failed"))?;

    let prediction = state
        .maintenance
        .predict(&history, &request.telemetry_data, now);

    tracing::debug!(
        station_id = %request.station_id,
        port_id = %request.port_id,
        history = history.len(),
        score = prediction.maintenance_score,
        "Maintenance predicted"
    );

    Ok(Json(PredictMaintenanceResponse {
        port_id: request.port_id,
        maintenance_score: prediction.maintenance_score,
        predicted_failure_date: prediction.predicted_failure_date,
        recommended_actions: prediction.recommended_actions,
        confidence: prediction.confidence,
        risk_factors: prediction.risk_factors,
        baseline_source: prediction.baseline_source,
    }))
}
