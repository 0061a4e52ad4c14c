use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::controller::AppState;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: &'static str,
    timestamp: DateTime<Utc>,
    version: &'static str,
    uptime_seconds: i64,
    models: ModelStatus,
}

#[derive(Debug, Serialize)]
pub struct ModelStatus {
    demand_trained: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    demand_trained_at: Option<DateTime<Utc>>,
    pricing_prior: bool,
    maintenance_baseline: bool,
}

impl ModelStatus {
    fn of(state: &AppState) -> Self {
        let model = state.demand.current_model();
        Self {
            demand_trained: model.is_some(),
            demand_trained_at: model.map(|m| m.trained_at),
            pricing_prior: state.pricing.price_elasticity().is_some(),
            maintenance_baseline: state.maintenance.fleet_baseline().is_some(),
        }
    }
}

/// GET /health
///
/// Always 200 while the process serves requests; model state is reported,
/// not enforced.
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy",
        timestamp: Utc::now(),
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: (Utc::now() - state.started_at).num_seconds(),
        models: ModelStatus::of(&state),
    })
}

/// GET /health/ready - 200 once the demand model can serve predictions
pub async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    if state.demand.is_trained() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// GET /health/live
pub async fn liveness_check() -> impl IntoResponse {
    StatusCode::OK
}
