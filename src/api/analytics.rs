use axum::{
    extract::{Path, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::{
    analytics::{AnalyticsFilters, AnalyticsReport, Insight},
    api::{error::ApiError, extract::flexible_datetime, extract::ValidatedJson},
    controller::AppState,
};

#[derive(Debug, Deserialize, Validate)]
pub struct AnalyticsRequest {
    #[validate(length(min = 1, max = 128))]
    pub tenant_id: String,
    #[validate(length(min = 1))]
    pub metric_type: String,
    #[serde(deserialize_with = "flexible_datetime::deserialize")]
    pub start_date: DateTime<Utc>,
    #[serde(deserialize_with = "flexible_datetime::deserialize")]
    pub end_date: DateTime<Utc>,
    #[serde(default)]
    pub filters: Option<AnalyticsFilters>,
}

#[derive(Debug, Serialize)]
pub struct AnalyticsResponse {
    tenant_id: String,
    analytics: AnalyticsReport,
    generated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct InsightsResponse {
    tenant_id: String,
    insights: Vec<Insight>,
    generated_at: DateTime<Utc>,
}

/// POST /analytics/generate
pub async fn generate_analytics(
    State(state): State<AppState>,
    ValidatedJson(request): ValidatedJson<AnalyticsRequest>,
) -> Result<Json<AnalyticsResponse>, ApiError> {
    let filters = request.filters.unwrap_or_default();
    let analytics = state
        .analytics
        .generate_comprehensive_analytics(
            &request.tenant_id,
            &request.metric_type,
            request.start_date,
            request.end_date,
            &filters,
        )
        .await
        .map_err(|e| ApiError::from_analytics(e, "Analytics generation failed"))?;

    Ok(Json(AnalyticsResponse {
        tenant_id: request.tenant_id,
        analytics,
        generated_at: Utc::now(),
    }))
}

/// GET /analytics/insights/:tenant_id
pub async fn get_insights(
    State(state): State<AppState>,
    Path(tenant_id): Path<String>,
) -> Result<Json<InsightsResponse>, ApiError> {
    let insights = state
        .analytics
        .generate_ai_insights(&tenant_id, Utc::now())
        .await
        .map_err(|e| ApiError::from_analytics(e, "Insight generation failed"))?;

    Ok(Json(InsightsResponse {
        tenant_id,
        insights,
        generated_at: Utc::now(),
    }))
}
