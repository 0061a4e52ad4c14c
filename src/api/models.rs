use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{
    api::error::ApiError,
    controller::{AppState, ModelAccuracies},
};

#[derive(Debug, Serialize)]
pub struct RetrainResponse {
    retrain_completed: bool,
    model_accuracies: ModelAccuracies,
    retrained_at: DateTime<Utc>,
}

/// GET|POST /models/retrain
pub async fn retrain_models(State(state): State<AppState>) -> Result<Json<RetrainResponse>, ApiError> {
    tracing::info!("Retraining all models");

    let model_accuracies = state
        .retrain_all()
        .await
        .map_err(ApiError::internal("Model retraining failed"))?;

    Ok(Json(RetrainResponse {
        retrain_completed: true,
        model_accuracies,
        retrained_at: Utc::now(),
    }))
}
