use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::analytics::AnalyticsError;
use crate::forecast::DemandError;
use crate::optimizer::PricingError;

/// API error types that can be returned from handlers
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// Failure whose detail stays in the logs. `message` is what the client sees.
    #[error("{message}: {source:#}")]
    Internal {
        message: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

/// Error response that gets serialized to JSON
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
}

impl ApiError {
    /// Wrap an underlying failure behind a fixed client-facing message
    pub fn internal(message: &'static str) -> impl FnOnce(anyhow::Error) -> ApiError {
        move |source| ApiError::Internal { message, source }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) | ApiError::ValidationError(_) => StatusCode::BAD_REQUEST,
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_type(&self) -> &'static str {
        match self {
            ApiError::NotFound(_) => "NotFound",
            ApiError::BadRequest(_) => "BadRequest",
            ApiError::ValidationError(_) => "ValidationError",
            ApiError::ServiceUnavailable(_) => "ServiceUnavailable",
            ApiError::Internal { .. } => "InternalServerError",
        }
    }

    /// Map a demand failure: no history is 404, a bad window is 400.
    pub fn from_demand(error: DemandError) -> Self {
        match error {
            DemandError::EmptyHistory => ApiError::NotFound("No historical data found".to_string()),
            DemandError::InvalidWindow(msg) => ApiError::BadRequest(msg),
            other => ApiError::internal("Prediction failed")(other.into()),
        }
    }

    pub fn from_pricing(error: PricingError) -> Self {
        match error {
            PricingError::InvalidInput(msg) => ApiError::BadRequest(msg),
            other => ApiError::internal("Optimization failed")(other.into()),
        }
    }

    pub fn from_analytics(error: AnalyticsError, message: &'static str) -> Self {
        match error {
            AnalyticsError::UnknownMetricType(_) | AnalyticsError::InvalidPeriod(_) => {
                ApiError::BadRequest(error.to_string())
            }
            AnalyticsError::Data(source) => ApiError::Internal { message, source },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_type = self.error_type();

        let message = match &self {
            ApiError::Internal { message, source } => {
                tracing::error!(error = %format!("{source:#}"), "{message}");
                message.to_string()
            }
            ApiError::ServiceUnavailable(_) => {
                tracing::warn!(error = %self, "Service unavailable");
                self.to_string()
            }
            _ => {
                tracing::debug!(error = %self, "Client error");
                self.to_string()
            }
        };

        let error_response = ErrorResponse {
            error: error_type.to_string(),
            message,
        };

        (status, Json(error_response)).into_response()
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        ApiError::ValidationError(errors.to_string())
    }
}
