//! API Error Handling
//!
//! Unified error types and conversion for API responses.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use strata_engine::EngineError;
use strata_ledger::LedgerError;

/// API error type
#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    /// The pipeline already has a run in progress.
    Conflict(String),
    DatabaseError(LedgerError),
    InternalError(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::DatabaseError(err) => {
                tracing::error!("Database error: {:?}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            ApiError::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::PipelineNotFound(name) => {
                ApiError::NotFound(format!("Pipeline {} not found", name))
            }
            LedgerError::StepRunNotFound(id) => {
                ApiError::NotFound(format!("Step run {} not found", id))
            }
            other => ApiError::DatabaseError(other),
        }
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::PipelineNotFound(name) => {
                ApiError::NotFound(format!("Pipeline {} not found", name))
            }
            EngineError::PipelineBusy(name) => {
                ApiError::Conflict(format!("Pipeline {} already has a run in progress", name))
            }
            EngineError::Validation(e) => ApiError::BadRequest(e.to_string()),
            EngineError::Ledger(e) => ApiError::from(e),
            other => ApiError::InternalError(other.to_string()),
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::ValidationError;

    #[test]
    fn test_busy_pipeline_maps_to_conflict() {
        let err = ApiError::from(EngineError::PipelineBusy("katarineko".to_string()));
        assert!(matches!(err, ApiError::Conflict(_)));
    }

    #[test]
    fn test_unknown_pipeline_maps_to_not_found() {
        let err = ApiError::from(EngineError::PipelineNotFound("katarineko".to_string()));
        assert!(matches!(err, ApiError::NotFound(_)));

        let err = ApiError::from(LedgerError::PipelineNotFound("katarineko".to_string()));
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[test]
    fn test_validation_maps_to_bad_request() {
        let err = ApiError::from(EngineError::Validation(ValidationError::EmptyName {
            kind: "step",
        }));
        assert!(matches!(err, ApiError::BadRequest(_)));
    }
}
