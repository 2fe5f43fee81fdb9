use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use utoipa::ToSchema;

/// Standard error response body.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    /// Machine-readable error code ("VALIDATION_ERROR", "NOT_FOUND", "INTERNAL")
    pub code: String,
    /// Human-readable error message
    pub error: String,
}

/// API-surface errors. The ingest pipeline itself never propagates these to
/// the caller (sink failures become run-record flags); they exist for the
/// read endpoints and the trigger's body validation.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Missing or malformed request input: absent area_id, days out of
    /// range, an unparseable trigger payload.
    #[error("{0}")]
    ValidationError(String),

    /// Unknown area, or no serving document written yet.
    #[error("{0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),
}

impl AppError {
    fn code(&self) -> &'static str {
        match self {
            AppError::ValidationError(_) => "VALIDATION_ERROR",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::InternalError(_) | AppError::DatabaseError(_) => "INTERNAL",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let code = self.code();
        let (status, message) = match &self {
            AppError::ValidationError(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::InternalError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
            AppError::DatabaseError(err) => {
                tracing::error!("Database error: {:?}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal database error".to_string(),
                )
            }
        };

        (
            status,
            axum::Json(ErrorResponse {
                code: code.to_string(),
                error: message,
            }),
        )
            .into_response()
    }
}
