//! # API Error Type
//!
//! Unified error type for admin API handlers.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Flow in the Admin API                          │
//! │                                                                         │
//! │  Handler ── Result<Json<T>, ApiError>                                   │
//! │     │                                                                   │
//! │     ├── SyncError::EntityNotFound ─────► 404 NOT_FOUND                  │
//! │     ├── SyncError::Validation ─────────► 400 VALIDATION_ERROR           │
//! │     ├── SyncError::EntityNotSyncable ──► 422 BUSINESS_LOGIC             │
//! │     ├── SyncError::TallyUnreachable ───► 502 TALLY_ERROR                │
//! │     └── SyncError::DatabaseError ──────► 500 DATABASE_ERROR             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Tally being offline during a manual push is not an error and never reaches
//! this type; the handler answers 202 with `queued` instead.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::error;

use ironmart_core::CoreError;
use ironmart_sync::SyncError;

/// API error returned from admin handlers.
///
/// ## Serialization
/// ```json
/// {
///   "code": "NOT_FOUND",
///   "message": "order 5f0c... not found"
/// }
/// ```
#[derive(Debug, Clone, Serialize, thiserror::Error)]
#[serde(rename_all = "camelCase")]
#[error("{message}")]
pub struct ApiError {
    /// Machine-readable error code for the admin UI
    pub code: ErrorCode,

    /// Human-readable error message for display
    pub message: String,
}

/// Error codes for API responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Entity or job not found (404)
    NotFound,

    /// Input validation failed (400)
    ValidationError,

    /// Entity cannot be pushed to Tally (422)
    BusinessLogic,

    /// Tally answered badly or not at all (502)
    TallyError,

    /// Database operation failed (500)
    DatabaseError,

    /// Internal server error (500)
    Internal,
}

impl ErrorCode {
    pub fn status(&self) -> StatusCode {
        match self {
            ErrorCode::NotFound => StatusCode::NOT_FOUND,
            ErrorCode::ValidationError => StatusCode::BAD_REQUEST,
            ErrorCode::BusinessLogic => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorCode::TallyError => StatusCode::BAD_GATEWAY,
            ErrorCode::DatabaseError | ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        ApiError {
            code,
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        ApiError::new(ErrorCode::ValidationError, message)
    }
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<SyncError> for ApiError {
    fn from(err: SyncError) -> Self {
        let code = match &err {
            SyncError::EntityNotFound { .. } | SyncError::UnknownJob(_) => ErrorCode::NotFound,
            SyncError::Core(CoreError::UnknownJob(_)) => ErrorCode::NotFound,
            SyncError::Core(_)
            | SyncError::Validation(_)
            | SyncError::InvalidConfig(_)
            | SyncError::InvalidUrl(_) => ErrorCode::ValidationError,
            SyncError::EntityNotSyncable { .. } => ErrorCode::BusinessLogic,
            SyncError::TallyUnreachable(_)
            | SyncError::Timeout(_)
            | SyncError::TallyHttpStatus { .. }
            | SyncError::MalformedResponse(_)
            | SyncError::VoucherRejected { .. } => ErrorCode::TallyError,
            SyncError::DatabaseError(_) => ErrorCode::DatabaseError,
            SyncError::ConfigLoadFailed(_)
            | SyncError::ConfigSaveFailed(_)
            | SyncError::Internal(_) => ErrorCode::Internal,
        };
        ApiError::new(code, err.to_string())
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        ApiError::from(SyncError::Core(err))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.code.status();
        if status.is_server_error() {
            error!(code = ?self.code, message = %self.message, "Admin request failed");
        }
        (status, Json(self)).into_response()
    }
}

/// Result type for admin handlers.
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_errors_map_to_codes() {
        let cases = [
            (SyncError::not_found("order", "o-1"), ErrorCode::NotFound),
            (SyncError::UnknownJob("nightly".into()), ErrorCode::NotFound),
            (
                SyncError::Core(CoreError::UnknownEntityType("invoice".into())),
                ErrorCode::ValidationError,
            ),
            (
                SyncError::TallyUnreachable("connection refused".into()),
                ErrorCode::TallyError,
            ),
            (SyncError::DatabaseError("locked".into()), ErrorCode::DatabaseError),
        ];
        for (err, code) in cases {
            assert_eq!(ApiError::from(err).code, code);
        }
    }

    #[test]
    fn test_error_serializes_screaming_code() {
        let json = serde_json::to_value(ApiError::validation("limit must be between 1 and 500"))
            .unwrap();
        assert_eq!(json["code"], "VALIDATION_ERROR");
        assert_eq!(json["message"], "limit must be between 1 and 500");
    }
}
