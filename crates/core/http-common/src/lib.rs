//! Error handling types shared by the HTTP services

use axum::{Json, http::StatusCode};

/// Standard error response returned by the services and the stub
///
/// ```json
/// {
///   "error_code": "CUSTOMER_NOT_FOUND",
///   "error_message": "customer 7 not found"
/// }
/// ```
///
/// ## Error Code Conventions
/// - Error codes use SCREAMING_SNAKE_CASE (e.g., `FIXTURE_NOT_FOUND`)
/// - Codes are stable and can be relied upon programmatically
/// - Messages may change and should only be used for display/logging
#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct ErrorResponse {
    /// Not serialized to JSON, used internally for response construction
    #[serde(skip)]
    pub status_code: StatusCode,

    /// Machine-readable error code in SCREAMING_SNAKE_CASE format
    pub error_code: String,

    /// Human-readable error message
    pub error_message: String,
}

/// Trait for error types that can be converted to HTTP error responses
pub trait IntoErrorResponse: std::fmt::Display + Send + Sync + 'static {
    /// Returns a stable, machine-readable error code
    fn error_code(&self) -> &'static str;

    /// Returns the HTTP status code for this error
    fn status_code(&self) -> StatusCode;
}

impl<E> From<E> for ErrorResponse
where
    E: IntoErrorResponse,
{
    fn from(error: E) -> Self {
        ErrorResponse {
            status_code: error.status_code(),
            error_code: error.error_code().to_string(),
            error_message: error.to_string(),
        }
    }
}

impl std::fmt::Display for ErrorResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.error_message.fmt(f)
    }
}

impl axum::response::IntoResponse for ErrorResponse {
    fn into_response(self) -> axum::response::Response {
        (self.status_code, Json(self)).into_response()
    }
}
