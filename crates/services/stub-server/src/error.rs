//! Error responses served by the stub

use axum::http::StatusCode;
pub use http_common::{ErrorResponse, IntoErrorResponse};

use crate::FixtureKey;

/// No fixture matches the request.
#[derive(Debug, thiserror::Error)]
#[error("no fixture registered for {key}")]
pub struct FixtureNotFound {
    pub key: FixtureKey,
}

impl IntoErrorResponse for FixtureNotFound {
    fn error_code(&self) -> &'static str {
        "FIXTURE_NOT_FOUND"
    }

    fn status_code(&self) -> StatusCode {
        StatusCode::NOT_FOUND
    }
}
