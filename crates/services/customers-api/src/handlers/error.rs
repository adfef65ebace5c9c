//! Error handling types for HTTP handlers

pub use http_common::{ErrorResponse, IntoErrorResponse};
