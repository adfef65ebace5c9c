use axum::{
    Router,
    http::StatusCode,
    routing::{get, post},
};

use crate::ctx::Ctx;

pub mod customers;
pub mod error;
pub mod notes;

pub fn router(ctx: Ctx) -> Router {
    Router::new()
        .route("/healthz", get(|| async { StatusCode::OK }))
        .route("/customers", post(customers::create))
        .route("/customers/{id}", get(customers::get))
        .route("/customers/{id}/notes", post(notes::create).get(notes::list))
        .with_state(ctx)
}
