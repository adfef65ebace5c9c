//! Customer note handlers

use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection, rejection::PathRejection},
    http::StatusCode,
};
use monitoring::logging;

use crate::{
    ctx::Ctx,
    db::{self, Note},
    handlers::error::{ErrorResponse, IntoErrorResponse},
};

#[derive(Debug, serde::Deserialize)]
pub struct CreateNote {
    pub body: String,
}

/// Handler for the `POST /customers/{id}/notes` endpoint
///
/// ## Response
/// - **201 Created**: the stored note
/// - **404 Not Found**: no customer with this id
#[tracing::instrument(skip_all, err)]
pub async fn create(
    State(ctx): State<Ctx>,
    id: Result<Path<i64>, PathRejection>,
    body: Result<Json<CreateNote>, JsonRejection>,
) -> Result<(StatusCode, Json<Note>), ErrorResponse> {
    let Path(id) = id.map_err(|err| Error::InvalidId { err })?;
    let Json(request) = body.map_err(|err| Error::InvalidRequestBody { err })?;

    match db::insert_note(&ctx.pool, id, &request.body).await {
        Ok(Some(note)) => Ok((StatusCode::CREATED, Json(note))),
        Ok(None) => Err(Error::CustomerNotFound { id }.into()),
        Err(err) => {
            tracing::error!(id, error = %err, error_source = logging::error_source(&err), "failed to insert note");
            Err(Error::Database(err).into())
        }
    }
}

/// Handler for the `GET /customers/{id}/notes` endpoint
///
/// Returns the notes oldest first. An unknown customer yields `404`.
#[tracing::instrument(skip_all, err)]
pub async fn list(
    State(ctx): State<Ctx>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Json<Vec<Note>>, ErrorResponse> {
    let Path(id) = id.map_err(|err| Error::InvalidId { err })?;

    let customer = db::get_customer(&ctx.pool, id)
        .await
        .map_err(Error::Database)?;
    if customer.is_none() {
        return Err(Error::CustomerNotFound { id }.into());
    }

    let notes = db::list_notes(&ctx.pool, id)
        .await
        .map_err(Error::Database)?;
    Ok(Json(notes))
}

/// Errors that can occur in the note handlers
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The JSON request body is malformed or missing `body`
    #[error("invalid request body: {err}")]
    InvalidRequestBody { err: JsonRejection },

    /// The path id is not an integer
    #[error("invalid customer id: {err}")]
    InvalidId { err: PathRejection },

    /// No customer with this id
    #[error("customer {id} not found")]
    CustomerNotFound { id: i64 },

    /// The database query failed
    #[error("database error: {0}")]
    Database(#[source] sqlx::Error),
}

impl IntoErrorResponse for Error {
    fn error_code(&self) -> &'static str {
        match self {
            Error::InvalidRequestBody { .. } => "INVALID_REQUEST_BODY",
            Error::InvalidId { .. } => "INVALID_CUSTOMER_ID",
            Error::CustomerNotFound { .. } => "CUSTOMER_NOT_FOUND",
            Error::Database(_) => "DATABASE_ERROR",
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            Error::InvalidRequestBody { .. } | Error::InvalidId { .. } => StatusCode::BAD_REQUEST,
            Error::CustomerNotFound { .. } => StatusCode::NOT_FOUND,
            Error::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
