//! Customer handlers

use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection, rejection::PathRejection},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use monitoring::logging;

use crate::{
    ctx::Ctx,
    db::{self, Customer},
    github::GithubError,
    handlers::error::{ErrorResponse, IntoErrorResponse},
};

#[derive(Debug, serde::Deserialize)]
pub struct CreateCustomer {
    /// GitHub login of the customer
    pub login: String,
}

/// Handler for the `POST /customers` endpoint
///
/// Validates the login against GitHub, then stores the customer.
///
/// ## Response
/// - **201 Created**: body is the stored customer, `Location` points at it
/// - **400 Bad Request**: malformed body
/// - **409 Conflict**: a customer with this login exists
/// - **422 Unprocessable Entity**: GitHub does not know the login
/// - **502 Bad Gateway**: GitHub could not be reached or answered unexpectedly
#[tracing::instrument(skip_all, err)]
pub async fn create(
    State(ctx): State<Ctx>,
    body: Result<Json<CreateCustomer>, JsonRejection>,
) -> Result<Response, ErrorResponse> {
    let request = match body {
        Ok(Json(request)) => request,
        Err(err) => {
            tracing::debug!(error = %err, "invalid JSON in request body");
            return Err(Error::InvalidRequestBody { err }.into());
        }
    };
    let login = request.login.trim();
    if login.is_empty() {
        return Err(Error::EmptyLogin.into());
    }

    let user = ctx.github.user(login).await.map_err(|err| {
        tracing::warn!(
            %login,
            error = %err, error_source = logging::error_source(&err),
            "GitHub lookup failed"
        );
        Error::Github(err)
    })?;
    let Some(user) = user else {
        return Err(Error::UnknownGithubUser {
            login: login.to_string(),
        }
        .into());
    };

    let customer = db::insert_customer(&ctx.pool, &user.login, user.id, user.name.as_deref())
        .await
        .map_err(|err| {
            if db::is_unique_violation(&err) {
                return Error::AlreadyExists {
                    login: user.login.clone(),
                };
            }
            tracing::error!(error = %err, error_source = logging::error_source(&err), "failed to insert customer");
            Error::Database(err)
        })?;

    tracing::info!(id = customer.id, login = %customer.login, "customer created");

    let location = HeaderValue::try_from(format!("/customers/{}", customer.id))
        .map_err(|_| Error::Location)?;
    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, location)],
        Json(customer),
    )
        .into_response())
}

/// Handler for the `GET /customers/{id}` endpoint
///
/// ## Response
/// - **200 OK**: the customer
/// - **400 Bad Request**: `id` is not an integer
/// - **404 Not Found**: no customer with this id
#[tracing::instrument(skip_all, err)]
pub async fn get(
    State(ctx): State<Ctx>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Json<Customer>, ErrorResponse> {
    let Path(id) = id.map_err(|err| Error::InvalidId { err })?;

    match db::get_customer(&ctx.pool, id).await {
        Ok(Some(customer)) => Ok(Json(customer)),
        Ok(None) => Err(Error::NotFound { id }.into()),
        Err(err) => {
            tracing::error!(id, error = %err, error_source = logging::error_source(&err), "failed to load customer");
            Err(Error::Database(err).into())
        }
    }
}

/// Errors that can occur in the customer handlers
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The JSON request body is malformed or missing `login`
    #[error("invalid request body: {err}")]
    InvalidRequestBody { err: JsonRejection },

    /// The login is empty after trimming
    #[error("login must not be empty")]
    EmptyLogin,

    /// The path id is not an integer
    #[error("invalid customer id: {err}")]
    InvalidId { err: PathRejection },

    /// GitHub has no user with this login
    #[error("GitHub user '{login}' does not exist")]
    UnknownGithubUser { login: String },

    /// A customer with this login is already stored
    #[error("customer '{login}' already exists")]
    AlreadyExists { login: String },

    /// No customer with this id
    #[error("customer {id} not found")]
    NotFound { id: i64 },

    /// GitHub could not be queried
    #[error("GitHub lookup failed: {0}")]
    Github(#[source] GithubError),

    /// The database query failed
    #[error("database error: {0}")]
    Database(#[source] sqlx::Error),

    /// The `Location` header could not be built
    #[error("failed to build Location header")]
    Location,
}

impl IntoErrorResponse for Error {
    fn error_code(&self) -> &'static str {
        match self {
            Error::InvalidRequestBody { .. } => "INVALID_REQUEST_BODY",
            Error::EmptyLogin => "INVALID_LOGIN",
            Error::InvalidId { .. } => "INVALID_CUSTOMER_ID",
            Error::UnknownGithubUser { .. } => "UNKNOWN_GITHUB_USER",
            Error::AlreadyExists { .. } => "CUSTOMER_ALREADY_EXISTS",
            Error::NotFound { .. } => "CUSTOMER_NOT_FOUND",
            Error::Github(_) => "GITHUB_UNAVAILABLE",
            Error::Database(_) => "DATABASE_ERROR",
            Error::Location => "INTERNAL_ERROR",
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            Error::InvalidRequestBody { .. } | Error::EmptyLogin | Error::InvalidId { .. } => {
                StatusCode::BAD_REQUEST
            }
            Error::UnknownGithubUser { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Error::AlreadyExists { .. } => StatusCode::CONFLICT,
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::Github(_) => StatusCode::BAD_GATEWAY,
            Error::Database(_) | Error::Location => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
