use std::{future::Future, net::SocketAddr, sync::Arc};

use axum::serve::{Listener as _, ListenerExt as _};
use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;

use crate::{MIGRATOR, config::Config, ctx::Ctx, github::GithubClient, handlers};

/// Create and initialize the customers service
///
/// Connects the database pool, applies pending migrations and binds the HTTP
/// listener. The server runs until `shutdown` resolves.
///
/// Returns the bound socket address and a future that runs the server with graceful shutdown.
pub async fn new(
    config: Arc<Config>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(SocketAddr, impl Future<Output = Result<(), std::io::Error>>), Error> {
    let pool = PgPoolOptions::new()
        .max_connections(config.pool_size)
        .connect(&config.database_url)
        .await
        .map_err(Error::DatabaseConnect)?;

    MIGRATOR.run(&pool).await.map_err(Error::Migrations)?;

    let github = GithubClient::new(config.github_api_url.clone()).map_err(Error::GithubClient)?;

    let ctx = Ctx { pool, github };
    let app = handlers::router(ctx);

    let at = config.listen_addr;
    let listener = TcpListener::bind(at)
        .await
        .map_err(|source| Error::TcpBind { addr: at, source })?
        .tap_io(|tcp_stream| {
            if let Err(err) = tcp_stream.set_nodelay(true) {
                tracing::debug!(error = %err, "failed to set TCP_NODELAY");
            }
        });
    let addr = listener.local_addr().map_err(Error::LocalAddr)?;

    tracing::info!(%addr, github = %config.github_api_url, "customers-api listening");

    let server = async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
    };
    Ok((addr, server))
}

/// Errors that can occur when creating the customers service
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Failed to connect to the database
    ///
    /// This occurs when:
    /// - The database URL is malformed
    /// - The database server is unreachable or rejects the credentials
    #[error("failed to connect to database: {0}")]
    DatabaseConnect(#[source] sqlx::Error),

    /// Failed to apply the schema migrations
    #[error("failed to run migrations: {0}")]
    Migrations(#[source] sqlx::migrate::MigrateError),

    /// Failed to build the GitHub HTTP client
    #[error("failed to build GitHub client: {0}")]
    GithubClient(#[source] crate::github::GithubError),

    /// Failed to bind TCP listener to the specified address
    #[error("failed to bind to {addr}: {source}")]
    TcpBind {
        addr: SocketAddr,
        source: std::io::Error,
    },

    /// Failed to get local address from TCP listener
    #[error("failed to get local address: {0}")]
    LocalAddr(#[source] std::io::Error),
}
