use std::{path::PathBuf, sync::Arc};

use customers_api::{config::Config, service};
use monitoring::logging;

#[derive(Debug, clap::Parser)]
#[command(version)]
struct Args {
    /// Optional TOML configuration file. `CUSTOMERS_*` environment variables
    /// override its values.
    #[arg(long, env = "CUSTOMERS_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    if let Err(err) = main_inner().await {
        // Manually print the error so we can control the format.
        let err = error_with_causes(&err);
        eprintln!("Exiting with error: {err}");
        std::process::exit(1);
    }
}

async fn main_inner() -> Result<(), Error> {
    logging::init();

    let Args { config } = clap::Parser::parse();
    let config = Config::load(config.as_deref()).map_err(Error::Config)?;

    let (addr, server) = service::new(Arc::new(config), shutdown_signal())
        .await
        .map_err(Error::Service)?;
    tracing::info!(%addr, "serving");

    server.await.map_err(Error::Serve)
}

async fn shutdown_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    let (mut sigint, mut sigterm) = match (
        signal(SignalKind::interrupt()),
        signal(SignalKind::terminate()),
    ) {
        (Ok(sigint), Ok(sigterm)) => (sigint, sigterm),
        (Err(err), _) | (_, Err(err)) => {
            tracing::error!(error = %err, "failed to install signal handlers");
            return std::future::pending().await;
        }
    };
    tokio::select! {
        _ = sigint.recv() => tracing::info!(signal = "SIGINT", "shutdown signal"),
        _ = sigterm.recv() => tracing::info!(signal = "SIGTERM", "shutdown signal"),
    }
}

/// Errors that abort the process
#[derive(Debug, thiserror::Error)]
enum Error {
    #[error("failed to load config")]
    Config(#[source] customers_api::config::LoadError),

    #[error("failed to start customers-api")]
    Service(#[source] service::Error),

    #[error("server error")]
    Serve(#[source] std::io::Error),
}

fn error_with_causes(err: &dyn std::error::Error) -> String {
    let mut error_chain = Vec::new();
    let mut current = err;
    while let Some(source) = current.source() {
        error_chain.push(source.to_string());
        current = source;
    }

    if error_chain.is_empty() {
        err.to_string()
    } else {
        format!("{} | Caused by: {}", err, error_chain.join(" -> "))
    }
}
