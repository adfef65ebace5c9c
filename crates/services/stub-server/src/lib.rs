//! In-process HTTP stub standing in for an external dependency.
//!
//! Tests register canned responses keyed by method and path, point the service
//! under test at [`StubServer::url`], and optionally inspect what the service sent
//! through [`StubServer::received_requests`]. Requests without a fixture get a
//! deterministic `404` with error code `FIXTURE_NOT_FOUND`.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use hermetic_config::StubConfig;
use tokio::{sync::oneshot, task::JoinHandle};

pub mod error;
mod fixtures;
pub mod service;

pub use self::{
    error::{ErrorResponse, FixtureNotFound, IntoErrorResponse},
    fixtures::{FixtureKey, Fixtures, REQUEST_LOG_CAPACITY, ReceivedRequest, StubResponse},
    service::BindError,
};

/// Upper bound on the wait for in-flight requests during [`StubServer::stop`].
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// A running stub server.
///
/// Fixtures may be registered at any time, including while requests are being
/// served. Dropping the server without [`stop`](Self::stop) aborts its task.
pub struct StubServer {
    addr: SocketAddr,
    fixtures: Arc<Fixtures>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<Result<(), std::io::Error>>>,
}

impl StubServer {
    /// Binds the stub and starts serving in a background task.
    pub async fn start(config: &StubConfig) -> Result<Self, BindError> {
        let fixtures = Arc::new(Fixtures::default());
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let shutdown = async move {
            let _ = shutdown_rx.await;
        };

        let (addr, server) = service::new(
            config.bind_addr,
            config.bind_attempts,
            fixtures.clone(),
            shutdown,
        )
        .await?;
        let task = tokio::spawn(server);

        tracing::info!(addr = %addr, "stub server listening");

        Ok(Self {
            addr,
            fixtures,
            shutdown_tx: Some(shutdown_tx),
            task: Some(task),
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Base URL, e.g. `http://127.0.0.1:41234`.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Inserts or overwrites a fixture. Takes effect for the next matching request.
    pub fn register_fixture(&self, key: FixtureKey, response: StubResponse) {
        self.fixtures.insert(key, response);
    }

    pub fn register_many(&self, fixtures: impl IntoIterator<Item = (FixtureKey, StubResponse)>) {
        for (key, response) in fixtures {
            self.fixtures.insert(key, response);
        }
    }

    pub fn remove_fixture(&self, key: &FixtureKey) -> Option<StubResponse> {
        self.fixtures.remove(key)
    }

    /// Drops every fixture and the request log.
    pub fn clear_fixtures(&self) {
        self.fixtures.clear();
    }

    pub fn received_requests(&self) -> Vec<ReceivedRequest> {
        self.fixtures.received()
    }

    pub fn fixtures(&self) -> &Arc<Fixtures> {
        &self.fixtures
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Shuts the server down and clears all fixtures.
    ///
    /// In-flight requests get [`SHUTDOWN_TIMEOUT`] to finish before the task is
    /// aborted. When this returns the listen port is closed. Calling `stop` again
    /// does nothing.
    pub async fn stop(&mut self) -> Result<(), StopError> {
        let Some(mut task) = self.task.take() else {
            return Ok(());
        };
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        let result = match tokio::time::timeout(SHUTDOWN_TIMEOUT, &mut task).await {
            Ok(Ok(Ok(()))) => Ok(()),
            Ok(Ok(Err(err))) => Err(StopError::Serve(err)),
            Ok(Err(err)) => Err(StopError::Task(err)),
            Err(_) => {
                tracing::warn!(addr = %self.addr, "stub server did not stop in time, aborting");
                task.abort();
                let _ = task.await;
                Err(StopError::Timeout {
                    timeout: SHUTDOWN_TIMEOUT,
                })
            }
        };

        self.fixtures.clear();
        tracing::info!(addr = %self.addr, "stub server stopped");
        result
    }
}

impl Drop for StubServer {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Errors reported by [`StubServer::stop`]. The server is stopped in every case.
#[derive(Debug, thiserror::Error)]
pub enum StopError {
    /// The server loop failed while serving.
    #[error("stub server failed")]
    Serve(#[source] std::io::Error),

    /// The server task panicked or was cancelled.
    #[error("stub server task failed")]
    Task(#[source] tokio::task::JoinError),

    /// In-flight requests did not finish in time; the task was aborted.
    #[error("stub server did not shut down within {timeout:?}")]
    Timeout { timeout: Duration },
}
