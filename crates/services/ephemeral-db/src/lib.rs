//! Ephemeral PostgreSQL containers.
//!
//! [`EphemeralDb`] provisions a fresh PostgreSQL server inside a Docker container,
//! publishes it on a free loopback port, and waits until it accepts connections.
//! The container is removed on [`stop`](EphemeralDb::stop), and as a last resort
//! when the controller is dropped.
//!
//! # Docker
//!
//! Containers are driven through the `docker` CLI, discovered via the [`which`]
//! crate or supplied with [`ContainerSpec::docker_bin`]. Every container carries
//! the `hermetic.instance=<uuid>` label so leftovers can be found with
//! `docker ps -a --filter label=hermetic.instance`.
//!
//! Each `docker` invocation is bounded by [`ContainerSpec::command_timeout`] and the
//! wait for connections by [`ContainerSpec::readiness_timeout`], so `start` never
//! blocks indefinitely.

use std::{net::TcpListener, time::Duration};

use backon::{ExponentialBuilder, Retryable};
use sqlx::{Connection as _, PgConnection};

mod connection;
mod docker;
mod spec;

pub use self::{
    connection::ConnectionInfo,
    docker::{DockerCli, DockerError, INSTANCE_LABEL},
    spec::{ContainerSpec, Credentials},
};

/// Port PostgreSQL listens on inside the container.
const CONTAINER_PORT: u16 = 5432;

/// Number of container log lines attached to a readiness failure.
const LOG_TAIL_LINES: usize = 50;

/// Lifecycle of an [`EphemeralDb`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceState {
    /// A start is in progress, or was cancelled before it finished.
    Starting,
    /// Accepting connections.
    Ready,
    /// Not started yet, or the container was removed.
    Stopped,
    /// The last start attempt failed; any container it created was removed.
    Failed,
}

/// Controller for one disposable database container.
pub struct EphemeralDb {
    spec: ContainerSpec,
    instance_id: String,
    state: InstanceState,
    container: Option<Container>,
    connection: Option<ConnectionInfo>,
}

impl EphemeralDb {
    pub fn new(spec: ContainerSpec) -> Self {
        Self {
            spec,
            instance_id: uuid::Uuid::new_v4().simple().to_string(),
            state: InstanceState::Stopped,
            container: None,
            connection: None,
        }
    }

    /// Launches the container and waits until the database accepts connections.
    ///
    /// A port conflict reported by Docker is retried once on a fresh port, unless
    /// the [`ContainerSpec`] pins the host port. Every other failure is returned as
    /// is. Whatever fails, no container created by this call is left running,
    /// including when the returned future is dropped early.
    pub async fn start(&mut self) -> Result<ConnectionInfo, Error> {
        if self.state == InstanceState::Ready {
            return Err(Error::AlreadyStarted {
                instance: self.instance_id.clone(),
            });
        }
        self.state = InstanceState::Starting;

        match self.provision().await {
            Ok((container, info)) => {
                self.container = Some(container);
                self.connection = Some(info.clone());
                self.state = InstanceState::Ready;
                Ok(info)
            }
            Err(err) => {
                self.state = InstanceState::Failed;
                Err(err)
            }
        }
    }

    /// Removes the container.
    ///
    /// Stopping an instance that was never started, or is already stopped, does
    /// nothing.
    pub async fn stop(&mut self) -> Result<(), Error> {
        self.connection = None;
        let Some(container) = self.container.take() else {
            self.state = InstanceState::Stopped;
            return Ok(());
        };

        let name = container.name.clone();
        let result = container.remove().await;
        self.state = InstanceState::Stopped;
        result.map_err(|source| Error::StopFailed {
            container: name,
            source,
        })
    }

    pub fn state(&self) -> InstanceState {
        self.state
    }

    /// Connection details while [`Ready`](InstanceState::Ready).
    pub fn connection_info(&self) -> Option<&ConnectionInfo> {
        self.connection.as_ref()
    }

    /// Name of the running container, if any.
    pub fn container_name(&self) -> Option<&str> {
        self.container.as_ref().map(|c| c.name.as_str())
    }

    /// Value of the [`INSTANCE_LABEL`] on every container this controller creates.
    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    pub fn spec(&self) -> &ContainerSpec {
        &self.spec
    }

    fn docker(&self) -> Result<DockerCli, Error> {
        match &self.spec.docker_bin {
            Some(bin) => DockerCli::at(bin),
            None => DockerCli::from_path(),
        }
        .map(|docker| docker.with_timeout(self.spec.command_timeout))
        .map_err(|source| Error::DockerNotFound { source })
    }

    async fn provision(&self) -> Result<(Container, ConnectionInfo), Error> {
        let docker = self.docker()?;
        let name = format!("hermetic-pg-{}", uuid::Uuid::new_v4().simple());

        tracing::info!(
            image = %self.spec.image,
            container = %name,
            instance = %self.instance_id,
            "starting ephemeral database"
        );

        let (container, port) = (|| self.launch(&docker, &name))
            .retry(
                ExponentialBuilder::default()
                    .with_min_delay(Duration::from_millis(200))
                    .with_max_times(1),
            )
            .sleep(tokio::time::sleep)
            // A pinned port would conflict again
            .when(|err| self.spec.host_port.is_none() && err.is_port_conflict())
            .notify(|err, dur| {
                tracing::warn!(
                    container = %name,
                    error = %err,
                    "host port taken, retrying on a new port in {:.1}s",
                    dur.as_secs_f32()
                );
            })
            .await?;

        let info = ConnectionInfo {
            host: "127.0.0.1".to_string(),
            port,
            database: self.spec.database.clone(),
            user: self.spec.credentials.user.clone(),
            password: self.spec.credentials.password.clone(),
        };

        if let Err(last_error) = wait_for_ready(&info, self.spec.readiness_timeout).await {
            let container_logs = docker
                .logs(&name, LOG_TAIL_LINES)
                .await
                .unwrap_or_else(|err| format!("<logs unavailable: {err}>"));
            if let Err(err) = container.remove().await {
                tracing::warn!(container = %name, error = %err, "failed to remove unready container");
            }
            return Err(Error::ProvisionTimeout {
                image: self.spec.image.clone(),
                timeout: self.spec.readiness_timeout,
                last_error,
                container_logs,
            });
        }

        tracing::info!(container = %name, port, "ephemeral database ready");
        Ok((container, info))
    }

    /// One `docker run` attempt. A half-created container is removed before returning.
    async fn launch(&self, docker: &DockerCli, name: &str) -> Result<(Container, u16), Error> {
        let port = match self.spec.host_port {
            Some(port) => port,
            None => allocate_free_port().map_err(|source| Error::PortAllocation { source })?,
        };

        let mut args = vec![
            "run".to_string(),
            "-d".to_string(),
            "--name".to_string(),
            name.to_string(),
            "--label".to_string(),
            format!("{INSTANCE_LABEL}={}", self.instance_id),
            "-p".to_string(),
            format!("127.0.0.1:{port}:{CONTAINER_PORT}"),
            "-e".to_string(),
            format!("POSTGRES_DB={}", self.spec.database),
            "-e".to_string(),
            format!("POSTGRES_USER={}", self.spec.credentials.user),
            "-e".to_string(),
            format!("POSTGRES_PASSWORD={}", self.spec.credentials.password.as_str()),
        ];
        for (key, value) in &self.spec.env {
            args.push("-e".to_string());
            args.push(format!("{key}={value}"));
        }
        args.push(self.spec.image.clone());

        // Armed before `docker run` so a cancelled start still cleans up
        let container = Container::new(docker.clone(), name.to_string(), self.spec.keep);

        match docker.exec(&args).await {
            Ok(id) => {
                tracing::debug!(container = %name, id = %id, port, "container launched");
                Ok((container, port))
            }
            Err(err) => {
                if let Err(rm_err) = container.remove_unkept().await {
                    tracing::warn!(container = %name, error = %rm_err, "failed to remove half-created container");
                }
                Err(match err {
                    DockerError::Spawn { source } => Error::LaunchFailed { source },
                    DockerError::Timeout { command, timeout } => {
                        Error::CommandTimeout { command, timeout }
                    }
                    err if err.is_port_conflict() => Error::PortAlreadyBound {
                        port,
                        source: err,
                    },
                    err => Error::RunFailed {
                        image: self.spec.image.clone(),
                        source: err,
                    },
                })
            }
        }
    }
}

impl Drop for EphemeralDb {
    fn drop(&mut self) {
        if let Some(container) = &self.container {
            tracing::debug!(container = %container.name, "ephemeral database dropped without stop");
        }
    }
}

/// Polls the database until a `SELECT 1` succeeds or `timeout` elapses.
///
/// On timeout returns the last connection error seen, if any.
async fn wait_for_ready(info: &ConnectionInfo, timeout: Duration) -> Result<(), Option<String>> {
    let url = info.url();
    let start = std::time::Instant::now();
    let mut last_error = None;

    let check = (|| async {
        let mut conn = PgConnection::connect(&url).await?;
        sqlx::query("SELECT 1").execute(&mut conn).await?;
        conn.close().await
    })
    .retry(
        ExponentialBuilder::default()
            .with_min_delay(Duration::from_millis(100))
            .with_max_delay(Duration::from_secs(1))
            .without_max_times(),
    )
    .sleep(tokio::time::sleep)
    .notify(|err: &sqlx::Error, dur| {
        tracing::trace!(error = %err, retry_after_ms = dur.as_millis() as u64, "database not ready");
        last_error = Some(err.to_string());
    });

    let result = tokio::time::timeout(timeout, check).await;
    match result {
        Ok(Ok(())) => {
            tracing::debug!(
                elapsed_ms = start.elapsed().as_millis() as u64,
                "database is accepting connections"
            );
            Ok(())
        }
        Ok(Err(err)) => Err(Some(err.to_string())),
        Err(_elapsed) => Err(last_error),
    }
}

/// Allocate a free port by binding to port 0 and closing the listener.
///
/// Another process may grab the port before Docker binds it; that case surfaces as
/// a port conflict and is retried.
fn allocate_free_port() -> std::io::Result<u16> {
    let listener = TcpListener::bind("127.0.0.1:0")?;
    let port = listener.local_addr()?.port();
    drop(listener);
    Ok(port)
}

/// Removal guard for a launched container.
///
/// Dropping the guard without calling [`remove`](Container::remove) removes the
/// container with a blocking `docker rm`, unless it is meant to be kept.
struct Container {
    docker: DockerCli,
    name: String,
    keep: bool,
    removed: bool,
}

impl Container {
    fn new(docker: DockerCli, name: String, keep: bool) -> Self {
        Self {
            docker,
            name,
            keep,
            removed: false,
        }
    }

    /// Removes the container unless it is meant to be kept.
    async fn remove(mut self) -> Result<(), DockerError> {
        self.removed = true;
        if self.keep {
            tracing::info!(container = %self.name, "keeping database container");
            return Ok(());
        }
        self.docker.remove(&self.name).await?;
        tracing::debug!(container = %self.name, "database container removed");
        Ok(())
    }

    /// Removes the container even when it is meant to be kept.
    ///
    /// Used for containers that never started; there is nothing in them to inspect.
    async fn remove_unkept(mut self) -> Result<(), DockerError> {
        self.keep = false;
        self.remove().await
    }
}

impl Drop for Container {
    fn drop(&mut self) {
        if self.removed || self.keep {
            return;
        }
        tracing::debug!(container = %self.name, "removing database container on drop");
        if let Err(err) = self.docker.remove_blocking(&self.name) {
            tracing::warn!(container = %self.name, error = %err, "failed to remove database container");
        }
    }
}

/// Errors that can occur while managing an ephemeral database.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The `docker` executable could not be found.
    ///
    /// Install Docker, put it on `PATH`, or point `database.docker_bin` at it.
    #[error("docker executable not found")]
    DockerNotFound {
        #[source]
        source: which::Error,
    },

    /// `start` was called while the instance is ready.
    #[error("ephemeral database {instance} is already started")]
    AlreadyStarted { instance: String },

    /// No free loopback port could be reserved.
    #[error("failed to allocate a host port")]
    PortAllocation {
        #[source]
        source: std::io::Error,
    },

    /// Docker could not publish the chosen host port, even after a retry.
    #[error("host port {port} is already in use")]
    PortAlreadyBound {
        port: u16,
        #[source]
        source: DockerError,
    },

    /// The `docker` process could not be spawned.
    #[error("failed to launch docker")]
    LaunchFailed {
        #[source]
        source: std::io::Error,
    },

    /// `docker run` failed, e.g. because the image cannot be pulled.
    #[error("failed to start a container from image {image}")]
    RunFailed {
        image: String,
        #[source]
        source: DockerError,
    },

    /// A `docker` command, e.g. `run` stuck pulling the image, did not finish within
    /// the command timeout. It was killed and any container it created was removed.
    #[error("docker {command} did not finish within {timeout:?}")]
    CommandTimeout { command: String, timeout: Duration },

    /// The database did not accept connections within the readiness timeout.
    ///
    /// The container was removed. `container_logs` holds its last log lines.
    #[error(
        "database from image {image} not ready within {timeout:?} (last error: {})",
        .last_error.as_deref().unwrap_or("none")
    )]
    ProvisionTimeout {
        image: String,
        timeout: Duration,
        last_error: Option<String>,
        container_logs: String,
    },

    /// The container could not be removed.
    #[error("failed to remove database container {container}")]
    StopFailed {
        container: String,
        #[source]
        source: DockerError,
    },
}

impl Error {
    /// Whether a new attempt on a different host port may succeed.
    pub fn is_port_conflict(&self) -> bool {
        matches!(self, Self::PortAlreadyBound { .. })
    }
}
