use std::{collections::BTreeMap, path::PathBuf, time::Duration};

use hermetic_config::{DatabaseConfig, Redacted};

/// Superuser credentials baked into the container on first boot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub user: String,
    pub password: Redacted<String>,
}

impl Credentials {
    pub fn new(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            password: Redacted::from(password.into()),
        }
    }
}

/// Everything needed to provision one database container.
///
/// ```ignore
/// let spec = ContainerSpec::new("postgres:16-alpine")
///     .database("app")
///     .credentials(Credentials::new("app", "app"))
///     .readiness_timeout(Duration::from_secs(30));
/// ```
#[derive(Debug, Clone)]
pub struct ContainerSpec {
    pub(crate) image: String,
    pub(crate) database: String,
    pub(crate) credentials: Credentials,
    pub(crate) readiness_timeout: Duration,
    pub(crate) command_timeout: Duration,
    pub(crate) docker_bin: Option<PathBuf>,
    pub(crate) host_port: Option<u16>,
    pub(crate) keep: bool,
    pub(crate) env: BTreeMap<String, String>,
}

impl ContainerSpec {
    pub fn new(image: impl Into<String>) -> Self {
        let defaults = DatabaseConfig::default();
        let readiness_timeout = defaults.readiness_timeout();
        let command_timeout = defaults.command_timeout();
        Self {
            image: image.into(),
            database: defaults.database,
            credentials: Credentials {
                user: defaults.user,
                password: defaults.password,
            },
            readiness_timeout,
            command_timeout,
            docker_bin: None,
            host_port: None,
            keep: false,
            env: BTreeMap::new(),
        }
    }

    /// Build a spec from the `[database]` config section.
    pub fn from_config(config: &DatabaseConfig) -> Self {
        Self {
            image: config.image.clone(),
            database: config.database.clone(),
            credentials: Credentials {
                user: config.user.clone(),
                password: config.password.clone(),
            },
            readiness_timeout: config.readiness_timeout(),
            command_timeout: config.command_timeout(),
            docker_bin: config.docker_bin.as_ref().map(PathBuf::from),
            host_port: None,
            keep: config.keep_container,
            env: BTreeMap::new(),
        }
    }

    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.database = database.into();
        self
    }

    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }

    /// Upper bound on the wait for the database to accept connections.
    pub fn readiness_timeout(mut self, timeout: Duration) -> Self {
        self.readiness_timeout = timeout;
        self
    }

    /// Upper bound on a single `docker` invocation, including the image pull of
    /// `docker run`.
    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    /// Use this `docker` executable instead of looking it up in `PATH`.
    pub fn docker_bin(mut self, path: impl Into<PathBuf>) -> Self {
        self.docker_bin = Some(path.into());
        self
    }

    /// Publish the database on a fixed loopback port.
    ///
    /// A free port is picked per start when unset. A pinned port that Docker reports
    /// as taken fails the start right away instead of being retried.
    pub fn host_port(mut self, port: u16) -> Self {
        self.host_port = Some(port);
        self
    }

    /// Leave the container behind after stop, for post-mortem debugging.
    pub fn keep(mut self, keep: bool) -> Self {
        self.keep = keep;
        self
    }

    /// Extra environment variable for the container, e.g. `POSTGRES_INITDB_ARGS`.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn image(&self) -> &str {
        &self.image
    }
}
