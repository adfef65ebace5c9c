use std::time::Duration;

use crate::Redacted;

/// Default container image for the ephemeral database.
pub const DEFAULT_DATABASE_IMAGE: &str = "postgres:16-alpine";

/// Default database name created inside the container.
pub const DEFAULT_DATABASE_NAME: &str = "hermetic";

/// Default superuser name for the ephemeral database.
pub const DEFAULT_DATABASE_USER: &str = "hermetic";

/// Default superuser password for the ephemeral database.
pub const DEFAULT_DATABASE_PASSWORD: &str = "hermetic";

/// Default time to wait for the database to accept connections (seconds).
pub const DEFAULT_READINESS_TIMEOUT_SECS: u64 = 60;

/// Default upper bound on one `docker` command, image pulls included (seconds).
pub const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 300;

/// Ephemeral database settings (`[database]` section).
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Container image to run (default: `postgres:16-alpine`)
    pub image: String,
    /// Database created on first boot (default: `hermetic`)
    pub database: String,
    /// Superuser name (default: `hermetic`)
    pub user: String,
    /// Superuser password (default: `hermetic`)
    pub password: Redacted<String>,
    /// Seconds to wait for the database to accept connections (default: 60)
    pub readiness_timeout_secs: u64,
    /// Seconds a single `docker` command may run, image pull included (default: 300)
    pub command_timeout_secs: u64,
    /// Leave the container running after teardown, for debugging (default: false)
    pub keep_container: bool,
    /// Explicit path to the `docker` CLI. Looked up in `PATH` when unset.
    pub docker_bin: Option<String>,
}

impl DatabaseConfig {
    /// Readiness timeout as a [`Duration`].
    pub fn readiness_timeout(&self) -> Duration {
        Duration::from_secs(self.readiness_timeout_secs)
    }

    /// Timeout of a single `docker` command as a [`Duration`].
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            image: DEFAULT_DATABASE_IMAGE.to_string(),
            database: DEFAULT_DATABASE_NAME.to_string(),
            user: DEFAULT_DATABASE_USER.to_string(),
            password: Redacted::from(DEFAULT_DATABASE_PASSWORD),
            readiness_timeout_secs: DEFAULT_READINESS_TIMEOUT_SECS,
            command_timeout_secs: DEFAULT_COMMAND_TIMEOUT_SECS,
            keep_container: false,
            docker_bin: None,
        }
    }
}
