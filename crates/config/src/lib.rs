//! Layered configuration for hermetic test environments.
//!
//! Values are resolved from built-in defaults, then an optional TOML file, then
//! environment variables prefixed with `HERMETIC_CONFIG_`. Nested keys use a double
//! underscore, e.g. `HERMETIC_CONFIG_DATABASE__IMAGE=postgres:15`.

use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Env, Format as _, Toml},
};
use fs_err as fs;

mod database;
mod redacted;
mod service;
mod stub;

pub use self::{
    database::{
        DEFAULT_COMMAND_TIMEOUT_SECS, DEFAULT_DATABASE_IMAGE, DEFAULT_DATABASE_NAME,
        DEFAULT_DATABASE_PASSWORD, DEFAULT_DATABASE_USER, DEFAULT_READINESS_TIMEOUT_SECS,
        DatabaseConfig,
    },
    redacted::Redacted,
    service::{DEFAULT_BOOT_TIMEOUT_SECS, DEFAULT_REQUEST_TIMEOUT_SECS, ServiceConfig},
    stub::{DEFAULT_STUB_BIND_ATTEMPTS, StubConfig},
};

/// Prefix of the environment variables that override configuration values.
pub const ENV_PREFIX: &str = "HERMETIC_CONFIG_";

/// Environment variable naming an optional TOML config file.
pub const CONFIG_FILE_ENV: &str = "HERMETIC_CONFIG";

/// Configuration of a whole test environment.
#[derive(Debug, Clone, Default, serde::Deserialize)]
#[serde(default)]
pub struct EnvironmentConfig {
    /// Ephemeral database settings
    pub database: DatabaseConfig,
    /// Stub dependency server settings
    pub stub: StubConfig,
    /// Service-under-test settings
    pub service: ServiceConfig,
}

impl EnvironmentConfig {
    /// Load configuration from an optional TOML file with `HERMETIC_CONFIG_*` overrides.
    ///
    /// Missing keys fall back to their defaults. Env vars win over the file.
    pub fn load(file: Option<&Path>) -> Result<Self, ConfigError> {
        let mut figment = Figment::new();
        if let Some(path) = file {
            let contents = fs::read_to_string(path)
                .map_err(|err| ConfigError::Io(path.to_path_buf(), err))?;
            figment = figment.merge(Toml::string(&contents));
        }
        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

        let config: Self = figment
            .extract()
            .map_err(|err| ConfigError::Figment(Box::new(err)))?;

        tracing::debug!(
            image = %config.database.image,
            stub_addr = %config.stub.bind_addr,
            from_file = file.is_some(),
            "environment config loaded"
        );

        Ok(config)
    }

    /// Load configuration using the file named by `HERMETIC_CONFIG`, if set.
    pub fn from_env() -> Result<Self, ConfigError> {
        let file = std::env::var_os(CONFIG_FILE_ENV).map(PathBuf::from);
        Self::load(file.as_deref())
    }
}

/// Errors that can occur while loading the environment configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read config file {}", .0.display())]
    Io(PathBuf, #[source] std::io::Error),

    /// A value could not be parsed into its configured type.
    #[error("invalid configuration")]
    Figment(#[source] Box<figment::Error>),
}
