//! Service configuration, read from `CUSTOMERS_*` environment variables.

use std::{
    net::SocketAddr,
    path::{Path, PathBuf},
};

use figment::{
    Figment,
    providers::{Env, Format as _, Toml},
};
use fs_err as fs;
use hermetic_config::Redacted;
use url::Url;

/// Prefix of the environment variables read by [`Config::load`].
pub const ENV_PREFIX: &str = "CUSTOMERS_";

/// Default upstream used to validate GitHub logins.
pub const DEFAULT_GITHUB_API_URL: &str = "https://api.github.com/";

/// Default maximum number of pooled database connections.
pub const DEFAULT_POOL_SIZE: u32 = 5;

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Config {
    /// PostgreSQL connection URL (`CUSTOMERS_DATABASE_URL`)
    pub database_url: Redacted<String>,
    /// Base URL of the GitHub REST API (`CUSTOMERS_GITHUB_API_URL`)
    #[serde(default = "default_github_api_url")]
    pub github_api_url: Url,
    /// HTTP listen address (`CUSTOMERS_LISTEN_ADDR`, default `127.0.0.1:0`)
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,
    /// Maximum pooled connections (`CUSTOMERS_POOL_SIZE`)
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,
}

fn default_github_api_url() -> Url {
    Url::parse(DEFAULT_GITHUB_API_URL).expect("default GitHub URL is valid")
}

fn default_listen_addr() -> SocketAddr {
    ([127, 0, 0, 1], 0).into()
}

fn default_pool_size() -> u32 {
    DEFAULT_POOL_SIZE
}

impl Config {
    /// Load from an optional TOML file, overridden by `CUSTOMERS_*` env vars.
    pub fn load(file: Option<&Path>) -> Result<Self, LoadError> {
        let mut figment = Figment::new();
        if let Some(path) = file {
            let contents = fs::read_to_string(path)
                .map_err(|err| LoadError::Io(path.to_path_buf(), err))?;
            figment = figment.merge(Toml::string(&contents));
        }
        let mut config: Self = figment
            .merge(Env::prefixed(ENV_PREFIX))
            .extract()
            .map_err(|err| LoadError::Figment(Box::new(err)))?;

        // `Url::join` drops the last segment of a base without a trailing slash
        if !config.github_api_url.path().ends_with('/') {
            let path = format!("{}/", config.github_api_url.path());
            config.github_api_url.set_path(&path);
        }

        Ok(config)
    }
}

/// Errors that can occur while loading the service configuration.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// The config file could not be read.
    #[error("failed to read config file {}", .0.display())]
    Io(PathBuf, #[source] std::io::Error),

    /// A required value is missing or a value has the wrong type.
    #[error("invalid customers-api configuration")]
    Figment(#[source] Box<figment::Error>),
}
