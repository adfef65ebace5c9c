//! Minimal client for the GitHub users endpoint.

use std::time::Duration;

use reqwest::StatusCode;
use url::Url;

/// Timeout of a single call to GitHub.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// The subset of a GitHub user the service stores.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
pub struct GithubUser {
    pub login: String,
    pub id: Option<i64>,
    pub name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct GithubClient {
    base_url: Url,
    http: reqwest::Client,
}

impl GithubClient {
    pub fn new(base_url: Url) -> Result<Self, GithubError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("customers-api/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(GithubError::Client)?;
        Ok(Self { base_url, http })
    }

    /// Looks up a user by login. `Ok(None)` means GitHub answered 404.
    pub async fn user(&self, login: &str) -> Result<Option<GithubUser>, GithubError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| GithubError::InvalidBaseUrl(self.base_url.clone()))?
            .pop_if_empty()
            .push("users")
            .push(login);

        let resp = self
            .http
            .get(url)
            .header(reqwest::header::ACCEPT, "application/vnd.github+json")
            .send()
            .await
            .map_err(GithubError::Request)?;

        match resp.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                resp.json().await.map(Some).map_err(GithubError::Decode)
            }
            status => Err(GithubError::UnexpectedStatus(status)),
        }
    }
}

/// Errors that can occur while talking to GitHub
#[derive(Debug, thiserror::Error)]
pub enum GithubError {
    /// The HTTP client could not be built
    #[error("failed to build HTTP client")]
    Client(#[source] reqwest::Error),

    /// The configured base URL cannot carry a path
    #[error("GitHub base URL {0} cannot be a base")]
    InvalidBaseUrl(Url),

    /// The request failed before a response arrived
    #[error("request to GitHub failed")]
    Request(#[source] reqwest::Error),

    /// GitHub answered with a status other than success or not found
    #[error("GitHub responded with status {0}")]
    UnexpectedStatus(StatusCode),

    /// The response body is not a GitHub user
    #[error("failed to decode GitHub user")]
    Decode(#[source] reqwest::Error),
}
