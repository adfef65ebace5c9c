//! HTTP client bound to a service-under-test.

use std::time::Duration;

use reqwest::{Method, RequestBuilder, Response};
use serde::Serialize;
use url::Url;

/// Client for the service of an [`Environment`](super::env::Environment).
///
/// Paths are resolved against the service's base URL, so tests write
/// `client.get("/customers/1")` without knowing the port.
#[derive(Clone)]
pub struct ServiceClient {
    http: reqwest::Client,
    base_url: Url,
}

impl ServiceClient {
    /// Every request is bounded by `timeout`.
    pub fn new(base_url: Url, timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { http, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Absolute URL of `path` on the service.
    pub fn url(&self, path: &str) -> Result<Url, ClientError> {
        self.base_url
            .join(path)
            .map_err(|source| ClientError::InvalidPath {
                path: path.to_string(),
                source,
            })
    }

    /// Starts a request for custom methods, headers or bodies.
    pub fn request(&self, method: Method, path: &str) -> Result<RequestBuilder, ClientError> {
        Ok(self.http.request(method, self.url(path)?))
    }

    pub async fn get(&self, path: &str) -> Result<Response, ClientError> {
        tracing::debug!(%path, "GET");
        self.request(Method::GET, path)?
            .send()
            .await
            .map_err(ClientError::Request)
    }

    /// Sends `body` as JSON.
    pub async fn post_json<T>(&self, path: &str, body: &T) -> Result<Response, ClientError>
    where
        T: Serialize + ?Sized,
    {
        tracing::debug!(%path, "POST");
        self.request(Method::POST, path)?
            .json(body)
            .send()
            .await
            .map_err(ClientError::Request)
    }
}

impl std::fmt::Debug for ServiceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceClient")
            .field("base_url", &self.base_url.as_str())
            .finish()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The path cannot be joined onto the base URL
    #[error("invalid request path '{path}'")]
    InvalidPath {
        path: String,
        #[source]
        source: url::ParseError,
    },

    /// The request failed or timed out before a response arrived
    #[error("request failed")]
    Request(#[source] reqwest::Error),
}
