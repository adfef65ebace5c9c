use std::{future::Future, net::SocketAddr, sync::Arc, time::Duration};

use axum::{
    Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, HeaderValue, Method, Uri, header},
    response::{IntoResponse, Response},
    serve::{Listener as _, ListenerExt as _},
};
use backon::{ConstantBuilder, Retryable};
use tokio::net::TcpListener;

use crate::{
    Fixtures, ReceivedRequest,
    error::{ErrorResponse, FixtureNotFound},
    fixtures::FixtureKey,
};

/// Delay between bind attempts.
const BIND_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Bind the stub to `at` and build its server future.
///
/// Binding is attempted up to `attempts` times (at least once). Every request is
/// answered from `fixtures`; the future completes once `shutdown` resolves and
/// in-flight requests have finished.
///
/// Returns the bound socket address and the server future.
pub async fn new(
    at: SocketAddr,
    attempts: u32,
    fixtures: Arc<Fixtures>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(SocketAddr, impl Future<Output = Result<(), std::io::Error>>), BindError> {
    let attempts = attempts.max(1);

    let listener = (|| TcpListener::bind(at))
        .retry(
            ConstantBuilder::default()
                .with_delay(BIND_RETRY_DELAY)
                .with_max_times(attempts as usize - 1),
        )
        .sleep(tokio::time::sleep)
        .notify(|err, dur| {
            tracing::debug!(addr = %at, error = %err, "stub bind failed, retrying in {:?}", dur);
        })
        .await
        .map_err(|source| BindError {
            addr: at,
            attempts,
            source,
        })?
        .tap_io(|tcp_stream| {
            if let Err(err) = tcp_stream.set_nodelay(true) {
                tracing::trace!(error = %err, "failed to set TCP_NODELAY");
            }
        });
    let addr = listener.local_addr().map_err(|source| BindError {
        addr: at,
        attempts,
        source,
    })?;

    let router = Router::new().fallback(serve_fixture).with_state(fixtures);

    let server = async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await
    };
    Ok((addr, server))
}

async fn serve_fixture(
    State(fixtures): State<Arc<Fixtures>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let path = uri.path().to_string();
    let found = fixtures.lookup(&method, &path);

    tracing::debug!(
        method = %method,
        path = %path,
        matched = found.as_ref().map(|(key, _)| key.to_string()),
        "stub request"
    );

    fixtures.record(ReceivedRequest {
        method: method.clone(),
        path: path.clone(),
        query: uri.query().map(str::to_string),
        headers,
        body,
        matched: found.as_ref().map(|(key, _)| key.clone()),
    });

    let Some((_, fixture)) = found else {
        let key = FixtureKey::new(method, path);
        return ErrorResponse::from(FixtureNotFound { key }).into_response();
    };

    let mut response = (fixture.status, fixture.body).into_response();
    let response_headers = response.headers_mut();
    *response_headers = fixture.headers;
    if !response_headers.contains_key(header::CONTENT_TYPE) {
        response_headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
    }
    response
}

/// The stub could not bind its listen address.
#[derive(Debug, thiserror::Error)]
#[error("failed to bind stub server to {addr} after {attempts} attempt(s)")]
pub struct BindError {
    pub addr: SocketAddr,
    pub attempts: u32,
    #[source]
    pub source: std::io::Error,
}
