//! Fixture table and request log

use std::{
    collections::{BTreeMap, VecDeque},
    fmt,
};

use axum::{
    body::Bytes,
    http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, header},
};
use parking_lot::{Mutex, RwLock};
use percent_encoding::percent_decode_str;

/// Most requests kept in the request log; older ones are evicted first.
pub const REQUEST_LOG_CAPACITY: usize = 1024;

/// Identifies a fixture: HTTP method plus request path.
///
/// The path is either concrete (`/users/alice`) or a template where whole
/// segments written as `{name}` match any single segment (`/users/{login}`).
/// Paths are normalized: a leading slash is added, a trailing one dropped, any
/// query string ignored, and every segment percent-decoded. `/users/a b` and
/// `/users/a%20b` are the same key. An encoded slash (`%2F`) stays inside its
/// segment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FixtureKey {
    method: String,
    path: String,
}

impl FixtureKey {
    pub fn new(method: Method, path: impl AsRef<str>) -> Self {
        Self {
            method: method.as_str().to_ascii_uppercase(),
            path: normalize_path(path.as_ref()),
        }
    }

    pub fn get(path: impl AsRef<str>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl AsRef<str>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Whether the path contains at least one `{param}` segment.
    pub fn is_template(&self) -> bool {
        self.path.split('/').any(is_param_segment)
    }

    /// Whether this template accepts `path`. Non-template keys never match here.
    fn template_matches(&self, method: &str, path: &str) -> bool {
        if self.method != method {
            return false;
        }
        let mut pattern = self.path.split('/');
        let mut actual = path.split('/');
        loop {
            match (pattern.next(), actual.next()) {
                (None, None) => return true,
                (Some(p), Some(a)) if is_param_segment(p) && !a.is_empty() => {}
                (Some(p), Some(a)) if p == a => {}
                _ => return false,
            }
        }
    }

    /// Number of literal segments; more literal segments means more specific.
    fn specificity(&self) -> usize {
        self.path
            .split('/')
            .filter(|s| !s.is_empty() && !is_param_segment(s))
            .count()
    }
}

impl fmt::Display for FixtureKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.path)
    }
}

fn is_param_segment(segment: &str) -> bool {
    segment.len() > 2 && segment.starts_with('{') && segment.ends_with('}')
}

fn normalize_path(path: &str) -> String {
    let path = path.split(['?', '#']).next().unwrap_or_default();
    let decoded = path
        .trim_matches('/')
        .split('/')
        .map(|segment| percent_decode_str(segment).decode_utf8_lossy().replace('/', "%2F"))
        .collect::<Vec<_>>()
        .join("/");
    format!("/{decoded}")
}

/// The canned response returned for a matched fixture.
#[derive(Debug, Clone)]
pub struct StubResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl StubResponse {
    /// An empty-bodied response.
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    /// A JSON response. `content-type` is set by default for every fixture.
    pub fn json(status: StatusCode, body: serde_json::Value) -> Self {
        Self::new(status).with_body(body.to_string())
    }

    /// A plain text response.
    pub fn text(status: StatusCode, body: impl Into<String>) -> Self {
        Self::new(status)
            .with_header(
                header::CONTENT_TYPE,
                HeaderValue::from_static("text/plain; charset=utf-8"),
            )
            .with_body(body.into())
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Adds a header, replacing any previous value for `name`.
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }
}

/// A request the stub received, kept for assertions.
///
/// `path` is the raw, still percent-encoded request path.
#[derive(Debug, Clone)]
pub struct ReceivedRequest {
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub body: Bytes,
    /// The fixture that answered, `None` if the stub replied not found
    pub matched: Option<FixtureKey>,
}

/// Shared fixture table.
///
/// Readers (request handlers) and writers (tests registering fixtures) may run
/// concurrently. A lookup sees either the old or the new response for a key,
/// never a partial one.
#[derive(Debug, Default)]
pub struct Fixtures {
    table: RwLock<BTreeMap<FixtureKey, StubResponse>>,
    received: Mutex<VecDeque<ReceivedRequest>>,
}

impl Fixtures {
    /// Inserts or overwrites the fixture for `key`.
    pub fn insert(&self, key: FixtureKey, response: StubResponse) {
        tracing::debug!(key = %key, status = %response.status, "fixture registered");
        self.table.write().insert(key, response);
    }

    pub fn remove(&self, key: &FixtureKey) -> Option<StubResponse> {
        self.table.write().remove(key)
    }

    pub fn clear(&self) {
        self.table.write().clear();
        self.received.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.table.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.read().is_empty()
    }

    /// Finds the response for a request.
    ///
    /// An exact key wins. Otherwise the matching template with the most literal
    /// segments answers; ties go to the lexicographically smallest template.
    pub fn lookup(&self, method: &Method, path: &str) -> Option<(FixtureKey, StubResponse)> {
        let key = FixtureKey::new(method.clone(), path);
        let table = self.table.read();

        if let Some(response) = table.get(&key) {
            return Some((key, response.clone()));
        }

        let mut best: Option<(&FixtureKey, &StubResponse)> = None;
        for (candidate, response) in table.iter().filter(|(k, _)| k.is_template()) {
            if !candidate.template_matches(&key.method, &key.path) {
                continue;
            }
            match best {
                Some((current, _)) if current.specificity() >= candidate.specificity() => {}
                _ => best = Some((candidate, response)),
            }
        }
        best.map(|(k, r)| (k.clone(), r.clone()))
    }

    pub(crate) fn record(&self, request: ReceivedRequest) {
        let mut received = self.received.lock();
        if received.len() == REQUEST_LOG_CAPACITY
            && let Some(evicted) = received.pop_front()
        {
            tracing::trace!(method = %evicted.method, path = %evicted.path, "request log full, evicting oldest");
        }
        received.push_back(request);
    }

    /// Requests received since start (or the last clear), oldest first.
    ///
    /// Holds at most [`REQUEST_LOG_CAPACITY`] entries.
    pub fn received(&self) -> Vec<ReceivedRequest> {
        self.received.lock().iter().cloned().collect()
    }
}
