use std::time::Duration;

/// Default time to wait for the service-under-test to answer its health check (seconds).
pub const DEFAULT_BOOT_TIMEOUT_SECS: u64 = 30;

/// Default per-request timeout of the test-facing HTTP client (seconds).
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Service-under-test settings (`[service]` section).
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Seconds to wait for the service to become reachable (default: 30)
    pub boot_timeout_secs: u64,
    /// Per-request timeout of the client handed to tests, in seconds (default: 30)
    pub request_timeout_secs: u64,
}

impl ServiceConfig {
    /// Boot timeout as a [`Duration`].
    pub fn boot_timeout(&self) -> Duration {
        Duration::from_secs(self.boot_timeout_secs)
    }

    /// Request timeout as a [`Duration`].
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            boot_timeout_secs: DEFAULT_BOOT_TIMEOUT_SECS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}
