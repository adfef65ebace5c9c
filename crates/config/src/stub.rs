use std::net::SocketAddr;

/// Default number of bind attempts before the stub server gives up.
pub const DEFAULT_STUB_BIND_ATTEMPTS: u32 = 3;

/// Stub dependency server settings (`[stub]` section).
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(default)]
pub struct StubConfig {
    /// Listen address (default: `127.0.0.1:0`, an ephemeral loopback port)
    pub bind_addr: SocketAddr,
    /// Bind attempts before failing with a bind error (default: 3)
    pub bind_attempts: u32,
}

impl Default for StubConfig {
    fn default() -> Self {
        Self {
            bind_addr: ([127, 0, 0, 1], 0).into(),
            bind_attempts: DEFAULT_STUB_BIND_ATTEMPTS,
        }
    }
}
