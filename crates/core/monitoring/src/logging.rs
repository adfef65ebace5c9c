//! A set of utilities to enable logging configuration using tracing_subscriber.

use std::{error::Error, io::IsTerminal, sync::Once};

use tracing_subscriber::{EnvFilter, filter::LevelFilter};

static HERMETIC_LOG_ENV_VAR: &str = "HERMETIC_LOG";

/// Initializes a tracing subscriber for logging.
///
/// Safe to call from every test: only the first call installs the subscriber.
pub fn init() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let (env_filter, log_level) = env_filter_and_log_level();

        // A subscriber installed by the host binary is left alone
        let _ = tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_ansi(std::io::stderr().is_terminal())
            .with_writer(std::io::stderr)
            .try_init();

        tracing::debug!("log level: {}", log_level);
    });
}

/// Renders the `source()` chain of an error, outermost cause first.
///
/// The error itself is not included; log it separately under `error`. Returns an
/// empty string when the error has no source.
pub fn error_source(err: &(dyn Error + 'static)) -> String {
    let mut causes = Vec::new();
    let mut current = err.source();
    while let Some(cause) = current {
        causes.push(cause.to_string());
        current = cause.source();
    }
    causes.join(": ")
}

/// List of crates in the workspace.
const HERMETIC_CRATES: &[&str] = &[
    "customers_api",
    "db_checkpoint",
    "ephemeral_db",
    "hermetic_config",
    "http_common",
    "monitoring",
    "stub_server",
    "tests",
];

fn env_filter_and_log_level() -> (EnvFilter, String) {
    let directive_string = std::env::var(EnvFilter::DEFAULT_ENV).unwrap_or_default();
    let mut env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::ERROR.into())
        .parse_lossy(&directive_string);

    let log_level = std::env::var(HERMETIC_LOG_ENV_VAR).unwrap_or_else(|_| "info".to_string());

    for crate_name in HERMETIC_CRATES {
        // RUST_LOG wins for crates it names explicitly
        if directive_string.contains(&format!("{crate_name}=")) {
            continue;
        }
        match format!("{crate_name}={log_level}").parse() {
            Ok(directive) => env_filter = env_filter.add_directive(directive),
            Err(err) => {
                eprintln!("ignoring invalid {HERMETIC_LOG_ENV_VAR} value {log_level:?}: {err}");
                break;
            }
        }
    }

    (env_filter, log_level)
}
