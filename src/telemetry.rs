//! Logging setup
//!
//! Plain tracing-based logging. Cluster operations emit spans carrying
//! `cluster_name` and `provider` fields, so `RUST_LOG=kindling=debug` shows
//! every `kind` command line as it is launched.
//!
//! # Example
//!
//! ```no_run
//! use kindling::telemetry::init_logging;
//!
//! init_logging();
//! // Logs go to stderr, filtered by RUST_LOG (default: info)
//! ```

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Initialize logging with the `info` default filter
///
/// Call once at the start of a test binary; later calls are no-ops.
pub fn init_logging() {
    init_logging_with("info");
}

/// Initialize logging, using `default_filter` when `RUST_LOG` is unset
pub fn init_logging_with(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_logging_is_idempotent() {
        init_logging();
        init_logging_with("kindling=debug");
    }
}
