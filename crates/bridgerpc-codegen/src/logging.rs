//! Diagnostic logging for the plugin binary
//!
//! stdout carries the encoded response, so log lines always go to stderr.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

/// Environment variable holding the log filter, e.g. `BRIDGERPC_LOG=debug`
pub const LOG_ENV: &str = "BRIDGERPC_LOG";

const DEFAULT_FILTER: &str = "warn";

/// Filter from the given directives, falling back to `warn` when they are
/// absent or do not parse
pub fn build_filter(directives: Option<&str>) -> EnvFilter {
    directives
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_FILTER))
}

/// Install the stderr subscriber
///
/// Call once at startup. A subscriber that is already installed is kept.
pub fn init_logging() {
    let directives = std::env::var(LOG_ENV).ok();

    let subscriber = tracing_subscriber::registry()
        .with(build_filter(directives.as_deref()))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        );

    let _ = tracing::subscriber::set_global_default(subscriber);
}
