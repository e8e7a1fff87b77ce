//! Tracing setup. Crawl results own stdout, so diagnostics go to stderr.

use tracing_subscriber::EnvFilter;

/// Initialize the stderr subscriber. `RUST_LOG` controls filtering and
/// defaults to `info`.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}
