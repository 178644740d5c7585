//! Log subscriber setup

use tracing_subscriber::{fmt, EnvFilter};

/// Install a stderr `fmt` subscriber. `RUST_LOG` takes precedence over
/// `default_filter`. Later calls are ignored, so tests and demos can all
/// call this.
pub fn init(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let _ = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init();
}
