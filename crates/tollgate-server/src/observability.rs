// Tracing initialization.
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::config::LoggingConfig;

/// Installs the global subscriber. Later calls are ignored.
///
/// `RUST_LOG` wins over `logging.level` when it parses.
pub fn init_tracing(logging: &LoggingConfig) {
    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let filter = log_filter(rust_log.as_deref(), &logging.level);

    let json = logging.json.then(|| fmt::layer().json());
    let plain = (!logging.json).then(fmt::layer);

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(json)
        .with(plain)
        .try_init();
}

fn log_filter(rust_log: Option<&str>, level: &str) -> EnvFilter {
    rust_log
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(level))
}
