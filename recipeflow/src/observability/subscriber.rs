//! Log subscriber installation.

use crate::config::LogConfig;
use tracing_subscriber::{fmt, EnvFilter};

/// Installs a global fmt subscriber.
///
/// `RUST_LOG` wins over the configured level. Returns false when a global
/// subscriber was already installed, which is not an error.
pub fn init_tracing(config: &LogConfig) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = fmt().with_env_filter(filter).with_target(true);
    let installed = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.is_ok()
}
