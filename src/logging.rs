//! Structured logging setup.
//!
//! `RUST_LOG` takes precedence over the configured level so operators can
//! raise verbosity without touching the deployment config.

use tracing_subscriber::EnvFilter;

use crate::config::LoggerConfig;

pub fn init(config: &LoggerConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);
    if config.json {
        let _ = builder.json().try_init();
    } else {
        let _ = builder.try_init();
    }
}
