//! Process-wide logging initialization
//!
//! Installs a `tracing-subscriber` formatter once per process. Library code only
//! emits `tracing` events; embedding applications may install their own
//! subscriber instead of calling [`init`].

use std::sync::OnceLock;
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

static INSTALLED: OnceLock<bool> = OnceLock::new();

/// Install the global subscriber
///
/// `RUST_LOG` takes precedence over `config.filter`. Returns `true` if this call
/// installed the subscriber, `false` if logging was already initialized (by an
/// earlier call or by another subscriber).
pub fn init(config: &LoggingConfig) -> bool {
    let mut installed_now = false;
    INSTALLED.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&config.filter))
            .unwrap_or_else(|_| EnvFilter::new("info"));

        let builder = tracing_subscriber::fmt().with_env_filter(filter);
        let result = if config.json {
            builder.json().try_init()
        } else {
            builder.try_init()
        };
        installed_now = result.is_ok();
        installed_now
    });
    installed_now
}
