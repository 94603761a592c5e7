//! Log setup for the registry and the operator tool.
//!
//! `RUST_LOG` always wins. Without it the filter starts from the level given
//! at startup and is replaced by `logging.level` once the configuration has
//! been loaded.

use std::sync::OnceLock;

use tracing_subscriber::{EnvFilter, Registry, fmt, prelude::*, reload};

use crate::config::LoggingConfig;

static FILTER_HANDLE: OnceLock<reload::Handle<EnvFilter, Registry>> = OnceLock::new();

/// Installs the global subscriber. Logs go to stderr so command output on
/// stdout stays machine readable. Later calls are ignored.
pub fn init_tracing_with_level(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let (filter_layer, handle) = reload::Layer::new(filter);

    let installed = tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(true))
        .try_init()
        .is_ok();
    if installed {
        let _ = FILTER_HANDLE.set(handle);
    }
}

/// Replaces the active filter with `level`.
///
/// Returns `false` when the subscriber was not installed by
/// [`init_tracing_with_level`] or the reload failed.
pub fn set_level(level: &str) -> bool {
    FILTER_HANDLE
        .get()
        .is_some_and(|handle| handle.modify(|f| *f = EnvFilter::new(level)).is_ok())
}

/// Applies the configured level unless `RUST_LOG` is set.
pub fn apply_logging_config(config: &LoggingConfig) -> bool {
    if std::env::var_os("RUST_LOG").is_some() {
        tracing::debug!("RUST_LOG is set, ignoring logging.level");
        return false;
    }
    set_level(&config.level)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configured_level_replaces_startup_level() {
        assert!(!set_level("debug"));

        init_tracing_with_level("warn");
        init_tracing_with_level("trace");
        assert!(set_level("ticketreg_registry=debug"));

        let config = LoggingConfig {
            level: "error".to_string(),
        };
        assert_eq!(
            apply_logging_config(&config),
            std::env::var_os("RUST_LOG").is_none()
        );
    }
}
