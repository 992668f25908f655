use crate::observability::ObservabilityConfig;
use tracing_subscriber::EnvFilter;

/// Initializes the global `tracing` subscriber from [`ObservabilityConfig`].
/// Console logging is gated by `console_logging`; the env filter falls back
/// to the configured `log_level` when `RUST_LOG` is unset, so operators can
/// still override verbosity ad hoc without touching the config file.
pub fn init_tracing(config: &ObservabilityConfig) {
    if !config.console_logging {
        return;
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_filter_str()));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}
