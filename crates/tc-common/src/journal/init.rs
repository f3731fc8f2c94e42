//! Journal initialization

use crate::config::LoggingConfig;

/// Initialize tracing for standalone use.
///
/// Honors `RUST_LOG` when set, otherwise falls back to the configured level
/// and per-target overrides. Safe to call more than once; only the first
/// call installs a subscriber.
pub fn init_journal(config: &LoggingConfig) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.filter_directives()));

    let result = match config.format.as_str() {
        "json" => tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_target(false).json())
            .try_init(),
        "pretty" => tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_target(false).pretty())
            .try_init(),
        _ => tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_target(false).compact())
            .try_init(),
    };

    // A subscriber installed by the host harness wins.
    if result.is_err() {
        tracing::debug!("global subscriber already installed, keeping it");
    }
}
