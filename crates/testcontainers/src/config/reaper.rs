//! Reaper (cleanup sentinel) configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Cleanup sentinel configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReaperConfig {
    /// Whether sessions spawn a sentinel. Disabling leaves explicit
    /// `terminate`/`end_session` as the only cleanup paths; resources are
    /// still labeled.
    pub enabled: bool,

    /// Grace given to `docker stop` during a sweep before force removal
    pub sweep_stop_timeout: Duration,
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sweep_stop_timeout: Duration::from_secs(5),
        }
    }
}
