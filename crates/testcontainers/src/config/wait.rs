//! Wait strategy engine configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Readiness waiting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaitConfig {
    /// Default per-condition timeout when a spec does not override it
    pub startup_timeout: Duration,

    /// Initial interval between readiness probes
    pub poll_interval: Duration,

    /// Ceiling for the exponential probe backoff
    pub backoff_ceiling: Duration,

    /// Number of trailing log lines captured when a container dies
    /// before becoming ready
    pub death_log_tail: u32,
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            startup_timeout: Duration::from_secs(60),
            poll_interval: Duration::from_millis(100),
            backoff_ceiling: Duration::from_secs(1),
            death_log_tail: 50,
        }
    }
}

impl WaitConfig {
    pub(crate) fn validate(&self) -> Result<(), String> {
        if self.poll_interval.is_zero() {
            return Err("wait.poll_interval must be greater than 0".to_string());
        }

        if self.backoff_ceiling < self.poll_interval {
            return Err("wait.backoff_ceiling must not be below wait.poll_interval".to_string());
        }

        Ok(())
    }
}
