//! Daemon connection configuration and validation

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Container daemon connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Daemon socket path or TCP endpoint
    /// (`unix:///var/run/docker.sock`, `tcp://127.0.0.1:2375`)
    pub socket_path: String,

    /// Connection establishment timeout in seconds
    pub connect_timeout_secs: u64,

    /// Per-request deadline for daemon API calls
    pub api_timeout: Duration,

    /// Retry policy for transport-level failures
    pub retry: RetryConfig,
}

/// Bounded exponential retry policy for transport failures
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of attempts before surfacing `DaemonUnreachable`
    pub max_attempts: u32,

    /// Delay before the first retry
    pub initial_backoff: Duration,

    /// Backoff ceiling; delays double per attempt up to this bound
    pub max_backoff: Duration,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            socket_path: "unix:///var/run/docker.sock".to_string(),
            connect_timeout_secs: 120,
            api_timeout: Duration::from_secs(30),
            retry: RetryConfig::default(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(2),
        }
    }
}

impl DaemonConfig {
    pub(crate) fn validate(&self) -> Result<(), String> {
        if self.socket_path.is_empty() {
            return Err("daemon socket path must not be empty".to_string());
        }

        if self.retry.max_attempts == 0 {
            return Err("retry.max_attempts must be at least 1".to_string());
        }

        if self.api_timeout.is_zero() {
            return Err("api_timeout must be greater than 0".to_string());
        }

        Ok(())
    }
}
