//! Error handling for the testcontainers engine
//!
//! This module defines the error infrastructure shared by the engine and the
//! bridge boundary:
//! - `CoreError` trait for consistent error handling
//! - `EngineError`, the classified failure taxonomy surfaced to callers
//! - `ConfigurationError` for configuration loading and validation
//!
//! # Design Principles
//! - All errors implement Send + Sync for async compatibility
//! - Use thiserror for library errors, anyhow for tests
//! - Carry enough context (container id, last known state, daemon body) to
//!   diagnose a failure without re-querying the daemon

use thiserror::Error;

/// Base trait for all engine-specific errors
///
/// Ensures errors are thread-safe, 'static, and implement the standard
/// Error trait so they can cross task and boundary seams freely.
pub trait CoreError: std::error::Error + Send + Sync + 'static {}

/// Classified failures surfaced by the engine
///
/// Every fallible engine operation resolves to exactly one of these kinds.
/// Transport-level failures are retried with bounded backoff before a
/// `DaemonUnreachable` is surfaced; all other kinds surface immediately.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Connection or transport failure talking to the container daemon.
    /// Already retried with backoff a bounded number of times.
    #[error("daemon unreachable at {endpoint} after {attempts} attempt(s): {source}")]
    DaemonUnreachable {
        endpoint: String,
        attempts: u32,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The daemon rejected the request outright. Not retryable.
    #[error("daemon rejected request (HTTP {status}): {message}")]
    SpecRejected { status: u16, message: String },

    /// Readiness was not achieved before a condition's timeout elapsed.
    /// `unmet` names every condition still unsatisfied at that moment.
    #[error("readiness wait timed out for container {container_id}; unmet: [{}]", unmet.join(", "))]
    WaitTimeout {
        container_id: String,
        unmet: Vec<String>,
    },

    /// The container exited before it became ready.
    #[error("container {container_id} died before ready (exit code {exit_code:?})")]
    ContainerDied {
        container_id: String,
        exit_code: Option<i64>,
        /// Tail of the container log stream, when it could be captured.
        logs: String,
    },

    /// Operation is invalid for the handle's current lifecycle state.
    #[error("operation '{operation}' invalid for container {container_id} in state {state}")]
    StateConflict {
        container_id: String,
        state: String,
        operation: String,
    },

    /// Best-effort teardown failed. Logged, never escalated to fail the
    /// caller's primary operation; the reaper remains the backstop.
    #[error("cleanup of {resource} failed: {message}")]
    CleanupFailure { resource: String, message: String },
}

impl CoreError for EngineError {}

impl EngineError {
    /// Create a `DaemonUnreachable` from any transport error
    pub fn daemon_unreachable(
        endpoint: impl Into<String>,
        attempts: u32,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::DaemonUnreachable {
            endpoint: endpoint.into(),
            attempts,
            source: Box::new(source),
        }
    }

    pub fn spec_rejected(status: u16, message: impl Into<String>) -> Self {
        Self::SpecRejected {
            status,
            message: message.into(),
        }
    }

    pub fn state_conflict(
        container_id: impl Into<String>,
        state: impl std::fmt::Display,
        operation: impl Into<String>,
    ) -> Self {
        Self::StateConflict {
            container_id: container_id.into(),
            state: state.to_string(),
            operation: operation.into(),
        }
    }

    pub fn cleanup_failure(resource: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::CleanupFailure {
            resource: resource.into(),
            message: message.to_string(),
        }
    }

    /// Whether surfacing this error should be preceded by local retry.
    /// Only transport failures qualify; everything else is definitive.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::DaemonUnreachable { .. })
    }
}

/// Configuration-related errors
///
/// These occur during configuration loading, parsing, or validation.
#[derive(Error, Debug)]
pub enum ConfigurationError {
    /// Configuration file not found
    #[error("configuration file not found: {path}")]
    FileNotFound { path: String },

    /// Configuration parsing failed
    #[error("failed to parse configuration: {details}")]
    ParseError { details: String },

    /// Invalid configuration value
    #[error("invalid configuration value for {key}: {value} ({reason})")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },

    /// Environment variable error
    #[error("environment variable error for {var}: {details}")]
    EnvironmentError { var: String, details: String },

    /// Configuration validation failed
    #[error("configuration validation failed: {details}")]
    ValidationFailed { details: String },
}

impl CoreError for ConfigurationError {}

impl ConfigurationError {
    pub fn validation_failed(details: impl Into<String>) -> Self {
        Self::ValidationFailed {
            details: details.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_error_display() {
        let err = EngineError::daemon_unreachable(
            "unix:///var/run/docker.sock",
            3,
            std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "Connection refused"),
        );

        let display = format!("{err}");
        assert!(display.contains("/var/run/docker.sock"));
        assert!(display.contains("3 attempt"));
    }

    #[test]
    fn test_error_source_chain() {
        let io_error = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "broken pipe");
        let err = EngineError::daemon_unreachable("tcp://localhost:2375", 1, io_error);
        assert!(err.source().is_some());
    }

    #[test]
    fn test_wait_timeout_names_unmet_conditions() {
        let err = EngineError::WaitTimeout {
            container_id: "abc123".to_string(),
            unmet: vec!["port_open(80/tcp)".to_string(), "log_pattern".to_string()],
        };
        let display = format!("{err}");
        assert!(display.contains("port_open(80/tcp)"));
        assert!(display.contains("log_pattern"));
    }

    #[test]
    fn test_retryability() {
        let unreachable = EngineError::daemon_unreachable(
            "unix:///var/run/docker.sock",
            1,
            std::io::Error::new(std::io::ErrorKind::TimedOut, "timeout"),
        );
        assert!(unreachable.is_retryable());

        let rejected = EngineError::spec_rejected(400, "invalid image reference");
        assert!(!rejected.is_retryable());
    }

    #[test]
    fn test_core_error_trait() {
        fn assert_core_error(_: impl CoreError) {}

        assert_core_error(EngineError::spec_rejected(404, "no such image"));
        assert_core_error(ConfigurationError::validation_failed("bad socket path"));
    }
}
