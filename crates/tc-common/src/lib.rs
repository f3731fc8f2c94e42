//! # tc-common
//!
//! Shared building blocks for the testcontainers engine workspace:
//! - `EngineError` taxonomy used across the engine and bridge boundary
//! - Layered configuration loading (defaults -> TOML file -> environment)
//! - Logging initialization and structured cleanup/reaper log helpers
//!
//! ## Design Principles
//! - Minimal dependencies to avoid bloat in dependent crates
//! - Use thiserror for library errors; anyhow stays in tests
//! - Errors are Send + Sync and carry enough context to diagnose without
//!   re-querying the daemon

pub mod config;
pub mod error;
pub mod journal;

pub use config::LoggingConfig;
pub use error::{ConfigurationError, CoreError, EngineError};

/// Version of the common crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_constant() {
        assert!(VERSION.chars().any(|c| c.is_ascii_digit()));
    }
}
