//! Logging initialization and structured event helpers
//!
//! The engine is a library; the host test harness usually installs its own
//! subscriber. `init_journal` is for standalone use (smoke tests, examples)
//! and is a no-op if a global subscriber is already set.

pub mod init;
pub mod logging;

pub use init::init_journal;
pub use logging::{log_cleanup_failure, log_cleanup_operation, log_sweep_completed};
