//! Configuration for the engine
//!
//! Each concern carries its own section with compiled defaults; the
//! aggregate `EngineConfig` is loaded through the layered loader in
//! `tc_common` (defaults -> TOML -> `TESTCONTAINERS_*` environment).

pub mod daemon;
pub mod reaper;
pub mod types;
pub mod wait;

pub use daemon::{DaemonConfig, RetryConfig};
pub use reaper::ReaperConfig;
pub use types::{EngineConfig, EngineConfigValidation};
pub use wait::WaitConfig;
