//! Aggregate engine configuration

use serde::{Deserialize, Serialize};
use std::path::Path;

use tc_common::config::{loader, LoggingConfig};
use tc_common::ConfigurationError;

use super::{DaemonConfig, ReaperConfig, WaitConfig};

/// Main engine configuration
///
/// Aggregates the per-concern sections; each section owns its defaults and
/// validation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Logging configuration
    pub logging: LoggingConfig,

    /// Daemon connection configuration
    pub daemon: DaemonConfig,

    /// Readiness waiting configuration
    pub wait: WaitConfig,

    /// Cleanup sentinel configuration
    pub reaper: ReaperConfig,
}

impl EngineConfig {
    /// Load configuration using the layered loader
    pub fn load() -> Result<Self, ConfigurationError> {
        let config: Self = loader::load_config()?;
        config.validate_all()?;
        Ok(config)
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigurationError> {
        let config: Self = loader::load_from_file(path)?;
        config.validate_all()?;
        Ok(config)
    }
}

/// Engine configuration validation
pub trait EngineConfigValidation {
    fn validate_all(&self) -> Result<(), ConfigurationError>;
    fn warnings(&self) -> Vec<String>;
}

impl EngineConfigValidation for EngineConfig {
    fn validate_all(&self) -> Result<(), ConfigurationError> {
        self.daemon
            .validate()
            .map_err(ConfigurationError::validation_failed)?;
        self.wait
            .validate()
            .map_err(ConfigurationError::validation_failed)?;
        Ok(())
    }

    fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if !self.reaper.enabled {
            warnings.push(
                "reaper disabled: crashed test processes will leak containers".to_string(),
            );
        }

        if self.daemon.socket_path.starts_with("tcp://")
            || self.daemon.socket_path.starts_with("http://")
        {
            warnings.push("daemon reached over unencrypted TCP".to_string());
        }

        warnings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = EngineConfig::default();
        assert!(config.validate_all().is_ok());
        assert!(config.warnings().is_empty());
    }

    #[test]
    fn test_zero_attempts_rejected() {
        let mut config = EngineConfig::default();
        config.daemon.retry.max_attempts = 0;
        assert!(config.validate_all().is_err());
    }

    #[test]
    fn test_disabled_reaper_warns() {
        let mut config = EngineConfig::default();
        config.reaper.enabled = false;
        assert_eq!(config.warnings().len(), 1);
    }

    #[test]
    fn test_load_from_file() {
        let toml_content = r#"
            [daemon]
            socket_path = "tcp://127.0.0.1:2375"

            [daemon.retry]
            max_attempts = 5

            [wait]
            death_log_tail = 20
        "#;

        let mut temp_file = tempfile::NamedTempFile::with_suffix(".toml").unwrap();
        std::io::Write::write_all(&mut temp_file, toml_content.as_bytes()).unwrap();

        let config = EngineConfig::load_from_file(temp_file.path()).unwrap();
        assert_eq!(config.daemon.socket_path, "tcp://127.0.0.1:2375");
        assert_eq!(config.daemon.retry.max_attempts, 5);
        assert_eq!(config.wait.death_log_tail, 20);
        // untouched sections keep their defaults
        assert!(config.reaper.enabled);
    }
}
