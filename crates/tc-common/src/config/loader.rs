//! # Configuration Loader
//!
//! Figment-based configuration loading with layered support:
//! 1. Compiled defaults
//! 2. Configuration file (TOML)
//! 3. Environment variable overrides
//!
//! Nested fields map to environment variables with a double underscore:
//! `TESTCONTAINERS_DAEMON__SOCKET_PATH` overrides `daemon.socket_path`.

use crate::error::ConfigurationError;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Default configuration file name
const DEFAULT_CONFIG_FILE: &str = "testcontainers.toml";

/// Environment variable prefix
const DEFAULT_ENV_PREFIX: &str = "TESTCONTAINERS";

/// Load configuration with the default layered approach
///
/// Layer priority (highest to lowest):
/// 1. Environment variables (`TESTCONTAINERS_*`)
/// 2. Configuration file (`testcontainers.toml` or `TESTCONTAINERS_CONFIG_PATH`)
/// 3. Compiled defaults
pub fn load_config<T>() -> Result<T, ConfigurationError>
where
    T: Default + DeserializeOwned + serde::Serialize,
{
    load_config_with_options::<T>(LoadOptions::default())
}

/// Load configuration from a specific file, with environment overrides
pub fn load_from_file<T>(path: &Path) -> Result<T, ConfigurationError>
where
    T: Default + DeserializeOwned + serde::Serialize,
{
    let options = LoadOptions {
        config_path: Some(path.to_path_buf()),
        env_prefix: DEFAULT_ENV_PREFIX.to_string(),
        require_file: true,
    };
    load_config_with_options::<T>(options)
}

/// Configuration loading options
#[derive(Debug, Clone)]
pub struct LoadOptions {
    /// Optional path to configuration file
    pub config_path: Option<PathBuf>,
    /// Environment variable prefix
    pub env_prefix: String,
    /// Whether the configuration file is required
    pub require_file: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            config_path: None,
            env_prefix: DEFAULT_ENV_PREFIX.to_string(),
            require_file: false,
        }
    }
}

/// Load configuration with custom options
pub fn load_config_with_options<T>(options: LoadOptions) -> Result<T, ConfigurationError>
where
    T: Default + DeserializeOwned + serde::Serialize,
{
    let mut figment = Figment::new().merge(Serialized::defaults(T::default()));

    let config_path = determine_config_path(options.config_path)?;

    if let Some(path) = &config_path {
        if path.exists() {
            debug!("Loading configuration from file: {}", path.display());
            figment = add_file_provider(figment, path)?;
        } else if options.require_file {
            return Err(ConfigurationError::FileNotFound {
                path: path.display().to_string(),
            });
        } else {
            warn!(
                "Configuration file not found: {} (using defaults)",
                path.display()
            );
        }
    }

    figment = figment.merge(
        Env::prefixed(&format!("{}_", options.env_prefix))
            .split("__")
            .ignore(&["PATH", "HOME", "USER"]),
    );

    figment
        .extract()
        .map_err(|err| ConfigurationError::ParseError {
            details: format!("failed to parse configuration: {err}"),
        })
}

/// Determine the configuration file path with fallback logic
fn determine_config_path(
    override_path: Option<PathBuf>,
) -> Result<Option<PathBuf>, ConfigurationError> {
    if let Some(path) = override_path {
        return Ok(Some(path));
    }

    if let Ok(env_path) = std::env::var("TESTCONTAINERS_CONFIG_PATH") {
        debug!("Using config path from environment: {env_path}");
        return Ok(Some(PathBuf::from(env_path)));
    }

    let current_dir_config = std::env::current_dir()
        .map_err(|e| ConfigurationError::EnvironmentError {
            var: "current_dir".to_string(),
            details: e.to_string(),
        })?
        .join(DEFAULT_CONFIG_FILE);

    if current_dir_config.exists() {
        return Ok(Some(current_dir_config));
    }

    if let Ok(home) = std::env::var("HOME") {
        let home_config = PathBuf::from(home)
            .join(".config")
            .join("testcontainers")
            .join(DEFAULT_CONFIG_FILE);
        if home_config.exists() {
            return Ok(Some(home_config));
        }
    }

    debug!("No configuration file found, using defaults");
    Ok(None)
}

/// Add a file provider to the figment based on file extension
fn add_file_provider(figment: Figment, path: &Path) -> Result<Figment, ConfigurationError> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("toml");

    match extension.to_lowercase().as_str() {
        "toml" => Ok(figment.merge(Toml::file(path))),
        _ => Err(ConfigurationError::ParseError {
            details: format!("unsupported configuration file format: {extension} (supported: toml)"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use serial_test::serial;
    use std::env;
    use tempfile::NamedTempFile;

    #[derive(Debug, Default, Deserialize, Serialize, PartialEq)]
    struct TestConfig {
        pub socket: String,
        pub attempts: u32,
        pub nested: NestedConfig,
    }

    #[derive(Debug, Default, Deserialize, Serialize, PartialEq)]
    struct NestedConfig {
        pub enabled: bool,
        pub timeout: u64,
    }

    #[test]
    #[serial]
    fn test_load_default_config() {
        env::remove_var("TESTCONTAINERS_SOCKET");
        env::remove_var("TESTCONTAINERS_ATTEMPTS");
        env::remove_var("TESTCONTAINERS_NESTED__ENABLED");
        env::remove_var("TESTCONTAINERS_NESTED__TIMEOUT");

        let config: TestConfig = load_config().unwrap();
        assert_eq!(config, TestConfig::default());
    }

    #[test]
    #[serial]
    fn test_load_from_toml_file() {
        env::remove_var("TESTCONTAINERS_SOCKET");
        env::remove_var("TESTCONTAINERS_ATTEMPTS");

        let toml_content = r#"
            socket = "unix:///run/user/1000/docker.sock"
            attempts = 5

            [nested]
            enabled = true
            timeout = 30
        "#;

        let mut temp_file = NamedTempFile::with_suffix(".toml").unwrap();
        std::io::Write::write_all(&mut temp_file, toml_content.as_bytes()).unwrap();

        let config: TestConfig = load_from_file(temp_file.path()).unwrap();
        assert_eq!(config.socket, "unix:///run/user/1000/docker.sock");
        assert_eq!(config.attempts, 5);
        assert!(config.nested.enabled);
        assert_eq!(config.nested.timeout, 30);
    }

    #[test]
    #[serial]
    fn test_env_var_overrides() {
        let test_prefix = "TC_LOADER_TEST";
        env::set_var(format!("{test_prefix}_SOCKET"), "npipe:////./pipe/docker");
        env::set_var(format!("{test_prefix}_ATTEMPTS"), "7");
        env::set_var(format!("{test_prefix}_NESTED__ENABLED"), "true");

        let options = LoadOptions {
            config_path: None,
            env_prefix: test_prefix.to_string(),
            require_file: false,
        };

        let config: TestConfig = load_config_with_options(options).unwrap();
        assert_eq!(config.socket, "npipe:////./pipe/docker");
        assert_eq!(config.attempts, 7);
        assert!(config.nested.enabled);

        env::remove_var(format!("{test_prefix}_SOCKET"));
        env::remove_var(format!("{test_prefix}_ATTEMPTS"));
        env::remove_var(format!("{test_prefix}_NESTED__ENABLED"));
    }

    #[test]
    fn test_file_not_found_when_required() {
        let non_existent_path = PathBuf::from("/non/existent/testcontainers.toml");
        let result: Result<TestConfig, _> = load_from_file(&non_existent_path);

        match result.unwrap_err() {
            ConfigurationError::FileNotFound { path } => {
                assert_eq!(path, "/non/existent/testcontainers.toml");
            }
            other => panic!("expected FileNotFound, got {other}"),
        }
    }
}
