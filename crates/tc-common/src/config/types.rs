//! Shared configuration sections

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (json, pretty, compact)
    pub format: String,

    /// Whether to log to stdout
    pub stdout: bool,

    /// Additional log targets and their levels
    pub targets: HashMap<String, String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "compact".to_string(),
            stdout: true,
            targets: HashMap::new(),
        }
    }
}

impl LoggingConfig {
    /// Render the level plus per-target overrides as an EnvFilter directive
    pub fn filter_directives(&self) -> String {
        let mut directives = vec![self.level.clone()];
        for (target, level) in &self.targets {
            directives.push(format!("{target}={level}"));
        }
        directives.join(",")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_directives() {
        let mut config = LoggingConfig::default();
        config.targets.insert("bollard".to_string(), "warn".to_string());

        let directives = config.filter_directives();
        assert!(directives.starts_with("info"));
        assert!(directives.contains("bollard=warn"));
    }
}
