//! Engine configuration.

use crate::errors::Result;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How the jobs of one step are dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// One job at a time, in row order.
    Sequential,
    /// One task per job.
    #[default]
    Concurrent,
}

/// Which evaluator is used for step conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionSemantics {
    /// Typed evaluation: unknown names and non-boolean logic are errors.
    #[default]
    Strict,
    /// Lenient evaluation: unknown names are null, logic uses truthiness.
    Legacy,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogConfig {
    /// Default filter directive, overridden by `RUST_LOG`.
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// Configuration for the pipeline runner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Job dispatch mode.
    #[serde(default)]
    pub execution_mode: ExecutionMode,
    /// Condition evaluator.
    #[serde(default)]
    pub condition_semantics: ConditionSemantics,
    /// Whether job input and output are checked against component schemas.
    #[serde(default = "default_validate_schemas")]
    pub validate_schemas: bool,
    /// Expiry of persisted trigger memory, in seconds.
    #[serde(default = "default_memory_ttl")]
    pub memory_ttl_seconds: u64,
    /// Key prefix of persisted trigger memory.
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
    /// Index name bound by range iterators without an explicit `index`.
    #[serde(default = "default_range_index")]
    pub default_range_index: String,
    /// Logging.
    #[serde(default)]
    pub log: LogConfig,
}

fn default_validate_schemas() -> bool {
    true
}

fn default_memory_ttl() -> u64 {
    3600
}

fn default_key_prefix() -> String {
    "pipeline_trigger".to_string()
}

fn default_range_index() -> String {
    "i".to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            execution_mode: ExecutionMode::default(),
            condition_semantics: ConditionSemantics::default(),
            validate_schemas: default_validate_schemas(),
            memory_ttl_seconds: default_memory_ttl(),
            key_prefix: default_key_prefix(),
            default_range_index: default_range_index(),
            log: LogConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Creates a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a configuration from JSON. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Loads a configuration from YAML. Missing fields take their defaults.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Sets the dispatch mode.
    #[must_use]
    pub fn with_execution_mode(mut self, mode: ExecutionMode) -> Self {
        self.execution_mode = mode;
        self
    }

    /// Sets the condition evaluator.
    #[must_use]
    pub fn with_condition_semantics(mut self, semantics: ConditionSemantics) -> Self {
        self.condition_semantics = semantics;
        self
    }

    /// Enables or disables schema validation.
    #[must_use]
    pub fn with_schema_validation(mut self, enabled: bool) -> Self {
        self.validate_schemas = enabled;
        self
    }

    /// Sets the trigger memory expiry.
    #[must_use]
    pub fn with_memory_ttl(mut self, ttl: Duration) -> Self {
        self.memory_ttl_seconds = ttl.as_secs();
        self
    }

    /// Sets the trigger memory key prefix.
    #[must_use]
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    /// Gets the trigger memory expiry as a Duration.
    #[must_use]
    pub fn memory_ttl(&self) -> Duration {
        Duration::from_secs(self.memory_ttl_seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.execution_mode, ExecutionMode::Concurrent);
        assert_eq!(config.condition_semantics, ConditionSemantics::Strict);
        assert!(config.validate_schemas);
        assert_eq!(config.memory_ttl(), Duration::from_secs(3600));
        assert_eq!(config.key_prefix, "pipeline_trigger");
        assert_eq!(config.default_range_index, "i");
        assert_eq!(config.log.level, "info");
    }

    #[test]
    fn test_partial_json_takes_defaults() {
        let config = EngineConfig::from_json_str(r#"{"condition_semantics": "legacy"}"#).unwrap();
        assert_eq!(config.condition_semantics, ConditionSemantics::Legacy);
        assert_eq!(config.execution_mode, ExecutionMode::Concurrent);
        assert_eq!(config.memory_ttl_seconds, 3600);
    }

    #[test]
    fn test_yaml() {
        let yaml = "execution_mode: sequential\nvalidate_schemas: false\nlog:\n  json: true\n";
        let config = EngineConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.execution_mode, ExecutionMode::Sequential);
        assert!(!config.validate_schemas);
        assert!(config.log.json);
        assert_eq!(config.log.level, "info");
    }

    #[test]
    fn test_builders() {
        let config = EngineConfig::new()
            .with_execution_mode(ExecutionMode::Sequential)
            .with_memory_ttl(Duration::from_secs(60))
            .with_key_prefix("runs");
        assert_eq!(config.execution_mode, ExecutionMode::Sequential);
        assert_eq!(config.memory_ttl_seconds, 60);
        assert_eq!(config.key_prefix, "runs");
    }
}
