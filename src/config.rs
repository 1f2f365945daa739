use crate::error::{PipelineError, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;

#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub ingestion: IngestionConfig,
    #[serde(default)]
    pub sources: HashMap<String, SourceConfig>,
}

#[derive(Debug, Deserialize)]
pub struct IngestionConfig {
    /// How far ahead of "now" the fetch window extends.
    #[serde(default = "default_lookahead_days")]
    pub lookahead_days: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    #[serde(default = "default_calls_per_minute")]
    pub calls_per_minute: usize,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    pub base_url: Option<String>,
}

fn default_lookahead_days() -> i64 {
    30
}

fn default_calls_per_minute() -> usize {
    30
}

fn default_timeout_seconds() -> u64 {
    30
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            lookahead_days: default_lookahead_days(),
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            calls_per_minute: default_calls_per_minute(),
            timeout_seconds: default_timeout_seconds(),
            base_url: None,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from("config.toml")
    }

    pub fn load_from(config_path: &str) -> Result<Self> {
        let config_content = fs::read_to_string(config_path).map_err(|e| {
            PipelineError::Config(format!("Failed to read config file '{config_path}': {e}"))
        })?;

        let config: Config = toml::from_str(&config_content)?;
        Ok(config)
    }

    /// Per-source settings, falling back to defaults for unconfigured sources.
    pub fn source(&self, name: &str) -> SourceConfig {
        self.sources.get(name).cloned().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_source_sections() {
        let raw = r#"
            [ingestion]
            lookahead_days = 14

            [sources.meetup]
            calls_per_minute = 30
            timeout_seconds = 10

            [sources.eventbrite]
            calls_per_minute = 60
        "#;
        let config: Config = toml::from_str(raw).unwrap();
        assert_eq!(config.ingestion.lookahead_days, 14);
        assert_eq!(config.source("meetup").calls_per_minute, 30);
        assert_eq!(config.source("meetup").timeout_seconds, 10);
        assert_eq!(config.source("eventbrite").calls_per_minute, 60);
        // Unconfigured sources fall back to defaults
        assert_eq!(config.source("techcrunch").calls_per_minute, 30);
    }

    #[test]
    fn loads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[sources.meetup]\ncalls_per_minute = 5\n").unwrap();

        let config = Config::load_from(path.to_str().unwrap()).unwrap();
        assert_eq!(config.source("meetup").calls_per_minute, 5);
        assert_eq!(config.ingestion.lookahead_days, 30);
    }

    #[test]
    fn missing_file_is_a_config_error() {
        let err = Config::load_from("/nonexistent/config.toml").unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
    }
}
