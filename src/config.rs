//! Simulator configuration loaded from TOML.

use embassy_time::Duration;
use log::LevelFilter;
use serde::Deserialize;
use std::path::Path;
use std::str::FromStr;

use crate::simulation::{SampleMode, SimulationSettings};

#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    FileReadError(String),
    ParseError(String),
    ValidationError(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::FileReadError(msg) => write!(f, "Failed to read config file: {}", msg),
            ConfigError::ParseError(msg) => write!(f, "Failed to parse config file: {}", msg),
            ConfigError::ValidationError(msg) => write!(f, "Invalid configuration: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Evaluation and runtime settings. Every key is optional.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct SimulatorConfig {
    /// Number of horizontal strips a run is split into
    pub sub_regions: usize,
    /// Pause between two region tasks, in milliseconds (0 = plain yield)
    pub yield_delay_ms: u64,
    /// Sample columns across the simulation area
    pub columns: usize,
    /// Sample rows across the whole simulation area, shared between strips
    pub rows: usize,
    pub sample_mode: SampleMode,
    /// Log level for this crate: off, error, warn, info, debug or trace
    pub log_level: String,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            sub_regions: 8,
            yield_delay_ms: 6,
            columns: 200,
            rows: 200,
            sample_mode: SampleMode::Both,
            log_level: "info".to_string(),
        }
    }
}

impl SimulatorConfig {
    /// Load and validate configuration from a TOML file.
    pub fn load(config_path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(config_path).map_err(|e| ConfigError::FileReadError(format!("{}: {}", config_path.display(), e)))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: SimulatorConfig = toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate().map_err(ConfigError::ValidationError)?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.sub_regions == 0 {
            return Err("sub-regions must be at least 1".to_string());
        }
        if self.columns == 0 {
            return Err("columns must be at least 1".to_string());
        }
        if self.rows < self.sub_regions {
            return Err(format!("rows ({}) must be at least sub-regions ({})", self.rows, self.sub_regions));
        }
        self.log_filter()?;
        Ok(())
    }

    pub fn log_filter(&self) -> Result<LevelFilter, String> {
        LevelFilter::from_str(&self.log_level).map_err(|_| format!("unknown log level '{}'", self.log_level))
    }

    /// Runtime settings for the simulation task.
    pub fn settings(&self) -> SimulationSettings {
        SimulationSettings {
            sub_regions: self.sub_regions,
            columns: self.columns,
            rows: self.rows,
            sample_mode: self.sample_mode,
            yield_delay: Duration::from_millis(self.yield_delay_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let config = SimulatorConfig::parse("").unwrap();
        assert_eq!(config, SimulatorConfig::default());
        assert_eq!(config.sub_regions, 8);
        assert_eq!(config.yield_delay_ms, 6);
        assert_eq!(config.log_filter().unwrap(), LevelFilter::Info);
    }

    #[test]
    fn keys_are_kebab_case() {
        let config = SimulatorConfig::parse(
            r#"
            sub-regions = 4
            yield-delay-ms = 0
            sample-mode = "coherence"
            log-level = "debug"
            "#,
        )
        .unwrap();
        assert_eq!(config.sub_regions, 4);
        assert_eq!(config.sample_mode, SampleMode::Coherence);
        assert_eq!(config.columns, 200);

        let settings = config.settings();
        assert_eq!(settings.yield_delay, Duration::from_millis(0));
        assert_eq!(settings.sub_regions, 4);
    }

    #[test]
    fn rejects_bad_values() {
        assert!(matches!(SimulatorConfig::parse("sub-regions = 0"), Err(ConfigError::ValidationError(_))));
        assert!(matches!(SimulatorConfig::parse("rows = 2"), Err(ConfigError::ValidationError(_))));
        assert!(matches!(SimulatorConfig::parse("log-level = \"loud\""), Err(ConfigError::ValidationError(_))));
        assert!(matches!(SimulatorConfig::parse("sub-regions = \"many\""), Err(ConfigError::ParseError(_))));
        assert!(matches!(SimulatorConfig::parse("colour = 3"), Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let err = SimulatorConfig::load(Path::new("/nonexistent/simulator.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::FileReadError(_)));
        assert!(err.to_string().starts_with("Failed to read config file"));
    }
}
