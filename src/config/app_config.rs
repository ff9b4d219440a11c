use serde::Deserialize;

use crate::domain::experiment::{
    ConversionPolicy, DEFAULT_PLANNED_ANALYSES, DEFAULT_POWER, DEFAULT_SEQUENTIAL_MIN_SAMPLE_SIZE,
    DEFAULT_SIGNIFICANCE_LEVEL,
};
use crate::infrastructure::experiment::{DEFAULT_CREDIBLE_LEVEL, DEFAULT_MIN_SAMPLE_SIZE_PER_VARIANT};
use crate::infrastructure::services::{EngineSettings, DEFAULT_MONITOR_INTERVAL_SECS};

/// Application configuration
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub engine: EngineConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Statistical defaults of the engine
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub significance_level: f64,
    pub power: f64,
    pub min_sample_size_per_variant: u64,
    pub sequential_min_sample_size: u64,
    pub planned_analyses: u32,
    pub credible_level: f64,
    pub conversion_policy: ConversionPolicy,
    /// Period of the interim analysis scheduler
    pub monitor_interval_secs: u64,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            significance_level: DEFAULT_SIGNIFICANCE_LEVEL,
            power: DEFAULT_POWER,
            min_sample_size_per_variant: DEFAULT_MIN_SAMPLE_SIZE_PER_VARIANT,
            sequential_min_sample_size: DEFAULT_SEQUENTIAL_MIN_SAMPLE_SIZE,
            planned_analyses: DEFAULT_PLANNED_ANALYSES,
            credible_level: DEFAULT_CREDIBLE_LEVEL,
            conversion_policy: ConversionPolicy::default(),
            monitor_interval_secs: DEFAULT_MONITOR_INTERVAL_SECS,
        }
    }
}

impl From<EngineConfig> for EngineSettings {
    fn from(config: EngineConfig) -> Self {
        Self {
            default_significance_level: config.significance_level,
            default_power: config.power,
            min_sample_size_per_variant: config.min_sample_size_per_variant,
            sequential_min_sample_size: config.sequential_min_sample_size,
            planned_analyses: config.planned_analyses,
            credible_level: config.credible_level,
            conversion_policy: config.conversion_policy,
            monitor_interval_secs: config.monitor_interval_secs,
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(
                config::Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::{Config, File, FileFormat};

    fn parse(toml: &str) -> AppConfig {
        Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn test_defaults_when_empty() {
        let config = parse("");

        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.format, LogFormat::Pretty);
        assert_eq!(config.engine, EngineConfig::default());
        assert_eq!(config.engine.min_sample_size_per_variant, 30);
        assert_eq!(config.engine.sequential_min_sample_size, 50);
    }

    #[test]
    fn test_partial_engine_section() {
        let config = parse(
            r#"
            [logging]
            level = "debug"
            format = "json"

            [engine]
            significance_level = 0.01
            conversion_policy = "allow_repeated"
            "#,
        );

        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.engine.significance_level, 0.01);
        assert_eq!(config.engine.conversion_policy, ConversionPolicy::AllowRepeated);
        assert_eq!(config.engine.planned_analyses, DEFAULT_PLANNED_ANALYSES);
    }

    #[test]
    fn test_monitor_interval_reaches_settings() {
        let config = parse(
            r#"
            [engine]
            monitor_interval_secs = 120
            "#,
        );

        assert_eq!(EngineSettings::from(config.engine).monitor_interval_secs, 120);
    }

    #[test]
    fn test_engine_settings_from_config() {
        let settings = EngineSettings::from(EngineConfig {
            credible_level: 0.9,
            ..Default::default()
        });

        assert_eq!(settings.credible_level, 0.9);
        assert_eq!(settings.default_significance_level, DEFAULT_SIGNIFICANCE_LEVEL);
        assert_eq!(settings, EngineSettings {
            credible_level: 0.9,
            ..EngineSettings::default()
        });
    }
}
