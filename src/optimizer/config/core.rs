//! Service configuration sections.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::contexts::SpaceDescription;
use crate::errors::{ConfigError, Error, Result};
use crate::optimizer::calibration::{LearnerKind, MIN_SAMPLES_FOR_RECALIBRATION};
use crate::optimizer::infra::logging::LogConfig;
use crate::optimizer::{MIN_BUCKET_COUNT, MIN_LEVEL_COUNT, MIN_WINDOW_CAPACITY};

/// Top-level service configuration (TOML).
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ServiceConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub space: SpaceConfig,
    #[serde(default)]
    pub optimizer: OptimizerConfig,
    #[serde(default)]
    pub recalibration: RecalibrationConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub contexts: ContextsConfig,
    #[serde(default)]
    pub logging: LogConfig,
}

impl ServiceConfig {
    /// Read `path`, falling back to defaults when the file does not exist.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let content =
            std::fs::read_to_string(path).map_err(|e| Error::io(path.display().to_string(), e))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::toml_parse(e.to_string()))
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::toml_parse(e.to_string()))
    }

    /// Check every section that has constraints.
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        self.space.validate()?;
        self.optimizer.validate()
    }

    /// Sample configuration with one inline context, used by `generate-config`.
    pub fn sample() -> Self {
        Self {
            contexts: ContextsConfig {
                spaces: vec![SpaceDescription {
                    context_hash: "default_ctx".to_string(),
                    min_price: Some(0.0),
                    max_price: Some(1.0),
                }],
                ..Default::default()
            },
            ..Default::default()
        }
    }
}

/// HTTP listener settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Shape of every pricing space's bucket grid.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SpaceConfig {
    /// Levels per space (distinct skews)
    pub level_count: usize,
    /// Buckets per level
    pub bucket_count: usize,
    /// Outcomes kept in each bucket's window
    pub window_capacity: usize,
    /// Exponential discount of the smoothed estimate, in [0, 1]
    pub discount: f64,
}

impl Default for SpaceConfig {
    fn default() -> Self {
        Self {
            level_count: 3,
            bucket_count: 10,
            window_capacity: 100,
            discount: 0.9,
        }
    }
}

impl SpaceConfig {
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.level_count < MIN_LEVEL_COUNT {
            return Err(ConfigError::LevelCount(self.level_count));
        }
        if self.bucket_count < MIN_BUCKET_COUNT {
            return Err(ConfigError::BucketCount(self.bucket_count));
        }
        if self.window_capacity < MIN_WINDOW_CAPACITY {
            return Err(ConfigError::WindowCapacity(self.window_capacity));
        }
        if !(0.0..=1.0).contains(&self.discount) {
            return Err(ConfigError::Discount(self.discount));
        }
        Ok(())
    }
}

/// Bid-time pricing settings.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct OptimizerConfig {
    /// Multiplier applied to the requested price
    pub shrink_factor: f64,
    /// Attempts per request id that are always reported as exploration
    pub exploration_rounds: u32,
    /// Upper bound on waiting for a space guard during feedback (ms)
    pub bid_timeout_ms: u64,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            shrink_factor: 0.9,
            exploration_rounds: 3,
            bid_timeout_ms: 50,
        }
    }
}

impl OptimizerConfig {
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if !(self.shrink_factor > 0.0 && self.shrink_factor <= 1.0) {
            return Err(ConfigError::ShrinkFactor(self.shrink_factor));
        }
        Ok(())
    }

    pub fn bid_timeout(&self) -> Duration {
        Duration::from_millis(self.bid_timeout_ms)
    }
}

/// Background recalibration settings.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RecalibrationConfig {
    pub interval_secs: u64,
    pub min_samples: usize,
    pub learner: LearnerKind,
}

impl Default for RecalibrationConfig {
    fn default() -> Self {
        Self {
            interval_secs: 60,
            min_samples: MIN_SAMPLES_FOR_RECALIBRATION,
            learner: LearnerKind::default(),
        }
    }
}

impl RecalibrationConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }
}

/// Request ledger retention.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Entries idle longer than this are evicted
    pub retention_secs: u64,
    pub sweep_interval_secs: u64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            retention_secs: 600,
            sweep_interval_secs: 60,
        }
    }
}

impl LedgerConfig {
    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

/// Where pricing contexts come from.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ContextsConfig {
    /// JSON list of `{context_hash, range: [min, max]}`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ranges_file: Option<PathBuf>,
    /// JSON list of space descriptions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub space_desc_file: Option<PathBuf>,
    /// Inline space descriptions, used when no file is given
    #[serde(default)]
    pub spaces: Vec<SpaceDescription>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let cfg = ServiceConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.optimizer.shrink_factor, 0.9);
        assert_eq!(cfg.optimizer.exploration_rounds, 3);
        assert_eq!(cfg.recalibration.interval(), Duration::from_secs(60));
        assert_eq!(cfg.recalibration.min_samples, 10);
        assert_eq!(cfg.server.bind_addr(), "127.0.0.1:8000");
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let cfg = ServiceConfig::from_toml(
            r#"
            [space]
            level_count = 5
            bucket_count = 20
            window_capacity = 50
            discount = 0.95

            [recalibration]
            interval_secs = 30
            min_samples = 10
            learner = "logistic"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.space.level_count, 5);
        assert_eq!(cfg.recalibration.learner, LearnerKind::Logistic);
        assert_eq!(cfg.ledger, LedgerConfig::default());
        assert_eq!(cfg.optimizer, OptimizerConfig::default());
    }

    #[test]
    fn test_single_key_sections_fill_remaining_fields() {
        let cfg = ServiceConfig::from_toml("[space]\nlevel_count = 5\n").unwrap();
        assert_eq!(
            cfg.space,
            SpaceConfig {
                level_count: 5,
                ..SpaceConfig::default()
            }
        );

        let cfg = ServiceConfig::from_toml("[server]\nport = 9000\n").unwrap();
        assert_eq!(cfg.server.bind_addr(), "127.0.0.1:9000");

        let cfg = ServiceConfig::from_toml("[optimizer]\nshrink_factor = 0.8\n").unwrap();
        assert_eq!(cfg.optimizer.shrink_factor, 0.8);
        assert_eq!(cfg.optimizer.exploration_rounds, 3);
        assert_eq!(cfg.optimizer.bid_timeout_ms, 50);

        let cfg = ServiceConfig::from_toml(
            "[recalibration]\nlearner = \"logistic\"\n\n[ledger]\nretention_secs = 30\n",
        )
        .unwrap();
        assert_eq!(cfg.recalibration.interval_secs, 60);
        assert_eq!(cfg.recalibration.learner, LearnerKind::Logistic);
        assert_eq!(cfg.ledger.retention(), Duration::from_secs(30));
        assert_eq!(cfg.ledger.sweep_interval_secs, 60);
    }

    #[test]
    fn test_sample_round_trips_through_toml() {
        let text = ServiceConfig::sample().to_toml().unwrap();
        let parsed = ServiceConfig::from_toml(&text).unwrap();
        assert_eq!(parsed.contexts.spaces.len(), 1);
        assert_eq!(parsed.contexts.spaces[0].context_hash, "default_ctx");
        assert_eq!(parsed.space, SpaceConfig::default());
    }

    #[test]
    fn test_validation_errors() {
        let mut cfg = ServiceConfig::default();
        cfg.space.window_capacity = 5;
        assert_eq!(cfg.validate(), Err(ConfigError::WindowCapacity(5)));

        let mut cfg = ServiceConfig::default();
        cfg.space.discount = 1.01;
        assert_eq!(cfg.validate(), Err(ConfigError::Discount(1.01)));

        let mut cfg = ServiceConfig::default();
        cfg.optimizer.shrink_factor = 0.0;
        assert_eq!(cfg.validate(), Err(ConfigError::ShrinkFactor(0.0)));
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let cfg = ServiceConfig::load("/definitely/not/here.toml").unwrap();
        assert_eq!(cfg.space, SpaceConfig::default());
    }

    #[test]
    fn test_bad_toml_is_error() {
        assert!(matches!(
            ServiceConfig::from_toml("[space\nlevel_count = "),
            Err(Error::TomlParse(_))
        ));
    }
}
