//! Structured logging infrastructure.
//!
//! Three ways to run:
//! - stdout only (default), in pretty, compact or JSON format
//! - stdout plus a single JSON log file
//! - multi-stream rolling files: operational (INFO+), diagnostic
//!   (calibration and space internals at DEBUG+) and errors (WARN+)
//!
//! # Component Targets
//!
//! | Target | Description |
//! |--------|-------------|
//! | `bid_optimizer::service` | Bid decisions and feedback handling |
//! | `bid_optimizer::space` | Bucket updates and curve snapshots |
//! | `bid_optimizer::calibration` | Recalibration cycles and learner failures |
//! | `bid_optimizer::ledger` | Request ledger and eviction |
//! | `bid_optimizer::background` | Task lifecycle |
//! | `bid_optimizer::http` | Request handling |
//! | `bid_optimizer::simulation` | Synthetic auction runs |
//!
//! ```bash
//! # Debug only recalibration
//! RUST_LOG=warn,bid_optimizer::calibration=debug cargo run -- run
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Layer;

/// Log output format.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human-readable format with colors
    #[default]
    Pretty,
    /// JSON format (best for log aggregation)
    Json,
    /// Compact single-line format
    Compact,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            "compact" => Ok(Self::Compact),
            other => Err(format!("unknown log format: {other}")),
        }
    }
}

/// Logging configuration (`[logging]` section).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LogConfig {
    /// Base level when `RUST_LOG` is not set
    #[serde(default = "default_level")]
    pub level: String,

    /// Directory for rolling log files (multi-stream mode)
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,

    /// Enable operational/diagnostic/error file streams
    #[serde(default)]
    pub enable_multi_stream: bool,

    /// Enable stdout logging
    #[serde(default = "default_enable_stdout")]
    pub enable_stdout: bool,

    #[serde(default)]
    pub stdout_format: LogFormat,

    /// Single JSON log file; ignored in multi-stream mode
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_file: Option<String>,
}

fn default_level() -> String {
    "info".to_string()
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_enable_stdout() -> bool {
    true
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            log_dir: default_log_dir(),
            enable_multi_stream: false,
            enable_stdout: default_enable_stdout(),
            stdout_format: LogFormat::default(),
            log_file: None,
        }
    }
}

impl LogConfig {
    /// JSON stdout plus rolling files under `log_dir`.
    pub fn production(log_dir: PathBuf) -> Self {
        Self {
            log_dir,
            enable_multi_stream: true,
            stdout_format: LogFormat::Json,
            ..Default::default()
        }
    }

    pub fn with_log_file(log_file: String) -> Self {
        Self {
            log_file: Some(log_file),
            ..Default::default()
        }
    }
}

fn quiet_dependencies(filter: EnvFilter) -> Result<EnvFilter, Box<dyn std::error::Error>> {
    Ok(filter.add_directive("hyper=warn".parse()?))
}

/// Initialize logging based on configuration.
///
/// The returned guards must be kept alive for the duration of the program so
/// file writers flush.
pub fn init_logging(
    config: &LogConfig,
    env_filter_override: Option<&str>,
) -> Result<Vec<WorkerGuard>, Box<dyn std::error::Error>> {
    let mut guards = Vec::new();

    let base_filter = match env_filter_override {
        Some(filter) => EnvFilter::new(filter),
        None => match EnvFilter::try_from_default_env() {
            Ok(filter) => filter,
            Err(_) => quiet_dependencies(EnvFilter::new(&config.level))?,
        },
    };

    if config.enable_multi_stream {
        std::fs::create_dir_all(&config.log_dir)?;

        let operational_appender =
            RollingFileAppender::new(Rotation::DAILY, &config.log_dir, "bid-operational.log");
        let (operational_writer, guard) = tracing_appender::non_blocking(operational_appender);
        guards.push(guard);
        let operational_layer = fmt::layer()
            .with_writer(operational_writer)
            .with_ansi(false)
            .json()
            .with_filter(quiet_dependencies(EnvFilter::new("info"))?);

        let diagnostic_appender =
            RollingFileAppender::new(Rotation::DAILY, &config.log_dir, "bid-diagnostic.log");
        let (diagnostic_writer, guard) = tracing_appender::non_blocking(diagnostic_appender);
        guards.push(guard);
        let diagnostic_layer = fmt::layer()
            .with_writer(diagnostic_writer)
            .with_ansi(false)
            .json()
            .with_filter(EnvFilter::new(format!(
                "{}=debug,{}=debug",
                targets::CALIBRATION,
                targets::SPACE
            )));

        let error_appender =
            RollingFileAppender::new(Rotation::DAILY, &config.log_dir, "bid-errors.log");
        let (error_writer, guard) = tracing_appender::non_blocking(error_appender);
        guards.push(guard);
        let error_layer = fmt::layer()
            .with_writer(error_writer)
            .with_ansi(false)
            .json()
            .with_filter(EnvFilter::new("warn"));

        let registry = tracing_subscriber::registry()
            .with(operational_layer)
            .with(diagnostic_layer)
            .with(error_layer);

        match (config.enable_stdout, config.stdout_format) {
            (false, _) => registry.init(),
            (true, LogFormat::Json) => registry
                .with(fmt::layer().json().with_filter(base_filter))
                .init(),
            (true, LogFormat::Compact) => registry
                .with(fmt::layer().compact().with_filter(base_filter))
                .init(),
            (true, LogFormat::Pretty) => registry
                .with(fmt::layer().with_filter(base_filter))
                .init(),
        }

        eprintln!("Multi-stream logging enabled: {}", config.log_dir.display());
    } else if let Some(ref log_file) = config.log_file {
        // File and stdout share the JSON formatter so the layers type-check together
        let file = std::fs::File::create(log_file)?;
        let file_layer = fmt::layer()
            .with_writer(std::sync::Mutex::new(file))
            .with_ansi(false)
            .json();

        tracing_subscriber::registry()
            .with(base_filter)
            .with(fmt::layer().json())
            .with(file_layer)
            .init();

        eprintln!("Logging to file: {log_file} (JSON)");
    } else {
        match config.stdout_format {
            LogFormat::Json => tracing_subscriber::fmt()
                .with_env_filter(base_filter)
                .json()
                .init(),
            LogFormat::Compact => tracing_subscriber::fmt()
                .with_env_filter(base_filter)
                .compact()
                .init(),
            LogFormat::Pretty => tracing_subscriber::fmt()
                .with_env_filter(base_filter)
                .init(),
        }
    }

    Ok(guards)
}

/// Log target constants for component-specific logging.
///
/// ```ignore
/// tracing::debug!(target: targets::CALIBRATION, level, "Winning curve recalibrated");
/// ```
pub mod targets {
    /// Bid decisions and feedback handling
    pub const SERVICE: &str = "bid_optimizer::service";
    /// Bucket updates and curve snapshots
    pub const SPACE: &str = "bid_optimizer::space";
    /// Recalibration cycles
    pub const CALIBRATION: &str = "bid_optimizer::calibration";
    /// Request ledger
    pub const LEDGER: &str = "bid_optimizer::ledger";
    /// Background task lifecycle
    pub const BACKGROUND: &str = "bid_optimizer::background";
    /// HTTP surface
    pub const HTTP: &str = "bid_optimizer::http";
    /// Offline auction runs
    pub const SIMULATION: &str = "bid_optimizer::simulation";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_config_defaults() {
        let config = LogConfig::default();
        assert_eq!(config.level, "info");
        assert!(!config.enable_multi_stream);
        assert!(config.enable_stdout);
        assert_eq!(config.stdout_format, LogFormat::Pretty);
        assert!(config.log_file.is_none());
    }

    #[test]
    fn test_log_config_production() {
        let config = LogConfig::production(PathBuf::from("/var/log/bids"));
        assert!(config.enable_multi_stream);
        assert_eq!(config.stdout_format, LogFormat::Json);
    }

    #[test]
    fn test_log_format_parse() {
        assert_eq!("JSON".parse::<LogFormat>(), Ok(LogFormat::Json));
        assert_eq!("compact".parse::<LogFormat>(), Ok(LogFormat::Compact));
        assert!("xml".parse::<LogFormat>().is_err());

        let parsed: LogFormat = serde_json::from_str("\"pretty\"").unwrap();
        assert_eq!(parsed, LogFormat::Pretty);
    }

    #[test]
    fn test_dependency_directives_parse() {
        let filter = quiet_dependencies(EnvFilter::new("info")).unwrap().to_string();
        assert!(filter.contains("hyper=warn"));
        assert!(!filter.contains("tower_http"));
    }
}
