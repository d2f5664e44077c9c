use thiserror::Error;

/// Invalid service or pricing-space configuration.
///
/// Raised at startup, before any pricing space is built.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Invalid level count: {0} (must be >= {min})", min = crate::optimizer::MIN_LEVEL_COUNT)]
    LevelCount(usize),
    #[error("Invalid bucket count: {0} (must be >= {min})", min = crate::optimizer::MIN_BUCKET_COUNT)]
    BucketCount(usize),
    #[error("Invalid window capacity: {0} (must be >= {min})", min = crate::optimizer::MIN_WINDOW_CAPACITY)]
    WindowCapacity(usize),
    #[error("Invalid discount factor: {0} (must be in [0, 1])")]
    Discount(f64),
    #[error("Invalid price range for context {context}: [{min_price}, {max_price}]")]
    PriceRange {
        context: String,
        min_price: f64,
        max_price: f64,
    },
    #[error("Invalid shrink factor: {0} (must be in (0, 1])")]
    ShrinkFactor(f64),
    #[error("Space description file not specified")]
    MissingSpaceDescFile,
    #[error("Duplicate context: {0}")]
    DuplicateContext(String),
}

/// Failure while fitting a calibration model for one level.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TrainingError {
    #[error("Not enough samples to train: {got} (need {need})")]
    InsufficientSamples { got: usize, need: usize },
    #[error("Non-finite feature or label at sample {0}")]
    NonFiniteInput(usize),
    #[error("Model diverged: {0}")]
    Diverged(String),
    #[error("Learner panicked: {0}")]
    Panicked(String),
}

/// Main crate error type
#[derive(Error, Debug)]
pub enum Error {
    /// Startup configuration is invalid
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// No pricing space exists for the requested context
    #[error("Unknown context {0}")]
    UnknownContext(String),

    /// The space guard could not be acquired within the bid deadline
    #[error("Pricing space {context} busy (waited {waited_ms} ms)")]
    SpaceBusy { context: String, waited_ms: u64 },

    /// Calibration fit failed
    #[error("Training error: {0}")]
    Training(#[from] TrainingError),

    /// Reading a configuration or context file failed
    #[error("IO error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// JSON parse error
    #[error("Json parse error: {0}")]
    JsonParse(String),

    /// TOML parse error
    #[error("Toml parse error: {0}")]
    TomlParse(String),
}

impl Error {
    /// Create an IO error tagged with the offending path
    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a JSON parse error
    pub fn json_parse(msg: impl Into<String>) -> Self {
        Error::JsonParse(msg.into())
    }

    /// Create a TOML parse error
    pub fn toml_parse(msg: impl Into<String>) -> Self {
        Error::TomlParse(msg.into())
    }

    /// Whether the caller may simply retry later.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::SpaceBusy { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_messages() {
        assert_eq!(
            ConfigError::BucketCount(3).to_string(),
            "Invalid bucket count: 3 (must be >= 5)"
        );
        assert_eq!(
            ConfigError::Discount(1.5).to_string(),
            "Invalid discount factor: 1.5 (must be in [0, 1])"
        );
    }

    #[test]
    fn test_error_from_config() {
        let err: Error = ConfigError::LevelCount(0).into();
        assert!(matches!(err, Error::Config(ConfigError::LevelCount(0))));
        assert!(!err.is_transient());
    }

    #[test]
    fn test_space_busy_is_transient() {
        let err = Error::SpaceBusy {
            context: "ctx".to_string(),
            waited_ms: 50,
        };
        assert!(err.is_transient());
        assert_eq!(err.to_string(), "Pricing space ctx busy (waited 50 ms)");
    }
}
