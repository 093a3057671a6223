//! Settings for coordinators built from configuration.
//!
//! Settings are layered from three sources:
//! 1. Default values (hardcoded)
//! 2. Configuration file (YAML)
//! 3. Environment variables (override)
//!
//! Environment variables take precedence over file values, which take
//! precedence over defaults.
//!
//! # Example
//!
//! ```ignore
//! use coalescer::config::CoalescerSettings;
//!
//! let settings = CoalescerSettings::load("coalescer.yaml")?;
//! let options = settings.batch_options::<u64>();
//! ```

use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;

use coalescer_core::BatchOptions;

use crate::observability::LoggingConfig;

/// Prefix for environment overrides, e.g. `COALESCER_BATCHING__MAX_BATCH_SIZE`.
const ENV_PREFIX: &str = "COALESCER";

/// Top-level settings.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct CoalescerSettings {
    /// Batching behavior of coordinators created from these settings
    #[serde(default)]
    pub batching: BatchingSettings,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingSettings,
}

/// Batching settings.
///
/// ```yaml
/// batching:
///   cache: true
///   max_batch_size: 100
/// ```
///
/// Environment variables:
/// - `COALESCER_BATCHING__CACHE=false` - Disable load memoization
/// - `COALESCER_BATCHING__MAX_BATCH_SIZE=50` - Cap batch size
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct BatchingSettings {
    /// Memoize loads per key
    #[serde(default = "default_true")]
    pub cache: bool,

    /// Maximum items per batch; absent means unbounded
    #[serde(default)]
    pub max_batch_size: Option<usize>,
}

impl Default for BatchingSettings {
    fn default() -> Self {
        Self {
            cache: true,
            max_batch_size: None,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Logging settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct LoggingSettings {
    /// Log level: "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Use JSON format (true for production, false for development)
    #[serde(default)]
    pub json: bool,

    /// Log busy/idle time when each batch dispatch finishes
    #[serde(default)]
    pub span_timings: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
            span_timings: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Error type for settings loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigLoadError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] ConfigError),

    #[error("configuration file not found: {path}")]
    FileNotFound { path: String },

    #[error("invalid configuration: {message}")]
    Invalid { message: String },
}

impl CoalescerSettings {
    /// Load settings from a YAML file with environment variable overrides.
    ///
    /// Environment variables are prefixed with `COALESCER_` and use `__` as
    /// the nested key separator, so `COALESCER_BATCHING__MAX_BATCH_SIZE=10`
    /// overrides `batching.max_batch_size`.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigLoadError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigLoadError::FileNotFound {
                path: path.display().to_string(),
            });
        }

        let config = Config::builder()
            .add_source(Config::try_from(&CoalescerSettings::default())?)
            .add_source(File::from(path).format(FileFormat::Yaml))
            .add_source(environment())
            .build()?;

        let settings: CoalescerSettings = config.try_deserialize()?;
        settings.validate()?;

        Ok(settings)
    }

    /// Load settings from defaults and `COALESCER_` environment variables only.
    pub fn from_env() -> Result<Self, ConfigLoadError> {
        let config = Config::builder()
            .add_source(Config::try_from(&CoalescerSettings::default())?)
            .add_source(environment())
            .build()?;

        let settings: CoalescerSettings = config.try_deserialize()?;
        settings.validate()?;

        Ok(settings)
    }

    /// Validate the settings.
    pub fn validate(&self) -> Result<(), ConfigLoadError> {
        if self.batching.max_batch_size == Some(0) {
            return Err(ConfigLoadError::Invalid {
                message: "batching.max_batch_size must be greater than 0".to_string(),
            });
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(ConfigLoadError::Invalid {
                message: format!(
                    "logging.level must be one of: {:?}, got: {}",
                    valid_levels, self.logging.level
                ),
            });
        }

        Ok(())
    }

    /// Coordinator options with identity cache keys.
    ///
    /// A custom cache key function can be layered on afterwards with
    /// [`BatchOptions::with_cache_key_fn`].
    pub fn batch_options<K>(&self) -> BatchOptions<K>
    where
        K: Clone + 'static,
    {
        let options = BatchOptions::default().with_cache(self.batching.cache);
        match self.batching.max_batch_size {
            Some(max) => options.with_max_batch_size(max),
            None => options.with_unbounded_batches(),
        }
    }

    /// Logging configuration derived from the `logging` section.
    ///
    /// An unparseable level falls back to INFO; `validate` rejects those
    /// before this is reached when settings come from `load` or `from_env`.
    pub fn logging_config(&self) -> LoggingConfig {
        let config = if self.logging.json {
            LoggingConfig::json()
        } else {
            LoggingConfig::text()
        }
        .with_span_timings(self.logging.span_timings);
        match self.logging.level.parse() {
            Ok(level) => config.with_level(level),
            Err(_) => config,
        }
    }
}

fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}
