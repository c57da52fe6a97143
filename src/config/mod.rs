//! # Engine Configuration
//!
//! Typed configuration for a batch run, loaded in layers by [`ConfigLoader`]:
//! built-in defaults, then an optional TOML/YAML/JSON file, then
//! `BATCH_ENGINE__<SECTION>__<KEY>` environment overrides.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use batch_engine::config::ConfigLoader;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ConfigLoader::from_file("config/batch-engine.toml")?;
//!
//! let timeout = config.engine.transform_timeout();
//! let log_path = &config.paths.record_log;
//! # Ok(())
//! # }
//! ```
//!
//! Job profiles live in the `profiles` table and are resolved separately by
//! [`ConfigurationResolver`], which fails closed on missing or inconsistent fields.

pub mod loader;
pub mod profile;
pub mod resolver;

pub use loader::ConfigLoader;
pub use profile::{
    GenerationParameters, JobProfile, OutputFormat, RawConstraints, RawGeneration, RawProfile,
    ValidationConstraints,
};
pub use resolver::ConfigurationResolver;

use crate::constants::paths;
use crate::cost::CostMode;
use crate::error::ConfigError;
use crate::orchestration::strategy::StrategyKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration of a batch run
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct EngineConfig {
    pub engine: EngineSettings,

    /// Locations of the record log, checkpoint, and progress file
    pub paths: PathsConfig,

    pub backoff: BackoffConfig,

    pub retry: RetryConfig,

    pub preflight: PreflightConfig,

    /// Cost tracking policy and optional budget ceiling
    pub cost: CostConfig,

    pub logging: LoggingConfig,

    /// Catalog of named job profiles
    pub profiles: BTreeMap<String, RawProfile>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Profile resolved for this run
    pub profile: String,
    pub strategy: StrategyKind,
    pub transform_timeout_ms: u64,
    /// Free-form label stamped into checkpoint metadata
    pub run_label: Option<String>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            profile: "default".to_string(),
            strategy: StrategyKind::Standard,
            transform_timeout_ms: 60_000,
            run_label: None,
        }
    }
}

impl EngineSettings {
    pub fn transform_timeout(&self) -> Duration {
        Duration::from_millis(self.transform_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct PathsConfig {
    pub record_log: PathBuf,
    pub checkpoint: PathBuf,
    pub progress: PathBuf,
    /// Timestamped checkpoint backups kept next to the checkpoint (0 disables backups)
    pub checkpoint_backups: usize,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            record_log: PathBuf::from(paths::RECORD_LOG),
            checkpoint: PathBuf::from(paths::CHECKPOINT),
            progress: PathBuf::from(paths::PROGRESS),
            checkpoint_backups: 3,
        }
    }
}

impl PathsConfig {
    /// Place all three artifacts under `dir`, keeping their default file names
    pub fn rooted_at(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        Self {
            record_log: dir.join("results.jsonl"),
            checkpoint: dir.join("checkpoint.json"),
            progress: dir.join("progress.json"),
            ..Self::default()
        }
    }
}

/// Backoff between retries of a failed transform call
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct BackoffConfig {
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
    /// Fraction of each delay added as random jitter
    pub jitter_factor: f64,
    pub rate_limit_floor_ms: u64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 1_000,
            max_delay_ms: 60_000,
            multiplier: 2.0,
            jitter_factor: 0.1,
            rate_limit_floor_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Replaces the strategy's attempt budget when set
    pub max_attempts_override: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct PreflightConfig {
    /// Spend one external call verifying the service before the run
    pub round_trip: bool,
    pub probe_payload: serde_json::Value,
}

impl Default for PreflightConfig {
    fn default() -> Self {
        Self {
            round_trip: true,
            probe_payload: serde_json::Value::String("preflight probe".to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CostConfig {
    pub mode: CostMode,
    /// Batch size at which `auto` mode switches from full to minimal tracking
    pub threshold: u64,
    pub price_per_1k_tokens: f64,
    /// Pause the run once estimated spend reaches this amount
    pub budget_limit: Option<f64>,
}

impl Default for CostConfig {
    fn default() -> Self {
        Self {
            mode: CostMode::Auto,
            threshold: 1_000,
            price_per_1k_tokens: 0.002,
            budget_limit: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Directory for JSON log files; console only when unset
    pub directory: Option<PathBuf>,
}

impl EngineConfig {
    /// Reject settings that cannot drive a run
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.engine.profile.trim().is_empty() {
            return Err(ConfigError::invalid_setting(
                "engine.profile",
                "profile name must not be empty",
            ));
        }

        if self.engine.transform_timeout_ms == 0 {
            return Err(ConfigError::invalid_setting(
                "engine.transform_timeout_ms",
                "timeout must be greater than 0",
            ));
        }

        if self.backoff.multiplier < 1.0 {
            return Err(ConfigError::invalid_setting(
                "backoff.multiplier",
                format!("must be at least 1.0, got {}", self.backoff.multiplier),
            ));
        }

        if !(0.0..=1.0).contains(&self.backoff.jitter_factor) {
            return Err(ConfigError::invalid_setting(
                "backoff.jitter_factor",
                format!("must be within 0.0..=1.0, got {}", self.backoff.jitter_factor),
            ));
        }

        if self.backoff.base_delay_ms > self.backoff.max_delay_ms {
            return Err(ConfigError::invalid_setting(
                "backoff.base_delay_ms",
                "base delay exceeds max delay",
            ));
        }

        if self.retry.max_attempts_override == Some(0) {
            return Err(ConfigError::invalid_setting(
                "retry.max_attempts_override",
                "at least one attempt is required",
            ));
        }

        if self.cost.price_per_1k_tokens < 0.0 {
            return Err(ConfigError::invalid_setting(
                "cost.price_per_1k_tokens",
                "price must not be negative",
            ));
        }

        if let Some(limit) = self.cost.budget_limit {
            if limit <= 0.0 {
                return Err(ConfigError::invalid_setting(
                    "cost.budget_limit",
                    "budget must be positive when set",
                ));
            }
        }

        let distinct = [
            &self.paths.record_log,
            &self.paths.checkpoint,
            &self.paths.progress,
        ];
        if distinct[0] == distinct[1] || distinct[0] == distinct[2] || distinct[1] == distinct[2] {
            return Err(ConfigError::invalid_setting(
                "paths",
                "record log, checkpoint, and progress file must be distinct",
            ));
        }

        Ok(())
    }
}
