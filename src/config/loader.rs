//! Configuration Loader
//!
//! Environment-aware layered loading on top of the `config` crate.

use super::EngineConfig;
use crate::constants::{ENV_NAME_VAR, ENV_PREFIX};
use crate::error::ConfigError;
use config::{Config, Environment, File};
use std::env;
use std::path::Path;
use tracing::debug;

/// Builds an [`EngineConfig`] from defaults, an optional file, and the environment
pub struct ConfigLoader;

impl ConfigLoader {
    /// Defaults overlaid with environment overrides only
    pub fn from_env() -> Result<EngineConfig, ConfigError> {
        Self::build(None)
    }

    /// Defaults, then the file at `path`, then environment overrides
    pub fn from_file(path: impl AsRef<Path>) -> Result<EngineConfig, ConfigError> {
        Self::build(Some(path.as_ref()))
    }

    /// Parse a configuration document held in memory, without environment overrides
    pub fn parse(contents: &str, format: config::FileFormat) -> Result<EngineConfig, ConfigError> {
        let settings = Config::builder()
            .add_source(File::from_str(contents, format))
            .build()?;
        Self::finish(settings)
    }

    /// Current deployment environment name, lowercased
    pub fn detect_environment() -> String {
        env::var(ENV_NAME_VAR)
            .unwrap_or_else(|_| "development".to_string())
            .to_lowercase()
    }

    fn build(path: Option<&Path>) -> Result<EngineConfig, ConfigError> {
        let environment = Self::detect_environment();
        debug!(
            environment = %environment,
            file = ?path.map(|p| p.display().to_string()),
            "Loading engine configuration"
        );

        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }
        let settings = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Self::finish(settings)
    }

    fn finish(settings: Config) -> Result<EngineConfig, ConfigError> {
        let config: EngineConfig = settings.try_deserialize()?;
        config.validate()?;

        debug!(
            profile = %config.engine.profile,
            strategy = %config.engine.strategy,
            profiles = config.profiles.len(),
            "Configuration loaded successfully"
        );
        Ok(config)
    }
}
