//! # Configuration Resolver
//!
//! Turns a named catalog entry into a [`JobProfile`] whose validation constraints
//! are satisfiable by its own generation parameters.
//!
//! Resolution fails closed. A missing field is an error rather than a default, and
//! every cross-check violation is reported at once so an operator can fix a profile
//! in one pass. Successful resolutions are cached; resolving the same name twice
//! yields the same profile.

use super::profile::{
    GenerationParameters, JobProfile, OutputFormat, RawProfile, ValidationConstraints,
};
use crate::error::ConfigError;
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Resolves and caches job profiles from a profile catalog
#[derive(Debug)]
pub struct ConfigurationResolver {
    catalog: BTreeMap<String, RawProfile>,
    resolved: DashMap<String, Arc<JobProfile>>,
}

impl ConfigurationResolver {
    pub fn new(catalog: BTreeMap<String, RawProfile>) -> Self {
        Self {
            catalog,
            resolved: DashMap::new(),
        }
    }

    pub fn profile_names(&self) -> Vec<&str> {
        self.catalog.keys().map(String::as_str).collect()
    }

    /// Resolve `name` into a consistent, immutable profile
    pub fn resolve(&self, name: &str) -> Result<Arc<JobProfile>, ConfigError> {
        if let Some(profile) = self.resolved.get(name) {
            debug!(profile = name, "Returning cached profile");
            return Ok(Arc::clone(profile.value()));
        }

        let profile = self.parse(name)?;
        let violations = Self::consistency_violations(&profile);
        if !violations.is_empty() {
            return Err(ConfigError::Inconsistent {
                profile: name.to_string(),
                violations,
            });
        }

        let profile = Arc::new(profile);
        self.resolved.insert(name.to_string(), Arc::clone(&profile));

        info!(
            profile = name,
            model = %profile.generation.model,
            max_units = profile.generation.max_units,
            "✅ Profile resolved"
        );
        Ok(profile)
    }

    /// Read every required field without cross-checking
    pub fn parse(&self, name: &str) -> Result<JobProfile, ConfigError> {
        let raw = self
            .catalog
            .get(name)
            .ok_or_else(|| ConfigError::UnknownProfile(name.to_string()))?;

        let generation = raw
            .generation
            .as_ref()
            .ok_or_else(|| ConfigError::missing(name, "generation"))?;
        let constraints = raw
            .constraints
            .as_ref()
            .ok_or_else(|| ConfigError::missing(name, "constraints"))?;

        let model = generation
            .model
            .clone()
            .ok_or_else(|| ConfigError::missing(name, "generation.model"))?;
        if model.trim().is_empty() {
            return Err(ConfigError::invalid_value(
                name,
                "generation.model",
                "must not be empty",
            ));
        }

        let temperature = generation
            .temperature
            .ok_or_else(|| ConfigError::missing(name, "generation.temperature"))?;
        if !(0.0..=2.0).contains(&temperature) {
            return Err(ConfigError::invalid_value(
                name,
                "generation.temperature",
                format!("must be within 0.0..=2.0, got {temperature}"),
            ));
        }

        let max_tokens = generation
            .max_tokens
            .ok_or_else(|| ConfigError::missing(name, "generation.max_tokens"))?;
        if max_tokens == 0 {
            return Err(ConfigError::invalid_value(
                name,
                "generation.max_tokens",
                "must be greater than 0",
            ));
        }

        let generation = GenerationParameters {
            model,
            temperature,
            max_tokens,
            min_units: generation
                .min_units
                .ok_or_else(|| ConfigError::missing(name, "generation.min_units"))?,
            max_units: generation
                .max_units
                .ok_or_else(|| ConfigError::missing(name, "generation.max_units"))?,
            output_format: generation
                .output_format
                .ok_or_else(|| ConfigError::missing(name, "generation.output_format"))?,
            extra: generation.extra.clone(),
        };

        let constraints = ValidationConstraints {
            min_units: constraints
                .min_units
                .ok_or_else(|| ConfigError::missing(name, "constraints.min_units"))?,
            max_units: constraints
                .max_units
                .ok_or_else(|| ConfigError::missing(name, "constraints.max_units"))?,
            required_fields: constraints.required_fields.clone(),
            max_output_chars: constraints.max_output_chars,
        };

        Ok(JobProfile {
            name: name.to_string(),
            generation,
            constraints,
        })
    }

    /// Every way the generator could produce output the validator must reject
    pub fn consistency_violations(profile: &JobProfile) -> Vec<String> {
        let g = &profile.generation;
        let c = &profile.constraints;
        let mut violations = Vec::new();

        if g.min_units > g.max_units {
            violations.push(format!(
                "generation.min_units ({}) exceeds generation.max_units ({})",
                g.min_units, g.max_units
            ));
        }
        if c.min_units > c.max_units {
            violations.push(format!(
                "constraints.min_units ({}) exceeds constraints.max_units ({})",
                c.min_units, c.max_units
            ));
        }
        if g.max_units > c.max_units {
            violations.push(format!(
                "generator may produce up to {} units but validator accepts at most {}",
                g.max_units, c.max_units
            ));
        }
        if g.min_units < c.min_units {
            violations.push(format!(
                "generator may produce as few as {} units but validator requires at least {}",
                g.min_units, c.min_units
            ));
        }
        if !c.required_fields.is_empty() && g.output_format != OutputFormat::Json {
            violations.push(format!(
                "required_fields need json output but generator emits {}",
                g.output_format
            ));
        }
        if c.max_output_chars == Some(0) {
            violations.push("constraints.max_output_chars must be positive".to_string());
        }

        violations
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::profile::{RawConstraints, RawGeneration};

    fn raw(gen_max: u32, constraint_max: u32) -> RawProfile {
        RawProfile {
            generation: Some(RawGeneration {
                model: Some("writer-small".to_string()),
                temperature: Some(0.3),
                max_tokens: Some(512),
                min_units: Some(1),
                max_units: Some(gen_max),
                output_format: Some(OutputFormat::Json),
                extra: BTreeMap::new(),
            }),
            constraints: Some(RawConstraints {
                min_units: Some(1),
                max_units: Some(constraint_max),
                required_fields: vec!["items".to_string()],
                max_output_chars: None,
            }),
        }
    }

    fn resolver(entries: Vec<(&str, RawProfile)>) -> ConfigurationResolver {
        ConfigurationResolver::new(
            entries
                .into_iter()
                .map(|(name, profile)| (name.to_string(), profile))
                .collect(),
        )
    }

    #[test]
    fn test_consistent_profile_resolves_and_is_cached() {
        let resolver = resolver(vec![("summaries", raw(8, 8))]);
        let first = resolver.resolve("summaries").unwrap();
        let second = resolver.resolve("summaries").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.generation.max_units, 8);
    }

    #[test]
    fn test_cache_is_shared_across_threads() {
        let resolver = Arc::new(resolver(vec![("summaries", raw(4, 8))]));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let resolver = Arc::clone(&resolver);
                std::thread::spawn(move || resolver.resolve("summaries").unwrap())
            })
            .collect();
        let profiles: Vec<Arc<JobProfile>> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        let cached = resolver.resolve("summaries").unwrap();
        assert!(profiles.iter().all(|p| p.generation == cached.generation));
        assert_eq!(resolver.resolved.len(), 1);
    }

    #[test]
    fn test_generator_exceeding_validator_is_inconsistent() {
        let resolver = resolver(vec![("loose", raw(10, 5))]);
        let err = resolver.resolve("loose").unwrap_err();
        match err {
            ConfigError::Inconsistent { profile, violations } => {
                assert_eq!(profile, "loose");
                assert_eq!(violations.len(), 1);
                assert!(violations[0].contains("up to 10 units"));
            }
            other => panic!("expected Inconsistent, got {other:?}"),
        }
    }

    #[test]
    fn test_resolution_is_deterministic() {
        let resolver = resolver(vec![("loose", raw(10, 5))]);
        let first = resolver.resolve("loose").unwrap_err().to_string();
        let second = resolver.resolve("loose").unwrap_err().to_string();
        assert_eq!(first, second);
    }

    #[test]
    fn test_missing_fields_fail_closed() {
        let mut profile = raw(5, 5);
        if let Some(generation) = profile.generation.as_mut() {
            generation.max_units = None;
        }
        let resolver = resolver(vec![("partial", profile)]);
        assert!(matches!(
            resolver.resolve("partial"),
            Err(ConfigError::MissingField { ref field, .. }) if field == "generation.max_units"
        ));

        let resolver = self::resolver(vec![("bare", RawProfile::default())]);
        assert!(matches!(
            resolver.resolve("bare"),
            Err(ConfigError::MissingField { ref field, .. }) if field == "generation"
        ));
    }

    #[test]
    fn test_unknown_profile() {
        let resolver = resolver(vec![]);
        assert!(matches!(
            resolver.resolve("nope"),
            Err(ConfigError::UnknownProfile(_))
        ));
    }

    #[test]
    fn test_every_violation_is_collected() {
        let mut profile = raw(10, 5);
        if let Some(generation) = profile.generation.as_mut() {
            generation.output_format = Some(OutputFormat::Text);
        }
        let resolver = resolver(vec![("broken", profile)]);
        match resolver.resolve("broken").unwrap_err() {
            ConfigError::Inconsistent { violations, .. } => assert_eq!(violations.len(), 2),
            other => panic!("expected Inconsistent, got {other:?}"),
        }
    }
}
