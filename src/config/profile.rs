//! Job profiles: raw catalog entries and their resolved, immutable form.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Shape the generator is instructed to produce
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    Json,
    Text,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json => write!(f, "json"),
            Self::Text => write!(f, "text"),
        }
    }
}

/// Catalog entry as written in configuration. Every field is optional here so that
/// resolution can report exactly which one is missing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawProfile {
    pub generation: Option<RawGeneration>,
    pub constraints: Option<RawConstraints>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawGeneration {
    pub model: Option<String>,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
    pub min_units: Option<u32>,
    pub max_units: Option<u32>,
    pub output_format: Option<OutputFormat>,
    pub extra: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawConstraints {
    pub min_units: Option<u32>,
    pub max_units: Option<u32>,
    pub required_fields: Vec<String>,
    pub max_output_chars: Option<usize>,
}

/// Instructions handed to the external transform
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationParameters {
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
    /// Fewest units the generator is asked to produce
    pub min_units: u32,
    /// Most units the generator is asked to produce
    pub max_units: u32,
    pub output_format: OutputFormat,
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// What the validator accepts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationConstraints {
    pub min_units: u32,
    pub max_units: u32,
    /// Top-level keys every JSON output must carry
    pub required_fields: Vec<String>,
    pub max_output_chars: Option<usize>,
}

/// A resolved profile whose constraints are satisfiable by its own parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobProfile {
    pub name: String,
    pub generation: GenerationParameters,
    pub constraints: ValidationConstraints,
}
