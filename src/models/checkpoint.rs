//! Checkpoint document and its fixed schema.
//!
//! A checkpoint on disk is always either absent or a document that passes
//! [`Checkpoint::validate_document`]; the store refuses to write anything else and
//! treats anything else it reads as corruption.

use crate::constants::{CHECKPOINT_REQUIRED_KEYS, CHECKPOINT_SCHEMA_VERSION};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Durable resume point of a batch run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub schema_version: u32,
    /// First index not yet attempted, `max(processed index) + 1`
    pub resume_index: u64,
    pub processed_count: u64,
    pub failed_count: u64,
    pub timestamp: DateTime<Utc>,
    pub metadata: BTreeMap<String, Value>,
}

impl Checkpoint {
    pub fn new(resume_index: u64, processed_count: u64, failed_count: u64) -> Self {
        Self {
            schema_version: CHECKPOINT_SCHEMA_VERSION,
            resume_index,
            processed_count,
            failed_count,
            timestamp: Utc::now(),
            metadata: BTreeMap::new(),
        }
    }

    /// Starting point of a fresh run
    pub fn initial() -> Self {
        Self::new(0, 0, 0)
    }

    pub fn with_metadata(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    /// Validate a typed checkpoint by round-tripping it through the document schema
    pub fn validate(&self) -> Result<(), String> {
        let document = serde_json::to_value(self).map_err(|e| e.to_string())?;
        Self::validate_document(&document)
    }

    /// Parse and validate a raw checkpoint document
    pub fn from_document(document: Value) -> Result<Self, String> {
        Self::validate_document(&document)?;
        serde_json::from_value(document).map_err(|e| e.to_string())
    }

    /// Check a raw document against the fixed checkpoint schema
    pub fn validate_document(document: &Value) -> Result<(), String> {
        let object = document
            .as_object()
            .ok_or_else(|| "checkpoint must be a JSON object".to_string())?;

        let missing: Vec<&str> = CHECKPOINT_REQUIRED_KEYS
            .iter()
            .copied()
            .filter(|key| !object.contains_key(*key))
            .collect();
        if !missing.is_empty() {
            return Err(format!("missing required keys: {}", missing.join(", ")));
        }

        let version = unsigned(object, "schema_version")?;
        if version != u64::from(CHECKPOINT_SCHEMA_VERSION) {
            return Err(format!(
                "unsupported schema_version {version}, expected {CHECKPOINT_SCHEMA_VERSION}"
            ));
        }

        let resume_index = unsigned(object, "resume_index")?;
        let processed = unsigned(object, "processed_count")?;
        let failed = unsigned(object, "failed_count")?;

        if failed > processed {
            return Err(format!(
                "failed_count {failed} exceeds processed_count {processed}"
            ));
        }
        if processed > resume_index {
            return Err(format!(
                "processed_count {processed} exceeds resume_index {resume_index}"
            ));
        }

        match object.get("timestamp") {
            Some(Value::String(raw)) => {
                DateTime::parse_from_rfc3339(raw)
                    .map_err(|e| format!("timestamp is not RFC 3339: {e}"))?;
            }
            _ => return Err("timestamp must be a string".to_string()),
        }

        if !object.get("metadata").is_some_and(Value::is_object) {
            return Err("metadata must be an object".to_string());
        }

        Ok(())
    }
}

fn unsigned(object: &serde_json::Map<String, Value>, key: &str) -> Result<u64, String> {
    match object.get(key) {
        Some(Value::Number(n)) => match (n.as_u64(), n.as_i64()) {
            (Some(v), _) => Ok(v),
            (None, Some(v)) if v < 0 => Err(format!("{key} must be >= 0, got {v}")),
            _ => Err(format!("{key} must be an integer")),
        },
        Some(other) => Err(format!("{key} must be an integer, got {other}")),
        None => Err(format!("missing required key: {key}")),
    }
}
