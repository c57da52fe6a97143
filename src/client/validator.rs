//! Default output validator driven entirely by [`ValidationConstraints`].
//!
//! A "unit" is one element of the generated result: a non-empty line of text
//! output, or one entry of a JSON array (either the top-level array or the `items`
//! array of a top-level object).

use super::traits::{OutputValidator, ValidationOutcome};
use crate::config::{OutputFormat, ValidationConstraints};
use serde_json::Value;

/// Key holding the unit array inside object-shaped JSON output
pub const ITEMS_KEY: &str = "items";

/// Check that `content` has the shape `format` promises
pub fn check_format(content: &Value, format: OutputFormat) -> Result<(), String> {
    match (format, content) {
        (OutputFormat::Json, Value::Object(_) | Value::Array(_)) => Ok(()),
        (OutputFormat::Json, other) => Err(format!(
            "expected a JSON object or array, got {}",
            type_name(other)
        )),
        (OutputFormat::Text, Value::String(_)) => Ok(()),
        (OutputFormat::Text, other) => Err(format!("expected text, got {}", type_name(other))),
    }
}

/// Number of units in `content`
pub fn count_units(content: &Value) -> usize {
    match content {
        Value::String(text) => text.lines().filter(|l| !l.trim().is_empty()).count(),
        Value::Array(items) => items.len(),
        Value::Object(map) => match map.get(ITEMS_KEY) {
            Some(Value::Array(items)) => items.len(),
            _ => 1,
        },
        Value::Null => 0,
        _ => 1,
    }
}

/// Unit count clamped to the `u32` range used by constraints
fn units_as_u32(count: usize) -> u32 {
    u32::try_from(count).unwrap_or(u32::MAX)
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Validator enforcing unit bounds, required fields, and output length
#[derive(Debug, Clone, Copy, Default)]
pub struct ConstraintValidator;

impl OutputValidator for ConstraintValidator {
    fn validate(&self, output: &Value, constraints: &ValidationConstraints) -> ValidationOutcome {
        let mut reasons = Vec::new();

        let units = units_as_u32(count_units(output));
        if units < constraints.min_units {
            reasons.push(format!(
                "expected at least {} units, got {units}",
                constraints.min_units
            ));
        }
        if units > constraints.max_units {
            reasons.push(format!(
                "expected at most {} units, got {units}",
                constraints.max_units
            ));
        }

        if !constraints.required_fields.is_empty() {
            match output.as_object() {
                Some(object) => {
                    for field in &constraints.required_fields {
                        if !object.contains_key(field) {
                            reasons.push(format!("missing required field '{field}'"));
                        }
                    }
                }
                None => reasons.push("required fields need an object output".to_string()),
            }
        }

        if let Some(limit) = constraints.max_output_chars {
            let length = match output {
                Value::String(text) => text.chars().count(),
                other => other.to_string().chars().count(),
            };
            if length > limit {
                reasons.push(format!("output has {length} characters, limit is {limit}"));
            }
        }

        if reasons.is_empty() {
            ValidationOutcome::Valid
        } else {
            ValidationOutcome::Invalid { reasons }
        }
    }
}
