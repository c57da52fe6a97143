//! # Collaborator Traits
//!
//! Seams between the engine and the outside world. Applications implement these to
//! plug in the generation service, the acceptability check, and the input source.

use crate::config::{GenerationParameters, ValidationConstraints};
use crate::error::TransformError;
use crate::models::WorkItem;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io;

/// Token accounting reported by the generation service
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

impl TokenUsage {
    pub fn total(&self) -> u64 {
        self.prompt_tokens + self.completion_tokens
    }
}

/// Raw output of one transform call
#[derive(Debug, Clone, PartialEq)]
pub struct TransformOutput {
    pub content: Value,
    pub usage: Option<TokenUsage>,
}

impl TransformOutput {
    pub fn new(content: Value) -> Self {
        Self {
            content,
            usage: None,
        }
    }

    pub fn with_usage(mut self, usage: TokenUsage) -> Self {
        self.usage = Some(usage);
        self
    }
}

/// The external text-generation service
///
/// Implementations should report service failures through the typed
/// [`TransformError`] variants where they can tell them apart, and fall back to
/// [`TransformError::Other`] otherwise; the engine classifies the message.
#[async_trait]
pub trait Transformer: Send + Sync {
    async fn transform(
        &self,
        payload: &Value,
        parameters: &GenerationParameters,
    ) -> Result<TransformOutput, TransformError>;
}

/// Verdict of an [`OutputValidator`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationOutcome {
    Valid,
    Invalid { reasons: Vec<String> },
}

impl ValidationOutcome {
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }
}

/// Domain check deciding whether a generated output is acceptable
pub trait OutputValidator: Send + Sync {
    fn validate(&self, output: &Value, constraints: &ValidationConstraints) -> ValidationOutcome;
}

/// Ordered producer of work items
pub trait WorkSource: Send {
    /// Next item, or `None` once the source is exhausted
    fn next_item(&mut self) -> io::Result<Option<WorkItem>>;

    /// Total number of items, when known up front
    fn size_hint(&self) -> Option<u64> {
        None
    }

    /// Position the source so the next item has index `index` or greater
    fn skip_to(&mut self, index: u64) -> io::Result<()> {
        let _ = index;
        Ok(())
    }
}
