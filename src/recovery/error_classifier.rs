//! # Error Classification
//!
//! Maps every failure the engine can observe onto an [`ErrorKind`] and a handling
//! recommendation.
//!
//! ## Overview
//!
//! Typed transform errors classify directly. Unstructured errors
//! ([`TransformError::Other`]) are classified from their message, the way service
//! client errors usually arrive. Engine-side errors (configuration, persistence,
//! checkpoint) classify by variant.
//!
//! ```text
//! ┌─────────────────┐     ┌─────────────────┐     ┌─────────────────┐
//! │ BatchError /    │────▶│ ErrorClassifier │────▶│ Classification  │
//! │ TransformError  │     │ + ErrorContext  │     │ (kind, delay)   │
//! └─────────────────┘     └─────────────────┘     └─────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use batch_engine::error::TransformError;
//! use batch_engine::models::ErrorKind;
//! use batch_engine::recovery::{ErrorClassifier, ErrorContext, StandardErrorClassifier};
//!
//! let classifier = StandardErrorClassifier::new();
//! let context = ErrorContext::for_attempt(7, 1, 3);
//! let error = TransformError::other("HTTP 429: too many requests");
//!
//! let classification = classifier.classify_transform(&error, &context);
//! assert_eq!(classification.kind, ErrorKind::RateLimited);
//! assert!(classification.is_retryable);
//! ```

use crate::error::{BatchError, CheckpointError, TransformError};
use crate::models::ErrorKind;
use crate::recovery::backoff::BackoffPolicy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Where and when the error happened
#[derive(Debug, Clone)]
pub struct ErrorContext {
    pub work_item_index: Option<u64>,

    /// Current attempt number (1-based)
    pub attempt_number: u32,

    pub max_attempts: u32,
}

impl ErrorContext {
    pub fn for_attempt(work_item_index: u64, attempt_number: u32, max_attempts: u32) -> Self {
        Self {
            work_item_index: Some(work_item_index),
            attempt_number,
            max_attempts,
        }
    }

    /// Context for errors outside any item, which are never retried
    pub fn engine() -> Self {
        Self {
            work_item_index: None,
            attempt_number: 1,
            max_attempts: 1,
        }
    }

    fn has_attempts_left(&self) -> bool {
        self.attempt_number < self.max_attempts
    }

    fn subject(&self) -> String {
        match self.work_item_index {
            Some(index) => format!("item {index}"),
            None => "engine".to_string(),
        }
    }
}

/// Result of error classification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorClassification {
    pub kind: ErrorKind,

    /// Whether the retry wrapper should try again
    pub is_retryable: bool,

    /// Recommended delay before retry (if retryable)
    pub retry_delay: Option<Duration>,

    /// Stable code for tracking
    pub error_code: String,

    pub error_message: String,

    pub remediation_suggestions: Vec<String>,

    pub is_final_attempt: bool,

    pub metadata: HashMap<String, serde_json::Value>,
}

/// Trait for error classification strategies
pub trait ErrorClassifier: Send + Sync {
    fn classify_transform(
        &self,
        error: &TransformError,
        context: &ErrorContext,
    ) -> ErrorClassification;

    fn classify_error(&self, error: &BatchError, context: &ErrorContext) -> ErrorClassification;

    fn classifier_name(&self) -> &'static str;

    /// Bucket only, without retry planning
    fn classify(&self, error: &BatchError) -> ErrorKind {
        self.classify_error(error, &ErrorContext::engine()).kind
    }
}

/// Standard classifier backed by a [`BackoffPolicy`] for retry delays
#[derive(Debug, Clone, Default)]
pub struct StandardErrorClassifier {
    backoff: BackoffPolicy,
}

impl StandardErrorClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_backoff(backoff: BackoffPolicy) -> Self {
        Self { backoff }
    }

    /// Classify an unstructured message by its content
    pub fn kind_from_message(message: &str) -> ErrorKind {
        let message = message.to_lowercase();
        let mentions = |needles: &[&str]| needles.iter().any(|n| message.contains(n));

        if mentions(&["rate limit", "rate-limit", "ratelimit", "429", "too many requests"]) {
            ErrorKind::RateLimited
        } else if mentions(&[
            "quota",
            "unauthorized",
            "forbidden",
            "401",
            "403",
            "invalid api key",
            "permission",
            "billing",
        ]) {
            ErrorKind::Fatal
        } else if mentions(&[
            "timeout",
            "timed out",
            "connection",
            "network",
            "unavailable",
            "overloaded",
            "502",
            "503",
            "504",
            "reset",
        ]) {
            ErrorKind::Transient
        } else if mentions(&["parse", "json", "schema", "malformed", "unexpected token"]) {
            ErrorKind::Malformed
        } else {
            // Unknown service errors get the conservative retry treatment.
            ErrorKind::Transient
        }
    }

    fn build(
        &self,
        kind: ErrorKind,
        error_code: &str,
        error_message: String,
        server_hint: Option<Duration>,
        context: &ErrorContext,
    ) -> ErrorClassification {
        let is_retryable = kind.is_retryable() && context.has_attempts_left();
        let retry_delay = is_retryable
            .then(|| self.backoff.delay_for(kind, context.attempt_number, server_hint));

        let mut metadata = HashMap::new();
        if let Some(index) = context.work_item_index {
            metadata.insert("work_item_index".to_string(), serde_json::json!(index));
        }
        metadata.insert(
            "attempt_number".to_string(),
            serde_json::json!(context.attempt_number),
        );

        ErrorClassification {
            kind,
            is_retryable,
            retry_delay,
            error_code: error_code.to_string(),
            error_message,
            remediation_suggestions: suggestions(kind),
            is_final_attempt: !is_retryable,
            metadata,
        }
    }
}

impl ErrorClassifier for StandardErrorClassifier {
    fn classify_transform(
        &self,
        error: &TransformError,
        context: &ErrorContext,
    ) -> ErrorClassification {
        let subject = context.subject();
        match error {
            TransformError::Transient { message } => self.build(
                ErrorKind::Transient,
                "TRANSFORM_TRANSIENT",
                format!("Transient failure on {subject}: {message}"),
                None,
                context,
            ),
            TransformError::Timeout(after) => self.build(
                ErrorKind::Transient,
                "TRANSFORM_TIMEOUT",
                format!("Transform for {subject} timed out after {after:?}"),
                None,
                context,
            ),
            TransformError::RateLimited {
                message,
                retry_after,
            } => self.build(
                ErrorKind::RateLimited,
                "TRANSFORM_RATE_LIMITED",
                format!("Rate limited on {subject}: {message}"),
                *retry_after,
                context,
            ),
            TransformError::Malformed { message, .. } => self.build(
                ErrorKind::Malformed,
                "TRANSFORM_MALFORMED",
                format!("Malformed output for {subject}: {message}"),
                None,
                context,
            ),
            TransformError::Fatal { message } => self.build(
                ErrorKind::Fatal,
                "TRANSFORM_FATAL",
                format!("Fatal transform failure on {subject}: {message}"),
                None,
                context,
            ),
            TransformError::Other { message } => {
                let kind = Self::kind_from_message(message);
                self.build(
                    kind,
                    "TRANSFORM_UNCLASSIFIED",
                    format!("Unclassified failure on {subject}: {message}"),
                    None,
                    context,
                )
            }
        }
    }

    fn classify_error(&self, error: &BatchError, context: &ErrorContext) -> ErrorClassification {
        match error {
            BatchError::Transform(transform) => self.classify_transform(transform, context),
            BatchError::Config(e) => self.build(
                ErrorKind::Fatal,
                "CONFIGURATION_ERROR",
                e.to_string(),
                None,
                context,
            ),
            BatchError::Write(e) => {
                self.build(ErrorKind::Fatal, "WRITE_FAILURE", e.to_string(), None, context)
            }
            BatchError::Checkpoint(
                e @ (CheckpointError::Corrupt { .. }
                | CheckpointError::Schema { .. }
                | CheckpointError::Unrecoverable(_)),
            ) => self.build(
                ErrorKind::Corruption,
                "CHECKPOINT_CORRUPTION",
                e.to_string(),
                None,
                context,
            ),
            BatchError::Checkpoint(e) => self.build(
                ErrorKind::Fatal,
                "CHECKPOINT_IO_FAILURE",
                e.to_string(),
                None,
                context,
            ),
            BatchError::Recovery(e) => self.build(
                ErrorKind::Corruption,
                "RECOVERY_EXHAUSTED",
                e.to_string(),
                None,
                context,
            ),
            BatchError::Source(e) => self.build(
                ErrorKind::Fatal,
                "SOURCE_FAILURE",
                e.to_string(),
                None,
                context,
            ),
            BatchError::Preflight { .. } => {
                self.build(ErrorKind::Fatal, "PREFLIGHT_FAILED", error.to_string(), None, context)
            }
            BatchError::InvalidTransition { .. } => self.build(
                ErrorKind::Fatal,
                "INVALID_TRANSITION",
                error.to_string(),
                None,
                context,
            ),
        }
    }

    fn classifier_name(&self) -> &'static str {
        "StandardErrorClassifier"
    }
}

fn suggestions(kind: ErrorKind) -> Vec<String> {
    let items: &[&str] = match kind {
        ErrorKind::Transient => &[
            "Check connectivity to the generation service",
            "Consider raising the transform timeout",
        ],
        ErrorKind::RateLimited => &[
            "Lower request throughput or switch to a slower strategy",
            "Review the service's rate limit policy",
        ],
        ErrorKind::Malformed => &[
            "Compare the response shape against the profile's output format",
            "Review validator reasons attached to the failed record",
        ],
        ErrorKind::Corruption => &[
            "Inspect the checkpoint and its backups",
            "Verify the result log is intact before resuming",
        ],
        ErrorKind::Fatal => &[
            "Fix the underlying configuration, credentials, or disk issue",
            "Resume from the reported index once resolved",
        ],
    };
    items.iter().map(|s| s.to_string()).collect()
}
