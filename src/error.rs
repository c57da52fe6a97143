//! # Error Taxonomy
//!
//! One error enum per concern, unified under [`BatchError`]. The split mirrors how the
//! engine reacts to each failure:
//!
//! - [`ConfigError`]: profile or engine configuration problems, fatal before any work
//! - [`WriteError`]: disk failures on the record log or checkpoint, always fatal
//! - [`CheckpointError`]: checkpoint schema/read failures, routed through recovery
//! - [`TransformError`]: per-item failures from the external generation service
//! - [`RecoveryError`]: every recovery strategy failed, operator action required

use crate::orchestration::state::EngineState;
use crate::recovery::strategies::RecoveryAttempt;
use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Profile resolution and engine configuration failures
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("profile '{0}' is not defined")]
    UnknownProfile(String),

    #[error("profile '{profile}' is missing required field '{field}'")]
    MissingField { profile: String, field: String },

    #[error("profile '{profile}' has an invalid value for '{field}': {reason}")]
    InvalidValue {
        profile: String,
        field: String,
        reason: String,
    },

    #[error("profile '{profile}' is inconsistent: {}", violations.join("; "))]
    Inconsistent {
        profile: String,
        violations: Vec<String>,
    },

    #[error("invalid engine setting '{field}': {reason}")]
    InvalidSetting { field: String, reason: String },

    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
}

impl ConfigError {
    pub fn missing(profile: &str, field: &str) -> Self {
        Self::MissingField {
            profile: profile.to_string(),
            field: field.to_string(),
        }
    }

    pub fn invalid_value(profile: &str, field: &str, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            profile: profile.to_string(),
            field: field.to_string(),
            reason: reason.into(),
        }
    }

    pub fn invalid_setting(field: &str, reason: impl Into<String>) -> Self {
        Self::InvalidSetting {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

/// Durable persistence failures on the record log, checkpoint, or progress file
#[derive(Debug, Error)]
pub enum WriteError {
    #[error("failed to open {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to serialize record: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl WriteError {
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Checkpoint load/save failures
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("checkpoint violates schema: {reason}")]
    Schema { reason: String },

    #[error("checkpoint at {} is corrupt: {reason}", path.display())]
    Corrupt { path: PathBuf, reason: String },

    #[error("failed to read checkpoint {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Write(#[from] WriteError),

    #[error(transparent)]
    Unrecoverable(#[from] RecoveryError),
}

/// Per-item failures reported by the external transform
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransformError {
    #[error("transient failure: {message}")]
    Transient { message: String },

    #[error("rate limited: {message}")]
    RateLimited {
        message: String,
        retry_after: Option<Duration>,
    },

    #[error("malformed output: {message}")]
    Malformed {
        message: String,
        reasons: Vec<String>,
    },

    #[error("transform timed out after {0:?}")]
    Timeout(Duration),

    #[error("fatal transform failure: {message}")]
    Fatal { message: String },

    /// Unstructured failure; classified by message content
    #[error("{message}")]
    Other { message: String },
}

impl TransformError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient {
            message: message.into(),
        }
    }

    pub fn rate_limited(message: impl Into<String>, retry_after: Option<Duration>) -> Self {
        Self::RateLimited {
            message: message.into(),
            retry_after,
        }
    }

    pub fn malformed(message: impl Into<String>, reasons: Vec<String>) -> Self {
        Self::Malformed {
            message: message.into(),
            reasons,
        }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self::Fatal {
            message: message.into(),
        }
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::Other {
            message: message.into(),
        }
    }

    /// Reasons to attach to a `Failed` record
    pub fn reasons(&self) -> Vec<String> {
        match self {
            Self::Malformed { message, reasons } if reasons.is_empty() => vec![message.clone()],
            Self::Malformed { reasons, .. } => reasons.clone(),
            other => vec![other.to_string()],
        }
    }
}

/// All recovery strategies failed
#[derive(Debug, Error)]
#[error(
    "checkpoint recovery exhausted {} strategies, operator action required: {}",
    attempts.len(),
    attempts.iter().map(|a| a.to_string()).collect::<Vec<_>>().join("; ")
)]
pub struct RecoveryError {
    pub attempts: Vec<RecoveryAttempt>,
}

/// Top-level engine error
#[derive(Debug, Error)]
pub enum BatchError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("write error: {0}")]
    Write(#[from] WriteError),

    #[error("checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    #[error("transform error: {0}")]
    Transform(#[from] TransformError),

    #[error("recovery error: {0}")]
    Recovery(#[from] RecoveryError),

    #[error("preflight failed: {}", failures.join("; "))]
    Preflight { failures: Vec<String> },

    #[error("input source failed: {0}")]
    Source(#[source] io::Error),

    #[error("invalid engine transition from {from} to {to}")]
    InvalidTransition { from: EngineState, to: EngineState },
}

pub type Result<T> = std::result::Result<T, BatchError>;
