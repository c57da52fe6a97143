use crate::constants::exit_codes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Terminal status of one work item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultStatus {
    Success,
    Failed,
    Skipped,
}

impl fmt::Display for ResultStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Failed => write!(f, "failed"),
            Self::Skipped => write!(f, "skipped"),
        }
    }
}

/// Classification bucket that decides retry, skip, recovery, or abort handling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// May succeed on retry
    Transient,
    /// Service asked us to slow down
    RateLimited,
    /// Output did not parse or failed validation
    Malformed,
    /// Durable state is unreadable
    Corruption,
    /// Continuing would risk silent data loss
    Fatal,
}

impl ErrorKind {
    /// Whether the retry wrapper may attempt the call again
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient | Self::RateLimited)
    }

    /// Process exit code reported when a run aborts on this kind
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Transient => exit_codes::TEMPORARY_FAILURE,
            Self::RateLimited => exit_codes::SERVICE_UNAVAILABLE,
            Self::Malformed => exit_codes::PROTOCOL,
            Self::Corruption => exit_codes::DATA_CORRUPTION,
            Self::Fatal => exit_codes::INTERNAL,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transient => write!(f, "transient"),
            Self::RateLimited => write!(f, "rate_limited"),
            Self::Malformed => write!(f, "malformed"),
            Self::Corruption => write!(f, "corruption"),
            Self::Fatal => write!(f, "fatal"),
        }
    }
}

/// Durable, append-only outcome of one work item (one line of the result log)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub work_item_index: u64,
    pub status: ResultStatus,
    pub output: Option<serde_json::Value>,
    pub error_kind: Option<ErrorKind>,
    #[serde(default)]
    pub reasons: Vec<String>,
    pub timestamp: DateTime<Utc>,
    pub attempt_count: u32,
}

impl ResultRecord {
    pub fn success(work_item_index: u64, output: serde_json::Value, attempt_count: u32) -> Self {
        Self {
            work_item_index,
            status: ResultStatus::Success,
            output: Some(output),
            error_kind: None,
            reasons: Vec::new(),
            timestamp: Utc::now(),
            attempt_count,
        }
    }

    pub fn failed(
        work_item_index: u64,
        error_kind: ErrorKind,
        reasons: Vec<String>,
        attempt_count: u32,
    ) -> Self {
        Self {
            work_item_index,
            status: ResultStatus::Failed,
            output: None,
            error_kind: Some(error_kind),
            reasons,
            timestamp: Utc::now(),
            attempt_count,
        }
    }

    pub fn skipped(work_item_index: u64, reason: impl Into<String>) -> Self {
        Self {
            work_item_index,
            status: ResultStatus::Skipped,
            output: None,
            error_kind: None,
            reasons: vec![reason.into()],
            timestamp: Utc::now(),
            attempt_count: 0,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ResultStatus::Success
    }
}
