use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Point-in-time progress view written for external monitors.
///
/// Never authoritative: the engine rebuilds its position from the checkpoint and
/// result log, never from this snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub run_id: String,
    pub processed: u64,
    pub failed: u64,
    pub current_index: Option<u64>,
    pub total: Option<u64>,
    pub percent_complete: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

impl ProgressSnapshot {
    pub fn succeeded(&self) -> u64 {
        self.processed.saturating_sub(self.failed)
    }
}

/// Percentage of `total` covered by `processed`, clamped to 100
pub fn percent_complete(processed: u64, total: Option<u64>) -> Option<f64> {
    match total {
        Some(0) => Some(100.0),
        Some(total) => Some(((processed as f64 / total as f64) * 100.0).min(100.0)),
        None => None,
    }
}
