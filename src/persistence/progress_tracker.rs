//! # Progress Tracker
//!
//! Single owner of the run's counters. Every outcome updates the counters and
//! rewrites the progress side file inside one critical section, so the file an
//! external monitor reads never lags or reorders relative to the counters.

use super::write_atomically;
use crate::error::WriteError;
use crate::models::progress::percent_complete;
use crate::models::ProgressSnapshot;
use chrono::Utc;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use tracing::warn;

#[derive(Debug, Default)]
struct Counters {
    processed: u64,
    failed: u64,
    current_index: Option<u64>,
    total: Option<u64>,
}

#[derive(Debug)]
pub struct ProgressTracker {
    run_id: String,
    path: PathBuf,
    counters: Mutex<Counters>,
}

impl ProgressTracker {
    pub fn new(path: impl Into<PathBuf>, run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            path: path.into(),
            counters: Mutex::new(Counters::default()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Seed counters from a loaded checkpoint
    pub fn resume_from(&self, processed: u64, failed: u64) {
        let mut counters = self.counters.lock();
        counters.processed = processed;
        counters.failed = failed;
    }

    pub fn set_total(&self, total: Option<u64>) {
        self.counters.lock().total = total;
    }

    /// Count one attempted item and publish the new snapshot
    pub fn record_outcome(&self, success: bool, work_item_index: u64) -> ProgressSnapshot {
        let mut counters = self.counters.lock();
        counters.processed += 1;
        if !success {
            counters.failed += 1;
        }
        counters.current_index = Some(work_item_index);

        let snapshot = self.build_snapshot(&counters);
        self.publish(&snapshot);
        snapshot
    }

    /// Current snapshot, written to the side file
    pub fn flush(&self) -> ProgressSnapshot {
        let counters = self.counters.lock();
        let snapshot = self.build_snapshot(&counters);
        self.publish(&snapshot);
        snapshot
    }

    /// Current snapshot without touching the side file
    pub fn snapshot(&self) -> ProgressSnapshot {
        let counters = self.counters.lock();
        self.build_snapshot(&counters)
    }

    fn build_snapshot(&self, counters: &Counters) -> ProgressSnapshot {
        ProgressSnapshot {
            run_id: self.run_id.clone(),
            processed: counters.processed,
            failed: counters.failed,
            current_index: counters.current_index,
            total: counters.total,
            percent_complete: percent_complete(counters.processed, counters.total),
            timestamp: Utc::now(),
        }
    }

    /// The side file is advisory; failing to write it never stops the run.
    fn publish(&self, snapshot: &ProgressSnapshot) {
        let written = serde_json::to_vec_pretty(snapshot)
            .map_err(WriteError::from)
            .and_then(|bytes| write_atomically(&self.path, &bytes));
        if let Err(e) = written {
            warn!(path = %self.path.display(), error = %e, "Failed to write progress file");
        }
    }
}
