//! Final report of an engine run and its process exit code.

use crate::constants::exit_codes;
use crate::cost::CostReport;
use crate::error::{BatchError, CheckpointError};
use crate::models::ErrorKind;
use crate::orchestration::state::EngineState;
use crate::recovery::ErrorClassifier;
use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PauseReason {
    /// Shutdown signal or caller cancellation
    Interrupted,
    /// Estimated spend reached the configured budget
    BudgetExhausted,
}

impl fmt::Display for PauseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Interrupted => write!(f, "interrupted"),
            Self::BudgetExhausted => write!(f, "cost budget exhausted"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    Paused(PauseReason),
    Aborted {
        kind: ErrorKind,
        exit_code: i32,
        reason: String,
    },
}

impl RunOutcome {
    /// Abort outcome for `error`, with the exit code its category maps to
    pub fn aborted(error: &BatchError, classifier: &dyn ErrorClassifier) -> Self {
        let kind = classifier.classify(error);
        Self::Aborted {
            kind,
            exit_code: exit_code_for(error, kind),
            reason: error.to_string(),
        }
    }
}

/// Exit code for an abort caused by `error`
pub fn exit_code_for(error: &BatchError, kind: ErrorKind) -> i32 {
    match error {
        BatchError::Config(_) => exit_codes::CONFIGURATION,
        BatchError::Write(_)
        | BatchError::Source(_)
        | BatchError::Checkpoint(CheckpointError::Write(_) | CheckpointError::Read { .. }) => {
            exit_codes::IO_FAILURE
        }
        _ => kind.exit_code(),
    }
}

/// Counts for the items attempted in this run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunCounts {
    pub succeeded: u64,
    pub failed: u64,
    pub skipped: u64,
    /// Items passed over because the log already held a result for them
    pub already_recorded: u64,
}

impl RunCounts {
    pub fn attempted(&self) -> u64 {
        self.succeeded + self.failed + self.skipped + self.already_recorded
    }
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_id: String,
    pub profile: String,
    pub outcome: RunOutcome,
    pub final_state: EngineState,
    /// Cumulative across resumed runs, as stored in the checkpoint
    pub processed_count: u64,
    pub failed_count: u64,
    pub this_run: RunCounts,
    /// Exact index a subsequent run starts from
    pub resume_index: u64,
    pub elapsed: Duration,
    pub cost: Option<CostReport>,
    pub warnings: Vec<String>,
}

impl RunSummary {
    pub fn exit_code(&self) -> i32 {
        match &self.outcome {
            RunOutcome::Completed | RunOutcome::Paused(_) => exit_codes::SUCCESS,
            RunOutcome::Aborted { exit_code, .. } => *exit_code,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.outcome == RunOutcome::Completed
    }

    pub fn has_failures(&self) -> bool {
        self.failed_count > 0
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let elapsed = self.elapsed.as_secs_f64();
        match &self.outcome {
            RunOutcome::Completed if self.has_failures() => write!(
                f,
                "completed, some items failed: {} processed, {} failed in {elapsed:.1}s",
                self.processed_count, self.failed_count
            )?,
            RunOutcome::Completed => write!(
                f,
                "completed: {} processed in {elapsed:.1}s",
                self.processed_count
            )?,
            RunOutcome::Paused(reason) => write!(
                f,
                "paused ({reason}): {} processed, {} failed in {elapsed:.1}s",
                self.processed_count, self.failed_count
            )?,
            RunOutcome::Aborted {
                kind,
                exit_code,
                reason,
            } => write!(
                f,
                "aborted before completion ({kind}, exit {exit_code}): {reason}; {} processed, {} failed in {elapsed:.1}s",
                self.processed_count, self.failed_count
            )?,
        }
        write!(f, "; resume index {}", self.resume_index)
    }
}
