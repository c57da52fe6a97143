//! # Checkpoint Recovery Strategies
//!
//! Prioritized tactics for rebuilding a resume point when the checkpoint is
//! unreadable or missing while results exist:
//!
//! 1. [`LogScanRecovery`] rebuilds the position from the result log
//! 2. [`ConservativeRecovery`] falls back to the last confirmed-clean boundary
//! 3. [`OperatorEscalation`] stops with diagnostics
//!
//! Strategies only compute a candidate checkpoint. Nothing is written until a
//! strategy succeeds and the caller commits the candidate, so every attempt is
//! idempotent.

use crate::constants::metadata_keys;
use crate::error::RecoveryError;
use crate::models::Checkpoint;
use crate::persistence::record_log::{LogScan, RecordLogReader};
use std::fmt;
use std::path::Path;
use tracing::{info, warn};

/// Inputs shared by all strategies
#[derive(Debug, Clone)]
pub struct RecoveryContext<'a> {
    pub record_log_path: &'a Path,
    pub checkpoint_path: &'a Path,
    /// Newest schema-valid backup of the checkpoint, if any
    pub latest_backup: Option<Checkpoint>,
    /// Why recovery was triggered
    pub cause: String,
}

/// Outcome of one strategy attempt, kept for diagnostics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryAttempt {
    pub strategy: String,
    pub succeeded: bool,
    pub detail: String,
}

impl fmt::Display for RecoveryAttempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verdict = if self.succeeded { "ok" } else { "failed" };
        write!(f, "{} {}: {}", self.strategy, verdict, self.detail)
    }
}

/// A successful recovery
#[derive(Debug, Clone)]
pub struct RecoveryOutcome {
    pub checkpoint: Checkpoint,
    pub strategy: &'static str,
    pub attempts: Vec<RecoveryAttempt>,
}

/// One recovery tactic
pub trait RecoveryStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Lower runs first
    fn priority(&self) -> u8;

    /// Compute a replacement checkpoint without side effects
    fn attempt(&self, context: &RecoveryContext<'_>) -> Result<Checkpoint, String>;
}

/// Rebuild `resume_index` from the highest contiguous attempted index in the log
#[derive(Debug, Default)]
pub struct LogScanRecovery;

impl RecoveryStrategy for LogScanRecovery {
    fn name(&self) -> &'static str {
        "log_scan"
    }

    fn priority(&self) -> u8 {
        1
    }

    fn attempt(&self, context: &RecoveryContext<'_>) -> Result<Checkpoint, String> {
        if !context.record_log_path.exists() {
            return Err(format!(
                "result log {} does not exist",
                context.record_log_path.display()
            ));
        }

        let scan = scan_log(context.record_log_path)?;
        if let Some(line) = scan.first_corrupt_line() {
            return Err(format!(
                "result log has {} corrupt line(s), first at line {line}",
                scan.corrupt_lines.len()
            ));
        }

        let position = scan.rebuild_position();
        Ok(Checkpoint::new(
            position.resume_index,
            position.processed_count,
            position.failed_count,
        ))
    }
}

/// Resume from the last confirmed-clean boundary, accepting some redone work.
///
/// The boundary is the lower of the newest valid backup and the clean prefix of
/// the log. Items past it that already succeeded are skipped by the engine's
/// success de-duplication, so redoing them never duplicates a `Success`.
#[derive(Debug, Default)]
pub struct ConservativeRecovery;

impl RecoveryStrategy for ConservativeRecovery {
    fn name(&self) -> &'static str {
        "conservative_boundary"
    }

    fn priority(&self) -> u8 {
        2
    }

    fn attempt(&self, context: &RecoveryContext<'_>) -> Result<Checkpoint, String> {
        let from_log = if context.record_log_path.exists() {
            let scan = scan_log(context.record_log_path)?;
            (scan.clean_prefix_len() > 0).then(|| {
                let position = scan.rebuild_clean_prefix();
                Checkpoint::new(
                    position.resume_index,
                    position.processed_count,
                    position.failed_count,
                )
            })
        } else {
            None
        };

        let candidate = match (context.latest_backup.clone(), from_log) {
            (Some(backup), Some(log)) if log.resume_index < backup.resume_index => log,
            (Some(backup), _) => Checkpoint::new(
                backup.resume_index,
                backup.processed_count,
                backup.failed_count,
            ),
            (None, Some(log)) => log,
            (None, None) => {
                return Err(
                    "no valid checkpoint backup and no clean prefix in the result log".to_string(),
                )
            }
        };

        candidate.validate()?;
        Ok(candidate)
    }
}

/// Final tactic: refuse to guess and hand the situation to an operator
#[derive(Debug, Default)]
pub struct OperatorEscalation;

impl RecoveryStrategy for OperatorEscalation {
    fn name(&self) -> &'static str {
        "operator_escalation"
    }

    fn priority(&self) -> u8 {
        3
    }

    fn attempt(&self, context: &RecoveryContext<'_>) -> Result<Checkpoint, String> {
        Err(format!(
            "manual repair required: inspect checkpoint {} and result log {} (cause: {})",
            context.checkpoint_path.display(),
            context.record_log_path.display(),
            context.cause
        ))
    }
}

/// Ordered collection of recovery strategies
pub struct RecoveryChain {
    strategies: Vec<Box<dyn RecoveryStrategy>>,
}

impl fmt::Debug for RecoveryChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecoveryChain")
            .field("strategies", &self.strategy_names())
            .finish()
    }
}

impl Default for RecoveryChain {
    fn default() -> Self {
        Self::standard()
    }
}

impl RecoveryChain {
    /// Log scan, then conservative boundary, then operator escalation
    pub fn standard() -> Self {
        Self::new(vec![
            Box::new(LogScanRecovery),
            Box::new(ConservativeRecovery),
            Box::new(OperatorEscalation),
        ])
    }

    pub fn new(mut strategies: Vec<Box<dyn RecoveryStrategy>>) -> Self {
        strategies.sort_by_key(|s| s.priority());
        Self { strategies }
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Try each strategy in priority order and stop at the first success
    pub fn recover(&self, context: &RecoveryContext<'_>) -> Result<RecoveryOutcome, RecoveryError> {
        let mut attempts = Vec::with_capacity(self.strategies.len());

        for strategy in &self.strategies {
            match strategy.attempt(context) {
                Ok(checkpoint) => {
                    attempts.push(RecoveryAttempt {
                        strategy: strategy.name().to_string(),
                        succeeded: true,
                        detail: format!("resume_index={}", checkpoint.resume_index),
                    });
                    info!(
                        strategy = strategy.name(),
                        resume_index = checkpoint.resume_index,
                        cause = %context.cause,
                        "♻️ Checkpoint recovered"
                    );
                    let checkpoint = checkpoint
                        .with_metadata(metadata_keys::RECOVERED_BY, strategy.name())
                        .with_metadata(metadata_keys::REASON, context.cause.clone());
                    return Ok(RecoveryOutcome {
                        checkpoint,
                        strategy: strategy.name(),
                        attempts,
                    });
                }
                Err(detail) => {
                    warn!(strategy = strategy.name(), %detail, "Recovery strategy failed");
                    attempts.push(RecoveryAttempt {
                        strategy: strategy.name().to_string(),
                        succeeded: false,
                        detail,
                    });
                }
            }
        }

        Err(RecoveryError { attempts })
    }
}

fn scan_log(path: &Path) -> Result<LogScan, String> {
    RecordLogReader::scan(path)
        .map_err(|e| format!("failed to read result log {}: {e}", path.display()))
}
