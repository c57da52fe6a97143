//! # Batch Engine
//!
//! Drives one run through `Initializing -> Preflighting -> Running` and into a
//! terminal state. Items are processed strictly in index order; every outcome is
//! appended to the result log before the position advances, and the checkpoint is
//! only ever written with a position the log already covers.

use crate::client::validator::check_format;
use crate::client::{
    ConstraintValidator, OutputValidator, TransformOutput, Transformer, ValidationOutcome,
    WorkSource,
};
use crate::config::JobProfile;
use crate::constants::metadata_keys;
use crate::cost::CostEstimator;
use crate::error::{BatchError, ConfigError, TransformError};
use crate::logging::{log_checkpoint_operation, log_error, log_item_outcome};
use crate::models::{Checkpoint, ErrorKind, ResultRecord, ResultStatus, WorkItem};
use crate::orchestration::factory::ComponentFactory;
use crate::orchestration::retry::RetryOutcome;
use crate::orchestration::state::{EngineState, EngineStateMachine};
use crate::orchestration::summary::{PauseReason, RunCounts, RunOutcome, RunSummary};
use crate::persistence::{AtomicRecordWriter, CheckpointStore, ProgressTracker, RecordLogReader};
use crate::preflight::PreflightValidator;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const EMPTY_PAYLOAD_REASON: &str = "empty payload";

/// Cumulative position, mirrored into every checkpoint
#[derive(Debug, Clone, Copy, Default)]
struct Position {
    resume_index: u64,
    processed: u64,
    failed: u64,
    /// Spend by earlier runs; absent after recovery rebuilt the checkpoint
    prior_spend: f64,
}

impl From<&Checkpoint> for Position {
    fn from(checkpoint: &Checkpoint) -> Self {
        Self {
            resume_index: checkpoint.resume_index,
            processed: checkpoint.processed_count,
            failed: checkpoint.failed_count,
            prior_spend: checkpoint
                .metadata
                .get(metadata_keys::ESTIMATED_COST)
                .and_then(serde_json::Value::as_f64)
                .unwrap_or(0.0),
        }
    }
}

/// Per-run bookkeeping threaded through the phases
struct RunContext {
    started: Instant,
    position: Position,
    counts: RunCounts,
    warnings: Vec<String>,
    cost: Option<Arc<dyn CostEstimator>>,
}

impl RunContext {
    /// Spend across every run of this job so far
    fn total_spend(&self) -> f64 {
        let this_run = self.cost.as_ref().map_or(0.0, |c| c.report().estimated_cost);
        self.position.prior_spend + this_run
    }
}

/// Why the item loop stopped
enum Stop {
    Exhausted,
    Paused(PauseReason),
    Aborted(BatchError),
}

pub struct BatchEngine {
    factory: Arc<ComponentFactory>,
    transformer: Arc<dyn Transformer>,
    validator: Arc<dyn OutputValidator>,
    state: Mutex<EngineStateMachine>,
}

impl std::fmt::Debug for BatchEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchEngine")
            .field("factory", &self.factory)
            .field("state", &self.state())
            .finish()
    }
}

impl BatchEngine {
    pub fn new(factory: Arc<ComponentFactory>, transformer: Arc<dyn Transformer>) -> Self {
        Self {
            factory,
            transformer,
            validator: Arc::new(ConstraintValidator),
            state: Mutex::new(EngineStateMachine::new()),
        }
    }

    pub fn with_validator(mut self, validator: Arc<dyn OutputValidator>) -> Self {
        self.validator = validator;
        self
    }

    pub fn state(&self) -> EngineState {
        self.state.lock().current()
    }

    /// Process `source` until it is exhausted, `cancel` fires, the cost budget runs
    /// out, or an unrecoverable error occurs.
    ///
    /// The returned summary always carries the index a subsequent run resumes from.
    pub async fn run(&self, source: &mut dyn WorkSource, cancel: &CancellationToken) -> RunSummary {
        let mut ctx = RunContext {
            started: Instant::now(),
            position: Position::default(),
            counts: RunCounts::default(),
            warnings: Vec::new(),
            cost: None,
        };
        let config = self.factory.config();
        let profile_name = config.engine.profile.clone();

        let begun = self.state.lock().begin();
        if let Err(error) = begun {
            log_error("engine", "run", &error.to_string(), Some(&profile_name));
            let outcome = RunOutcome::aborted(&error, self.factory.classifier().as_ref());
            return self.summarize(ctx, &profile_name, outcome);
        }

        info!(
            run_id = %self.factory.run_id(),
            profile = %profile_name,
            strategy = %config.engine.strategy,
            "🚀 Starting batch run"
        );

        // Initializing: establish the resume point before anything else.
        let store = self.factory.checkpoint_store();
        match store.load() {
            Ok(Some(checkpoint)) => {
                ctx.position = Position::from(&checkpoint);
                info!(
                    resume_index = checkpoint.resume_index,
                    processed_count = checkpoint.processed_count,
                    failed_count = checkpoint.failed_count,
                    "🔁 Resuming from checkpoint"
                );
            }
            Ok(None) => debug!("No prior progress, starting at index 0"),
            Err(e) => return self.abort(ctx, &profile_name, e.into()),
        }

        // Preflighting: nothing below may spend budget on a broken profile.
        if let Err(error) = self.transition(EngineState::Preflighting) {
            return self.abort(ctx, &profile_name, error);
        }
        let resolver = self.factory.resolver();
        let classifier = self.factory.classifier();
        let preflight = PreflightValidator {
            resolver: &resolver,
            paths: &config.paths,
            settings: &config.preflight,
            transformer: self.transformer.as_ref(),
            classifier: classifier.as_ref(),
            timeout: config.engine.transform_timeout(),
        };
        let report = preflight.run(&profile_name).await;
        ctx.warnings.extend(
            report
                .warnings()
                .into_iter()
                .map(|check| format!("{}: {}", check.name, check.message)),
        );

        if report.is_fatal() {
            let failures = report.fatal_messages();
            log_error("preflight", "run", &failures.join("; "), Some(&profile_name));
            let kind = report
                .checks
                .iter()
                .find_map(|c| c.error_kind)
                .unwrap_or(ErrorKind::Fatal);
            let outcome = RunOutcome::Aborted {
                kind,
                exit_code: report.exit_code(),
                reason: BatchError::Preflight { failures }.to_string(),
            };
            return self.finish(ctx, &profile_name, EngineState::Aborted, outcome);
        }
        let Some(profile) = report.profile else {
            let error = ConfigError::UnknownProfile(profile_name.clone()).into();
            return self.abort(ctx, &profile_name, error);
        };

        // Running
        if let Err(error) = self.transition(EngineState::Running) {
            return self.abort(ctx, &profile_name, error);
        }
        let stop = match self.process(source, cancel, &profile, &store, &mut ctx).await {
            Ok(stop) => stop,
            Err(error) => Stop::Aborted(error),
        };

        match stop {
            Stop::Exhausted => match self.save_checkpoint(&store, &ctx, None) {
                Ok(()) => {
                    self.factory.progress_tracker().flush();
                    self.finish(ctx, &profile_name, EngineState::Completed, RunOutcome::Completed)
                }
                Err(error) => self.abort(ctx, &profile_name, error),
            },
            Stop::Paused(reason) => {
                let note = reason.to_string();
                match self.save_checkpoint(&store, &ctx, Some(&note)) {
                    Ok(()) => {
                        self.factory.progress_tracker().flush();
                        info!(
                            resume_index = ctx.position.resume_index,
                            reason = %reason,
                            "⏸️ Run paused"
                        );
                        self.finish(ctx, &profile_name, EngineState::Paused, RunOutcome::Paused(reason))
                    }
                    Err(error) => self.abort(ctx, &profile_name, error),
                }
            }
            Stop::Aborted(error) => {
                // Best effort; the log already covers this position.
                if let Err(e) = self.save_checkpoint(&store, &ctx, Some("aborted")) {
                    warn!(error = %e, "Failed to save checkpoint while aborting");
                }
                self.abort(ctx, &profile_name, error)
            }
        }
    }

    async fn process(
        &self,
        source: &mut dyn WorkSource,
        cancel: &CancellationToken,
        profile: &JobProfile,
        store: &CheckpointStore,
        ctx: &mut RunContext,
    ) -> Result<Stop, BatchError> {
        let config = self.factory.config();
        let strategy = self.factory.strategy();
        let retry = self.factory.retry_executor();
        let writer = self.factory.record_writer()?;
        let tracker = self.factory.progress_tracker();

        let already_recorded = self.scan_recorded(&writer)?;
        tracker.resume_from(ctx.position.processed, ctx.position.failed);
        tracker.set_total(source.size_hint());

        let expected = source
            .size_hint()
            .map(|total| total.saturating_sub(ctx.position.resume_index));
        let cost = self.factory.cost_estimator(expected);
        ctx.cost = Some(Arc::clone(&cost));
        debug!(estimator = cost.name(), ?expected, "Selected cost estimator");

        source
            .skip_to(ctx.position.resume_index)
            .map_err(BatchError::Source)?;

        loop {
            if cancel.is_cancelled() {
                return Ok(Stop::Paused(PauseReason::Interrupted));
            }
            if cost
                .report()
                .budget_exhausted_after(ctx.position.prior_spend, config.cost.budget_limit)
            {
                warn!(
                    estimated_cost = ctx.total_spend(),
                    budget_limit = ?config.cost.budget_limit,
                    "💸 Cost budget exhausted"
                );
                return Ok(Stop::Paused(PauseReason::BudgetExhausted));
            }

            let Some(item) = source.next_item().map_err(BatchError::Source)? else {
                return Ok(Stop::Exhausted);
            };
            if item.index < ctx.position.resume_index {
                continue;
            }

            if let Some(status) = already_recorded.get(&item.index) {
                debug!(
                    work_item_index = item.index,
                    status = %status,
                    "Result log already holds an outcome for this item"
                );
                ctx.counts.already_recorded += 1;
                self.advance(ctx, &tracker, item.index, *status != ResultStatus::Failed);
            } else if item.has_empty_payload() {
                let record = ResultRecord::skipped(item.index, EMPTY_PAYLOAD_REASON);
                writer.append(&record)?;
                ctx.counts.skipped += 1;
                self.advance(ctx, &tracker, item.index, true);
                log_item_outcome(item.index, "skipped", 0, None, Some(EMPTY_PAYLOAD_REASON));
            } else {
                let outcome = retry
                    .run(item.index, cancel, |_attempt| {
                        self.attempt(&item, profile, cost.as_ref())
                    })
                    .await;

                let record = match outcome {
                    RetryOutcome::Succeeded { output, attempts } => {
                        ctx.counts.succeeded += 1;
                        log_item_outcome(item.index, "success", attempts, None, None);
                        ResultRecord::success(item.index, output.content, attempts)
                    }
                    RetryOutcome::Failed {
                        kind,
                        reasons,
                        attempts,
                    } => {
                        ctx.counts.failed += 1;
                        let details = reasons.join("; ");
                        log_item_outcome(
                            item.index,
                            "failed",
                            attempts,
                            Some(&kind.to_string()),
                            Some(&details),
                        );
                        ResultRecord::failed(item.index, kind, reasons, attempts)
                    }
                    RetryOutcome::Fatal { error, attempts } => {
                        log_error(
                            "engine",
                            "transform",
                            &error.to_string(),
                            Some(&format!("work_item_index={} attempts={attempts}", item.index)),
                        );
                        return Err(BatchError::Transform(error));
                    }
                    RetryOutcome::Cancelled { attempts } => {
                        info!(
                            work_item_index = item.index,
                            attempts, "Item abandoned during backoff, it will be retried on resume"
                        );
                        return Ok(Stop::Paused(PauseReason::Interrupted));
                    }
                };

                let success = record.is_success();
                writer.append(&record)?;
                self.advance(ctx, &tracker, item.index, success);
            }

            if strategy.checkpoint_due(ctx.counts.attempted()) {
                self.save_checkpoint(store, ctx, None)?;
            }
        }
    }

    /// One transform call plus the shape and domain checks on its output
    async fn attempt(
        &self,
        item: &WorkItem,
        profile: &JobProfile,
        cost: &dyn CostEstimator,
    ) -> Result<TransformOutput, TransformError> {
        let result = self
            .transformer
            .transform(&item.payload, &profile.generation)
            .await;
        cost.record(item.index, result.as_ref().ok().and_then(|o| o.usage));
        let output = result?;

        check_format(&output.content, profile.generation.output_format)
            .map_err(|reason| TransformError::malformed("output does not match declared format", vec![reason]))?;

        match self.validator.validate(&output.content, &profile.constraints) {
            ValidationOutcome::Valid => Ok(output),
            ValidationOutcome::Invalid { reasons } => Err(TransformError::malformed(
                "output rejected by validator",
                reasons,
            )),
        }
    }

    /// Outcomes already in the log; a crash between checkpoints leaves some past
    /// the resume index, and those items must not get a second result.
    fn scan_recorded(
        &self,
        writer: &AtomicRecordWriter,
    ) -> Result<BTreeMap<u64, ResultStatus>, BatchError> {
        let scan = RecordLogReader::scan(writer.path()).map_err(BatchError::Source)?;
        let duplicates = scan.duplicate_successes();
        if !duplicates.is_empty() {
            warn!(?duplicates, "Result log holds more than one success for some indices");
        }
        Ok(scan.recorded_outcomes())
    }

    fn advance(&self, ctx: &mut RunContext, tracker: &ProgressTracker, index: u64, success: bool) {
        ctx.position.resume_index = index + 1;
        ctx.position.processed += 1;
        if !success {
            ctx.position.failed += 1;
        }
        tracker.record_outcome(success, index);
    }

    fn save_checkpoint(
        &self,
        store: &CheckpointStore,
        ctx: &RunContext,
        reason: Option<&str>,
    ) -> Result<(), BatchError> {
        let config = self.factory.config();
        let position = &ctx.position;
        let mut checkpoint = Checkpoint::new(position.resume_index, position.processed, position.failed)
            .with_metadata(metadata_keys::RUN_ID, self.factory.run_id())
            .with_metadata(metadata_keys::PROFILE, config.engine.profile.as_str())
            .with_metadata(metadata_keys::STRATEGY, config.engine.strategy.to_string())
            .with_metadata(metadata_keys::ESTIMATED_COST, ctx.total_spend());
        if let Some(reason) = reason {
            checkpoint = checkpoint.with_metadata(metadata_keys::REASON, reason);
        }
        store.save(&checkpoint)?;
        log_checkpoint_operation("save", Some(position.resume_index), "ok", reason);
        Ok(())
    }

    fn transition(&self, to: EngineState) -> Result<(), BatchError> {
        self.state.lock().transition(to)
    }

    fn abort(&self, ctx: RunContext, profile: &str, error: BatchError) -> RunSummary {
        log_error("engine", "run", &error.to_string(), Some(profile));
        let outcome = RunOutcome::aborted(&error, self.factory.classifier().as_ref());
        self.finish(ctx, profile, EngineState::Aborted, outcome)
    }

    fn finish(
        &self,
        ctx: RunContext,
        profile: &str,
        state: EngineState,
        outcome: RunOutcome,
    ) -> RunSummary {
        let outcome = match self.transition(state) {
            Ok(()) => outcome,
            Err(error) => {
                log_error("engine", "transition", &error.to_string(), Some(profile));
                self.state.lock().abort();
                RunOutcome::aborted(&error, self.factory.classifier().as_ref())
            }
        };
        self.summarize(ctx, profile, outcome)
    }

    fn summarize(&self, ctx: RunContext, profile: &str, outcome: RunOutcome) -> RunSummary {
        let summary = RunSummary {
            run_id: self.factory.run_id().to_string(),
            profile: profile.to_string(),
            outcome,
            final_state: self.state(),
            processed_count: ctx.position.processed,
            failed_count: ctx.position.failed,
            this_run: ctx.counts,
            resume_index: ctx.position.resume_index,
            elapsed: ctx.started.elapsed(),
            cost: ctx.cost.map(|c| c.report()),
            warnings: ctx.warnings,
        };
        info!(
            run_id = %summary.run_id,
            final_state = %summary.final_state,
            exit_code = summary.exit_code(),
            "🏁 {summary}"
        );
        summary
    }
}
