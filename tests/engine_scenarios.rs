//! End-to-end runs of the engine against scripted transformers.

mod common;

use batch_engine::client::{InMemorySource, TransformOutput};
use batch_engine::constants::metadata_keys;
use batch_engine::error::TransformError;
use batch_engine::models::{Checkpoint, ErrorKind, ProgressSnapshot, ResultRecord, ResultStatus};
use batch_engine::orchestration::{EngineState, PauseReason, RunOutcome, StrategyKind};
use batch_engine::persistence::{AtomicRecordWriter, CheckpointStore};
use common::*;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::fs;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

fn load_checkpoint(workspace: &TestWorkspace) -> Checkpoint {
    let raw = fs::read_to_string(workspace.checkpoint()).expect("checkpoint exists");
    serde_json::from_str(&raw).expect("checkpoint parses")
}

#[tokio::test]
async fn fresh_run_processes_every_item_once() {
    let workspace = TestWorkspace::new();
    let transformer = Arc::new(ScriptedTransformer::echo());
    let engine = workspace.engine(Arc::clone(&transformer));
    let mut source = InMemorySource::new(payloads(10));

    let summary = engine.run(&mut source, &CancellationToken::new()).await;

    assert_eq!(summary.outcome, RunOutcome::Completed);
    assert_eq!(summary.final_state, EngineState::Completed);
    assert_eq!(summary.exit_code(), 0);
    assert_eq!(summary.processed_count, 10);
    assert_eq!(summary.failed_count, 0);
    assert_eq!(summary.resume_index, 10);
    assert_eq!(transformer.calls(), 10);

    let records = workspace.records();
    let indices: Vec<u64> = records.iter().map(|r| r.work_item_index).collect();
    assert_eq!(indices, (0..10).collect::<Vec<_>>());
    assert!(records.iter().all(|r| r.status == ResultStatus::Success));

    let checkpoint = load_checkpoint(&workspace);
    assert_eq!(checkpoint.resume_index, 10);
    assert_eq!(checkpoint.processed_count, 10);
    assert_eq!(checkpoint.metadata["profile"], json!(PROFILE));
    assert_eq!(checkpoint.metadata["run_id"], json!("test-run"));

    let progress: ProgressSnapshot =
        serde_json::from_str(&fs::read_to_string(workspace.progress()).unwrap()).unwrap();
    assert_eq!(progress.processed, 10);
    assert_eq!(progress.percent_complete, Some(100.0));
}

#[tokio::test]
async fn interrupted_run_resumes_at_next_index() {
    let workspace = TestWorkspace::new();
    let cancel = CancellationToken::new();
    let transformer = Arc::new(
        ScriptedTransformer::echo().cancel_while_serving(json!("item-2"), cancel.clone()),
    );

    let first = workspace
        .engine(Arc::clone(&transformer))
        .run(&mut InMemorySource::new(payloads(10)), &cancel)
        .await;

    assert_eq!(first.outcome, RunOutcome::Paused(PauseReason::Interrupted));
    assert_eq!(first.exit_code(), 0);
    assert_eq!(first.resume_index, 3);
    assert_eq!(load_checkpoint(&workspace).resume_index, 3);
    assert_eq!(workspace.records().len(), 3);

    let second = workspace
        .engine(Arc::clone(&transformer))
        .run(&mut InMemorySource::new(payloads(10)), &CancellationToken::new())
        .await;

    assert!(second.is_completed());
    assert_eq!(second.processed_count, 10);
    assert_eq!(second.this_run.succeeded, 7);

    // Each payload reached the service exactly once across both runs
    assert_eq!(transformer.seen(), payloads(10));

    let mut successes: BTreeMap<u64, usize> = BTreeMap::new();
    for record in workspace.records() {
        if record.is_success() {
            *successes.entry(record.work_item_index).or_default() += 1;
        }
    }
    assert_eq!(successes.len(), 10);
    assert!(successes.values().all(|count| *count == 1));
}

#[tokio::test(start_paused = true)]
async fn exhausted_transient_retries_fail_only_that_item() {
    let workspace = TestWorkspace::new();
    let transformer = Arc::new(ScriptedTransformer::failing_for(
        json!("item-3"),
        TransformError::transient("503 Service Unavailable"),
    ));
    let engine = workspace.engine(Arc::clone(&transformer));

    let summary = engine
        .run(&mut InMemorySource::new(payloads(6)), &CancellationToken::new())
        .await;

    assert!(summary.is_completed());
    assert_eq!(summary.exit_code(), 0);
    assert_eq!(summary.processed_count, 6);
    assert_eq!(summary.failed_count, 1);
    assert!(summary.to_string().starts_with("completed, some items failed"));
    // 5 items once each, item 3 three times
    assert_eq!(transformer.calls(), 8);

    let records = workspace.records();
    let failed = records
        .iter()
        .find(|r| r.work_item_index == 3)
        .expect("record for item 3");
    assert_eq!(failed.status, ResultStatus::Failed);
    assert_eq!(failed.error_kind, Some(ErrorKind::Transient));
    assert_eq!(failed.attempt_count, 3);
    assert!(records
        .iter()
        .filter(|r| r.work_item_index != 3)
        .all(|r| r.is_success()));
}

#[tokio::test]
async fn deleted_checkpoint_is_rebuilt_from_result_log() {
    let workspace = TestWorkspace::new();
    let first = workspace
        .engine(Arc::new(ScriptedTransformer::echo()))
        .run(&mut InMemorySource::new(payloads(10)), &CancellationToken::new())
        .await;
    assert!(first.is_completed());

    fs::remove_file(workspace.checkpoint()).unwrap();

    let transformer = Arc::new(ScriptedTransformer::echo());
    let second = workspace
        .engine(Arc::clone(&transformer))
        .run(&mut InMemorySource::new(payloads(15)), &CancellationToken::new())
        .await;

    assert!(second.is_completed());
    assert_eq!(second.resume_index, 15);
    assert_eq!(second.processed_count, 15);
    let expected: Vec<Value> = payloads(15).into_iter().skip(10).collect();
    assert_eq!(transformer.seen(), expected);
    assert_eq!(workspace.records().len(), 15);
}

#[tokio::test]
async fn inconsistent_profile_is_rejected_before_any_call() {
    let mut workspace = TestWorkspace::with_profile(inconsistent_profile());
    workspace.config.preflight.round_trip = true;
    let transformer = Arc::new(ScriptedTransformer::echo());
    let engine = workspace.engine(Arc::clone(&transformer));

    let summary = engine
        .run(&mut InMemorySource::new(payloads(5)), &CancellationToken::new())
        .await;

    assert_eq!(transformer.calls(), 0);
    assert_eq!(summary.final_state, EngineState::Aborted);
    assert_eq!(summary.exit_code(), 78);
    assert!(summary.to_string().starts_with("aborted before completion"));
    assert!(summary.to_string().contains("up to 20 units"));
    assert!(!workspace.record_log().exists() || workspace.records().is_empty());
}

#[tokio::test]
async fn logged_successes_are_not_redone_after_stale_checkpoint() {
    let workspace = TestWorkspace::new();
    workspace
        .engine(Arc::new(ScriptedTransformer::echo()))
        .run(&mut InMemorySource::new(payloads(5)), &CancellationToken::new())
        .await;

    // A crash between append and checkpoint leaves the checkpoint behind the log
    let store = CheckpointStore::new(workspace.checkpoint(), workspace.record_log());
    store.save(&Checkpoint::new(2, 2, 0)).unwrap();

    let transformer = Arc::new(ScriptedTransformer::echo());
    let summary = workspace
        .engine(Arc::clone(&transformer))
        .run(&mut InMemorySource::new(payloads(5)), &CancellationToken::new())
        .await;

    assert!(summary.is_completed());
    assert_eq!(transformer.calls(), 0);
    assert_eq!(summary.this_run.already_recorded, 3);
    assert_eq!(summary.resume_index, 5);
    assert_eq!(workspace.records().len(), 5);
}

#[tokio::test]
async fn logged_failures_past_checkpoint_are_not_redone() {
    let workspace = TestWorkspace::new();
    workspace
        .engine(Arc::new(ScriptedTransformer::echo()))
        .run(&mut InMemorySource::new(payloads(10)), &CancellationToken::new())
        .await;
    assert_eq!(load_checkpoint(&workspace).resume_index, 10);

    // Two more outcomes reached the log before the process died
    let writer = AtomicRecordWriter::open(workspace.record_log()).unwrap();
    writer
        .append(&ResultRecord::failed(
            10,
            ErrorKind::Malformed,
            vec!["too many units".to_string()],
            1,
        ))
        .unwrap();
    writer
        .append(&ResultRecord::success(11, json!({"items": ["item-11"]}), 1))
        .unwrap();
    drop(writer);

    let transformer = Arc::new(ScriptedTransformer::failing_for(
        json!("item-10"),
        TransformError::malformed("output rejected by validator", vec![]),
    ));
    let summary = workspace
        .engine(Arc::clone(&transformer))
        .run(&mut InMemorySource::new(payloads(12)), &CancellationToken::new())
        .await;

    assert!(summary.is_completed());
    assert_eq!(transformer.calls(), 0);
    assert_eq!(summary.this_run.already_recorded, 2);
    assert_eq!(summary.processed_count, 12);
    assert_eq!(summary.failed_count, 1);
    assert_eq!(summary.resume_index, 12);

    let records = workspace.records();
    assert_eq!(records.len(), 12);
    assert_eq!(records.iter().filter(|r| r.work_item_index == 10).count(), 1);
}

#[tokio::test]
async fn fatal_transform_error_aborts_with_checkpoint_at_item() {
    let workspace = TestWorkspace::new();
    let transformer = Arc::new(ScriptedTransformer::failing_for(
        json!("item-1"),
        TransformError::other("401 Unauthorized: invalid api key"),
    ));

    let summary = workspace
        .engine(Arc::clone(&transformer))
        .run(&mut InMemorySource::new(payloads(4)), &CancellationToken::new())
        .await;

    assert_eq!(summary.final_state, EngineState::Aborted);
    assert_eq!(summary.exit_code(), 70);
    assert_eq!(summary.resume_index, 1);
    assert_eq!(transformer.calls(), 2);
    assert_eq!(workspace.records().len(), 1);
    assert_eq!(load_checkpoint(&workspace).resume_index, 1);
}

#[tokio::test]
async fn rejected_output_is_recorded_as_malformed() {
    let workspace = TestWorkspace::new();
    let transformer = Arc::new(ScriptedTransformer::new(|payload, _| {
        if *payload == json!("item-2") {
            let units: Vec<u32> = (0..12).collect();
            Ok(TransformOutput::new(json!({ "items": units })))
        } else {
            Ok(echo_output(payload))
        }
    }));

    let summary = workspace
        .engine(Arc::clone(&transformer))
        .run(&mut InMemorySource::new(payloads(4)), &CancellationToken::new())
        .await;

    assert!(summary.is_completed());
    assert_eq!(summary.failed_count, 1);
    // Standard strategy does not retry malformed output
    assert_eq!(transformer.calls(), 4);

    let rejected = workspace
        .records()
        .into_iter()
        .find(|r| r.work_item_index == 2)
        .unwrap();
    assert_eq!(rejected.error_kind, Some(ErrorKind::Malformed));
    assert!(rejected.reasons.iter().any(|r| r.contains("12")));
}

#[tokio::test(start_paused = true)]
async fn reliability_strategy_retries_malformed_output() {
    let mut workspace = TestWorkspace::new();
    workspace.config.engine.strategy = StrategyKind::ReliabilityFocused;
    let transformer = Arc::new(ScriptedTransformer::new(|payload, attempt| {
        if *payload == json!("item-0") && attempt < 3 {
            Ok(TransformOutput::new(json!("not an object")))
        } else {
            Ok(echo_output(payload))
        }
    }));

    let summary = workspace
        .engine(Arc::clone(&transformer))
        .run(&mut InMemorySource::new(payloads(2)), &CancellationToken::new())
        .await;

    assert!(summary.is_completed());
    assert_eq!(summary.failed_count, 0);
    assert_eq!(transformer.calls(), 4);
    assert_eq!(workspace.records()[0].attempt_count, 3);
}

#[tokio::test]
async fn exhausted_budget_pauses_run() {
    let mut workspace = TestWorkspace::new();
    // Each echo call reports 100 tokens, 0.0002 at the default price
    workspace.config.cost.budget_limit = Some(0.0003);

    let summary = workspace
        .engine(Arc::new(ScriptedTransformer::echo()))
        .run(&mut InMemorySource::new(payloads(5)), &CancellationToken::new())
        .await;

    assert_eq!(summary.outcome, RunOutcome::Paused(PauseReason::BudgetExhausted));
    assert_eq!(summary.exit_code(), 0);
    assert_eq!(summary.resume_index, 2);
    let cost = summary.cost.expect("cost report");
    assert_eq!(cost.calls, 2);
    assert_eq!(cost.total_tokens, 200);
    assert_eq!(load_checkpoint(&workspace).resume_index, 2);
}

#[tokio::test]
async fn budget_spend_carries_across_resumed_runs() {
    let mut workspace = TestWorkspace::new();
    workspace.config.cost.budget_limit = Some(0.0003);
    workspace
        .engine(Arc::new(ScriptedTransformer::echo()))
        .run(&mut InMemorySource::new(payloads(6)), &CancellationToken::new())
        .await;
    let spent = load_checkpoint(&workspace).metadata[metadata_keys::ESTIMATED_COST]
        .as_f64()
        .unwrap();
    assert!((spent - 0.0004).abs() < 1e-9);

    // Same budget: the restarted process must not spend again
    let transformer = Arc::new(ScriptedTransformer::echo());
    let summary = workspace
        .engine(Arc::clone(&transformer))
        .run(&mut InMemorySource::new(payloads(6)), &CancellationToken::new())
        .await;
    assert_eq!(summary.outcome, RunOutcome::Paused(PauseReason::BudgetExhausted));
    assert_eq!(transformer.calls(), 0);
    assert_eq!(summary.resume_index, 2);

    // A raised budget buys exactly the difference
    workspace.config.cost.budget_limit = Some(0.0007);
    let transformer = Arc::new(ScriptedTransformer::echo());
    let summary = workspace
        .engine(Arc::clone(&transformer))
        .run(&mut InMemorySource::new(payloads(6)), &CancellationToken::new())
        .await;
    assert_eq!(summary.outcome, RunOutcome::Paused(PauseReason::BudgetExhausted));
    assert_eq!(transformer.calls(), 2);
    assert_eq!(summary.resume_index, 4);
    let spent = load_checkpoint(&workspace).metadata[metadata_keys::ESTIMATED_COST]
        .as_f64()
        .unwrap();
    assert!((spent - 0.0008).abs() < 1e-9);
}

#[tokio::test]
async fn empty_payloads_get_skip_records() {
    let workspace = TestWorkspace::new();
    let transformer = Arc::new(ScriptedTransformer::echo());

    let summary = workspace
        .engine(Arc::clone(&transformer))
        .run(
            &mut InMemorySource::new(vec![json!("a"), Value::Null, json!("  "), json!("d")]),
            &CancellationToken::new(),
        )
        .await;

    assert!(summary.is_completed());
    assert_eq!(summary.this_run.skipped, 2);
    assert_eq!(summary.failed_count, 0);
    assert_eq!(transformer.calls(), 2);
    let statuses: Vec<ResultStatus> = workspace.records().iter().map(|r| r.status).collect();
    assert_eq!(
        statuses,
        vec![
            ResultStatus::Success,
            ResultStatus::Skipped,
            ResultStatus::Skipped,
            ResultStatus::Success
        ]
    );
}

#[tokio::test]
async fn custom_validator_sees_every_output() {
    let workspace = TestWorkspace::new();
    let validator = Arc::new(CountingValidator::rejecting("item-1"));
    let transformer = Arc::new(ScriptedTransformer::echo());

    let summary = workspace
        .engine_with_validator(Arc::clone(&transformer), Arc::clone(&validator))
        .run(&mut InMemorySource::new(payloads(3)), &CancellationToken::new())
        .await;

    assert!(summary.is_completed());
    assert_eq!(validator.calls(), 3);
    assert_eq!(summary.failed_count, 1);

    let rejected = &workspace.records()[1];
    assert_eq!(rejected.status, ResultStatus::Failed);
    assert_eq!(rejected.error_kind, Some(ErrorKind::Malformed));
    assert_eq!(
        rejected.reasons,
        vec!["output mentions forbidden marker 'item-1'".to_string()]
    );
}
