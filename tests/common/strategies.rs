use batch_engine::models::{ErrorKind, ResultRecord};
use proptest::prelude::*;
use serde_json::{json, Value};

/// Strategy for generating item outputs, including ones with embedded newlines
pub fn output_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        "[a-zA-Z0-9 .,!?]{0,64}".prop_map(Value::String),
        "[a-z]{1,8}\n[a-z]{1,8}".prop_map(Value::String),
        prop::collection::vec("[a-z]{1,12}", 0..6).prop_map(|items| json!({ "items": items })),
    ]
}

pub fn error_kind_strategy() -> impl Strategy<Value = ErrorKind> {
    prop_oneof![
        Just(ErrorKind::Transient),
        Just(ErrorKind::RateLimited),
        Just(ErrorKind::Malformed),
    ]
}

/// One record for `index`: success, failure, or skip
pub fn record_strategy(index: u64) -> impl Strategy<Value = ResultRecord> {
    prop_oneof![
        (output_strategy(), 1u32..4)
            .prop_map(move |(output, attempts)| ResultRecord::success(index, output, attempts)),
        (error_kind_strategy(), "[a-z ]{1,24}", 1u32..4).prop_map(
            move |(kind, reason, attempts)| ResultRecord::failed(index, kind, vec![reason], attempts)
        ),
        Just(ResultRecord::skipped(index, "empty payload")),
    ]
}

/// Records for indices `0..n` in order
pub fn record_run_strategy(max_len: u64) -> impl Strategy<Value = Vec<ResultRecord>> {
    (1..=max_len).prop_flat_map(|len| {
        (0..len)
            .map(record_strategy)
            .collect::<Vec<_>>()
    })
}
