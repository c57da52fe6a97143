//! Shared fixtures: engine configuration, job profiles, and scripted collaborators.

use async_trait::async_trait;
use batch_engine::client::{
    ConstraintValidator, OutputValidator, TokenUsage, TransformOutput, Transformer,
    ValidationOutcome,
};
use batch_engine::config::{
    EngineConfig, GenerationParameters, PathsConfig, RawProfile, ValidationConstraints,
};
use batch_engine::error::TransformError;
use batch_engine::orchestration::{BatchEngine, ComponentFactory};
use batch_engine::persistence::RecordLogReader;
use batch_engine::ResultRecord;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

pub const PROFILE: &str = "summaries";

/// Profile whose generator range sits inside what the validator accepts
pub fn consistent_profile() -> RawProfile {
    serde_json::from_value(json!({
        "generation": {
            "model": "test-model",
            "temperature": 0.3,
            "max_tokens": 512,
            "min_units": 1,
            "max_units": 5,
            "output_format": "json"
        },
        "constraints": { "min_units": 1, "max_units": 10 }
    }))
    .expect("valid profile fixture")
}

/// Generator may produce 20 units, validator accepts at most 10
pub fn inconsistent_profile() -> RawProfile {
    serde_json::from_value(json!({
        "generation": {
            "model": "test-model",
            "temperature": 0.3,
            "max_tokens": 512,
            "min_units": 1,
            "max_units": 20,
            "output_format": "json"
        },
        "constraints": { "min_units": 1, "max_units": 10 }
    }))
    .expect("valid profile fixture")
}

/// Temporary output directory plus a config rooted in it
pub struct TestWorkspace {
    pub dir: TempDir,
    pub config: EngineConfig,
}

impl TestWorkspace {
    pub fn new() -> Self {
        Self::with_profile(consistent_profile())
    }

    pub fn with_profile(profile: RawProfile) -> Self {
        let dir = tempfile::tempdir().expect("create temp dir");
        let mut config = EngineConfig {
            paths: PathsConfig::rooted_at(dir.path()),
            ..EngineConfig::default()
        };
        config.engine.profile = PROFILE.to_string();
        config.engine.run_label = Some("test-run".to_string());
        config.preflight.round_trip = false;
        config.backoff.jitter_factor = 0.0;
        config.profiles.insert(PROFILE.to_string(), profile);
        Self { dir, config }
    }

    pub fn record_log(&self) -> &Path {
        &self.config.paths.record_log
    }

    pub fn checkpoint(&self) -> &Path {
        &self.config.paths.checkpoint
    }

    pub fn progress(&self) -> &Path {
        &self.config.paths.progress
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    pub fn records(&self) -> Vec<ResultRecord> {
        RecordLogReader::read_records(self.record_log()).expect("read result log")
    }

    /// Fresh engine over the current config, as a restarted process would build it
    pub fn engine(&self, transformer: Arc<ScriptedTransformer>) -> BatchEngine {
        let factory = ComponentFactory::new(self.config.clone()).expect("valid config");
        BatchEngine::new(Arc::new(factory), transformer)
    }

    pub fn engine_with_validator(
        &self,
        transformer: Arc<ScriptedTransformer>,
        validator: Arc<CountingValidator>,
    ) -> BatchEngine {
        self.engine(transformer).with_validator(validator)
    }
}

impl Default for TestWorkspace {
    fn default() -> Self {
        Self::new()
    }
}

/// `item-0`, `item-1`, ...
pub fn payloads(count: u64) -> Vec<Value> {
    (0..count).map(|i| json!(format!("item-{i}"))).collect()
}

type Behavior = dyn Fn(&Value, u32) -> Result<TransformOutput, TransformError> + Send + Sync;

/// Transformer driven by a closure of `(payload, per-payload call number)`
pub struct ScriptedTransformer {
    behavior: Box<Behavior>,
    calls: AtomicU32,
    seen: Mutex<Vec<Value>>,
    cancel_on: Mutex<Option<(Value, CancellationToken)>>,
}

impl ScriptedTransformer {
    pub fn new(
        behavior: impl Fn(&Value, u32) -> Result<TransformOutput, TransformError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            behavior: Box::new(behavior),
            calls: AtomicU32::new(0),
            seen: Mutex::new(Vec::new()),
            cancel_on: Mutex::new(None),
        }
    }

    /// Wraps each payload into a single-unit JSON output
    pub fn echo() -> Self {
        Self::new(|payload, _| Ok(echo_output(payload)))
    }

    /// Echo, except `payload` always fails with `error`
    pub fn failing_for(payload: Value, error: TransformError) -> Self {
        Self::new(move |p, _| {
            if *p == payload {
                Err(error.clone())
            } else {
                Ok(echo_output(p))
            }
        })
    }

    /// Cancel `token` while serving `payload`, as a signal arriving mid-call would
    pub fn cancel_while_serving(self, payload: Value, token: CancellationToken) -> Self {
        *self.cancel_on.lock() = Some((payload, token));
        self
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn seen(&self) -> Vec<Value> {
        self.seen.lock().clone()
    }
}

pub fn echo_output(payload: &Value) -> TransformOutput {
    TransformOutput::new(json!({ "items": [payload.clone()] })).with_usage(TokenUsage {
        prompt_tokens: 40,
        completion_tokens: 60,
    })
}

#[async_trait]
impl Transformer for ScriptedTransformer {
    async fn transform(
        &self,
        payload: &Value,
        _parameters: &GenerationParameters,
    ) -> Result<TransformOutput, TransformError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let attempt = {
            let mut seen = self.seen.lock();
            seen.push(payload.clone());
            seen.iter().filter(|p| *p == payload).count() as u32
        };
        if let Some((trigger, token)) = self.cancel_on.lock().as_ref() {
            if trigger == payload {
                token.cancel();
            }
        }
        (self.behavior)(payload, attempt)
    }
}

/// Constraint validator that counts calls and rejects outputs mentioning `reject`
pub struct CountingValidator {
    calls: AtomicU32,
    reject: Option<String>,
}

impl CountingValidator {
    pub fn new() -> Self {
        Self {
            calls: AtomicU32::new(0),
            reject: None,
        }
    }

    pub fn rejecting(marker: &str) -> Self {
        Self {
            calls: AtomicU32::new(0),
            reject: Some(marker.to_string()),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for CountingValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputValidator for CountingValidator {
    fn validate(&self, output: &Value, constraints: &ValidationConstraints) -> ValidationOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(marker) = &self.reject {
            if output.to_string().contains(marker.as_str()) {
                return ValidationOutcome::Invalid {
                    reasons: vec![format!("output mentions forbidden marker '{marker}'")],
                };
            }
        }
        ConstraintValidator.validate(output, constraints)
    }
}
