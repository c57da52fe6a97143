//! # Preflight Validation
//!
//! Ordered checks run before the engine commits any API budget, cheapest first:
//!
//! 1. the profile parses
//! 2. its generation parameters and validation constraints agree
//! 3. every output path is writable
//! 4. one minimal round-trip call returns output of the expected shape
//!
//! Once a check is fatal the remaining ones are reported as skipped, so a broken
//! profile never reaches the external service.

use crate::client::validator::check_format;
use crate::client::Transformer;
use crate::config::{ConfigurationResolver, JobProfile, PathsConfig, PreflightConfig};
use crate::constants::exit_codes;
use crate::error::TransformError;
use crate::models::ErrorKind;
use crate::recovery::{ErrorClassifier, ErrorContext};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::{self, OpenOptions};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckSeverity {
    Passed,
    /// Problem that does not block the run
    Warning,
    /// Problem that blocks the run
    Fatal,
    Skipped,
}

impl fmt::Display for CheckSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Passed => write!(f, "passed"),
            Self::Warning => write!(f, "warning"),
            Self::Fatal => write!(f, "fatal"),
            Self::Skipped => write!(f, "skipped"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResult {
    pub name: String,
    pub severity: CheckSeverity,
    pub message: String,
    /// Classification of the service failure behind a round-trip result
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
}

impl CheckResult {
    fn new(name: &str, severity: CheckSeverity, message: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            severity,
            message: message.into(),
            error_kind: None,
        }
    }

    fn with_kind(mut self, kind: ErrorKind) -> Self {
        self.error_kind = Some(kind);
        self
    }
}

/// Outcome of a preflight run
#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    pub checks: Vec<CheckResult>,
    /// The resolved profile the run must use, once consistency passed
    pub profile: Option<Arc<JobProfile>>,
}

impl ValidationReport {
    pub fn is_fatal(&self) -> bool {
        self.checks.iter().any(|c| c.severity == CheckSeverity::Fatal)
    }

    pub fn warnings(&self) -> Vec<&CheckResult> {
        self.checks
            .iter()
            .filter(|c| c.severity == CheckSeverity::Warning)
            .collect()
    }

    /// `name: message` for every fatal check
    pub fn fatal_messages(&self) -> Vec<String> {
        self.checks
            .iter()
            .filter(|c| c.severity == CheckSeverity::Fatal)
            .map(|c| format!("{}: {}", c.name, c.message))
            .collect()
    }

    /// Process exit code for a blocked run, from the first fatal check
    pub fn exit_code(&self) -> i32 {
        let Some(first) = self
            .checks
            .iter()
            .find(|c| c.severity == CheckSeverity::Fatal)
        else {
            return exit_codes::SUCCESS;
        };
        match first.name.as_str() {
            CHECK_PROFILE_PARSES | CHECK_PROFILE_CONSISTENT => exit_codes::CONFIGURATION,
            CHECK_PATHS_WRITABLE => exit_codes::IO_FAILURE,
            _ => first
                .error_kind
                .map(|kind| kind.exit_code())
                .unwrap_or(exit_codes::INTERNAL),
        }
    }

    pub fn check(&self, name: &str) -> Option<&CheckResult> {
        self.checks.iter().find(|c| c.name == name)
    }

    fn push(&mut self, result: CheckResult) {
        match result.severity {
            CheckSeverity::Fatal => warn!(check = %result.name, message = %result.message, "❌ Preflight check failed"),
            CheckSeverity::Warning => warn!(check = %result.name, message = %result.message, "⚠️ Preflight warning"),
            _ => info!(check = %result.name, severity = %result.severity, "Preflight check"),
        }
        self.checks.push(result);
    }
}

pub const CHECK_PROFILE_PARSES: &str = "profile_parses";
pub const CHECK_PROFILE_CONSISTENT: &str = "profile_consistent";
pub const CHECK_PATHS_WRITABLE: &str = "output_paths_writable";
pub const CHECK_ROUND_TRIP: &str = "service_round_trip";

const CHECK_ORDER: [&str; 4] = [
    CHECK_PROFILE_PARSES,
    CHECK_PROFILE_CONSISTENT,
    CHECK_PATHS_WRITABLE,
    CHECK_ROUND_TRIP,
];

pub struct PreflightValidator<'a> {
    pub resolver: &'a ConfigurationResolver,
    pub paths: &'a PathsConfig,
    pub settings: &'a PreflightConfig,
    pub transformer: &'a dyn Transformer,
    pub classifier: &'a dyn ErrorClassifier,
    pub timeout: Duration,
}

impl PreflightValidator<'_> {
    pub async fn run(&self, profile_name: &str) -> ValidationReport {
        let mut report = ValidationReport::default();

        for (position, name) in CHECK_ORDER.iter().enumerate() {
            if report.is_fatal() {
                for skipped in &CHECK_ORDER[position..] {
                    report.push(CheckResult::new(
                        skipped,
                        CheckSeverity::Skipped,
                        "skipped after an earlier fatal check",
                    ));
                }
                break;
            }

            let result = match *name {
                CHECK_PROFILE_PARSES => self.check_parses(profile_name),
                CHECK_PROFILE_CONSISTENT => {
                    let (result, profile) = self.check_consistency(profile_name);
                    report.profile = profile;
                    result
                }
                CHECK_PATHS_WRITABLE => self.check_paths(),
                _ => match report.profile.clone() {
                    Some(profile) => self.check_round_trip(&profile).await,
                    None => CheckResult::new(name, CheckSeverity::Skipped, "no resolved profile"),
                },
            };
            report.push(result);
        }

        report
    }

    fn check_parses(&self, profile_name: &str) -> CheckResult {
        match self.resolver.parse(profile_name) {
            Ok(_) => CheckResult::new(CHECK_PROFILE_PARSES, CheckSeverity::Passed, "profile parsed"),
            Err(e) => CheckResult::new(CHECK_PROFILE_PARSES, CheckSeverity::Fatal, e.to_string()),
        }
    }

    fn check_consistency(&self, profile_name: &str) -> (CheckResult, Option<Arc<JobProfile>>) {
        match self.resolver.resolve(profile_name) {
            Ok(profile) => (
                CheckResult::new(
                    CHECK_PROFILE_CONSISTENT,
                    CheckSeverity::Passed,
                    "generation parameters satisfy validation constraints",
                ),
                Some(profile),
            ),
            Err(e) => (
                CheckResult::new(CHECK_PROFILE_CONSISTENT, CheckSeverity::Fatal, e.to_string()),
                None,
            ),
        }
    }

    fn check_paths(&self) -> CheckResult {
        let targets = [
            &self.paths.record_log,
            &self.paths.checkpoint,
            &self.paths.progress,
        ];
        let problems: Vec<String> = targets
            .iter()
            .filter_map(|path| probe_writable(path).err())
            .collect();

        if problems.is_empty() {
            CheckResult::new(CHECK_PATHS_WRITABLE, CheckSeverity::Passed, "all output paths writable")
        } else {
            CheckResult::new(CHECK_PATHS_WRITABLE, CheckSeverity::Fatal, problems.join("; "))
        }
    }

    async fn check_round_trip(&self, profile: &JobProfile) -> CheckResult {
        if !self.settings.round_trip {
            return CheckResult::new(
                CHECK_ROUND_TRIP,
                CheckSeverity::Skipped,
                "disabled by configuration",
            );
        }

        let call = self
            .transformer
            .transform(&self.settings.probe_payload, &profile.generation);
        let result = match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(TransformError::Timeout(self.timeout)),
        };

        match result {
            Ok(output) => match check_format(&output.content, profile.generation.output_format) {
                Ok(()) => CheckResult::new(
                    CHECK_ROUND_TRIP,
                    CheckSeverity::Passed,
                    "service responded with well-formed output",
                ),
                Err(reason) => CheckResult::new(
                    CHECK_ROUND_TRIP,
                    CheckSeverity::Fatal,
                    format!("response does not match expected schema: {reason}"),
                )
                .with_kind(ErrorKind::Malformed),
            },
            Err(error) => {
                let kind = self
                    .classifier
                    .classify_transform(&error, &ErrorContext::engine())
                    .kind;
                let severity = match kind {
                    ErrorKind::Transient | ErrorKind::RateLimited => CheckSeverity::Warning,
                    _ => CheckSeverity::Fatal,
                };
                CheckResult::new(CHECK_ROUND_TRIP, severity, format!("{kind}: {error}"))
                    .with_kind(kind)
            }
        }
    }
}

/// Create the parent directory and prove a file can be created next to `path`
fn probe_writable(path: &Path) -> Result<(), String> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)
        .map_err(|e| format!("cannot create {}: {e}", parent.display()))?;

    if path.exists() {
        OpenOptions::new()
            .append(true)
            .open(path)
            .map_err(|e| format!("{} is not writable: {e}", path.display()))?;
        return Ok(());
    }

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    let probe = parent.join(format!(".{file_name}.preflight"));
    fs::write(&probe, b"probe").map_err(|e| format!("{} is not writable: {e}", parent.display()))?;
    let _ = fs::remove_file(&probe);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::TransformOutput;
    use crate::config::{
        GenerationParameters, OutputFormat, RawConstraints, RawGeneration, RawProfile,
    };
    use crate::recovery::StandardErrorClassifier;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FixedTransformer {
        response: Result<TransformOutput, TransformError>,
        calls: AtomicU32,
    }

    impl FixedTransformer {
        fn new(response: Result<TransformOutput, TransformError>) -> Self {
            Self {
                response,
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl Transformer for FixedTransformer {
        async fn transform(
            &self,
            _payload: &Value,
            _parameters: &GenerationParameters,
        ) -> Result<TransformOutput, TransformError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.response.clone()
        }
    }

    fn catalog(gen_max: u32, constraint_max: u32) -> ConfigurationResolver {
        let profile = RawProfile {
            generation: Some(RawGeneration {
                model: Some("writer".to_string()),
                temperature: Some(0.2),
                max_tokens: Some(256),
                min_units: Some(1),
                max_units: Some(gen_max),
                output_format: Some(OutputFormat::Json),
                extra: BTreeMap::new(),
            }),
            constraints: Some(RawConstraints {
                min_units: Some(1),
                max_units: Some(constraint_max),
                required_fields: vec![],
                max_output_chars: None,
            }),
        };
        ConfigurationResolver::new(BTreeMap::from([("jobs".to_string(), profile)]))
    }

    async fn run(
        resolver: &ConfigurationResolver,
        transformer: &FixedTransformer,
        dir: &Path,
    ) -> ValidationReport {
        let paths = PathsConfig::rooted_at(dir);
        let settings = PreflightConfig::default();
        let classifier = StandardErrorClassifier::new();
        PreflightValidator {
            resolver,
            paths: &paths,
            settings: &settings,
            transformer,
            classifier: &classifier,
            timeout: Duration::from_secs(5),
        }
        .run("jobs")
        .await
    }

    #[tokio::test]
    async fn test_all_checks_pass() {
        let dir = tempfile::tempdir().unwrap();
        let transformer = FixedTransformer::new(Ok(TransformOutput::new(json!({"items": [1]}))));
        let report = run(&catalog(5, 5), &transformer, dir.path()).await;

        assert!(!report.is_fatal());
        assert_eq!(report.checks.len(), 4);
        assert!(report.checks.iter().all(|c| c.severity == CheckSeverity::Passed));
        assert!(report.profile.is_some());
    }

    #[tokio::test]
    async fn test_inconsistent_profile_makes_no_external_call() {
        let dir = tempfile::tempdir().unwrap();
        let transformer = FixedTransformer::new(Ok(TransformOutput::new(json!({}))));
        let report = run(&catalog(10, 5), &transformer, dir.path()).await;

        assert!(report.is_fatal());
        assert_eq!(transformer.calls.load(Ordering::SeqCst), 0);
        assert_eq!(
            report.check(CHECK_ROUND_TRIP).map(|c| c.severity),
            Some(CheckSeverity::Skipped)
        );
        assert!(report.profile.is_none());
        assert_eq!(report.exit_code(), exit_codes::CONFIGURATION);
    }

    #[tokio::test]
    async fn test_transient_round_trip_is_a_warning() {
        let dir = tempfile::tempdir().unwrap();
        let transformer = FixedTransformer::new(Err(TransformError::transient("503")));
        let report = run(&catalog(5, 5), &transformer, dir.path()).await;

        assert!(!report.is_fatal());
        assert_eq!(report.warnings().len(), 1);
    }

    #[tokio::test]
    async fn test_schema_mismatch_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let transformer = FixedTransformer::new(Ok(TransformOutput::new(json!("plain text"))));
        let report = run(&catalog(5, 5), &transformer, dir.path()).await;

        assert!(report.is_fatal());
        assert!(report.fatal_messages()[0].contains("expected schema"));
        assert_eq!(report.exit_code(), exit_codes::PROTOCOL);
    }

    #[tokio::test]
    async fn test_unwritable_paths_are_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, b"not a directory").unwrap();

        let transformer = FixedTransformer::new(Ok(TransformOutput::new(json!([1]))));
        let report = run(&catalog(5, 5), &transformer, &blocker.join("out")).await;

        assert_eq!(
            report.check(CHECK_PATHS_WRITABLE).map(|c| c.severity),
            Some(CheckSeverity::Fatal)
        );
        assert_eq!(transformer.calls.load(Ordering::SeqCst), 0);
    }
}
