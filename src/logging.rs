//! # Structured Logging Module
//!
//! Environment-aware structured logging to the console and, optionally, to JSON
//! files for post-mortem analysis of long runs.

use crate::constants::ENV_NAME_VAR;
use chrono::Utc;
use std::fs;
use std::path::Path;
use std::process;
use std::sync::OnceLock;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();
static FILE_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Initialize structured logging once per process.
///
/// The level follows `BATCH_ENGINE_ENV`; `RUST_LOG` overrides it. When `log_dir` is
/// given, a JSON copy of every event is written to
/// `<log_dir>/<environment>.<pid>.<timestamp>.log`.
pub fn init_structured_logging(log_dir: Option<&Path>) {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = get_environment();
        let log_level = get_log_level(&environment);

        let console = fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_level(true)
            .with_ansi(true)
            .with_filter(env_filter(&log_level));

        let file_target = log_dir.and_then(|dir| match fs::create_dir_all(dir) {
            Ok(()) => {
                let name = format!(
                    "{}.{}.{}.log",
                    environment,
                    process::id(),
                    Utc::now().format("%Y%m%d_%H%M%S")
                );
                Some((dir.to_path_buf(), name))
            }
            Err(e) => {
                eprintln!("batch engine: cannot create log directory {}: {e}", dir.display());
                None
            }
        });

        let file_layer = file_target.as_ref().map(|(dir, name)| {
            let appender = tracing_appender::rolling::never(dir, name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let _ = FILE_GUARD.set(guard);
            fmt::layer()
                .with_writer(writer)
                .with_target(true)
                .with_thread_ids(true)
                .with_level(true)
                .with_ansi(false)
                .json()
                .with_filter(env_filter(&log_level))
        });

        // Another subscriber may already be installed by the host application.
        if tracing_subscriber::registry()
            .with(console)
            .with(file_layer)
            .try_init()
            .is_err()
        {
            tracing::debug!("Global tracing subscriber already initialized - continuing");
        }

        tracing::info!(
            pid = process::id(),
            environment = %environment,
            log_file = ?file_target.map(|(dir, name)| dir.join(name).display().to_string()),
            "🔧 STRUCTURED LOGGING: Initialized"
        );
    });
}

fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

fn get_environment() -> String {
    std::env::var(ENV_NAME_VAR).unwrap_or_else(|_| "development".to_string())
}

fn get_log_level(environment: &str) -> String {
    match environment {
        "production" => "info".to_string(),
        _ => "debug".to_string(),
    }
}

/// Log the terminal outcome of one work item
pub fn log_item_outcome(
    work_item_index: u64,
    status: &str,
    attempts: u32,
    error_kind: Option<&str>,
    details: Option<&str>,
) {
    tracing::info!(
        work_item_index = work_item_index,
        status = %status,
        attempts = attempts,
        error_kind = error_kind,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "📋 ITEM_OUTCOME"
    );
}

/// Log a checkpoint save, load, or recovery
pub fn log_checkpoint_operation(
    operation: &str,
    resume_index: Option<u64>,
    status: &str,
    details: Option<&str>,
) {
    tracing::info!(
        operation = %operation,
        resume_index = resume_index,
        status = %status,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "💾 CHECKPOINT_OPERATION"
    );
}

/// Log error with full context
pub fn log_error(component: &str, operation: &str, error: &str, context: Option<&str>) {
    tracing::error!(
        component = %component,
        operation = %operation,
        error = %error,
        context = context,
        timestamp = %Utc::now().to_rfc3339(),
        "❌ ERROR"
    );
}
