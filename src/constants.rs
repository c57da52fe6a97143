//! # System Constants
//!
//! Fixed values that define on-disk formats and process boundaries of the engine.

/// Current checkpoint document schema version
pub const CHECKPOINT_SCHEMA_VERSION: u32 = 1;

/// Required keys of a checkpoint document
pub const CHECKPOINT_REQUIRED_KEYS: [&str; 6] = [
    "schema_version",
    "resume_index",
    "processed_count",
    "failed_count",
    "timestamp",
    "metadata",
];

/// Record separator for the result log
pub const RECORD_SEPARATOR: u8 = b'\n';

/// Suffix used for temp files that are renamed over their target
pub const TEMP_SUFFIX: &str = "tmp";

/// Infix used for timestamped checkpoint backups (`checkpoint.json.bak.<stamp>`)
pub const BACKUP_INFIX: &str = "bak";

/// Environment variable prefix for engine configuration overrides
pub const ENV_PREFIX: &str = "BATCH_ENGINE";

/// Environment variable naming the deployment environment
pub const ENV_NAME_VAR: &str = "BATCH_ENGINE_ENV";

/// Default file locations
pub mod paths {
    pub const RECORD_LOG: &str = "output/results.jsonl";
    pub const CHECKPOINT: &str = "output/checkpoint.json";
    pub const PROGRESS: &str = "output/progress.json";
}

/// Process exit codes reported to the CLI collaborator
pub mod exit_codes {
    pub const SUCCESS: i32 = 0;
    pub const DATA_CORRUPTION: i32 = 65;
    pub const SERVICE_UNAVAILABLE: i32 = 69;
    pub const INTERNAL: i32 = 70;
    pub const IO_FAILURE: i32 = 74;
    pub const TEMPORARY_FAILURE: i32 = 75;
    pub const PROTOCOL: i32 = 76;
    pub const CONFIGURATION: i32 = 78;
}

/// Metadata keys written into checkpoints
pub mod metadata_keys {
    pub const RUN_ID: &str = "run_id";
    pub const PROFILE: &str = "profile";
    pub const STRATEGY: &str = "strategy";
    pub const RECOVERED_BY: &str = "recovered_by";
    pub const REASON: &str = "reason";
    /// Estimated spend summed over every run that contributed to this checkpoint
    pub const ESTIMATED_COST: &str = "estimated_cost";
}
