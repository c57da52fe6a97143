//! # Failure Handling
//!
//! Error classification, retry backoff, and checkpoint recovery strategies.

pub mod backoff;
pub mod error_classifier;
pub mod strategies;

pub use backoff::BackoffPolicy;
pub use error_classifier::{
    ErrorClassification, ErrorClassifier, ErrorContext, StandardErrorClassifier,
};
pub use strategies::{
    ConservativeRecovery, LogScanRecovery, OperatorEscalation, RecoveryAttempt, RecoveryChain,
    RecoveryContext, RecoveryOutcome, RecoveryStrategy,
};
