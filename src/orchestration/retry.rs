//! # Retry Wrapper
//!
//! Runs one item's transform call under a timeout, classifies each failure, and
//! waits out the backoff between attempts. The wait is the engine's only
//! suspension point besides the call itself, and the only one a shutdown request
//! may cut short.

use crate::client::TransformOutput;
use crate::error::TransformError;
use crate::models::ErrorKind;
use crate::recovery::{BackoffPolicy, ErrorClassifier, ErrorContext};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// How one item's attempts ended
#[derive(Debug, Clone, PartialEq)]
pub enum RetryOutcome {
    Succeeded {
        output: TransformOutput,
        attempts: u32,
    },
    /// Terminal for this item only; the run continues
    Failed {
        kind: ErrorKind,
        reasons: Vec<String>,
        attempts: u32,
    },
    /// Continuing the run is unsafe
    Fatal {
        error: TransformError,
        attempts: u32,
    },
    /// Shutdown requested while waiting to retry
    Cancelled { attempts: u32 },
}

#[derive(Clone)]
pub struct RetryExecutor {
    classifier: Arc<dyn ErrorClassifier>,
    backoff: BackoffPolicy,
    timeout: Duration,
    max_attempts: u32,
    retry_malformed: bool,
}

impl std::fmt::Debug for RetryExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryExecutor")
            .field("classifier", &self.classifier.classifier_name())
            .field("timeout", &self.timeout)
            .field("max_attempts", &self.max_attempts)
            .field("retry_malformed", &self.retry_malformed)
            .finish()
    }
}

impl RetryExecutor {
    pub fn new(
        classifier: Arc<dyn ErrorClassifier>,
        backoff: BackoffPolicy,
        timeout: Duration,
        max_attempts: u32,
    ) -> Self {
        Self {
            classifier,
            backoff,
            timeout,
            max_attempts: max_attempts.max(1),
            retry_malformed: false,
        }
    }

    pub fn with_retry_malformed(mut self, retry_malformed: bool) -> Self {
        self.retry_malformed = retry_malformed;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Call `operation` (given the 1-based attempt number) until it succeeds, fails
    /// terminally, or the attempt budget runs out.
    pub async fn run<F, Fut>(
        &self,
        work_item_index: u64,
        cancel: &CancellationToken,
        mut operation: F,
    ) -> RetryOutcome
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<TransformOutput, TransformError>>,
    {
        let mut attempt = 0u32;
        loop {
            attempt += 1;

            let result = match tokio::time::timeout(self.timeout, operation(attempt)).await {
                Ok(result) => result,
                Err(_) => Err(TransformError::Timeout(self.timeout)),
            };

            let error = match result {
                Ok(output) => {
                    debug!(work_item_index, attempt, "Transform succeeded");
                    return RetryOutcome::Succeeded {
                        output,
                        attempts: attempt,
                    };
                }
                Err(error) => error,
            };

            let context = ErrorContext::for_attempt(work_item_index, attempt, self.max_attempts);
            let classification = self.classifier.classify_transform(&error, &context);
            let kind = classification.kind;

            if matches!(kind, ErrorKind::Fatal | ErrorKind::Corruption) {
                return RetryOutcome::Fatal {
                    error,
                    attempts: attempt,
                };
            }

            let retry_as_malformed = kind == ErrorKind::Malformed
                && self.retry_malformed
                && attempt < self.max_attempts;
            if !classification.is_retryable && !retry_as_malformed {
                return RetryOutcome::Failed {
                    kind,
                    reasons: error.reasons(),
                    attempts: attempt,
                };
            }

            let delay = classification
                .retry_delay
                .unwrap_or_else(|| self.backoff.delay_for(kind, attempt, None));
            warn!(
                work_item_index,
                attempt,
                max_attempts = self.max_attempts,
                error_kind = %kind,
                error_code = %classification.error_code,
                delay_ms = delay.as_millis() as u64,
                "🔄 Retrying transform after failure"
            );

            tokio::select! {
                _ = cancel.cancelled() => {
                    return RetryOutcome::Cancelled { attempts: attempt };
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}
