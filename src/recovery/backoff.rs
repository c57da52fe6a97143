//! # Backoff Policy
//!
//! Explicit attempt → delay mapping used by the retry wrapper. Handles both
//! server-requested delays (a `Retry-After` style hint carried by a rate-limit
//! error) and exponential backoff with optional jitter.

use crate::config::BackoffConfig;
use crate::models::ErrorKind;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    /// Fraction of the delay added as random jitter (0.0 - 1.0)
    pub jitter_factor: f64,
    /// Minimum wait after a rate-limit response without a server hint
    pub rate_limit_floor: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            multiplier: 2.0,
            jitter_factor: 0.1,
            rate_limit_floor: Duration::from_secs(5),
        }
    }
}

impl From<&BackoffConfig> for BackoffPolicy {
    fn from(config: &BackoffConfig) -> Self {
        Self {
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            multiplier: config.multiplier,
            jitter_factor: config.jitter_factor,
            rate_limit_floor: Duration::from_millis(config.rate_limit_floor_ms),
        }
    }
}

impl BackoffPolicy {
    /// A policy that never waits, for tests and dry runs
    pub fn immediate() -> Self {
        Self {
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            multiplier: 1.0,
            jitter_factor: 0.0,
            rate_limit_floor: Duration::ZERO,
        }
    }

    /// Exponential delay after the given 1-based failed attempt
    pub fn exponential_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(30) as i32;
        let delay = self.base_delay.mul_f64(self.multiplier.powi(exponent));

        let jittered = if self.jitter_factor > 0.0 {
            delay.mul_f64(1.0 + fastrand::f64() * self.jitter_factor)
        } else {
            delay
        };

        jittered.min(self.max_delay)
    }

    /// Delay before retrying after a failure of `kind`.
    ///
    /// A server-requested delay wins over the computed one, but is still capped at
    /// `max_delay`.
    pub fn delay_for(&self, kind: ErrorKind, attempt: u32, server_hint: Option<Duration>) -> Duration {
        if let Some(hint) = server_hint {
            return hint.min(self.max_delay);
        }

        let computed = self.exponential_delay(attempt);
        match kind {
            ErrorKind::RateLimited => computed.max(self.rate_limit_floor).min(self.max_delay),
            _ => computed,
        }
    }
}
