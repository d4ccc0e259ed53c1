//! Retry executor: bounded linear backoff around a single unit of work.
//! Owns attempt counting and the exhausted-unit failure counter; what an attempt does stays with the caller.

use crate::error::ApiError;
use crate::recovery::RecoveryOutcome;
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{error, warn};

/// One end-to-end attempt at producing a record (render → call → recover).
#[allow(async_fn_in_trait)]
pub trait UnitOfWork {
    /// `attempt` is 1-indexed.
    async fn attempt(&mut self, attempt: u32) -> Result<RecoveryOutcome, ApiError>;
}

/// Backoff configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries beyond the first attempt
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Wait after failed attempt `attempt` (1-indexed): `base_delay * attempt`.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt)
    }
}

/// Result of one unit of work, including all of its retries
#[derive(Debug)]
pub struct AttemptResult {
    pub succeeded: bool,
    pub record: Option<Map<String, Value>>,
    pub error: Option<ApiError>,
    pub attempts_used: u32,
    pub elapsed_ms: u64,
}

impl AttemptResult {
    /// Failed on a non-retryable error rather than by exhausting attempts
    pub fn is_fatal(&self) -> bool {
        !self.succeeded && self.error.as_ref().map(ApiError::is_fatal).unwrap_or(false)
    }
}

pub struct RetryExecutor {
    policy: RetryPolicy,
    failures: Arc<AtomicU64>,
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self::with_failure_counter(policy, Arc::new(AtomicU64::new(0)))
    }

    pub fn with_failure_counter(policy: RetryPolicy, failures: Arc<AtomicU64>) -> Self {
        Self { policy, failures }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Units that exhausted every attempt
    pub fn failure_count(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    pub fn failure_counter(&self) -> Arc<AtomicU64> {
        self.failures.clone()
    }

    pub async fn execute<U: UnitOfWork>(&self, unit: &mut U) -> AttemptResult {
        let started = Instant::now();
        let max_attempts = self.policy.max_attempts();
        let mut last_error: Option<ApiError> = None;

        for attempt in 1..=max_attempts {
            match unit.attempt(attempt).await {
                Ok(RecoveryOutcome::Accepted(record)) => {
                    return AttemptResult {
                        succeeded: true,
                        record: Some(record),
                        error: None,
                        attempts_used: attempt,
                        elapsed_ms: elapsed_ms(started),
                    };
                }
                Ok(RecoveryOutcome::Rejected { reason, raw_text }) => {
                    warn!(
                        attempt,
                        max_attempts,
                        reason = %reason,
                        raw_excerpt = %excerpt(&raw_text),
                        "provider response rejected"
                    );
                    last_error = Some(ApiError::ResponseRejected(reason));
                }
                Err(err) if err.is_fatal() => {
                    error!(attempt, error = %err, "unit of work failed with a fatal error");
                    return AttemptResult {
                        succeeded: false,
                        record: None,
                        error: Some(err),
                        attempts_used: attempt,
                        elapsed_ms: elapsed_ms(started),
                    };
                }
                Err(err) => {
                    warn!(attempt, max_attempts, error = %err, "generation attempt failed");
                    last_error = Some(err);
                }
            }

            if attempt < max_attempts {
                sleep(self.policy.delay_after(attempt)).await;
            }
        }

        self.failures.fetch_add(1, Ordering::Relaxed);
        error!(
            attempts = max_attempts,
            error = ?last_error.as_ref().map(ToString::to_string),
            "unit of work failed after exhausting retries"
        );
        AttemptResult {
            succeeded: false,
            record: None,
            error: last_error,
            attempts_used: max_attempts,
            elapsed_ms: elapsed_ms(started),
        }
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

fn excerpt(text: &str) -> String {
    const MAX_CHARS: usize = 200;
    if text.chars().count() <= MAX_CHARS {
        text.to_string()
    } else {
        let mut cut: String = text.chars().take(MAX_CHARS).collect();
        cut.push_str("...");
        cut
    }
}
