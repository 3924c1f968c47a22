use crate::backends::CompletionBackend;
use crate::config::RunContext;
use parley_core::{ParleyError, ParleyResult, Role, Turn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

#[cfg(test)]
type SleepFuture = std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>>;

/// Type alias for the injectable sleep function used in tests.
#[cfg(test)]
type SleepFn = Box<dyn Fn(u64) -> SleepFuture + Send + Sync>;

/// Configures retry behaviour for transient provider failures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Maximum number of retries after the first attempt.
    pub max_retries: u32,
    /// Base delay in milliseconds for exponential backoff.
    pub backoff_base_ms: u64,
    /// Maximum delay in milliseconds (cap for exponential backoff).
    pub backoff_max_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_base_ms: 500,
            backoff_max_ms: 30_000,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }
}

/// Computes the backoff delay for a given attempt using exponential backoff
/// capped at `backoff_max_ms`.
fn compute_backoff(policy: &RetryPolicy, attempt: u32) -> u64 {
    let delay = policy
        .backoff_base_ms
        .saturating_mul(2u64.saturating_pow(attempt));
    delay.min(policy.backoff_max_ms)
}

/// The completion provider adapter: a [`CompletionBackend`] plus the retry
/// policy.
///
/// Transient failures are retried up to `max_retries` times with
/// exponential backoff; a fatal failure is returned on the spot. When the
/// retries run out, the last transient error is returned.
pub struct CompletionProvider {
    backend: Arc<dyn CompletionBackend>,
    policy: RetryPolicy,
    /// Injectable sleep function for testing (allows skipping real delays).
    #[cfg(test)]
    sleep_fn: Option<SleepFn>,
}

impl CompletionProvider {
    /// Wraps `backend` with `policy`.
    pub fn new(backend: Arc<dyn CompletionBackend>, policy: RetryPolicy) -> Self {
        Self {
            backend,
            policy,
            #[cfg(test)]
            sleep_fn: None,
        }
    }

    /// Perform a sleep for the given duration in milliseconds.
    async fn do_sleep(&self, ms: u64) {
        #[cfg(test)]
        if let Some(ref f) = self.sleep_fn {
            f(ms).await;
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(ms)).await;
    }

    /// Requests the next assistant reply for `turns`.
    ///
    /// `turns` must be non-empty and end with a user turn; anything else is
    /// rejected as a malformed request without reaching the backend.
    pub async fn complete(&self, turns: &[Turn], context: &RunContext) -> ParleyResult<String> {
        match turns.last() {
            None => return Err(ParleyError::fatal("malformed request: no turns to complete")),
            Some(last) if last.role() != Role::User => {
                return Err(ParleyError::fatal(format!(
                    "malformed request: last turn is from {}, expected user",
                    last.role()
                )))
            }
            Some(_) => {}
        }

        let mut attempt = 0;
        loop {
            match self.backend.complete(turns, context).await {
                Ok(text) => return Ok(text),
                Err(e) if e.is_transient() && attempt < self.policy.max_retries => {
                    let delay = compute_backoff(&self.policy, attempt);
                    info!(
                        attempt,
                        delay_ms = delay,
                        error = %e,
                        "Transient provider error, backing off"
                    );
                    self.do_sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    if e.is_transient() {
                        warn!(attempts = attempt + 1, error = %e, "Provider retries exhausted");
                    } else {
                        warn!(attempt, error = %e, "Non-retryable provider error");
                    }
                    return Err(e);
                }
            }
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
