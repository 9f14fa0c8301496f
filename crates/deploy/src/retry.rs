//! Bounded-retry execution for fallible network operations.
//!
//! Every network call the pipeline issues (gas price, nonce, receipt
//! fetches, read-only calls, verification status checks) goes through
//! [`RetryExecutor::execute`] so backoff and error classification behave
//! identically at every call site.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::clock::Clock;

/// Classification of a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Worth another attempt after the policy delay.
    Retryable,
    /// Retrying cannot help; abort immediately.
    Fatal,
}

/// Tagged outcome of executing an operation under a [`RetryPolicy`].
#[derive(Debug)]
pub enum OperationResult<T, E> {
    Success(T),
    /// All attempts were consumed; carries the last error observed.
    RetryableFailure(E),
    /// An attempt failed with an error classified as fatal.
    FatalFailure(E),
}

impl<T, E> OperationResult<T, E> {
    /// Collapse into a plain `Result` for call sites that only propagate.
    pub fn into_result(self) -> Result<T, E> {
        match self {
            OperationResult::Success(value) => Ok(value),
            OperationResult::RetryableFailure(err) | OperationResult::FatalFailure(err) => Err(err),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, OperationResult::Success(_))
    }
}

/// How many times to attempt an operation, how long to pause between
/// attempts (constant backoff), and which errors deserve a retry.
///
/// A policy is a plain value; build it once and share it between call sites.
#[derive(Clone)]
pub struct RetryPolicy<E> {
    pub max_attempts: u32,
    pub delay: Duration,
    pub classify: fn(&E) -> ErrorClass,
}

impl<E> RetryPolicy<E> {
    /// Create a policy. `max_attempts` is clamped to at least one attempt.
    pub fn new(max_attempts: u32, delay: Duration, classify: fn(&E) -> ErrorClass) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
            classify,
        }
    }
}

/// Drives a fallible async operation to completion under a [`RetryPolicy`].
///
/// The sleep between attempts is the only suspension point; no shared state
/// is mutated.
pub struct RetryExecutor {
    clock: Arc<dyn Clock>,
}

impl RetryExecutor {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    /// Invoke `operation` up to `policy.max_attempts` times.
    ///
    /// A fatal classification aborts immediately. A retryable failure sleeps
    /// `policy.delay` and tries again, unless attempts are exhausted, in
    /// which case the last error is returned as [`OperationResult::RetryableFailure`].
    pub async fn execute<T, E, F, Fut>(
        &self,
        policy: &RetryPolicy<E>,
        mut operation: F,
    ) -> OperationResult<T, E>
    where
        E: std::fmt::Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match operation().await {
                Ok(value) => return OperationResult::Success(value),
                Err(err) => match (policy.classify)(&err) {
                    ErrorClass::Fatal => {
                        tracing::debug!(attempt, error = %err, "Attempt failed fatally, aborting");
                        return OperationResult::FatalFailure(err);
                    }
                    ErrorClass::Retryable if attempt >= policy.max_attempts => {
                        tracing::debug!(
                            attempt,
                            max_attempts = policy.max_attempts,
                            error = %err,
                            "Attempts exhausted"
                        );
                        return OperationResult::RetryableFailure(err);
                    }
                    ErrorClass::Retryable => {
                        tracing::debug!(
                            attempt,
                            max_attempts = policy.max_attempts,
                            error = %err,
                            "Attempt failed, retrying..."
                        );
                        self.clock.sleep(policy.delay).await;
                    }
                },
            }
        }
    }
}
