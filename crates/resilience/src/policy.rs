//! Retry-then-circuit-breaker execution policy

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::circuit_breaker::{CircuitBreaker, CircuitState};
use crate::error::PolicyError;
use crate::params::ResilienceParameters;

/// Classifies an operation error as worth retrying
pub type TransientFn<E> = Arc<dyn Fn(&E) -> bool + Send + Sync>;

/// Invoked before each retry
pub type RetryHook<E> = Arc<dyn Fn(&RetryEvent<'_, E>) + Send + Sync>;

/// Details handed to the retry hook
#[derive(Debug)]
pub struct RetryEvent<'a, E> {
    /// Name of the policy, normally the operation name
    pub name: &'a str,
    /// 1-based retry number
    pub attempt: u32,
    /// Error from the attempt that failed
    pub error: &'a E,
    /// Wait before the next attempt
    pub delay: Duration,
}

/// How an in-flight attempt reacts to the token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Interrupt {
    /// Dropped as soon as the token fires
    Race,
    /// Left to observe the token and finish on its own
    Cooperative,
}

/// Compiled policy: a retry layer, optionally wrapped by a circuit breaker
pub struct ResiliencePolicy<E> {
    name: String,
    params: ResilienceParameters,
    is_transient: TransientFn<E>,
    on_retry: RetryHook<E>,
    breaker: Option<CircuitBreaker>,
}

impl<E> fmt::Debug for ResiliencePolicy<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResiliencePolicy")
            .field("name", &self.name)
            .field("params", &self.params)
            .field("breaker", &self.breaker)
            .finish()
    }
}

impl<E> ResiliencePolicy<E> {
    pub fn new(
        name: impl Into<String>,
        params: ResilienceParameters,
        is_transient: TransientFn<E>,
        on_retry: RetryHook<E>,
    ) -> Self {
        let name = name.into();
        let breaker = params.breaker_threshold().map(|threshold| {
            CircuitBreaker::new(
                name.clone(),
                threshold,
                params.circuit_breaker_open_duration(),
            )
        });
        Self {
            name,
            params,
            is_transient,
            on_retry,
            breaker,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parameters(&self) -> &ResilienceParameters {
        &self.params
    }

    /// Breaker state, `None` for a retry-only policy
    pub fn circuit_state(&self) -> Option<CircuitState> {
        self.breaker.as_ref().map(CircuitBreaker::state)
    }

    /// Run `op` under the policy
    ///
    /// `op` receives the 1-based attempt number. The token is checked before
    /// each attempt, raced against each attempt and each backoff sleep, and
    /// re-checked after a failed attempt; a cancelled execution is never
    /// retried and leaves the breaker count unchanged.
    pub async fn execute<T, F, Fut>(
        &self,
        cancel: &CancellationToken,
        op: F,
    ) -> Result<T, PolicyError<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.execute_with(cancel, op, Interrupt::Race).await
    }

    /// Like [`execute`](Self::execute), but an attempt already started is
    /// never dropped when the token fires
    ///
    /// For attempts that must clean up after themselves, such as a
    /// transaction that has to roll back. `op` is expected to observe the
    /// token itself; backoff sleeps are still interrupted.
    pub async fn execute_cooperative<T, F, Fut>(
        &self,
        cancel: &CancellationToken,
        op: F,
    ) -> Result<T, PolicyError<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.execute_with(cancel, op, Interrupt::Cooperative).await
    }

    async fn execute_with<T, F, Fut>(
        &self,
        cancel: &CancellationToken,
        mut op: F,
        interrupt: Interrupt,
    ) -> Result<T, PolicyError<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if cancel.is_cancelled() {
            return Err(PolicyError::Cancelled);
        }

        let permit = match &self.breaker {
            Some(breaker) => Some(
                breaker
                    .try_acquire()
                    .map_err(|retry_after| PolicyError::CircuitOpen { retry_after })?,
            ),
            None => None,
        };

        let outcome = self.retry(cancel, &mut op, interrupt).await;

        if let Some(permit) = permit {
            match &outcome {
                Ok(_) => permit.succeed(),
                Err(PolicyError::Cancelled) => drop(permit),
                Err(_) => permit.fail(),
            }
        }
        outcome
    }

    async fn retry<T, F, Fut>(
        &self,
        cancel: &CancellationToken,
        op: &mut F,
        interrupt: Interrupt,
    ) -> Result<T, PolicyError<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            if cancel.is_cancelled() {
                return Err(PolicyError::Cancelled);
            }

            let result = match interrupt {
                Interrupt::Race => tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(PolicyError::Cancelled),
                    result = op(attempt) => result,
                },
                Interrupt::Cooperative => op(attempt).await,
            };

            let error = match result {
                Ok(value) => return Ok(value),
                // an attempt that failed because the token fired is a cancellation
                Err(_) if cancel.is_cancelled() => return Err(PolicyError::Cancelled),
                Err(error) => error,
            };

            if !(self.is_transient)(&error) {
                return Err(PolicyError::Rejected(error));
            }
            if attempt > self.params.retry_count {
                return Err(PolicyError::Exhausted {
                    attempts: attempt,
                    source: error,
                });
            }

            let delay = self.params.backoff.delay(attempt);
            (self.on_retry)(&RetryEvent {
                name: &self.name,
                attempt,
                error: &error,
                delay,
            });

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(PolicyError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}
