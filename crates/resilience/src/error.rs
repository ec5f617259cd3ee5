//! Policy errors

use std::time::Duration;

use thiserror::Error;

/// Outcome of a failed policy execution
#[derive(Debug, Error)]
pub enum PolicyError<E> {
    /// Transient failures used up the retry budget
    #[error("Gave up after {attempts} attempts: {source}")]
    Exhausted { attempts: u32, source: E },

    /// Non-transient failure, propagated on first occurrence
    #[error(transparent)]
    Rejected(E),

    /// The circuit breaker refused the call without running it
    #[error("Circuit breaker open, retry after {retry_after:?}")]
    CircuitOpen { retry_after: Duration },

    #[error("Operation cancelled")]
    Cancelled,
}

impl<E> PolicyError<E> {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, PolicyError::Cancelled)
    }

    /// The underlying operation error, if the operation ran
    pub fn into_source(self) -> Option<E> {
        match self {
            PolicyError::Exhausted { source, .. } | PolicyError::Rejected(source) => Some(source),
            PolicyError::CircuitOpen { .. } | PolicyError::Cancelled => None,
        }
    }
}
