//! Retry and circuit-breaker policies
//!
//! A [`ResiliencePolicy`] runs an async operation with a bounded retry loop
//! for transient errors; when the failure threshold is at least one, a
//! [`CircuitBreaker`] wraps the retry loop and counts failed executions.
//! [`PolicyCache`] compiles one policy per operation name on first use.

pub mod cache;
pub mod circuit_breaker;
pub mod error;
pub mod params;
pub mod policy;

pub use cache::PolicyCache;
pub use circuit_breaker::{CircuitBreaker, CircuitState, Permit};
pub use error::PolicyError;
pub use params::{Backoff, BackoffStrategy, ResilienceParameters};
pub use policy::{ResiliencePolicy, RetryEvent, RetryHook, TransientFn};
