//! Resilience parameters
//!
//! Loaded from YAML alongside the rest of the data-store configuration:
//!
//! ```yaml
//! retry_count: 2
//! backoff: { kind: exponential, initial_ms: 20, max_ms: 2000, jitter_ms: 5 }
//! circuit_breaker_failure_threshold: 3
//! circuit_breaker_open_ms: 1000
//! ```

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Delay curve between attempts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// Same delay before every retry
    Fixed { delay_ms: u64 },
    /// `step_ms * attempt`
    Linear { step_ms: u64 },
    /// `initial_ms * 2^(attempt - 1)`, capped at `max_ms`
    Exponential { initial_ms: u64, max_ms: u64 },
}

impl BackoffStrategy {
    fn base_ms(&self, attempt: u32) -> u64 {
        let attempt = attempt.max(1);
        match *self {
            BackoffStrategy::Fixed { delay_ms } => delay_ms,
            BackoffStrategy::Linear { step_ms } => step_ms.saturating_mul(attempt as u64),
            BackoffStrategy::Exponential { initial_ms, max_ms } => {
                let factor = 1_u64.checked_shl(attempt - 1).unwrap_or(u64::MAX);
                initial_ms.saturating_mul(factor).min(max_ms)
            }
        }
    }
}

/// Backoff strategy plus optional random jitter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Backoff {
    #[serde(flatten)]
    pub strategy: BackoffStrategy,
    /// Adds a uniformly random `[0, jitter_ms)` to every delay
    #[serde(default)]
    pub jitter_ms: u64,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            strategy: BackoffStrategy::Exponential {
                initial_ms: 20,
                max_ms: 2000,
            },
            jitter_ms: 0,
        }
    }
}

impl Backoff {
    pub fn fixed(delay: Duration) -> Self {
        Self {
            strategy: BackoffStrategy::Fixed {
                delay_ms: delay.as_millis() as u64,
            },
            jitter_ms: 0,
        }
    }

    /// Wait before retry number `attempt` (1-based)
    pub fn delay(&self, attempt: u32) -> Duration {
        let mut ms = self.strategy.base_ms(attempt);
        if self.jitter_ms > 0 {
            ms = ms.saturating_add(rand::thread_rng().gen_range(0..self.jitter_ms));
        }
        Duration::from_millis(ms)
    }
}

fn default_retry_count() -> u32 {
    6
}

fn default_failure_threshold() -> i32 {
    20
}

fn default_open_ms() -> u64 {
    5000
}

/// Retry and circuit-breaker settings for one connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResilienceParameters {
    /// Retries after the first attempt
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,
    #[serde(default)]
    pub backoff: Backoff,
    /// Consecutive failed executions before the breaker opens; below 1 disables it
    #[serde(default = "default_failure_threshold")]
    pub circuit_breaker_failure_threshold: i32,
    #[serde(default = "default_open_ms")]
    pub circuit_breaker_open_ms: u64,
}

impl Default for ResilienceParameters {
    fn default() -> Self {
        Self {
            retry_count: default_retry_count(),
            backoff: Backoff::default(),
            circuit_breaker_failure_threshold: default_failure_threshold(),
            circuit_breaker_open_ms: default_open_ms(),
        }
    }
}

impl ResilienceParameters {
    pub fn circuit_breaker_open_duration(&self) -> Duration {
        Duration::from_millis(self.circuit_breaker_open_ms)
    }

    /// Threshold as a count, `None` when the breaker is disabled
    pub fn breaker_threshold(&self) -> Option<u32> {
        u32::try_from(self.circuit_breaker_failure_threshold)
            .ok()
            .filter(|t| *t >= 1)
    }

    /// Retry-only parameters
    pub fn without_breaker(mut self) -> Self {
        self.circuit_breaker_failure_threshold = 0;
        self
    }
}
