//! Consecutive-failure circuit breaker
//!
//! Counts execution-level outcomes reported through a [`Permit`]. Time is read
//! from `tokio::time::Instant` so paused-clock tests drive the open timer.

use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Calls flow, failures are counted
    Closed,
    /// Calls fail fast until the open duration elapses
    Open,
    /// One probe call decides whether to close or re-open
    HalfOpen,
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    probe_in_flight: bool,
}

/// Circuit breaker guarding one compiled policy
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    threshold: u32,
    open_duration: Duration,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, threshold: u32, open_duration: Duration) -> Self {
        Self {
            name: name.into(),
            threshold: threshold.max(1),
            open_duration,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                opened_at: None,
                probe_in_flight: false,
            }),
        }
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.inner.lock().consecutive_failures
    }

    /// Admit a call, or return how long until the breaker may admit one
    pub fn try_acquire(&self) -> Result<Permit<'_>, Duration> {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => Ok(Permit::new(self, false)),
            CircuitState::Open => {
                let elapsed = inner
                    .opened_at
                    .map(|at| at.elapsed())
                    .unwrap_or(self.open_duration);
                if elapsed < self.open_duration {
                    return Err(self.open_duration - elapsed);
                }
                debug!(breaker = %self.name, "circuit half-open, admitting probe");
                inner.state = CircuitState::HalfOpen;
                inner.probe_in_flight = true;
                Ok(Permit::new(self, true))
            }
            CircuitState::HalfOpen => {
                if inner.probe_in_flight {
                    return Err(Duration::ZERO);
                }
                inner.probe_in_flight = true;
                Ok(Permit::new(self, true))
            }
        }
    }

    fn on_success(&self, probe: bool) {
        let mut inner = self.inner.lock();
        if probe {
            inner.state = CircuitState::Closed;
            inner.consecutive_failures = 0;
            inner.opened_at = None;
            inner.probe_in_flight = false;
            info!(breaker = %self.name, "circuit closed after successful probe");
        } else if inner.state == CircuitState::Closed {
            inner.consecutive_failures = 0;
        }
    }

    fn on_failure(&self, probe: bool) {
        let mut inner = self.inner.lock();
        if probe {
            inner.probe_in_flight = false;
            self.trip(&mut inner);
        } else if inner.state == CircuitState::Closed {
            inner.consecutive_failures += 1;
            if inner.consecutive_failures >= self.threshold {
                self.trip(&mut inner);
            }
        }
    }

    fn trip(&self, inner: &mut BreakerInner) {
        inner.state = CircuitState::Open;
        inner.opened_at = Some(Instant::now());
        warn!(
            breaker = %self.name,
            threshold = self.threshold,
            open_ms = self.open_duration.as_millis() as u64,
            "circuit opened"
        );
    }

    fn abandon(&self, probe: bool) {
        if probe {
            self.inner.lock().probe_in_flight = false;
        }
    }
}

/// Admission ticket for one execution
///
/// Dropping an unsettled permit records nothing; an abandoned probe frees its
/// slot and leaves the breaker half-open.
#[must_use]
#[derive(Debug)]
pub struct Permit<'a> {
    breaker: &'a CircuitBreaker,
    probe: bool,
    settled: bool,
}

impl<'a> Permit<'a> {
    fn new(breaker: &'a CircuitBreaker, probe: bool) -> Self {
        Self {
            breaker,
            probe,
            settled: false,
        }
    }

    pub fn is_probe(&self) -> bool {
        self.probe
    }

    pub fn succeed(mut self) {
        self.settled = true;
        self.breaker.on_success(self.probe);
    }

    pub fn fail(mut self) {
        self.settled = true;
        self.breaker.on_failure(self.probe);
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.breaker.abandon(self.probe);
        }
    }
}
