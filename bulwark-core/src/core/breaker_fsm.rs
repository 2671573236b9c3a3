//! Circuit Breaker State Machine
//!
//! Pure transition logic for the three-state breaker. No locking, no clocks:
//! the caller passes `now` in and applies the returned [`Transition`]s. The
//! thread-safe wrapper lives in [`crate::resilience::circuit_breaker`].
//!
//! ```text
//!     CLOSED ──fail(N)──→ OPEN ──reset_timeout──→ HALFOPEN
//!        ▲                                           │
//!        │                success(M)                 │
//!        └───────────────────────────────────────────┘
//!                              │
//!                             fail
//!                              ▼
//!                            OPEN
//! ```
//!
//! - **Closed**: every call is admitted
//! - **Open**: calls are rejected until `reset_timeout` has elapsed since the
//!   breaker opened; the check is lazy, at admission time
//! - **HalfOpen**: one probe at a time; `half_open_max_attempts` consecutive
//!   probe successes close the breaker, any probe failure re-opens it
//!
//! Each transition bumps a generation counter. Outcomes of calls admitted
//! under an older generation are tallied in the lifetime counters but never
//! move the state machine.

use crate::config::CircuitBreakerConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CircuitState {
    /// Normal operation, calls pass through
    Closed,
    /// Tripped, calls fail fast
    Open,
    /// Probing whether the dependency recovered
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        }
    }

    /// Numeric encoding used by the state gauge
    pub fn as_gauge(&self) -> i64 {
        match self {
            Self::Closed => 0,
            Self::Open => 1,
            Self::HalfOpen => 2,
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A state change produced by the runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: CircuitState,
    pub to: CircuitState,
}

/// Ticket for one admitted call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Permit {
    generation: u64,
    probe: bool,
}

impl Permit {
    pub fn is_probe(&self) -> bool {
        self.probe
    }
}

/// Admission decision for a single call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Permitted(Permit),
    /// Rejected; `retry_after` is zero when only the probe slot is busy
    Rejected { retry_after: Duration },
}

/// Point-in-time view of a breaker
#[derive(Debug, Clone, Serialize)]
pub struct CircuitStats {
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub half_open_successes: u32,
    pub probe_in_flight: bool,
    #[serde(skip)]
    pub last_failure: Option<Instant>,
    #[serde(skip)]
    pub opened_at: Option<Instant>,
    pub total_calls: u64,
    pub total_successes: u64,
    pub total_failures: u64,
    pub total_rejections: u64,
    pub times_opened: u64,
}

/// Mutable state owned by exactly one breaker
#[derive(Debug, Clone)]
pub struct CircuitBreakerRuntime {
    config: CircuitBreakerConfig,
    state: CircuitState,
    consecutive_failures: u32,
    half_open_successes: u32,
    last_failure: Option<Instant>,
    opened_at: Option<Instant>,
    probe_in_flight: bool,
    generation: u64,
    total_calls: u64,
    total_successes: u64,
    total_failures: u64,
    total_rejections: u64,
    times_opened: u64,
}

impl CircuitBreakerRuntime {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            state: CircuitState::Closed,
            consecutive_failures: 0,
            half_open_successes: 0,
            last_failure: None,
            opened_at: None,
            probe_in_flight: false,
            generation: 0,
            total_calls: 0,
            total_successes: 0,
            total_failures: 0,
            total_rejections: 0,
            times_opened: 0,
        }
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    pub fn state(&self) -> CircuitState {
        self.state
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn half_open_successes(&self) -> u32 {
        self.half_open_successes
    }

    /// Decide whether a call may proceed at `now`
    ///
    /// An Open breaker whose reset timeout has elapsed moves to HalfOpen here
    /// and admits the caller as the probe.
    pub fn admit(&mut self, now: Instant) -> (Admission, Option<Transition>) {
        match self.state {
            CircuitState::Closed => (Admission::Permitted(self.permit(false)), None),
            CircuitState::Open => {
                let remaining = self.remaining_open(now);
                if remaining.is_zero() {
                    let transition = self.transition(CircuitState::HalfOpen);
                    self.half_open_successes = 0;
                    self.probe_in_flight = true;
                    (Admission::Permitted(self.permit(true)), Some(transition))
                } else {
                    self.total_rejections += 1;
                    (Admission::Rejected { retry_after: remaining }, None)
                }
            }
            CircuitState::HalfOpen => {
                if self.probe_in_flight {
                    self.total_rejections += 1;
                    (
                        Admission::Rejected {
                            retry_after: Duration::ZERO,
                        },
                        None,
                    )
                } else {
                    self.probe_in_flight = true;
                    (Admission::Permitted(self.permit(true)), None)
                }
            }
        }
    }

    /// Whether [`admit`](Self::admit) would let a call through, without
    /// changing anything
    pub fn would_admit(&self, now: Instant) -> bool {
        match self.state {
            CircuitState::Closed => true,
            CircuitState::Open => self.remaining_open(now).is_zero(),
            CircuitState::HalfOpen => !self.probe_in_flight,
        }
    }

    /// Record a successful call
    pub fn on_success(&mut self, permit: Permit) -> Option<Transition> {
        self.total_successes += 1;
        if permit.generation != self.generation {
            return None;
        }

        match self.state {
            CircuitState::Closed => {
                self.consecutive_failures = 0;
                None
            }
            CircuitState::HalfOpen => {
                if permit.probe {
                    self.probe_in_flight = false;
                }
                self.half_open_successes += 1;
                if self.half_open_successes >= self.config.half_open_max_attempts {
                    let transition = self.transition(CircuitState::Closed);
                    self.clear_counters();
                    Some(transition)
                } else {
                    None
                }
            }
            // A current-generation permit cannot exist while Open
            CircuitState::Open => None,
        }
    }

    /// Record a failed call
    pub fn on_failure(&mut self, permit: Permit, now: Instant) -> Option<Transition> {
        self.total_failures += 1;
        if permit.generation != self.generation {
            return None;
        }
        self.last_failure = Some(now);

        match self.state {
            CircuitState::Closed => {
                self.consecutive_failures += 1;
                if self.consecutive_failures >= self.config.failure_threshold {
                    self.consecutive_failures = self.config.failure_threshold;
                    Some(self.open(now))
                } else {
                    None
                }
            }
            CircuitState::HalfOpen => {
                self.probe_in_flight = false;
                Some(self.open(now))
            }
            CircuitState::Open => None,
        }
    }

    /// Release a permit whose call never completed (its future was dropped)
    pub fn abandon(&mut self, permit: Permit) {
        if permit.probe && permit.generation == self.generation {
            self.probe_in_flight = false;
        }
    }

    /// Force Closed and clear every counter and the pending reset deadline
    pub fn reset(&mut self) -> Option<Transition> {
        let transition = if self.state != CircuitState::Closed {
            Some(self.transition(CircuitState::Closed))
        } else {
            // Outstanding permits are still invalidated
            self.generation += 1;
            None
        };
        self.clear_counters();
        self.last_failure = None;
        self.opened_at = None;
        transition
    }

    /// Force Open, starting a fresh reset timeout at `now`
    pub fn force_open(&mut self, now: Instant) -> Option<Transition> {
        if self.state == CircuitState::Open {
            self.opened_at = Some(now);
            return None;
        }
        self.probe_in_flight = false;
        Some(self.open(now))
    }

    pub fn stats(&self) -> CircuitStats {
        CircuitStats {
            state: self.state,
            consecutive_failures: self.consecutive_failures,
            half_open_successes: self.half_open_successes,
            probe_in_flight: self.probe_in_flight,
            last_failure: self.last_failure,
            opened_at: self.opened_at,
            total_calls: self.total_calls,
            total_successes: self.total_successes,
            total_failures: self.total_failures,
            total_rejections: self.total_rejections,
            times_opened: self.times_opened,
        }
    }

    fn permit(&mut self, probe: bool) -> Permit {
        self.total_calls += 1;
        Permit {
            generation: self.generation,
            probe,
        }
    }

    fn remaining_open(&self, now: Instant) -> Duration {
        match self.opened_at {
            Some(opened_at) => self
                .config
                .reset_timeout
                .saturating_sub(now.saturating_duration_since(opened_at)),
            None => Duration::ZERO,
        }
    }

    fn open(&mut self, now: Instant) -> Transition {
        // Replaces any previous deadline
        self.opened_at = Some(now);
        self.half_open_successes = 0;
        self.times_opened += 1;
        self.transition(CircuitState::Open)
    }

    fn clear_counters(&mut self) {
        self.consecutive_failures = 0;
        self.half_open_successes = 0;
        self.probe_in_flight = false;
    }

    fn transition(&mut self, to: CircuitState) -> Transition {
        let from = self.state;
        self.state = to;
        self.generation += 1;
        Transition { from, to }
    }
}
