//! Exponential backoff for retry logic
//!
//! Delay after failed attempt `n` (1-based):
//!
//! ```text
//! raw    = min(initial_delay * multiplier^(n-1), max_delay)
//! jitter = raw * jitter_ratio * u        u in [-1, 1]
//! delay  = max(0, raw + jitter)
//! ```
//!
//! `u` comes from a [`JitterSource`] so runs can be made reproducible.

use crate::config::RetryPolicy;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use std::time::Duration;

/// Source of jitter samples in `[-1, 1]`
pub trait JitterSource: Send + Sync {
    fn sample(&self) -> f64;
}

pub type SharedJitter = Arc<dyn JitterSource>;

/// Thread-local RNG (default)
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadRngJitter;

impl ThreadRngJitter {
    pub fn shared() -> SharedJitter {
        Arc::new(Self)
    }
}

impl JitterSource for ThreadRngJitter {
    fn sample(&self) -> f64 {
        rand::thread_rng().gen_range(-1.0..=1.0)
    }
}

/// Seeded RNG for reproducible delay sequences
#[derive(Debug)]
pub struct SeededJitter {
    rng: Mutex<StdRng>,
}

impl SeededJitter {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl JitterSource for SeededJitter {
    fn sample(&self) -> f64 {
        self.rng.lock().gen_range(-1.0..=1.0)
    }
}

/// Always returns the same sample
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedJitter(pub f64);

impl JitterSource for FixedJitter {
    fn sample(&self) -> f64 {
        self.0
    }
}

/// Un-jittered delay after failed attempt `attempt`
pub fn base_delay(policy: &RetryPolicy, attempt: u32) -> Duration {
    nanos_to_duration(raw_nanos(policy, attempt))
}

/// Delay after failed attempt `attempt` for the jitter sample `sample`
///
/// Samples outside `[-1, 1]` are clamped; NaN counts as zero.
pub fn jittered_delay(policy: &RetryPolicy, attempt: u32, sample: f64) -> Duration {
    let raw = raw_nanos(policy, attempt);
    let sample = if sample.is_nan() {
        0.0
    } else {
        sample.clamp(-1.0, 1.0)
    };
    let ratio = if policy.jitter_ratio.is_nan() {
        0.0
    } else {
        policy.jitter_ratio.clamp(0.0, 1.0)
    };

    let jitter = raw * ratio * sample;
    nanos_to_duration((raw + jitter).max(0.0))
}

fn raw_nanos(policy: &RetryPolicy, attempt: u32) -> f64 {
    let initial = policy.initial_delay.as_nanos() as f64;
    if initial == 0.0 {
        return 0.0;
    }
    let max = policy.max_delay.as_nanos() as f64;
    let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
    let raw = initial * policy.backoff_multiplier.powi(exponent);

    if raw.is_finite() {
        raw.min(max)
    } else {
        max
    }
}

#[inline]
fn nanos_to_duration(nanos: f64) -> Duration {
    // `as` saturates at u64::MAX
    Duration::from_nanos(nanos.round() as u64)
}

/// Exponential backoff state machine
///
/// Hands out the delay before each retry of one call, then refuses once the
/// policy's attempts are used up.
pub struct ExponentialBackoff {
    policy: RetryPolicy,
    jitter: SharedJitter,
    current_attempt: u32,
}

impl ExponentialBackoff {
    /// Backoff jittered by the thread RNG
    pub fn new(policy: RetryPolicy) -> Self {
        Self::with_jitter(policy, ThreadRngJitter::shared())
    }

    pub fn with_jitter(policy: RetryPolicy, jitter: SharedJitter) -> Self {
        Self {
            policy,
            jitter,
            current_attempt: 0,
        }
    }

    /// Delay before the next attempt, or None once no attempts remain
    pub fn next_delay(&mut self) -> Option<Duration> {
        if !self.can_retry() {
            return None;
        }

        self.current_attempt += 1;
        Some(jittered_delay(
            &self.policy,
            self.current_attempt,
            self.jitter.sample(),
        ))
    }

    /// Reset the backoff to initial state
    pub fn reset(&mut self) {
        self.current_attempt = 0;
    }

    /// Number of delays handed out so far
    pub fn attempt_number(&self) -> u32 {
        self.current_attempt
    }

    /// Check if more retries are available
    pub fn can_retry(&self) -> bool {
        self.current_attempt.saturating_add(1) < self.policy.max_attempts
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }
}
