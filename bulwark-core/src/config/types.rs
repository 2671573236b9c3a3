use crate::core::ConfigError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Complete resilience configuration for one call site
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResilienceConfig {
    #[serde(default)]
    pub retry: RetryPolicy,

    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfig,
}

impl ResilienceConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.retry.validate()?;
        self.circuit_breaker.validate()
    }
}

/// Retry and backoff policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first
    pub max_attempts: u32,

    /// Delay after the first failed attempt
    #[serde(rename = "initial_delay_ms", with = "duration_ms")]
    pub initial_delay: Duration,

    /// Upper bound on the un-jittered delay
    #[serde(rename = "max_delay_ms", with = "duration_ms")]
    pub max_delay: Duration,

    /// Growth factor per attempt (typically 2.0)
    pub backoff_multiplier: f64,

    /// Randomization applied to each delay (0.0 to 1.0)
    #[serde(default = "default_jitter_ratio")]
    pub jitter_ratio: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            jitter_ratio: default_jitter_ratio(),
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no retries
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    /// Short delays, few attempts (interactive requests, tests)
    pub fn aggressive() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_secs(1),
            backoff_multiplier: 1.5,
            jitter_ratio: 0.1,
        }
    }

    /// Long delays, many attempts (background sync)
    pub fn conservative() -> Self {
        Self {
            max_attempts: 8,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
            jitter_ratio: 0.2,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::ZeroAttempts);
        }
        if self.max_delay < self.initial_delay {
            return Err(ConfigError::DelayRange {
                initial: self.initial_delay,
                max: self.max_delay,
            });
        }
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err(ConfigError::Multiplier(self.backoff_multiplier));
        }
        if !(0.0..=1.0).contains(&self.jitter_ratio) {
            return Err(ConfigError::JitterRatio(self.jitter_ratio));
        }
        Ok(())
    }

    /// Largest delay the policy can ever produce
    pub fn delay_ceiling(&self) -> Duration {
        self.max_delay.mul_f64(1.0 + self.jitter_ratio)
    }
}

/// Circuit breaker thresholds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit
    pub failure_threshold: u32,

    /// How long the circuit stays Open before admitting a probe
    #[serde(rename = "reset_timeout_ms", with = "duration_ms")]
    pub reset_timeout: Duration,

    /// Consecutive probe successes needed to close again
    pub half_open_max_attempts: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(30),
            half_open_max_attempts: 2,
        }
    }
}

impl CircuitBreakerConfig {
    /// Trips quickly, probes soon (for testing)
    pub fn aggressive() -> Self {
        Self {
            failure_threshold: 3,
            reset_timeout: Duration::from_secs(5),
            half_open_max_attempts: 2,
        }
    }

    /// Tolerates more failures, waits longer
    pub fn conservative() -> Self {
        Self {
            failure_threshold: 10,
            reset_timeout: Duration::from_secs(60),
            half_open_max_attempts: 5,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.failure_threshold == 0 {
            return Err(ConfigError::ZeroFailureThreshold);
        }
        if self.half_open_max_attempts == 0 {
            return Err(ConfigError::ZeroHalfOpenAttempts);
        }
        Ok(())
    }
}

fn default_jitter_ratio() -> f64 {
    0.1
}

/// Durations as integer milliseconds
mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let millis = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        serializer.serialize_u64(millis)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(RetryPolicy::default().validate().is_ok());
        assert!(RetryPolicy::aggressive().validate().is_ok());
        assert!(RetryPolicy::conservative().validate().is_ok());
        assert!(RetryPolicy::no_retry().validate().is_ok());
        assert!(CircuitBreakerConfig::default().validate().is_ok());
        assert!(CircuitBreakerConfig::aggressive().validate().is_ok());
        assert!(CircuitBreakerConfig::conservative().validate().is_ok());
    }

    #[test]
    fn test_retry_policy_rejects_bad_values() {
        let zero = RetryPolicy {
            max_attempts: 0,
            ..Default::default()
        };
        assert_eq!(zero.validate(), Err(ConfigError::ZeroAttempts));

        let inverted = RetryPolicy {
            initial_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(1),
            ..Default::default()
        };
        assert!(matches!(
            inverted.validate(),
            Err(ConfigError::DelayRange { .. })
        ));

        let shrinking = RetryPolicy {
            backoff_multiplier: 0.5,
            ..Default::default()
        };
        assert_eq!(shrinking.validate(), Err(ConfigError::Multiplier(0.5)));

        let nan = RetryPolicy {
            backoff_multiplier: f64::NAN,
            ..Default::default()
        };
        assert!(matches!(nan.validate(), Err(ConfigError::Multiplier(_))));

        let wild = RetryPolicy {
            jitter_ratio: 1.5,
            ..Default::default()
        };
        assert_eq!(wild.validate(), Err(ConfigError::JitterRatio(1.5)));
    }

    #[test]
    fn test_breaker_config_rejects_zero_thresholds() {
        let config = CircuitBreakerConfig {
            failure_threshold: 0,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::ZeroFailureThreshold));

        let config = CircuitBreakerConfig {
            half_open_max_attempts: 0,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::ZeroHalfOpenAttempts));
    }

    #[test]
    fn test_serde_uses_milliseconds() {
        let config = ResilienceConfig::default();
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["retry"]["initial_delay_ms"], 1000);
        assert_eq!(json["circuit_breaker"]["reset_timeout_ms"], 30_000);

        let parsed: ResilienceConfig = serde_json::from_str(
            r#"{
                "retry": {
                    "max_attempts": 4,
                    "initial_delay_ms": 250,
                    "max_delay_ms": 2000,
                    "backoff_multiplier": 2.0
                }
            }"#,
        )
        .unwrap();
        assert_eq!(parsed.retry.max_attempts, 4);
        assert_eq!(parsed.retry.initial_delay, Duration::from_millis(250));
        assert_eq!(parsed.retry.jitter_ratio, 0.1);
        assert_eq!(parsed.circuit_breaker, CircuitBreakerConfig::default());
    }

    #[test]
    fn test_delay_ceiling() {
        let policy = RetryPolicy {
            max_delay: Duration::from_millis(1000),
            jitter_ratio: 0.5,
            ..Default::default()
        };
        assert_eq!(policy.delay_ceiling(), Duration::from_millis(1500));
    }
}
