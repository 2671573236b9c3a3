//! Configuration profiles for different environments
//!
//! Provides pre-configured profiles for:
//! - Development: fast retries and a twitchy breaker so failures surface quickly
//! - Staging: production shape with shorter cool-downs
//! - Production: patient retries, tolerant breaker

use super::types::*;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Configuration profile name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileName {
    /// Development profile (local testing)
    Development,
    /// Staging profile (pre-production)
    Staging,
    /// Production profile
    Production,
}

impl ProfileName {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Staging => "staging",
            Self::Production => "production",
        }
    }
}

impl fmt::Display for ProfileName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProfileName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dev" | "development" => Ok(Self::Development),
            "staging" | "stage" => Ok(Self::Staging),
            "prod" | "production" => Ok(Self::Production),
            other => Err(format!(
                "unknown profile '{}', expected development, staging or production",
                other
            )),
        }
    }
}

/// Configuration profile with environment-specific defaults
pub struct ConfigProfile;

impl ConfigProfile {
    pub fn for_profile(name: ProfileName) -> ResilienceConfig {
        match name {
            ProfileName::Development => Self::development(),
            ProfileName::Staging => Self::staging(),
            ProfileName::Production => Self::production(),
        }
    }

    /// Create a development configuration
    ///
    /// - Three quick attempts
    /// - Breaker opens after three failures, probes after two seconds
    pub fn development() -> ResilienceConfig {
        ResilienceConfig {
            retry: RetryPolicy {
                max_attempts: 3,
                initial_delay: Duration::from_millis(50),
                max_delay: Duration::from_millis(500),
                backoff_multiplier: 2.0,
                jitter_ratio: 0.0,
            },
            circuit_breaker: CircuitBreakerConfig {
                failure_threshold: 3,
                reset_timeout: Duration::from_secs(2),
                half_open_max_attempts: 1,
            },
        }
    }

    /// Create a staging configuration
    pub fn staging() -> ResilienceConfig {
        ResilienceConfig {
            retry: RetryPolicy {
                max_attempts: 4,
                initial_delay: Duration::from_millis(250),
                max_delay: Duration::from_secs(5),
                backoff_multiplier: 2.0,
                jitter_ratio: 0.1,
            },
            circuit_breaker: CircuitBreakerConfig {
                failure_threshold: 5,
                reset_timeout: Duration::from_secs(10),
                half_open_max_attempts: 2,
            },
        }
    }

    /// Create a production configuration
    ///
    /// - Jittered exponential backoff up to 30s
    /// - Breaker tolerates short bursts of failures
    pub fn production() -> ResilienceConfig {
        ResilienceConfig {
            retry: RetryPolicy {
                max_attempts: 5,
                initial_delay: Duration::from_millis(500),
                max_delay: Duration::from_secs(30),
                backoff_multiplier: 2.0,
                jitter_ratio: 0.2,
            },
            circuit_breaker: CircuitBreakerConfig {
                failure_threshold: 5,
                reset_timeout: Duration::from_secs(30),
                half_open_max_attempts: 3,
            },
        }
    }
}
