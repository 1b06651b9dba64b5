use crate::error::{BreakerError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BreakerState {
    /// Circuit is closed, calls flow normally
    Closed,
    /// Circuit is open, calls are rejected
    Open,
    /// Circuit is half-open, allowing a limited number of trial calls
    HalfOpen,
}

impl BreakerState {
    /// Numeric gauge value: 0 = Closed, 1 = Open, 2 = HalfOpen
    pub fn as_gauge(&self) -> f64 {
        match self {
            BreakerState::Closed => 0.0,
            BreakerState::Open => 1.0,
            BreakerState::HalfOpen => 2.0,
        }
    }
}

impl std::fmt::Display for BreakerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BreakerState::Closed => write!(f, "Closed"),
            BreakerState::Open => write!(f, "Open"),
            BreakerState::HalfOpen => write!(f, "HalfOpen"),
        }
    }
}

/// Circuit breaker configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakerConfig {
    /// Number of consecutive failures before opening the circuit
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Error rate over the rolling window (0.0 to 1.0) that opens the circuit
    #[serde(default = "default_error_rate_threshold")]
    pub error_rate_threshold: f64,

    /// Samples required in the window before the error rate is considered
    #[serde(default = "default_min_samples_for_rate")]
    pub min_samples_for_rate: u32,

    /// Span of the rolling sample window in milliseconds
    #[serde(default = "default_rolling_window_ms")]
    pub rolling_window_ms: u64,

    /// Time to stay open before allowing trial calls, in milliseconds
    #[serde(default = "default_recovery_timeout_ms")]
    pub recovery_timeout_ms: u64,

    /// Maximum number of trial calls admitted per half-open episode
    #[serde(default = "default_half_open_trial_limit")]
    pub half_open_trial_limit: u32,

    /// Successful trial calls needed to close the circuit
    #[serde(default = "default_half_open_success_threshold")]
    pub half_open_success_threshold: u32,
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_error_rate_threshold() -> f64 {
    0.5
}

fn default_min_samples_for_rate() -> u32 {
    10
}

fn default_rolling_window_ms() -> u64 {
    60_000
}

fn default_recovery_timeout_ms() -> u64 {
    60_000
}

fn default_half_open_trial_limit() -> u32 {
    3
}

fn default_half_open_success_threshold() -> u32 {
    3
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            error_rate_threshold: default_error_rate_threshold(),
            min_samples_for_rate: default_min_samples_for_rate(),
            rolling_window_ms: default_rolling_window_ms(),
            recovery_timeout_ms: default_recovery_timeout_ms(),
            half_open_trial_limit: default_half_open_trial_limit(),
            half_open_success_threshold: default_half_open_success_threshold(),
        }
    }
}

impl BreakerConfig {
    pub fn rolling_window(&self) -> Duration {
        Duration::from_millis(self.rolling_window_ms)
    }

    pub fn recovery_timeout(&self) -> Duration {
        Duration::from_millis(self.recovery_timeout_ms)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.failure_threshold == 0 {
            return Err(BreakerError::Config(
                "failure_threshold must be > 0".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.error_rate_threshold) {
            return Err(BreakerError::Config(format!(
                "error_rate_threshold must be within [0, 1], got {}",
                self.error_rate_threshold
            )));
        }

        if self.rolling_window_ms == 0 {
            return Err(BreakerError::Config(
                "rolling_window_ms must be > 0".to_string(),
            ));
        }

        if self.recovery_timeout_ms == 0 {
            return Err(BreakerError::Config(
                "recovery_timeout_ms must be > 0".to_string(),
            ));
        }

        if self.half_open_trial_limit == 0 {
            return Err(BreakerError::Config(
                "half_open_trial_limit must be > 0".to_string(),
            ));
        }

        if self.half_open_success_threshold == 0
            || self.half_open_success_threshold > self.half_open_trial_limit
        {
            return Err(BreakerError::Config(format!(
                "half_open_success_threshold must be within 1..={}, got {}",
                self.half_open_trial_limit, self.half_open_success_threshold
            )));
        }

        Ok(())
    }
}

/// Retry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Initial backoff duration in milliseconds
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Maximum backoff duration in milliseconds
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// Backoff multiplier
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    100
}

fn default_max_backoff_ms() -> u64 {
    10000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            backoff_multiplier: default_backoff_multiplier(),
        }
    }
}

impl RetryConfig {
    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }
}

/// Point-in-time snapshot of a breaker, taken under its lock
#[derive(Debug, Clone, Serialize)]
pub struct BreakerMetrics {
    pub name: String,
    pub state: BreakerState,
    /// Failures since the last success while closed
    pub consecutive_failures: u32,
    /// Successful trial calls in the current half-open episode
    pub success_count: u32,
    pub failure_threshold: u32,
    pub half_open_trial_count: u32,
    pub half_open_success_threshold: u32,
    /// Instant of the most recent recorded failure
    #[serde(skip)]
    pub last_failure_time: Option<Instant>,
    /// Time elapsed since the most recent recorded failure
    pub since_last_failure: Option<Duration>,
    /// Samples currently held in the rolling window
    pub window_samples: usize,
    pub window_failures: usize,
    /// Windowed error rate, 0.0 while below the minimum sample count
    pub error_rate: f64,
    /// Calls admitted
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    /// Calls refused with `BreakerOpen`
    pub rejected_requests: u64,
    /// Admitted calls that never reported an outcome
    pub cancelled_requests: u64,
    pub timeout_count: u64,
    pub opened_count: u64,
    pub half_opened_count: u64,
    pub closed_count: u64,
}
