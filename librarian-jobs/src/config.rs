//! Controller configuration
//!
//! Polling intervals and backoff bounds used by the job controller.

use std::time::Duration;

/// Polling and backoff settings
///
/// All intervals are configurable so tests and slow deployments can tune
/// them; the defaults match the backend's expected polling cadence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Delay between status polls while a job is running
    pub status_interval: Duration,

    /// Delay between output polls while a job is running
    pub output_interval: Duration,

    /// Fixed delay before retrying a failed output poll
    pub output_retry_interval: Duration,

    /// First step of the status poll backoff
    pub backoff_base: Duration,

    /// Upper bound of the status poll backoff
    pub backoff_cap: Duration,
}

impl ControllerConfig {
    /// Creates configuration from environment variables
    ///
    /// Every variable is optional (milliseconds) and falls back to the default:
    /// - LIBRARIAN_STATUS_INTERVAL_MS (default: 2000)
    /// - LIBRARIAN_OUTPUT_INTERVAL_MS (default: 500)
    /// - LIBRARIAN_OUTPUT_RETRY_MS (default: 5000)
    /// - LIBRARIAN_BACKOFF_BASE_MS (default: 1000)
    /// - LIBRARIAN_BACKOFF_CAP_MS (default: 10000)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            status_interval: env_millis("LIBRARIAN_STATUS_INTERVAL_MS")
                .unwrap_or(defaults.status_interval),
            output_interval: env_millis("LIBRARIAN_OUTPUT_INTERVAL_MS")
                .unwrap_or(defaults.output_interval),
            output_retry_interval: env_millis("LIBRARIAN_OUTPUT_RETRY_MS")
                .unwrap_or(defaults.output_retry_interval),
            backoff_base: env_millis("LIBRARIAN_BACKOFF_BASE_MS").unwrap_or(defaults.backoff_base),
            backoff_cap: env_millis("LIBRARIAN_BACKOFF_CAP_MS").unwrap_or(defaults.backoff_cap),
        }
    }

    /// Delay before the next status poll after `error_count` consecutive failures
    ///
    /// `min(backoff_base * 2^error_count, backoff_cap)`, saturating instead of
    /// overflowing for large counts.
    pub fn backoff_delay(&self, error_count: u32) -> Duration {
        let factor = 1u32.checked_shl(error_count).unwrap_or(u32::MAX);
        self.backoff_base
            .checked_mul(factor)
            .unwrap_or(self.backoff_cap)
            .min(self.backoff_cap)
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.status_interval.is_zero() {
            anyhow::bail!("status_interval must be greater than 0");
        }

        if self.output_interval.is_zero() {
            anyhow::bail!("output_interval must be greater than 0");
        }

        if self.output_retry_interval.is_zero() {
            anyhow::bail!("output_retry_interval must be greater than 0");
        }

        if self.backoff_base.is_zero() {
            anyhow::bail!("backoff_base must be greater than 0");
        }

        if self.backoff_cap < self.backoff_base {
            anyhow::bail!("backoff_cap must not be smaller than backoff_base");
        }

        Ok(())
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            status_interval: Duration::from_millis(2000),
            output_interval: Duration::from_millis(500),
            output_retry_interval: Duration::from_millis(5000),
            backoff_base: Duration::from_millis(1000),
            backoff_cap: Duration::from_millis(10_000),
        }
    }
}

fn env_millis(name: &str) -> Option<Duration> {
    std::env::var(name)
        .ok()
        .and_then(|s| s.trim().parse::<u64>().ok())
        .map(Duration::from_millis)
}
