//! Bounded exponential backoff for automatic reconnects

use crate::config::schema::RetryConfig;
use std::time::Duration;

/// Reconnect policy: `min(base * 2^attempt, cap)`, at most `max_retries` attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base: Duration,
    pub cap: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base: Duration::from_millis(1_000),
            cap: Duration::from_millis(30_000),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base: Duration::from_millis(config.base_delay_ms),
            cap: Duration::from_millis(config.max_delay_ms),
        }
    }

    /// Delay before the automatic attempt made when `retry_count` attempts
    /// have already happened
    pub fn delay(&self, retry_count: u32) -> Duration {
        // 2^31 seconds already exceeds any sane cap
        let factor = 1u32.checked_shl(retry_count.min(31)).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor).min(self.cap)
    }

    /// Whether another automatic attempt is allowed
    pub fn should_retry(&self, retry_count: u32) -> bool {
        retry_count < self.max_retries
    }
}
