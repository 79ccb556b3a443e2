//! Bounded exponential backoff for the merge loop

use std::time::Duration;

use crate::core::config::RetrySettings;

/// How many merge attempts to make and how long to wait between them
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, at least one
    pub max_attempts: u32,
    pub base_ms: u64,
    pub factor: f64,
    pub max_ms: u64,
}

impl RetryPolicy {
    /// `max_retries` of zero still allows a single attempt
    pub fn new(max_retries: u32, settings: &RetrySettings) -> Self {
        Self {
            max_attempts: max_retries.max(1),
            base_ms: settings.base_delay_ms,
            factor: settings.factor,
            max_ms: settings.max_delay_ms,
        }
    }

    /// Policy that never sleeps
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_attempts: max_retries.max(1),
            base_ms: 0,
            factor: 1.0,
            max_ms: 0,
        }
    }

    /// Delay after the failed attempt `attempt` (1-based)
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let delay = (self.base_ms as f64 * self.factor.powi(exponent)).round();
        let capped = if delay.is_finite() {
            (delay as u64).min(self.max_ms)
        } else {
            self.max_ms
        };
        Duration::from_millis(capped)
    }

    /// Whether another attempt follows `attempt`
    pub fn has_next(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}
