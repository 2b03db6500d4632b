use std::time::Duration;

use ringmend_core::ChannelSettings;

/// Bounded retry budget with exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub retries: u32,
    pub backoff_factor: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    pub fn new(retries: u32, backoff_factor: Duration) -> Self {
        Self {
            retries,
            backoff_factor,
            max_backoff: Duration::from_secs(120),
        }
    }

    pub fn from_settings(settings: &ChannelSettings) -> Self {
        Self {
            retries: settings.retries,
            backoff_factor: settings.backoff_factor,
            max_backoff: settings.max_backoff,
        }
    }

    /// Total attempts allowed, first one included.
    pub fn max_attempts(&self) -> u32 {
        self.retries.saturating_add(1)
    }

    /// Delay after failed attempt `attempt` (1-based) before the next one.
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.backoff_factor
            .saturating_mul(1u32 << exponent)
            .min(self.max_backoff)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_settings(&ChannelSettings::default())
    }
}
