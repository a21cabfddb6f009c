//! Retry policy for contended creations

use crate::config::schema::BrokerConfig;
use std::time::Duration;

/// Default delay between attempts while another process holds the lock
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Default attempt budget (about five minutes at the default delay)
pub const DEFAULT_MAX_ATTEMPTS: u32 = 300;

/// How long the broker keeps polling a contended creation lock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Fixed sleep between attempts
    pub delay: Duration,
    /// Attempt budget; `None` polls forever
    pub max_attempts: Option<u32>,
}

impl RetryPolicy {
    pub fn new(delay: Duration, max_attempts: Option<u32>) -> Self {
        Self {
            delay,
            max_attempts,
        }
    }

    /// Poll forever at `delay`
    pub fn unbounded(delay: Duration) -> Self {
        Self::new(delay, None)
    }

    /// Build from the `[broker]` config section (`max_attempts = 0` is unbounded)
    pub fn from_config(config: &BrokerConfig) -> Self {
        let max_attempts = match config.max_attempts {
            0 => None,
            n => Some(n),
        };
        Self::new(Duration::from_millis(config.retry_delay_ms), max_attempts)
    }

    /// Whether `attempts` already made use up the budget
    pub fn exhausted(&self, attempts: u32) -> bool {
        self.max_attempts.is_some_and(|max| attempts >= max)
    }
}

/// One more attempt; an unbounded wait may outlast `u32`
pub(crate) fn count_attempt(attempts: u32) -> u32 {
    attempts.saturating_add(1)
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_RETRY_DELAY, Some(DEFAULT_MAX_ATTEMPTS))
    }
}
