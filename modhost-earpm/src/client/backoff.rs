//! Exponential backoff between broker connection attempts.

use std::time::Duration;

const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(100);
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(30);

/// Doubles the delay on every failed attempt, capped at `max_delay`.
/// Resets to `base_delay` the moment a connection attempt succeeds.
#[derive(Debug, Clone)]
pub struct ReconnectBackoff {
    base_delay: Duration,
    max_delay: Duration,
    current: Duration,
}

impl ReconnectBackoff {
    pub fn new(base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            base_delay,
            max_delay,
            current: base_delay,
        }
    }

    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(self.max_delay);
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.base_delay;
    }
}

impl Default for ReconnectBackoff {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_DELAY, DEFAULT_MAX_DELAY)
    }
}
