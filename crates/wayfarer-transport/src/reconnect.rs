//! Reconnect policy for abnormal closes.

use std::time::Duration;

/// Decides whether and when to reconnect after an abnormal close.
///
/// Delays grow exponentially from `initial_delay`, capped at `max_delay`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Reconnect at all.
    pub enabled: bool,
    /// Delay before the first reconnect.
    pub initial_delay: Duration,
    /// Upper bound for the delay.
    pub max_delay: Duration,
    /// Give up after this many consecutive failures (`None` = never).
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            max_attempts: None,
        }
    }
}

impl ReconnectPolicy {
    /// Never reconnect.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Delay before reconnecting after `failures` consecutive abnormal
    /// closes, or `None` to stop.
    #[must_use]
    pub fn next_delay(&self, failures: u32) -> Option<Duration> {
        if !self.enabled || failures == 0 {
            return None;
        }
        if self.max_attempts.is_some_and(|max| failures > max) {
            return None;
        }

        let shift = (failures - 1).min(16);
        let delay = self.initial_delay.saturating_mul(1u32 << shift);
        Some(delay.min(self.max_delay))
    }
}
