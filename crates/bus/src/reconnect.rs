//! Back-off schedule for re-dialling the hub after a dropped socket.

use std::time::Duration;

use tm_domain::config::ReconnectConfig;

#[derive(Debug, Clone)]
pub struct ReconnectBackoff {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_factor: f64,
    /// `0` = never give up.
    pub max_attempts: u32,
}

impl Default for ReconnectBackoff {
    fn default() -> Self {
        Self::from(&ReconnectConfig::default())
    }
}

impl From<&ReconnectConfig> for ReconnectBackoff {
    fn from(c: &ReconnectConfig) -> Self {
        Self {
            initial_delay: Duration::from_millis(c.initial_delay_ms),
            max_delay: Duration::from_millis(c.max_delay_ms),
            backoff_factor: c.backoff_factor,
            max_attempts: c.max_attempts,
        }
    }
}

impl ReconnectBackoff {
    /// Delay before re-dial number `attempt` (0-based), capped at
    /// `max_delay` plus up to 25% jitter.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = self.backoff_factor.powi(attempt.min(64) as i32);
        let ms = (self.initial_delay.as_millis() as f64 * exp).min(self.max_delay.as_millis() as f64);
        Duration::from_millis((ms * (1.0 + 0.25 * spread(attempt))) as u64)
    }

    pub fn exhausted(&self, attempt: u32) -> bool {
        self.max_attempts != 0 && attempt >= self.max_attempts
    }
}

/// Deterministic value in `[0, 1)` per attempt (Knuth multiplicative hash).
fn spread(attempt: u32) -> f64 {
    attempt.wrapping_mul(2_654_435_761) as f64 / u32::MAX as f64
}
