//! Retry budget and delay between connection attempts

use std::time::Duration;

/// Configuration for automatic reconnection
///
/// The default is a fixed one second delay between attempts with an
/// unlimited budget. `multiplier` and `jitter` turn it into a backoff.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Failed connect attempts allowed before giving up (0 = unlimited)
    pub retries: u32,
    /// Delay before the first retry
    pub delay: Duration,
    /// Upper bound on the delay when `multiplier` grows it
    pub max_delay: Duration,
    /// Growth factor per attempt (1.0 keeps the delay fixed)
    pub multiplier: f64,
    /// Random jitter factor (0.0 to 1.0)
    pub jitter: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            retries: 0,
            delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 1.0,
            jitter: 0.0,
        }
    }
}

impl ReconnectConfig {
    /// Create a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the retry budget (0 = unlimited)
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Set the delay between attempts
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Set maximum delay
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Set backoff multiplier
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier.max(1.0);
        self
    }

    /// Set jitter factor
    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 1.0);
        self
    }

    /// Allow a single attempt only
    pub fn disabled() -> Self {
        Self {
            retries: 1,
            ..Default::default()
        }
    }

    /// Delay after the given failed attempt (1-indexed)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt <= 1 || self.multiplier <= 1.0 {
            return self.delay;
        }

        let exponent = attempt.saturating_sub(1) as i32;
        let delay_ms = self.delay.as_millis() as f64 * self.multiplier.powi(exponent);
        let delay = Duration::from_millis(delay_ms as u64);

        std::cmp::min(delay, self.max_delay)
    }

    /// Apply jitter to a base delay
    pub fn apply_jitter(&self, base: Duration) -> Duration {
        if self.jitter == 0.0 {
            return base;
        }

        let jitter_range = base.as_millis() as f64 * self.jitter;
        let jitter = rand::random::<f64>() * 2.0 * jitter_range - jitter_range;
        let adjusted_ms = (base.as_millis() as f64 + jitter).max(0.0) as u64;

        Duration::from_millis(adjusted_ms)
    }

    /// Get delay with jitter applied for a given attempt
    pub fn delay_with_jitter(&self, attempt: u32) -> Duration {
        let base = self.delay_for_attempt(attempt);
        self.apply_jitter(base)
    }

    /// Returns true if another attempt is allowed after `failed` failures
    pub fn should_retry(&self, failed: u32) -> bool {
        self.retries == 0 || failed < self.retries
    }
}
