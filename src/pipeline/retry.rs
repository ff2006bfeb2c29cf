//! Retry policy with exponential backoff and jitter

use crate::transport::TransportError;
use rand::Rng;
use std::time::Duration;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(200);
pub const DEFAULT_FACTOR: f64 = 2.0;
pub const DEFAULT_JITTER: f64 = 0.2;
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(10);

/// How many times to attempt delivery and how long to wait in between
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub factor: f64,
    /// Fraction of the nominal delay added or removed at random
    pub jitter: f64,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
            factor: DEFAULT_FACTOR,
            jitter: DEFAULT_JITTER,
            max_delay: DEFAULT_MAX_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Single attempt, never retry
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Clamp fields into their valid ranges
    #[must_use]
    pub fn normalized(mut self) -> Self {
        self.max_attempts = self.max_attempts.max(1);
        if !self.factor.is_finite() || self.factor < 1.0 {
            self.factor = 1.0;
        }
        self.jitter = if self.jitter.is_finite() {
            self.jitter.clamp(0.0, 0.99)
        } else {
            0.0
        };
        self.max_delay = self.max_delay.max(self.base_delay);
        self
    }

    /// Whether a failure on `attempt` (1-based) should be tried again
    pub fn should_retry(&self, attempt: u32, error: &TransportError) -> bool {
        error.is_transient() && attempt < self.max_attempts
    }

    /// Delay after failed `attempt` (1-based).
    ///
    /// `spread` in `[-1, 1]` selects where in the jitter band the delay
    /// falls: `-1` is the shortest, `1` the longest, `0` the nominal
    /// `base * factor^(attempt - 1)`.
    pub fn backoff(&self, attempt: u32, spread: f64) -> Duration {
        if self.base_delay.is_zero() {
            return Duration::ZERO;
        }
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let nominal = self.base_delay.as_secs_f64() * self.factor.powi(exponent);
        let spread = if spread.is_nan() { 0.0 } else { spread.clamp(-1.0, 1.0) };
        let jittered = nominal * (1.0 + self.jitter * spread);

        Duration::try_from_secs_f64(jittered).map_or(self.max_delay, |d| d.min(self.max_delay))
    }

    /// Randomized delay before the next attempt, honoring any server hint
    pub fn next_delay(&self, attempt: u32, error: &TransportError) -> Duration {
        let spread = if self.jitter > 0.0 {
            rand::thread_rng().gen_range(-1.0..=1.0)
        } else {
            0.0
        };
        let delay = self.backoff(attempt, spread);
        match error.retry_after {
            Some(hint) => delay.max(hint).min(self.max_delay),
            None => delay,
        }
    }
}
