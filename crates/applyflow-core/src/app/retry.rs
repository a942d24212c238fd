//! Backoff policy for recoverable failures.

use std::time::Duration;

use rand::Rng;

/// Exponential backoff with a cap and a small random jitter.
///
/// Delay before attempt n+1 is `base_delay * multiplier^(n-1)`, capped at
/// `max_delay`, then stretched by up to `jitter` (a ratio) so retries against
/// the same domain don't land in lockstep.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,

    /// Upper bound of the random stretch, as a fraction of the delay.
    /// 0.1 means "up to 10% longer"; zero disables jitter.
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(2),
            multiplier: 2.0,
            max_delay: Duration::from_secs(300),
            jitter: 0.1,
        }
    }
}

impl RetryPolicy {
    /// Delay before the next attempt, given the number of attempts already
    /// made (1-indexed).
    pub fn next_delay(&self, attempts: u32) -> Duration {
        let exponent = attempts.saturating_sub(1) as i32;
        let raw = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);
        let capped = raw.min(self.max_delay.as_secs_f64());

        let stretch = if self.jitter > 0.0 {
            1.0 + rand::thread_rng().gen_range(0.0..self.jitter)
        } else {
            1.0
        };
        Duration::from_secs_f64(capped * stretch)
    }
}
