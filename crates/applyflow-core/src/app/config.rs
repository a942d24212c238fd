//! Engine tunables.
//!
//! Retry counts, backoff shape, and timeouts vary by deployment; none of
//! them are hard-coded at use sites. The defaults here are starting points.

use std::time::Duration;

use super::retry::RetryPolicy;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Worker pool size: maximum concurrently processing tasks, all domains
    /// combined.
    pub max_workers: usize,

    /// Attempts per task before a recoverable failure becomes terminal.
    pub max_attempts: u32,

    pub retry: RetryPolicy,

    /// Hard wall-clock budget per execution attempt. Exceeding it cancels
    /// the agent and counts as a recoverable failure.
    pub task_timeout: Duration,

    /// How often the dispatcher rescans for eligible tasks.
    pub poll_interval: Duration,

    /// How many eligible tasks one scan pulls from the store.
    pub dispatch_batch: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_workers: 4,
            max_attempts: 3,
            retry: RetryPolicy::default(),
            task_timeout: Duration::from_secs(120),
            poll_interval: Duration::from_millis(250),
            dispatch_batch: 16,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_reasonable() {
        let c = EngineConfig::default();
        assert_eq!(c.max_attempts, 3);
        assert!(c.max_workers > 0);
        assert!(c.task_timeout > c.poll_interval);
    }
}
