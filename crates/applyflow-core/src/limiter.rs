//! Per-domain execution permits.
//!
//! Non-blocking by design: when a host has no capacity the dispatcher leaves
//! the task queued and moves on to other eligible work, so a slow or blocked
//! domain never stalls the loop or a worker.

use std::collections::HashMap;
use std::time::Instant;

use tokio::sync::Mutex;

use crate::domain::{HealthStatus, RateLimitPolicy};

#[derive(Debug, Default)]
struct DomainSlot {
    in_flight: u32,
    last_granted: Option<Instant>,
}

/// Permit accounting per host. The policy itself lives in the domain record;
/// the limiter only tracks what is currently running and when the last
/// execution started.
#[derive(Default)]
pub struct DomainLimiter {
    slots: Mutex<HashMap<String, DomainSlot>>,
}

impl DomainLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Try to take a permit for `host`. Denies when the host is blocked,
    /// at its concurrency cap, or inside its minimum inter-request spacing.
    pub async fn try_acquire(
        &self,
        host: &str,
        policy: &RateLimitPolicy,
        health: HealthStatus,
    ) -> bool {
        if health == HealthStatus::Blocked {
            return false;
        }
        let mut slots = self.slots.lock().await;
        let slot = slots.entry(host.to_string()).or_default();

        if slot.in_flight >= policy.max_concurrent {
            return false;
        }
        if let Some(last) = slot.last_granted
            && last.elapsed() < policy.min_interval
        {
            return false;
        }

        slot.in_flight += 1;
        slot.last_granted = Some(Instant::now());
        true
    }

    /// Give a permit back. Called unconditionally when an execution reaches a
    /// terminal or retry-pending state; releasing an unknown host is a no-op.
    pub async fn release(&self, host: &str) {
        let mut slots = self.slots.lock().await;
        if let Some(slot) = slots.get_mut(host) {
            slot.in_flight = slot.in_flight.saturating_sub(1);
        }
    }

    /// Executions currently holding a permit for `host`.
    pub async fn in_flight(&self, host: &str) -> u32 {
        let slots = self.slots.lock().await;
        slots.get(host).map(|s| s.in_flight).unwrap_or(0)
    }
}
