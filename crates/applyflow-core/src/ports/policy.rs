//! DomainPolicyStore port: per-host automation policy.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{Domain, HealthStatus};

#[derive(Debug, Error)]
pub enum PolicyError {
    /// No policy is configured for the host; the engine cannot pick an agent
    /// or a rate limit, so tasks against it fail non-recoverably.
    #[error("no automation policy for host {0}")]
    UnknownHost(String),

    #[error("policy backend: {0}")]
    Backend(String),
}

/// Read side is consulted on every dispatch; the single write-back updates
/// the host's observed health after each execution.
#[async_trait]
pub trait DomainPolicyStore: Send + Sync {
    async fn lookup(&self, host: &str) -> Result<Domain, PolicyError>;

    async fn record_outcome(&self, host: &str, status: HealthStatus) -> Result<(), PolicyError>;
}
