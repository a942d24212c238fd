//! In-memory domain policy store.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::{Domain, HealthStatus};
use crate::ports::{DomainPolicyStore, PolicyError};

#[derive(Default)]
pub struct InMemoryPolicyStore {
    domains: Mutex<HashMap<String, Domain>>,
}

impl InMemoryPolicyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace one host's policy. Configuration management's job in a
    /// real deployment.
    pub async fn seed(&self, domain: Domain) {
        self.domains
            .lock()
            .await
            .insert(domain.host.clone(), domain);
    }
}

#[async_trait]
impl DomainPolicyStore for InMemoryPolicyStore {
    async fn lookup(&self, host: &str) -> Result<Domain, PolicyError> {
        let domains = self.domains.lock().await;
        domains
            .get(host)
            .cloned()
            .ok_or_else(|| PolicyError::UnknownHost(host.to_string()))
    }

    async fn record_outcome(&self, host: &str, status: HealthStatus) -> Result<(), PolicyError> {
        let mut domains = self.domains.lock().await;
        let domain = domains
            .get_mut(host)
            .ok_or_else(|| PolicyError::UnknownHost(host.to_string()))?;
        domain.last_status = status;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::AutomationType;

    #[tokio::test]
    async fn lookup_and_health_write_back() {
        let store = InMemoryPolicyStore::new();
        store
            .seed(Domain::new("jobs.example.com", AutomationType::new("hosted_form")))
            .await;

        let domain = store.lookup("jobs.example.com").await.unwrap();
        assert_eq!(domain.last_status, HealthStatus::Healthy);

        store
            .record_outcome("jobs.example.com", HealthStatus::Degraded)
            .await
            .unwrap();
        let domain = store.lookup("jobs.example.com").await.unwrap();
        assert_eq!(domain.last_status, HealthStatus::Degraded);
    }

    #[tokio::test]
    async fn unknown_host_errors() {
        let store = InMemoryPolicyStore::new();
        assert!(matches!(
            store.lookup("nowhere.test").await,
            Err(PolicyError::UnknownHost(_))
        ));
        assert!(matches!(
            store.record_outcome("nowhere.test", HealthStatus::Healthy).await,
            Err(PolicyError::UnknownHost(_))
        ));
    }
}
