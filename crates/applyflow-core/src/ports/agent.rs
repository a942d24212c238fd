//! AutomationAgent port: one implementation per external target-system family.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use super::audit::AuditTrail;
use crate::domain::{ApplicationTask, AutomationType, Domain, JobPosting, Outcome, ProfileSnapshot};

/// Everything one execution needs, resolved by the dispatcher before the
/// agent runs. The profile snapshot is read-only; agents must not write
/// candidate data anywhere but the target form.
pub struct AgentContext {
    pub task: ApplicationTask,
    pub profile: ProfileSnapshot,
    pub posting: JobPosting,
    pub domain: Domain,
    pub audit: AuditTrail,
}

/// Drives one external application flow end to end.
///
/// Contract for every implementation:
/// - Emit an audit step before the first network interaction.
/// - Classify every failure into the [`Outcome`] taxonomy; raw transport
///   errors never cross this boundary.
/// - Return exactly one outcome per invocation; retries belong to the
///   dispatcher, never to the agent.
/// - On CAPTCHA detection: capture evidence, log `captcha_detected`, return
///   review-required. Never attempt to solve or bypass.
#[async_trait]
pub trait AutomationAgent: Send + Sync {
    async fn execute(&self, ctx: &AgentContext) -> Outcome;
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("duplicate agent for automation_type={0}")]
    Duplicate(AutomationType),
}

/// Registry of agents, keyed by the automation type named in a host's policy.
///
/// Built during initialization (mutable), read-only afterwards, so no locks at
/// dispatch time.
#[derive(Default)]
pub struct AgentRegistry {
    agents: HashMap<AutomationType, Arc<dyn AutomationAgent>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self {
            agents: HashMap::new(),
        }
    }

    pub fn register(
        &mut self,
        automation_type: AutomationType,
        agent: Arc<dyn AutomationAgent>,
    ) -> Result<(), RegistryError> {
        if self.agents.contains_key(&automation_type) {
            return Err(RegistryError::Duplicate(automation_type));
        }
        self.agents.insert(automation_type, agent);
        Ok(())
    }

    pub fn get(&self, automation_type: &AutomationType) -> Option<&Arc<dyn AutomationAgent>> {
        self.agents.get(automation_type)
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct SubmitAgent;

    #[async_trait]
    impl AutomationAgent for SubmitAgent {
        async fn execute(&self, _ctx: &AgentContext) -> Outcome {
            Outcome::submitted()
        }
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut reg = AgentRegistry::new();
        reg.register(AutomationType::new("hosted_form"), Arc::new(SubmitAgent))
            .unwrap();
        let err = reg
            .register(AutomationType::new("hosted_form"), Arc::new(SubmitAgent))
            .unwrap_err();
        assert!(err.to_string().contains("hosted_form"));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn lookup_by_automation_type() {
        let mut reg = AgentRegistry::new();
        reg.register(AutomationType::new("hosted_form"), Arc::new(SubmitAgent))
            .unwrap();
        assert!(reg.get(&AutomationType::new("hosted_form")).is_some());
        assert!(reg.get(&AutomationType::new("workday")).is_none());
    }
}
