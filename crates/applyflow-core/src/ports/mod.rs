//! Ports: the seams between the engine and its collaborators.
//!
//! Every trait here hides an external system: durable task storage, the
//! audit store, site configuration, the browser driver (and the object store
//! behind it), profile and job lookups, and notification delivery. The
//! dispatcher only ever talks through these seams.

pub mod agent;
pub mod audit;
pub mod browser;
pub mod directory;
pub mod notifier;
pub mod policy;
pub mod task_store;

pub use agent::{AgentContext, AgentRegistry, AutomationAgent, RegistryError};
pub use audit::{AuditError, AuditLog, AuditTrail};
pub use browser::{BrowserError, BrowserProvider, BrowserSession, SubmissionReceipt};
pub use directory::{JobCatalog, LookupError, ProfileDirectory};
pub use notifier::{Notifier, NotifyError};
pub use policy::{DomainPolicyStore, PolicyError};
pub use task_store::{StoreError, TaskStore};
