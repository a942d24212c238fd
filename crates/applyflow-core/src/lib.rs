//! applyflow-core
//!
//! Engine that drives queued job-application tasks through external
//! application forms: scheduling, retry with backoff, per-domain rate
//! limiting, CAPTCHA escalation, and a full per-task audit trail.
//!
//! - **domain**: records and vocabulary (tasks, outcomes, audit, sites, profiles)
//! - **ports**: seams to external collaborators (task store, agents, browser driver, ...)
//! - **limiter**: per-domain execution permits
//! - **app**: engine surface, dispatch loop, retry policy, configuration
//! - **impls**: in-memory adapters and the reference form agent

pub mod app;
pub mod domain;
pub mod impls;
pub mod limiter;
pub mod ports;

pub use app::config::EngineConfig;
pub use app::engine::{
    BuildError, DispatcherHandle, Engine, EngineBuilder, EngineError, ReviewResolution,
};
pub use app::retry::RetryPolicy;
pub use app::status::{TaskCounts, TaskStatusView};
pub use domain::{
    ApplicationTask, ArtifactRef, AuditEntry, AutomationType, CandidateId, CaptchaMode, Domain,
    HealthStatus, JobId, JobPosting, Outcome, OutcomeKind, ProfileField, ProfileSnapshot,
    RateLimitPolicy, TaskEvent, TaskId, TaskStatus,
};
