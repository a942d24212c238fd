//! Engine: the public surface callers see, plus builder and lifecycle.
//!
//! All task state transitions are funnelled through compare-and-set updates
//! against the task store; the dispatcher owns transitions for processing
//! tasks, while externally triggered transitions (cancel, review resolution)
//! go through the same CAS so the two can never double-apply.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tracing::warn;

use super::config::EngineConfig;
use super::dispatcher;
use super::status::{TaskCounts, TaskStatusView};
use crate::domain::audit::steps;
use crate::domain::{
    ApplicationTask, AuditEntry, AutomationType, CandidateId, JobId, TaskEvent, TaskId, TaskStatus,
};
use crate::limiter::DomainLimiter;
use crate::ports::{
    AgentRegistry, AuditError, AuditLog, AutomationAgent, DomainPolicyStore, JobCatalog,
    LookupError, Notifier, ProfileDirectory, RegistryError, StoreError, TaskStore,
};

#[derive(Debug, Error)]
pub enum EngineError {
    /// The pair already has a queued or processing task.
    #[error("an active application already exists for this pair (task {0})")]
    AlreadyActive(TaskId),

    #[error("task {0} not found")]
    TaskNotFound(TaskId),

    #[error("task {task_id} is already terminal ({status:?})")]
    AlreadyTerminal { task_id: TaskId, status: TaskStatus },

    #[error("task {task_id} is not awaiting review ({status:?})")]
    NotAwaitingReview { task_id: TaskId, status: TaskStatus },

    #[error("collaborator lookup: {0}")]
    Lookup(#[from] LookupError),

    #[error("task store: {0}")]
    Store(StoreError),

    #[error("audit log: {0}")]
    Audit(#[from] AuditError),
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::AlreadyActive(existing) => EngineError::AlreadyActive(existing),
            StoreError::NotFound(task_id) => EngineError::TaskNotFound(task_id),
            other => EngineError::Store(other),
        }
    }
}

/// How an external human-review workflow resolved a needs_review task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewResolution {
    /// The reviewer finished the application by hand.
    Completed,
    /// Send the task back to the queue; attempt history is preserved.
    Requeue,
    /// Abandon the application.
    Cancelled,
}

pub(crate) struct EngineInner {
    pub(crate) config: EngineConfig,
    pub(crate) store: Arc<dyn TaskStore>,
    pub(crate) audit: Arc<dyn AuditLog>,
    pub(crate) policies: Arc<dyn DomainPolicyStore>,
    pub(crate) agents: AgentRegistry,
    pub(crate) limiter: DomainLimiter,
    pub(crate) notifier: Arc<dyn Notifier>,
    pub(crate) profiles: Arc<dyn ProfileDirectory>,
    pub(crate) jobs: Arc<dyn JobCatalog>,

    /// Cancel signals for in-flight executions, inserted before a task is
    /// claimed and removed when its completion is applied.
    pub(crate) cancels: Mutex<HashMap<TaskId, watch::Sender<bool>>>,
}

impl EngineInner {
    /// Raise the terminal-transition event. Called only after a successful
    /// CAS into the terminal status, which is what makes it exactly-once.
    pub(crate) async fn emit_event(&self, task: &ApplicationTask) {
        let event = TaskEvent::new(
            task.task_id,
            task.candidate_id.clone(),
            task.job_id.clone(),
            task.status,
        );
        if let Err(e) = self.notifier.notify(event).await {
            warn!(task_id = %task.task_id, error = %e, "terminal event delivery failed");
        }
    }
}

/// The application-automation engine.
///
/// Cheap to clone; all clones share the same state.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

impl Engine {
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    /// Create a queued task for (candidate, job).
    ///
    /// Rejects the request when the pair already has a queued or processing
    /// task; the existing task id is carried in the error.
    pub async fn enqueue(
        &self,
        candidate_id: CandidateId,
        job_id: JobId,
    ) -> Result<TaskId, EngineError> {
        let posting = self.inner.jobs.job(&job_id).await?;
        let task = ApplicationTask::new(
            TaskId::generate(),
            candidate_id,
            job_id,
            posting.target_host,
        );
        let task_id = task.task_id;

        self.inner.store.insert(task.clone()).await?;

        let entry = AuditEntry::new(
            task_id,
            steps::ENQUEUED,
            serde_json::json!({
                "candidate_id": task.candidate_id.as_str(),
                "job_id": task.job_id.as_str(),
                "host": task.host.clone(),
            }),
            vec![],
        );
        if let Err(e) = self.inner.audit.append(entry).await {
            // The task exists either way; the enqueue marker is informative.
            warn!(task_id = %task_id, error = %e, "enqueue audit write failed");
        }
        Ok(task_id)
    }

    /// Point-in-time status read.
    pub async fn get_status(&self, task_id: TaskId) -> Result<TaskStatusView, EngineError> {
        let task = self.load(task_id).await?;
        Ok(TaskStatusView::from(&task))
    }

    /// Full ordered audit history for a task.
    pub async fn get_audit_log(&self, task_id: TaskId) -> Result<Vec<AuditEntry>, EngineError> {
        self.load(task_id).await?;
        Ok(self.inner.audit.entries_for(task_id).await?)
    }

    /// Cancel a task.
    ///
    /// Queued and needs_review tasks cancel immediately; a processing task
    /// has its in-flight execution signalled, and any outcome that lands
    /// after the signal is discarded in favor of cancelled.
    pub async fn cancel(&self, task_id: TaskId) -> Result<(), EngineError> {
        loop {
            let task = self.load(task_id).await?;
            if task.status.is_terminal() {
                return Err(EngineError::AlreadyTerminal {
                    task_id,
                    status: task.status,
                });
            }

            if task.status == TaskStatus::Processing {
                let cancels = self.inner.cancels.lock().await;
                if let Some(tx) = cancels.get(&task_id) {
                    let _ = tx.send(true);
                    return Ok(());
                }
                drop(cancels);
                // The completion is being applied right now; re-read and
                // cancel whatever state the task lands in.
                tokio::task::yield_now().await;
                continue;
            }

            let expected = task.status;
            let mut cancelled = task;
            cancelled.mark_cancelled();
            match self.inner.store.update_if(expected, cancelled.clone()).await {
                Ok(()) => {
                    let entry = AuditEntry::new(
                        task_id,
                        steps::CANCELLED,
                        serde_json::json!({"was": expected}),
                        vec![],
                    );
                    if let Err(e) = self.inner.audit.append(entry).await {
                        warn!(task_id = %task_id, error = %e, "cancel audit write failed");
                    }
                    self.inner.emit_event(&cancelled).await;
                    return Ok(());
                }
                Err(StoreError::Conflict { .. }) => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Apply an external review decision to a needs_review task.
    pub async fn resolve_review(
        &self,
        task_id: TaskId,
        resolution: ReviewResolution,
    ) -> Result<(), EngineError> {
        let task = self.load(task_id).await?;
        if task.status != TaskStatus::NeedsReview {
            return Err(EngineError::NotAwaitingReview {
                task_id,
                status: task.status,
            });
        }

        let mut resolved = task;
        match resolution {
            ReviewResolution::Completed => resolved.complete(),
            ReviewResolution::Requeue => resolved.requeue(),
            ReviewResolution::Cancelled => resolved.mark_cancelled(),
        }

        self.inner
            .store
            .update_if(TaskStatus::NeedsReview, resolved.clone())
            .await?;

        let entry = AuditEntry::new(
            task_id,
            steps::REVIEW_RESOLVED,
            serde_json::json!({"resolution": format!("{resolution:?}"), "status": resolved.status}),
            vec![],
        );
        if let Err(e) = self.inner.audit.append(entry).await {
            warn!(task_id = %task_id, error = %e, "review audit write failed");
        }

        if resolved.status.is_terminal() {
            self.inner.emit_event(&resolved).await;
        }
        Ok(())
    }

    /// Task tally by status.
    pub async fn counts(&self) -> Result<TaskCounts, EngineError> {
        Ok(self.inner.store.counts().await?)
    }

    /// Spawn the dispatch loop. The engine stays usable (enqueue, cancel,
    /// queries) whether or not a dispatcher is running.
    pub fn start(&self) -> DispatcherHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let inner = Arc::clone(&self.inner);
        let join = tokio::spawn(async move {
            dispatcher::run(inner, shutdown_rx).await;
        });
        DispatcherHandle { shutdown_tx, join }
    }

    async fn load(&self, task_id: TaskId) -> Result<ApplicationTask, EngineError> {
        self.inner
            .store
            .get(task_id)
            .await?
            .ok_or(EngineError::TaskNotFound(task_id))
    }
}

/// Handle to a running dispatch loop.
///
/// Dropping the handle counts as a shutdown request; prefer
/// [`shutdown_and_join`](Self::shutdown_and_join) to also wait for in-flight
/// work.
pub struct DispatcherHandle {
    shutdown_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl DispatcherHandle {
    /// Stop taking new work. In-flight executions run to completion and
    /// their outcomes are still applied.
    pub fn request_shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        let _ = self.join.await;
    }
}

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("no automation agents registered")]
    NoAgents,

    #[error("missing collaborator: {0}")]
    Missing(&'static str),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Wires the engine together. Fails fast on an incomplete setup so a
/// misconfigured deployment dies at startup, not at first dispatch.
pub struct EngineBuilder {
    config: EngineConfig,
    agents: AgentRegistry,
    store: Option<Arc<dyn TaskStore>>,
    audit: Option<Arc<dyn AuditLog>>,
    policies: Option<Arc<dyn DomainPolicyStore>>,
    notifier: Option<Arc<dyn Notifier>>,
    profiles: Option<Arc<dyn ProfileDirectory>>,
    jobs: Option<Arc<dyn JobCatalog>>,
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self {
            config: EngineConfig::default(),
            agents: AgentRegistry::new(),
            store: None,
            audit: None,
            policies: None,
            notifier: None,
            profiles: None,
            jobs: None,
        }
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn task_store(mut self, store: Arc<dyn TaskStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn audit_log(mut self, audit: Arc<dyn AuditLog>) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn policy_store(mut self, policies: Arc<dyn DomainPolicyStore>) -> Self {
        self.policies = Some(policies);
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn profile_directory(mut self, profiles: Arc<dyn ProfileDirectory>) -> Self {
        self.profiles = Some(profiles);
        self
    }

    pub fn job_catalog(mut self, jobs: Arc<dyn JobCatalog>) -> Self {
        self.jobs = Some(jobs);
        self
    }

    pub fn register_agent(
        mut self,
        automation_type: AutomationType,
        agent: Arc<dyn AutomationAgent>,
    ) -> Result<Self, RegistryError> {
        self.agents.register(automation_type, agent)?;
        Ok(self)
    }

    pub fn build(self) -> Result<Engine, BuildError> {
        if self.agents.is_empty() {
            return Err(BuildError::NoAgents);
        }
        let inner = EngineInner {
            config: self.config,
            store: self.store.ok_or(BuildError::Missing("task store"))?,
            audit: self.audit.ok_or(BuildError::Missing("audit log"))?,
            policies: self.policies.ok_or(BuildError::Missing("policy store"))?,
            agents: self.agents,
            limiter: DomainLimiter::new(),
            notifier: self.notifier.ok_or(BuildError::Missing("notifier"))?,
            profiles: self
                .profiles
                .ok_or(BuildError::Missing("profile directory"))?,
            jobs: self.jobs.ok_or(BuildError::Missing("job catalog"))?,
            cancels: Mutex::new(HashMap::new()),
        };
        Ok(Engine {
            inner: Arc::new(inner),
        })
    }
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}
