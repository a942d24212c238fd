//! TaskStore port: durable source of truth for application tasks.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::app::status::TaskCounts;
use crate::domain::{ApplicationTask, TaskId, TaskStatus};

#[derive(Debug, Error)]
pub enum StoreError {
    /// The (candidate, job) pair already has a queued or processing task.
    #[error("pair already has an active task: {0}")]
    AlreadyActive(TaskId),

    #[error("task {0} not found")]
    NotFound(TaskId),

    /// Compare-and-set lost: someone else transitioned the task first.
    #[error("status conflict for task {task_id}: expected {expected:?}, found {found:?}")]
    Conflict {
        task_id: TaskId,
        expected: TaskStatus,
        found: TaskStatus,
    },

    #[error("storage backend: {0}")]
    Backend(String),
}

/// Durable record of every application task.
///
/// Design principles:
/// - The store is the source of truth; the dispatcher holds no task state of
///   its own between loop iterations.
/// - `update_if` is a per-task compare-and-set keyed on the current status.
///   Every state transition goes through it, which is what makes
///   at-most-one-active-execution hold under concurrent workers.
/// - `insert` enforces the one-active-task-per-(candidate, job) invariant
///   atomically with the write.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Insert a newly enqueued task. Fails with [`StoreError::AlreadyActive`]
    /// if the pair already has a queued or processing task.
    async fn insert(&self, task: ApplicationTask) -> Result<(), StoreError>;

    async fn get(&self, task_id: TaskId) -> Result<Option<ApplicationTask>, StoreError>;

    /// Persist `task` only if the stored status equals `expected`.
    ///
    /// Implementations must also re-check the active-pair invariant when a
    /// task re-enters an active status (review requeue), returning
    /// [`StoreError::AlreadyActive`] if a newer task took the pair.
    async fn update_if(&self, expected: TaskStatus, task: ApplicationTask) -> Result<(), StoreError>;

    /// Queued tasks whose backoff gate has elapsed, oldest first.
    async fn list_eligible(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<ApplicationTask>, StoreError>;

    async fn counts(&self) -> Result<TaskCounts, StoreError>;
}
