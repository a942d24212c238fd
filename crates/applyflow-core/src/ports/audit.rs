//! AuditLog port: append-only step records, ordered per task.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{ArtifactRef, AuditEntry, TaskId};

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("audit backend: {0}")]
    Backend(String),
}

/// Append-only audit storage.
///
/// A write failure must surface to the caller: a task outcome is not final
/// until its audit trail is durable, so the dispatcher turns a failed append
/// into a recoverable error for the owning task.
#[async_trait]
pub trait AuditLog: Send + Sync {
    async fn append(&self, entry: AuditEntry) -> Result<(), AuditError>;

    /// Full history for one task, in append order.
    async fn entries_for(&self, task_id: TaskId) -> Result<Vec<AuditEntry>, AuditError>;
}

/// Task-scoped writer handed to agents so they can record steps without
/// seeing the rest of the log.
#[derive(Clone)]
pub struct AuditTrail {
    log: Arc<dyn AuditLog>,
    task_id: TaskId,
}

impl AuditTrail {
    pub fn new(log: Arc<dyn AuditLog>, task_id: TaskId) -> Self {
        Self { log, task_id }
    }

    pub fn task_id(&self) -> TaskId {
        self.task_id
    }

    pub async fn append(
        &self,
        step: &str,
        payload: serde_json::Value,
        artifacts: Vec<ArtifactRef>,
    ) -> Result<(), AuditError> {
        self.log
            .append(AuditEntry::new(self.task_id, step, payload, artifacts))
            .await
    }
}
