//! In-memory audit log.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::{AuditEntry, TaskId};
use crate::ports::{AuditError, AuditLog};

/// Per-task append-only vectors; append order is the per-task order.
#[derive(Default)]
pub struct InMemoryAuditLog {
    entries: Mutex<HashMap<TaskId, Vec<AuditEntry>>>,
}

impl InMemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AuditLog for InMemoryAuditLog {
    async fn append(&self, entry: AuditEntry) -> Result<(), AuditError> {
        let mut entries = self.entries.lock().await;
        entries.entry(entry.task_id).or_default().push(entry);
        Ok(())
    }

    async fn entries_for(&self, task_id: TaskId) -> Result<Vec<AuditEntry>, AuditError> {
        let entries = self.entries.lock().await;
        Ok(entries.get(&task_id).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::audit::steps;

    #[tokio::test]
    async fn entries_come_back_in_append_order() {
        let log = InMemoryAuditLog::new();
        let task_id = TaskId::generate();
        let other = TaskId::generate();

        for step in [steps::ENQUEUED, steps::ATTEMPT_STARTED, steps::COMPLETED] {
            log.append(AuditEntry::new(task_id, step, serde_json::json!({}), vec![]))
                .await
                .unwrap();
        }
        log.append(AuditEntry::new(other, steps::ENQUEUED, serde_json::json!({}), vec![]))
            .await
            .unwrap();

        let trail = log.entries_for(task_id).await.unwrap();
        let labels: Vec<_> = trail.iter().map(|e| e.step.as_str()).collect();
        assert_eq!(labels, vec!["enqueued", "attempt_started", "completed"]);

        assert_eq!(log.entries_for(other).await.unwrap().len(), 1);
        assert!(log.entries_for(TaskId::generate()).await.unwrap().is_empty());
    }
}
