//! Serializable status views for callers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{ApplicationTask, TaskStatus};

/// Point-in-time view of one task, as returned by `get_status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskStatusView {
    pub status: TaskStatus,
    pub attempt_count: u32,
    pub last_error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl From<&ApplicationTask> for TaskStatusView {
    fn from(task: &ApplicationTask) -> Self {
        Self {
            status: task.status,
            attempt_count: task.attempt_count,
            last_error: task.last_error.clone(),
            updated_at: task.updated_at,
        }
    }
}

/// Task tally by status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskCounts {
    pub queued: usize,
    pub processing: usize,
    pub needs_review: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
}

impl TaskCounts {
    pub fn record(&mut self, status: TaskStatus) {
        match status {
            TaskStatus::Queued => self.queued += 1,
            TaskStatus::Processing => self.processing += 1,
            TaskStatus::NeedsReview => self.needs_review += 1,
            TaskStatus::Completed => self.completed += 1,
            TaskStatus::Failed => self.failed += 1,
            TaskStatus::Cancelled => self.cancelled += 1,
        }
    }

    /// Anything still moving through the engine.
    pub fn in_progress(&self) -> usize {
        self.queued + self.processing
    }
}
