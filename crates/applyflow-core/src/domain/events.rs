//! Terminal-transition events raised toward the notification collaborator.

use serde::{Deserialize, Serialize};

use super::ids::{CandidateId, JobId, TaskId};
use super::task::TaskStatus;

/// Raised exactly once per terminal transition (completed, failed,
/// needs_review, cancelled). Delivery (push, email, webhook) is an
/// external collaborator's concern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskEvent {
    pub task_id: TaskId,
    pub candidate_id: CandidateId,
    pub job_id: JobId,
    pub status: TaskStatus,
}

impl TaskEvent {
    pub fn new(
        task_id: TaskId,
        candidate_id: CandidateId,
        job_id: JobId,
        status: TaskStatus,
    ) -> Self {
        Self {
            task_id,
            candidate_id,
            job_id,
            status,
        }
    }
}
