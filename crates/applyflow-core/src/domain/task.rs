//! Application task record and status state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{CandidateId, JobId, TaskId};

/// Task status.
///
/// Transitions:
/// - Queued -> Processing (worker slot free and domain permit granted)
/// - Processing -> Completed | NeedsReview | Failed
/// - Processing -> Queued (recoverable error, attempts left)
/// - Queued | Processing | NeedsReview -> Cancelled
/// - NeedsReview -> Completed | Queued (external review resolution)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Queued,
    Processing,
    NeedsReview,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    /// Terminal states admit no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }

    /// Active states count toward the one-per-pair invariant.
    pub fn is_active(self) -> bool {
        matches!(self, TaskStatus::Queued | TaskStatus::Processing)
    }
}

/// One unit of "apply candidate X to job Y".
///
/// Design:
/// - This record is the single source of truth for a task.
/// - State transitions happen via methods, never direct field writes, so
///   `updated_at` and the attempt counter stay consistent.
/// - Retained forever: cancellation is a status, not a removal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationTask {
    pub task_id: TaskId,
    pub candidate_id: CandidateId,
    pub job_id: JobId,

    /// Target site host, resolved from the job posting at enqueue time.
    pub host: String,

    pub status: TaskStatus,

    /// Executions started so far. Never decreases.
    pub attempt_count: u32,

    /// Short, non-sensitive description of the last failure. Cleared on success.
    pub last_error: Option<String>,

    /// Worker currently (or last) processing this task.
    pub assigned_worker: Option<String>,

    /// Earliest time the next attempt may start (retry backoff gate).
    pub next_attempt_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ApplicationTask {
    pub fn new(task_id: TaskId, candidate_id: CandidateId, job_id: JobId, host: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            task_id,
            candidate_id,
            job_id,
            host: host.into(),
            status: TaskStatus::Queued,
            attempt_count: 0,
            last_error: None,
            assigned_worker: None,
            next_attempt_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Queued -> Processing. Increments the attempt counter and records the worker.
    pub fn begin_attempt(&mut self, worker: impl Into<String>) {
        self.status = TaskStatus::Processing;
        self.attempt_count += 1;
        self.assigned_worker = Some(worker.into());
        self.next_attempt_at = None;
        self.touch();
    }

    /// Processing -> Completed. Clears the last error.
    pub fn complete(&mut self) {
        self.status = TaskStatus::Completed;
        self.last_error = None;
        self.touch();
    }

    /// Processing -> NeedsReview (CAPTCHA or other human-decision point).
    pub fn mark_needs_review(&mut self, reason: impl Into<String>) {
        self.status = TaskStatus::NeedsReview;
        self.last_error = Some(reason.into());
        self.touch();
    }

    /// Processing -> Queued with a backoff gate.
    pub fn schedule_retry(&mut self, next_attempt_at: DateTime<Utc>, error: impl Into<String>) {
        self.status = TaskStatus::Queued;
        self.next_attempt_at = Some(next_attempt_at);
        self.last_error = Some(error.into());
        self.touch();
    }

    /// Processing -> Failed (attempts exhausted or non-recoverable error).
    pub fn mark_failed(&mut self, error: impl Into<String>) {
        self.status = TaskStatus::Failed;
        self.last_error = Some(error.into());
        self.touch();
    }

    /// Any non-terminal state -> Cancelled.
    pub fn mark_cancelled(&mut self) {
        self.status = TaskStatus::Cancelled;
        self.touch();
    }

    /// NeedsReview -> Queued (external review sent the task back). Attempt
    /// history is preserved; the backoff gate is cleared.
    pub fn requeue(&mut self) {
        self.status = TaskStatus::Queued;
        self.next_attempt_at = None;
        self.touch();
    }

    /// Queued and past its backoff gate.
    pub fn is_eligible(&self, now: DateTime<Utc>) -> bool {
        self.status == TaskStatus::Queued && self.next_attempt_at.is_none_or(|at| at <= now)
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn task() -> ApplicationTask {
        ApplicationTask::new(
            TaskId::generate(),
            CandidateId::new("cand-1"),
            JobId::new("job-1"),
            "jobs.example.com",
        )
    }

    #[test]
    fn new_task_is_queued_with_zero_attempts() {
        let t = task();
        assert_eq!(t.status, TaskStatus::Queued);
        assert_eq!(t.attempt_count, 0);
        assert!(t.assigned_worker.is_none());
        assert!(t.is_eligible(Utc::now()));
    }

    #[test]
    fn begin_attempt_increments_and_assigns() {
        let mut t = task();
        t.begin_attempt("worker-1");
        assert_eq!(t.status, TaskStatus::Processing);
        assert_eq!(t.attempt_count, 1);
        assert_eq!(t.assigned_worker.as_deref(), Some("worker-1"));
    }

    #[test]
    fn complete_clears_last_error() {
        let mut t = task();
        t.begin_attempt("worker-1");
        t.schedule_retry(Utc::now(), "transient");
        t.begin_attempt("worker-2");
        t.complete();
        assert_eq!(t.status, TaskStatus::Completed);
        assert!(t.last_error.is_none());
        assert_eq!(t.attempt_count, 2);
    }

    #[test]
    fn retry_gate_blocks_eligibility_until_elapsed() {
        let mut t = task();
        t.begin_attempt("worker-1");
        t.schedule_retry(Utc::now() + chrono::Duration::seconds(30), "timeout");
        assert_eq!(t.status, TaskStatus::Queued);
        assert!(!t.is_eligible(Utc::now()));
        assert!(t.is_eligible(Utc::now() + chrono::Duration::seconds(31)));
    }

    #[rstest]
    #[case::completed(TaskStatus::Completed)]
    #[case::failed(TaskStatus::Failed)]
    #[case::cancelled(TaskStatus::Cancelled)]
    fn terminal_statuses(#[case] status: TaskStatus) {
        assert!(status.is_terminal());
        assert!(!status.is_active());
    }

    #[rstest]
    #[case::queued(TaskStatus::Queued)]
    #[case::processing(TaskStatus::Processing)]
    fn active_statuses(#[case] status: TaskStatus) {
        assert!(status.is_active());
        assert!(!status.is_terminal());
    }

    #[test]
    fn needs_review_is_neither_active_nor_terminal() {
        assert!(!TaskStatus::NeedsReview.is_active());
        assert!(!TaskStatus::NeedsReview.is_terminal());
    }

    #[test]
    fn status_serializes_snake_case() {
        let s = serde_json::to_string(&TaskStatus::NeedsReview).unwrap();
        assert_eq!(s, "\"needs_review\"");
    }
}
