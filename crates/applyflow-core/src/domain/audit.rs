//! Audit trail: immutable step records for a task.
//!
//! Entries are append-only, ordered per task, and never embed binary data;
//! screenshots and page snapshots are referenced by URI.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::TaskId;
use super::outcome::ArtifactRef;

/// Step labels used across the engine. Kept in one place so queries and
/// dashboards can match on stable names.
pub mod steps {
    /// Task accepted into the queue.
    pub const ENQUEUED: &str = "enqueued";
    /// Dispatcher claimed the task for a worker.
    pub const ATTEMPT_STARTED: &str = "attempt_started";
    /// Agent is about to load the application form.
    pub const NAVIGATING: &str = "navigating";
    /// Application form loaded.
    pub const NAVIGATED: &str = "navigated";
    /// One form field populated from the profile (value redacted).
    pub const FIELD_FILLED: &str = "field_filled";
    /// Optional form field left empty (no profile source).
    pub const FIELD_SKIPPED: &str = "field_skipped";
    /// CAPTCHA heuristic fired; execution escalates to review.
    pub const CAPTCHA_DETECTED: &str = "captcha_detected";
    /// Form submitted to the target site.
    pub const SUBMITTED: &str = "submitted";
    /// Terminal: application completed.
    pub const COMPLETED: &str = "completed";
    /// Recoverable failure; next attempt scheduled.
    pub const RETRY_SCHEDULED: &str = "retry_scheduled";
    /// Terminal: attempts exhausted or non-recoverable failure.
    pub const FAILED: &str = "failed";
    /// Terminal from the engine's view: waiting on a human decision.
    pub const NEEDS_REVIEW: &str = "needs_review";
    /// Terminal: cancelled by external request.
    pub const CANCELLED: &str = "cancelled";
    /// External review workflow resolved a needs_review task.
    pub const REVIEW_RESOLVED: &str = "review_resolved";
}

/// One immutable record of a step taken while executing a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub task_id: TaskId,

    /// Short label of the action performed (see [`steps`]).
    pub step: String,

    /// Structured detail. Field values are redacted before they get here.
    pub payload: serde_json::Value,

    /// URIs of externally stored evidence.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub artifacts: Vec<ArtifactRef>,

    pub recorded_at: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(
        task_id: TaskId,
        step: impl Into<String>,
        payload: serde_json::Value,
        artifacts: Vec<ArtifactRef>,
    ) -> Self {
        Self {
            task_id,
            step: step.into(),
            payload,
            artifacts,
            recorded_at: Utc::now(),
        }
    }
}
