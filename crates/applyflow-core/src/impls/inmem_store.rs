//! In-memory task store.
//!
//! Development and test adapter. The mutex-guarded map is the single source
//! of truth, and the active-pair index is maintained inside the same lock so
//! the one-active-task-per-pair invariant holds atomically with every write.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::app::status::TaskCounts;
use crate::domain::{ApplicationTask, CandidateId, JobId, TaskId, TaskStatus};
use crate::ports::{StoreError, TaskStore};

type PairKey = (CandidateId, JobId);

#[derive(Default)]
struct StoreState {
    tasks: HashMap<TaskId, ApplicationTask>,
    /// (candidate, job) -> the task currently holding the pair.
    active_pairs: HashMap<PairKey, TaskId>,
}

#[derive(Default)]
pub struct InMemoryTaskStore {
    state: Mutex<StoreState>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn pair_key(task: &ApplicationTask) -> PairKey {
    (task.candidate_id.clone(), task.job_id.clone())
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn insert(&self, task: ApplicationTask) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        let key = pair_key(&task);
        if let Some(&existing) = state.active_pairs.get(&key) {
            return Err(StoreError::AlreadyActive(existing));
        }
        if task.status.is_active() {
            state.active_pairs.insert(key, task.task_id);
        }
        state.tasks.insert(task.task_id, task);
        Ok(())
    }

    async fn get(&self, task_id: TaskId) -> Result<Option<ApplicationTask>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.tasks.get(&task_id).cloned())
    }

    async fn update_if(
        &self,
        expected: TaskStatus,
        task: ApplicationTask,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;

        let found = match state.tasks.get(&task.task_id) {
            Some(current) => current.status,
            None => return Err(StoreError::NotFound(task.task_id)),
        };
        if found != expected {
            return Err(StoreError::Conflict {
                task_id: task.task_id,
                expected,
                found,
            });
        }

        let key = pair_key(&task);
        if task.status.is_active() {
            // Re-entering the queue (review requeue): the pair may have been
            // taken by a newer task in the meantime.
            if let Some(&holder) = state.active_pairs.get(&key)
                && holder != task.task_id
            {
                return Err(StoreError::AlreadyActive(holder));
            }
            state.active_pairs.insert(key, task.task_id);
        } else if state.active_pairs.get(&key) == Some(&task.task_id) {
            state.active_pairs.remove(&key);
        }

        state.tasks.insert(task.task_id, task);
        Ok(())
    }

    async fn list_eligible(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<ApplicationTask>, StoreError> {
        let state = self.state.lock().await;
        let mut eligible: Vec<ApplicationTask> = state
            .tasks
            .values()
            .filter(|t| t.is_eligible(now))
            .cloned()
            .collect();
        // Oldest first; task ids are time-sortable and break created_at ties.
        eligible.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then(a.task_id.cmp(&b.task_id))
        });
        eligible.truncate(limit);
        Ok(eligible)
    }

    async fn counts(&self) -> Result<TaskCounts, StoreError> {
        let state = self.state.lock().await;
        let mut counts = TaskCounts::default();
        for task in state.tasks.values() {
            counts.record(task.status);
        }
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(candidate: &str, job: &str) -> ApplicationTask {
        ApplicationTask::new(
            TaskId::generate(),
            CandidateId::new(candidate),
            JobId::new(job),
            "jobs.example.com",
        )
    }

    #[tokio::test]
    async fn insert_rejects_second_active_task_for_pair() {
        let store = InMemoryTaskStore::new();
        let first = task("cand-1", "job-1");
        let first_id = first.task_id;
        store.insert(first).await.unwrap();

        let err = store.insert(task("cand-1", "job-1")).await.unwrap_err();
        match err {
            StoreError::AlreadyActive(existing) => assert_eq!(existing, first_id),
            other => panic!("expected AlreadyActive, got {other:?}"),
        }

        // Other pairs are unaffected.
        store.insert(task("cand-1", "job-2")).await.unwrap();
        store.insert(task("cand-2", "job-1")).await.unwrap();
    }

    #[tokio::test]
    async fn terminal_transition_frees_the_pair() {
        let store = InMemoryTaskStore::new();
        let mut t = task("cand-1", "job-1");
        store.insert(t.clone()).await.unwrap();

        t.begin_attempt("worker-1");
        store.update_if(TaskStatus::Queued, t.clone()).await.unwrap();
        t.complete();
        store
            .update_if(TaskStatus::Processing, t.clone())
            .await
            .unwrap();

        store.insert(task("cand-1", "job-1")).await.unwrap();
    }

    #[tokio::test]
    async fn update_if_detects_conflicts() {
        let store = InMemoryTaskStore::new();
        let mut t = task("cand-1", "job-1");
        store.insert(t.clone()).await.unwrap();

        t.begin_attempt("worker-1");
        store.update_if(TaskStatus::Queued, t.clone()).await.unwrap();

        // A second claim against the same stored status loses.
        let mut stale = t.clone();
        stale.begin_attempt("worker-2");
        let err = store
            .update_if(TaskStatus::Queued, stale)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict { found, .. } if found == TaskStatus::Processing));
    }

    #[tokio::test]
    async fn requeue_into_an_occupied_pair_is_rejected() {
        let store = InMemoryTaskStore::new();

        // Old task parks in needs_review, freeing the pair.
        let mut old = task("cand-1", "job-1");
        store.insert(old.clone()).await.unwrap();
        old.begin_attempt("worker-1");
        store.update_if(TaskStatus::Queued, old.clone()).await.unwrap();
        old.mark_needs_review("captcha");
        store
            .update_if(TaskStatus::Processing, old.clone())
            .await
            .unwrap();

        // A newer task takes the pair.
        let newer = task("cand-1", "job-1");
        store.insert(newer).await.unwrap();

        // Review requeue of the old task must not create a second active task.
        old.requeue();
        let err = store
            .update_if(TaskStatus::NeedsReview, old)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::AlreadyActive(_)));
    }

    #[tokio::test]
    async fn eligibility_honors_backoff_gate_and_age_order() {
        let store = InMemoryTaskStore::new();

        let first = task("cand-1", "job-1");
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        let second = task("cand-2", "job-1");
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        let mut gated = task("cand-3", "job-1");
        gated.begin_attempt("worker-1");
        gated.schedule_retry(Utc::now() + chrono::Duration::seconds(60), "transient");

        store.insert(first.clone()).await.unwrap();
        store.insert(second.clone()).await.unwrap();
        store.insert(gated).await.unwrap();

        let eligible = store.list_eligible(Utc::now(), 10).await.unwrap();
        let ids: Vec<_> = eligible.iter().map(|t| t.task_id).collect();
        assert_eq!(ids, vec![first.task_id, second.task_id]);
    }

    #[tokio::test]
    async fn counts_tally_by_status() {
        let store = InMemoryTaskStore::new();
        let mut done = task("cand-1", "job-1");
        store.insert(done.clone()).await.unwrap();
        done.begin_attempt("worker-1");
        store.update_if(TaskStatus::Queued, done.clone()).await.unwrap();
        done.complete();
        store.update_if(TaskStatus::Processing, done).await.unwrap();

        store.insert(task("cand-2", "job-2")).await.unwrap();

        let counts = store.counts().await.unwrap();
        assert_eq!(counts.completed, 1);
        assert_eq!(counts.queued, 1);
        assert_eq!(counts.in_progress(), 1);
    }
}
