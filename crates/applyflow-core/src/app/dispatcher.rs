//! Dispatch loop: the single place where task state transitions happen.
//!
//! The loop selects over three signals (shutdown, worker completions, and a
//! poll tick) so a task's transitions are serialized through one coordinator
//! while the actual agent executions run on spawned workers. Every transition
//! goes through the store's compare-and-set, so a lost race is dropped on the
//! floor instead of double-applied.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::json;
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::engine::EngineInner;
use crate::domain::audit::steps;
use crate::domain::{
    ApplicationTask, AuditEntry, Domain, HealthStatus, Outcome, OutcomeKind, TaskId, TaskStatus,
};
use crate::ports::{AgentContext, AuditTrail, PolicyError};

/// What a worker reports back to the loop. One per execution attempt.
struct Completion {
    task_id: TaskId,
    host: String,
    result: ExecResult,
}

enum ExecResult {
    /// The agent returned a classified outcome.
    Finished(Outcome),
    /// The wall-clock budget ran out; the agent was aborted.
    TimedOut,
    /// A cancel signal interrupted the execution.
    Cancelled,
}

enum FinalizeResult {
    Applied,
    /// The outcome audit entry could not be made durable; the attempt must
    /// stay retriable.
    AuditFailed,
    /// The compare-and-set lost: something else transitioned the task.
    Lost,
}

pub(crate) async fn run(inner: Arc<EngineInner>, mut shutdown_rx: watch::Receiver<bool>) {
    let (completion_tx, mut completion_rx) =
        mpsc::channel::<Completion>(inner.config.max_workers.max(1));
    let mut in_flight: usize = 0;
    let mut worker_seq: u64 = 0;

    let mut poll = tokio::time::interval(inner.config.poll_interval);
    poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(max_workers = inner.config.max_workers, "dispatcher started");

    loop {
        tokio::select! {
            biased;

            res = shutdown_rx.changed() => {
                // A dropped handle counts as a shutdown request.
                if res.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }
            Some(done) = completion_rx.recv() => {
                in_flight = in_flight.saturating_sub(1);
                apply_completion(&inner, done).await;
            }
            _ = poll.tick() => {
                in_flight += dispatch_eligible(&inner, &completion_tx, in_flight, &mut worker_seq).await;
            }
        }
    }

    // Drain: no new claims, but in-flight executions still complete and
    // their outcomes are applied.
    let grace = inner.config.task_timeout + Duration::from_secs(5);
    while in_flight > 0 {
        match tokio::time::timeout(grace, completion_rx.recv()).await {
            Ok(Some(done)) => {
                in_flight -= 1;
                apply_completion(&inner, done).await;
            }
            _ => break,
        }
    }
    info!("dispatcher stopped");
}

/// One scan over eligible queued tasks. Returns how many executions started.
async fn dispatch_eligible(
    inner: &Arc<EngineInner>,
    completion_tx: &mpsc::Sender<Completion>,
    in_flight: usize,
    worker_seq: &mut u64,
) -> usize {
    let slots = inner.config.max_workers.saturating_sub(in_flight);
    if slots == 0 {
        return 0;
    }

    let eligible = match inner
        .store
        .list_eligible(Utc::now(), inner.config.dispatch_batch)
        .await
    {
        Ok(tasks) => tasks,
        Err(e) => {
            warn!(error = %e, "eligibility scan failed");
            return 0;
        }
    };

    let mut dispatched = 0;
    for task in eligible {
        if dispatched >= slots {
            break;
        }

        let domain = match inner.policies.lookup(&task.host).await {
            Ok(domain) => domain,
            Err(PolicyError::UnknownHost(_)) => {
                fail_unconfigured(inner, task, worker_seq).await;
                continue;
            }
            Err(e) => {
                warn!(host = %task.host, error = %e, "policy lookup failed; task stays queued");
                continue;
            }
        };

        if !inner
            .limiter
            .try_acquire(&task.host, &domain.rate_limit_policy, domain.last_status)
            .await
        {
            debug!(task_id = %task.task_id, host = %task.host, "no domain permit; task stays queued");
            continue;
        }

        if start_execution(inner, task, domain, completion_tx, worker_seq).await {
            dispatched += 1;
        }
    }
    dispatched
}

/// Claim one task and hand it to a worker. The cancel signal is registered
/// before the claim so an external cancel can never slip between the two.
async fn start_execution(
    inner: &Arc<EngineInner>,
    task: ApplicationTask,
    domain: Domain,
    completion_tx: &mpsc::Sender<Completion>,
    worker_seq: &mut u64,
) -> bool {
    *worker_seq += 1;
    let worker = format!("worker-{worker_seq}");

    let mut claimed = task;
    claimed.begin_attempt(worker.as_str());

    let (cancel_tx, mut cancel_rx) = watch::channel(false);
    inner
        .cancels
        .lock()
        .await
        .insert(claimed.task_id, cancel_tx);

    if let Err(e) = inner
        .store
        .update_if(TaskStatus::Queued, claimed.clone())
        .await
    {
        debug!(task_id = %claimed.task_id, error = %e, "claim lost; skipping");
        inner.cancels.lock().await.remove(&claimed.task_id);
        inner.limiter.release(&claimed.host).await;
        return false;
    }

    let entry = AuditEntry::new(
        claimed.task_id,
        steps::ATTEMPT_STARTED,
        json!({"attempt": claimed.attempt_count, "worker": worker, "host": claimed.host.clone()}),
        vec![],
    );
    if let Err(e) = inner.audit.append(entry).await {
        warn!(task_id = %claimed.task_id, error = %e, "attempt audit write failed");
    }

    let inner = Arc::clone(inner);
    let completion_tx = completion_tx.clone();
    tokio::spawn(async move {
        let result = execute_attempt(&inner, &claimed, &domain, &mut cancel_rx).await;
        let _ = completion_tx
            .send(Completion {
                task_id: claimed.task_id,
                host: claimed.host.clone(),
                result,
            })
            .await;
    });
    true
}

/// Run the agent for one attempt, bounded by the task timeout and the
/// cancel signal. Never returns an unclassified error: collaborator lookup
/// failures and agent panics are folded into the outcome taxonomy here.
async fn execute_attempt(
    inner: &Arc<EngineInner>,
    task: &ApplicationTask,
    domain: &Domain,
    cancel_rx: &mut watch::Receiver<bool>,
) -> ExecResult {
    let Some(agent) = inner.agents.get(&domain.automation_type) else {
        return ExecResult::Finished(Outcome::non_recoverable(format!(
            "no agent registered for automation type {}",
            domain.automation_type
        )));
    };
    let agent = Arc::clone(agent);

    let profile = match inner.profiles.profile_snapshot(&task.candidate_id).await {
        Ok(profile) => profile,
        Err(e) if e.is_transient() => {
            return ExecResult::Finished(Outcome::recoverable(e.to_string()));
        }
        Err(e) => return ExecResult::Finished(Outcome::non_recoverable(e.to_string())),
    };
    let posting = match inner.jobs.job(&task.job_id).await {
        Ok(posting) => posting,
        Err(e) if e.is_transient() => {
            return ExecResult::Finished(Outcome::recoverable(e.to_string()));
        }
        Err(e) => return ExecResult::Finished(Outcome::non_recoverable(e.to_string())),
    };

    let ctx = AgentContext {
        task: task.clone(),
        profile,
        posting,
        domain: domain.clone(),
        audit: AuditTrail::new(Arc::clone(&inner.audit), task.task_id),
    };

    // Own spawn so a panic is contained and cancel/timeout can abort it.
    let mut join = tokio::spawn(async move { agent.execute(&ctx).await });

    tokio::select! {
        _ = cancel_rx.changed() => {
            join.abort();
            ExecResult::Cancelled
        }
        res = tokio::time::timeout(inner.config.task_timeout, &mut join) => match res {
            Ok(Ok(outcome)) => ExecResult::Finished(outcome),
            Ok(Err(join_err)) => {
                // Unclassified agent death. Fail-safe toward retry, but make
                // it stand out for operators.
                warn!(
                    task_id = %task.task_id,
                    error = %join_err,
                    "agent execution died unclassified; treating as recoverable"
                );
                ExecResult::Finished(Outcome::recoverable("agent execution aborted unexpectedly"))
            }
            Err(_) => {
                join.abort();
                ExecResult::TimedOut
            }
        }
    }
}

/// Apply one worker completion: release the permit, fold in any cancel
/// request, write back domain health, and transition the task.
async fn apply_completion(inner: &Arc<EngineInner>, done: Completion) {
    let Completion {
        task_id,
        host,
        result,
    } = done;

    inner.limiter.release(&host).await;

    let cancel_requested = {
        let mut cancels = inner.cancels.lock().await;
        cancels
            .remove(&task_id)
            .map(|tx| *tx.borrow())
            .unwrap_or(false)
    };

    let task = match inner.store.get(task_id).await {
        Ok(Some(task)) => task,
        Ok(None) => {
            warn!(task_id = %task_id, "completion for unknown task");
            return;
        }
        Err(e) => {
            warn!(task_id = %task_id, error = %e, "task read failed while applying completion");
            return;
        }
    };
    if task.status != TaskStatus::Processing {
        warn!(task_id = %task_id, status = ?task.status, "completion for a task no longer processing; dropped");
        return;
    }

    // A cancel that raced the outcome wins: the outcome is discarded.
    let result = if cancel_requested {
        ExecResult::Cancelled
    } else {
        result
    };

    match result {
        ExecResult::Cancelled => {
            let mut cancelled = task;
            cancelled.mark_cancelled();
            let entry = AuditEntry::new(
                task_id,
                steps::CANCELLED,
                json!({"was": TaskStatus::Processing}),
                vec![],
            );
            if let Err(e) = inner.audit.append(entry).await {
                warn!(task_id = %task_id, error = %e, "cancel audit write failed");
            }
            match inner
                .store
                .update_if(TaskStatus::Processing, cancelled.clone())
                .await
            {
                Ok(()) => inner.emit_event(&cancelled).await,
                Err(e) => warn!(task_id = %task_id, error = %e, "cancel transition lost"),
            }
        }
        ExecResult::TimedOut => {
            record_health(inner, &host, HealthStatus::Degraded).await;
            retry_or_fail(inner, task, "attempt timed out".to_string()).await;
        }
        ExecResult::Finished(outcome) => {
            let reason = outcome
                .reason
                .clone()
                .unwrap_or_else(|| "unspecified".to_string());
            match outcome.kind {
                OutcomeKind::Submitted => {
                    record_health(inner, &host, HealthStatus::Healthy).await;
                    let mut completed = task.clone();
                    completed.complete();
                    let payload = json!({"confirmation": outcome.confirmation});
                    match finalize(inner, &completed, steps::COMPLETED, payload, outcome.artifacts)
                        .await
                    {
                        FinalizeResult::Applied => inner.emit_event(&completed).await,
                        FinalizeResult::AuditFailed => {
                            schedule_retry(inner, task, "audit write failed".to_string()).await;
                        }
                        FinalizeResult::Lost => {}
                    }
                }
                OutcomeKind::Recoverable => {
                    record_health(inner, &host, HealthStatus::Degraded).await;
                    retry_or_fail(inner, task, reason).await;
                }
                OutcomeKind::NonRecoverable => {
                    let mut failed = task.clone();
                    failed.mark_failed(&reason);
                    let payload = json!({"reason": reason, "attempt": failed.attempt_count});
                    match finalize(inner, &failed, steps::FAILED, payload, outcome.artifacts).await {
                        FinalizeResult::Applied => inner.emit_event(&failed).await,
                        FinalizeResult::AuditFailed => {
                            schedule_retry(inner, task, "audit write failed".to_string()).await;
                        }
                        FinalizeResult::Lost => {}
                    }
                }
                OutcomeKind::ReviewRequired => {
                    record_health(inner, &host, HealthStatus::Degraded).await;
                    let mut review = task.clone();
                    review.mark_needs_review(&reason);
                    let payload = json!({"reason": reason});
                    match finalize(inner, &review, steps::NEEDS_REVIEW, payload, outcome.artifacts)
                        .await
                    {
                        FinalizeResult::Applied => inner.emit_event(&review).await,
                        FinalizeResult::AuditFailed => {
                            schedule_retry(inner, task, "audit write failed".to_string()).await;
                        }
                        FinalizeResult::Lost => {}
                    }
                }
            }
        }
    }
}

/// Recoverable failure: schedule the next attempt, or fail the task when the
/// attempt budget is spent.
async fn retry_or_fail(inner: &Arc<EngineInner>, task: ApplicationTask, reason: String) {
    if task.attempt_count >= inner.config.max_attempts {
        let final_reason = format!(
            "{reason} (attempts exhausted: {}/{})",
            task.attempt_count, inner.config.max_attempts
        );
        let mut failed = task.clone();
        failed.mark_failed(&final_reason);
        let payload = json!({"reason": final_reason, "attempt": failed.attempt_count});
        match finalize(inner, &failed, steps::FAILED, payload, vec![]).await {
            FinalizeResult::Applied => inner.emit_event(&failed).await,
            FinalizeResult::AuditFailed => {
                // Trail not durable; keep the attempt retriable so the
                // outcome is re-derived once the audit store recovers.
                schedule_retry(inner, task, reason).await;
            }
            FinalizeResult::Lost => {}
        }
    } else {
        schedule_retry(inner, task, reason).await;
    }
}

async fn schedule_retry(inner: &Arc<EngineInner>, mut task: ApplicationTask, reason: String) {
    let delay = inner.config.retry.next_delay(task.attempt_count);
    let next_at = Utc::now() + chrono::Duration::milliseconds(delay.as_millis() as i64);

    let entry = AuditEntry::new(
        task.task_id,
        steps::RETRY_SCHEDULED,
        json!({
            "reason": reason.clone(),
            "attempt": task.attempt_count,
            "next_attempt_at": next_at.to_rfc3339(),
        }),
        vec![],
    );
    if let Err(e) = inner.audit.append(entry).await {
        warn!(task_id = %task.task_id, error = %e, "retry audit write failed; scheduling anyway");
    }

    task.schedule_retry(next_at, reason);
    if let Err(e) = inner.store.update_if(TaskStatus::Processing, task).await {
        warn!(error = %e, "retry transition lost");
    }
}

/// Write the outcome audit entry, then CAS processing -> the task's new
/// status. The entry goes first: an outcome is not final until its trail is
/// durable.
async fn finalize(
    inner: &Arc<EngineInner>,
    task: &ApplicationTask,
    step: &str,
    payload: serde_json::Value,
    artifacts: Vec<crate::domain::ArtifactRef>,
) -> FinalizeResult {
    let entry = AuditEntry::new(task.task_id, step, payload, artifacts);
    if let Err(e) = inner.audit.append(entry).await {
        warn!(task_id = %task.task_id, error = %e, "outcome audit write failed");
        return FinalizeResult::AuditFailed;
    }
    match inner
        .store
        .update_if(TaskStatus::Processing, task.clone())
        .await
    {
        Ok(()) => FinalizeResult::Applied,
        Err(e) => {
            warn!(task_id = %task.task_id, error = %e, "outcome transition lost");
            FinalizeResult::Lost
        }
    }
}

/// No policy for the host: the task can never dispatch. Walk it through
/// processing so the attempt is accounted for, then fail it.
async fn fail_unconfigured(inner: &Arc<EngineInner>, task: ApplicationTask, worker_seq: &mut u64) {
    *worker_seq += 1;
    let mut claimed = task;
    claimed.begin_attempt(format!("worker-{worker_seq}"));
    if inner
        .store
        .update_if(TaskStatus::Queued, claimed.clone())
        .await
        .is_err()
    {
        return;
    }

    let reason = format!("no automation policy for host {}", claimed.host);
    let mut failed = claimed.clone();
    failed.mark_failed(&reason);
    let payload = json!({"reason": reason.clone(), "attempt": failed.attempt_count});
    match finalize(inner, &failed, steps::FAILED, payload, vec![]).await {
        FinalizeResult::Applied => inner.emit_event(&failed).await,
        FinalizeResult::AuditFailed => schedule_retry(inner, claimed, reason).await,
        FinalizeResult::Lost => {}
    }
}

async fn record_health(inner: &Arc<EngineInner>, host: &str, status: HealthStatus) {
    if let Err(e) = inner.policies.record_outcome(host, status).await {
        debug!(host, error = %e, "health write-back failed");
    }
}
