//! Demo driver for the applyflow engine.
//!
//! Wires the engine with in-memory adapters and a stub browser driver, seeds
//! a couple of site policies and candidates, applies them to sample jobs, and
//! prints what happened, including the full audit trail per task.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::info;
use tracing_subscriber::EnvFilter;

use applyflow_core::domain::{
    AutomationType, CandidateId, CaptchaMode, ContactInfo, Domain, JobId, JobPosting,
    ProfileSnapshot, WorkEntry,
};
use applyflow_core::impls::{
    ChannelNotifier, FieldMap, HostedFormAgent, InMemoryAuditLog, InMemoryPolicyStore,
    InMemoryTaskStore,
};
use applyflow_core::ports::{
    BrowserError, BrowserProvider, BrowserSession, JobCatalog, LookupError, ProfileDirectory,
    SubmissionReceipt,
};
use applyflow_core::{Engine, EngineConfig, RetryPolicy, TaskId};

/// Stand-in for a real browser driver: every page loads, every submission is
/// accepted. Pages on hosts whose policy says "always captcha" still escalate
/// because the agent checks the policy, not just the page.
struct StubBrowser;

struct StubSession {
    url: String,
}

#[async_trait]
impl BrowserProvider for StubBrowser {
    async fn open(&self) -> Result<Box<dyn BrowserSession>, BrowserError> {
        Ok(Box::new(StubSession { url: String::new() }))
    }
}

#[async_trait]
impl BrowserSession for StubSession {
    async fn navigate(&mut self, url: &str) -> Result<(), BrowserError> {
        self.url = url.to_string();
        Ok(())
    }

    async fn page_text(&mut self) -> Result<String, BrowserError> {
        Ok(format!("Application form at {}", self.url))
    }

    async fn fill(&mut self, _field: &str, _value: &str) -> Result<(), BrowserError> {
        Ok(())
    }

    async fn screenshot(&mut self) -> Result<String, BrowserError> {
        Ok(format!("file:///tmp/applyflow-demo/{}.png", self.url.len()))
    }

    async fn submit(&mut self) -> Result<SubmissionReceipt, BrowserError> {
        Ok(SubmissionReceipt {
            confirmation: Some(format!("CONF-{}", self.url.len())),
        })
    }
}

struct DemoProfiles {
    profiles: HashMap<String, ProfileSnapshot>,
}

#[async_trait]
impl ProfileDirectory for DemoProfiles {
    async fn profile_snapshot(
        &self,
        candidate_id: &CandidateId,
    ) -> Result<ProfileSnapshot, LookupError> {
        self.profiles
            .get(candidate_id.as_str())
            .cloned()
            .ok_or_else(|| LookupError::CandidateNotFound(candidate_id.clone()))
    }
}

struct DemoJobs {
    postings: HashMap<String, JobPosting>,
}

#[async_trait]
impl JobCatalog for DemoJobs {
    async fn job(&self, job_id: &JobId) -> Result<JobPosting, LookupError> {
        self.postings
            .get(job_id.as_str())
            .cloned()
            .ok_or_else(|| LookupError::JobNotFound(job_id.clone()))
    }
}

fn demo_profiles() -> DemoProfiles {
    let mut profiles = HashMap::new();
    profiles.insert(
        "cand-dana".to_string(),
        ProfileSnapshot {
            full_name: "Dana Osei".into(),
            contact: ContactInfo {
                email: "dana@example.net".into(),
                phone: Some("+351 900 000 000".into()),
                location: Some("Lisbon".into()),
            },
            work_history: vec![WorkEntry {
                employer: "Acme".into(),
                title: "Engineer".into(),
                start: "2021-03".into(),
                end: None,
            }],
            education: vec![],
            resume_reference: Some("s3://resumes/dana.pdf".into()),
        },
    );
    profiles.insert(
        "cand-iris".to_string(),
        ProfileSnapshot {
            full_name: "Iris Tanaka".into(),
            contact: ContactInfo {
                email: "iris@example.net".into(),
                phone: None,
                location: Some("Osaka".into()),
            },
            work_history: vec![],
            education: vec![],
            resume_reference: Some("s3://resumes/iris.pdf".into()),
        },
    );
    DemoProfiles { profiles }
}

fn demo_jobs() -> DemoJobs {
    let mut postings = HashMap::new();
    postings.insert(
        "job-backend".to_string(),
        JobPosting {
            external_apply_url: "https://jobs.friendly.example/backend/apply".into(),
            target_host: "jobs.friendly.example".into(),
        },
    );
    postings.insert(
        "job-data".to_string(),
        JobPosting {
            external_apply_url: "https://jobs.friendly.example/data/apply".into(),
            target_host: "jobs.friendly.example".into(),
        },
    );
    postings.insert(
        "job-platform".to_string(),
        JobPosting {
            external_apply_url: "https://careers.guarded.example/platform/apply".into(),
            target_host: "careers.guarded.example".into(),
        },
    );
    DemoJobs { postings }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let policies = Arc::new(InMemoryPolicyStore::new());
    policies
        .seed(Domain::new(
            "jobs.friendly.example",
            AutomationType::new("hosted_form"),
        ))
        .await;
    policies
        .seed(
            Domain::new("careers.guarded.example", AutomationType::new("hosted_form"))
                .with_captcha_mode(CaptchaMode::Always),
        )
        .await;

    let audit = Arc::new(InMemoryAuditLog::new());
    let (notifier, mut events) = ChannelNotifier::new();

    let config = EngineConfig {
        max_workers: 4,
        max_attempts: 3,
        retry: RetryPolicy {
            base_delay: Duration::from_millis(200),
            ..RetryPolicy::default()
        },
        task_timeout: Duration::from_secs(10),
        poll_interval: Duration::from_millis(50),
        dispatch_batch: 16,
    };

    let engine = Engine::builder()
        .config(config)
        .task_store(Arc::new(InMemoryTaskStore::new()))
        .audit_log(audit.clone() as Arc<dyn applyflow_core::ports::AuditLog>)
        .policy_store(policies.clone() as Arc<dyn applyflow_core::ports::DomainPolicyStore>)
        .notifier(Arc::new(notifier))
        .profile_directory(Arc::new(demo_profiles()))
        .job_catalog(Arc::new(demo_jobs()))
        .register_agent(
            AutomationType::new("hosted_form"),
            Arc::new(HostedFormAgent::new(
                Arc::new(StubBrowser),
                FieldMap::standard(),
            )),
        )
        .expect("agent registration")
        .build()
        .expect("engine wiring");

    let handle = engine.start();

    let mut task_ids: Vec<TaskId> = Vec::new();
    for (candidate, job) in [
        ("cand-dana", "job-backend"),
        ("cand-iris", "job-data"),
        ("cand-dana", "job-platform"), // CAPTCHA-gated host: ends in needs_review
    ] {
        let task_id = engine
            .enqueue(CandidateId::new(candidate), JobId::new(job))
            .await
            .expect("enqueue");
        info!(%task_id, candidate, job, "enqueued");
        task_ids.push(task_id);
    }

    // Wait for the queue to settle.
    loop {
        let counts = engine.counts().await.expect("counts");
        if counts.in_progress() == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    for task_id in &task_ids {
        let status = engine.get_status(*task_id).await.expect("status");
        println!(
            "{task_id}: {}",
            serde_json::to_string_pretty(&status).expect("status json")
        );
        let trail = engine.get_audit_log(*task_id).await.expect("audit log");
        for entry in trail {
            println!("  [{}] {} {}", entry.recorded_at, entry.step, entry.payload);
        }
    }

    while let Ok(event) = events.try_recv() {
        println!(
            "event: {}",
            serde_json::to_string(&event).expect("event json")
        );
    }

    handle.shutdown_and_join().await;
}
