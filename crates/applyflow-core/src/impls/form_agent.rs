//! Reference agent: drives a hosted ATS application form.
//!
//! Field mapping is a declarative table per target-system family; the agent
//! fills only what the profile can honestly supply, escalates CAPTCHAs with
//! evidence, and classifies every driver error before returning. It never
//! retries on its own.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use crate::domain::audit::steps;
use crate::domain::{ArtifactRef, CaptchaMode, Outcome, ProfileField};
use crate::ports::{
    AgentContext, AuditTrail, AutomationAgent, BrowserError, BrowserProvider, BrowserSession,
};

/// Page-text markers that flag a CAPTCHA challenge.
const CAPTCHA_MARKERS: &[&str] = &[
    "captcha",
    "recaptcha",
    "hcaptcha",
    "verify you are human",
    "are you a robot",
];

/// One external form field and where its value comes from.
#[derive(Debug, Clone)]
pub struct FieldBinding {
    pub form_field: String,
    pub source: ProfileField,
    pub required: bool,
}

impl FieldBinding {
    pub fn required(form_field: impl Into<String>, source: ProfileField) -> Self {
        Self {
            form_field: form_field.into(),
            source,
            required: true,
        }
    }

    pub fn optional(form_field: impl Into<String>, source: ProfileField) -> Self {
        Self {
            form_field: form_field.into(),
            source,
            required: false,
        }
    }
}

/// Declarative field-name correspondence table for one target-system family.
#[derive(Debug, Clone, Default)]
pub struct FieldMap {
    bindings: Vec<FieldBinding>,
}

impl FieldMap {
    pub fn new(bindings: Vec<FieldBinding>) -> Self {
        Self { bindings }
    }

    /// The field set most hosted application forms share.
    pub fn standard() -> Self {
        Self::new(vec![
            FieldBinding::required("full_name", ProfileField::FullName),
            FieldBinding::required("email", ProfileField::Email),
            FieldBinding::optional("phone", ProfileField::Phone),
            FieldBinding::optional("location", ProfileField::Location),
            FieldBinding::required("resume", ProfileField::ResumeReference),
            FieldBinding::optional("work_history", ProfileField::WorkHistory),
            FieldBinding::optional("education", ProfileField::Education),
        ])
    }

    pub fn bindings(&self) -> &[FieldBinding] {
        &self.bindings
    }
}

/// Applies to jobs hosted on standard ATS application pages.
pub struct HostedFormAgent {
    browser: Arc<dyn BrowserProvider>,
    fields: FieldMap,
}

impl HostedFormAgent {
    pub fn new(browser: Arc<dyn BrowserProvider>, fields: FieldMap) -> Self {
        Self { browser, fields }
    }
}

#[async_trait]
impl AutomationAgent for HostedFormAgent {
    async fn execute(&self, ctx: &AgentContext) -> Outcome {
        // Both arms carry the classified outcome; Err is the early exit.
        match self.run(ctx).await {
            Ok(outcome) => outcome,
            Err(outcome) => outcome,
        }
    }
}

impl HostedFormAgent {
    async fn run(&self, ctx: &AgentContext) -> Result<Outcome, Outcome> {
        let url = &ctx.posting.external_apply_url;

        // First audit step lands before any network interaction.
        record(&ctx.audit, steps::NAVIGATING, json!({"url": url}), vec![]).await?;

        let mut session = self.browser.open().await.map_err(classify)?;
        session.navigate(url).await.map_err(classify)?;
        record(&ctx.audit, steps::NAVIGATED, json!({"url": url}), vec![]).await?;

        if let Some(outcome) = self.captcha_check(ctx, session.as_mut()).await? {
            return Ok(outcome);
        }

        for binding in self.fields.bindings() {
            match ctx.profile.field(binding.source) {
                Some(value) => {
                    session
                        .fill(&binding.form_field, &value)
                        .await
                        .map_err(classify)?;
                    record(
                        &ctx.audit,
                        steps::FIELD_FILLED,
                        json!({"field": binding.form_field.clone(), "value_redacted": true}),
                        vec![],
                    )
                    .await?;
                }
                None if binding.required => {
                    // Submitting placeholder data would be dishonest; this
                    // application cannot complete without the candidate.
                    return Ok(Outcome::non_recoverable(format!(
                        "required field '{}' has no profile source",
                        binding.form_field
                    )));
                }
                None => {
                    record(
                        &ctx.audit,
                        steps::FIELD_SKIPPED,
                        json!({"field": binding.form_field.clone()}),
                        vec![],
                    )
                    .await?;
                }
            }
        }

        // Sites commonly reveal the challenge only at the submit gate.
        if let Some(outcome) = self.captcha_check(ctx, session.as_mut()).await? {
            return Ok(outcome);
        }

        let receipt = session.submit().await.map_err(classify)?;
        record(
            &ctx.audit,
            steps::SUBMITTED,
            json!({"confirmation": receipt.confirmation.clone()}),
            vec![],
        )
        .await?;

        let mut outcome = Outcome::submitted();
        if let Some(confirmation) = receipt.confirmation {
            outcome = outcome.with_confirmation(confirmation);
        }
        Ok(outcome)
    }

    /// Heuristic check, run before submitting. On detection: capture
    /// evidence, log it, and hand the decision to a human. Solving or
    /// bypassing the challenge is out of the question.
    async fn captcha_check(
        &self,
        ctx: &AgentContext,
        session: &mut dyn BrowserSession,
    ) -> Result<Option<Outcome>, Outcome> {
        let text = session.page_text().await.map_err(classify)?;
        let lower = text.to_lowercase();
        let marker = CAPTCHA_MARKERS.iter().find(|m| lower.contains(**m));

        if marker.is_none() && ctx.domain.captcha_mode != CaptchaMode::Always {
            return Ok(None);
        }

        let mut artifacts = Vec::new();
        match session.screenshot().await {
            Ok(uri) => artifacts.push(ArtifactRef::Screenshot(uri)),
            Err(e) => {
                debug!(task_id = %ctx.task.task_id, error = %e, "captcha screenshot capture failed")
            }
        }

        record(
            &ctx.audit,
            steps::CAPTCHA_DETECTED,
            json!({"marker": marker, "captcha_mode": ctx.domain.captcha_mode}),
            artifacts.clone(),
        )
        .await?;

        let mut outcome = Outcome::review_required("captcha challenge presented");
        for artifact in artifacts {
            outcome = outcome.with_artifact(artifact);
        }
        Ok(Some(outcome))
    }
}

/// Audit-before-proceed: a failed append makes the whole attempt retriable.
async fn record(
    audit: &AuditTrail,
    step: &str,
    payload: serde_json::Value,
    artifacts: Vec<ArtifactRef>,
) -> Result<(), Outcome> {
    audit
        .append(step, payload, artifacts)
        .await
        .map_err(|e| Outcome::recoverable(format!("audit write failed: {e}")))
}

/// Map driver errors onto the outcome taxonomy.
fn classify(err: BrowserError) -> Outcome {
    match err {
        BrowserError::Transport(msg) => Outcome::recoverable(format!("transport: {msg}")),
        BrowserError::Gone(msg) => {
            Outcome::non_recoverable(format!("posting no longer available: {msg}"))
        }
        BrowserError::MissingField(field) => {
            Outcome::non_recoverable(format!("form field not present: {field}"))
        }
        BrowserError::AuthRejected(msg) => {
            Outcome::non_recoverable(format!("authentication rejected: {msg}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::domain::{
        ApplicationTask, AutomationType, CandidateId, ContactInfo, Domain, JobId, JobPosting,
        OutcomeKind, ProfileSnapshot, TaskId,
    };
    use crate::impls::InMemoryAuditLog;
    use crate::ports::{AuditLog, SubmissionReceipt};

    #[derive(Default)]
    struct MockState {
        page_text: String,
        fail_navigate: Mutex<Option<BrowserError>>,
        fail_submit: Mutex<Option<BrowserError>>,
        filled: Mutex<Vec<(String, String)>>,
        confirmation: Option<String>,
    }

    struct MockProvider {
        state: Arc<MockState>,
    }

    struct MockSession {
        state: Arc<MockState>,
    }

    #[async_trait]
    impl BrowserProvider for MockProvider {
        async fn open(&self) -> Result<Box<dyn BrowserSession>, BrowserError> {
            Ok(Box::new(MockSession {
                state: Arc::clone(&self.state),
            }))
        }
    }

    #[async_trait]
    impl BrowserSession for MockSession {
        async fn navigate(&mut self, _url: &str) -> Result<(), BrowserError> {
            match self.state.fail_navigate.lock().unwrap().take() {
                Some(err) => Err(err),
                None => Ok(()),
            }
        }

        async fn page_text(&mut self) -> Result<String, BrowserError> {
            Ok(self.state.page_text.clone())
        }

        async fn fill(&mut self, field: &str, value: &str) -> Result<(), BrowserError> {
            self.state
                .filled
                .lock()
                .unwrap()
                .push((field.to_string(), value.to_string()));
            Ok(())
        }

        async fn screenshot(&mut self) -> Result<String, BrowserError> {
            Ok("s3://evidence/mock.png".to_string())
        }

        async fn submit(&mut self) -> Result<SubmissionReceipt, BrowserError> {
            match self.state.fail_submit.lock().unwrap().take() {
                Some(err) => Err(err),
                None => Ok(SubmissionReceipt {
                    confirmation: self.state.confirmation.clone(),
                }),
            }
        }
    }

    fn profile() -> ProfileSnapshot {
        ProfileSnapshot {
            full_name: "Dana Osei".into(),
            contact: ContactInfo {
                email: "dana@example.net".into(),
                phone: None,
                location: Some("Lisbon".into()),
            },
            work_history: vec![],
            education: vec![],
            resume_reference: Some("s3://resumes/dana.pdf".into()),
        }
    }

    struct AgentFixture {
        agent: HostedFormAgent,
        ctx: AgentContext,
        audit: Arc<InMemoryAuditLog>,
        state: Arc<MockState>,
    }

    fn agent_fixture(state: MockState, profile: ProfileSnapshot, domain: Domain) -> AgentFixture {
        let state = Arc::new(state);
        let audit = Arc::new(InMemoryAuditLog::new());
        let task = ApplicationTask::new(
            TaskId::generate(),
            CandidateId::new("cand-1"),
            JobId::new("job-1"),
            domain.host.clone(),
        );
        let trail = AuditTrail::new(
            Arc::clone(&audit) as Arc<dyn crate::ports::AuditLog>,
            task.task_id,
        );
        let ctx = AgentContext {
            task,
            profile,
            posting: JobPosting {
                external_apply_url: format!("https://{}/apply", domain.host),
                target_host: domain.host.clone(),
            },
            domain,
            audit: trail,
        };
        let agent = HostedFormAgent::new(
            Arc::new(MockProvider {
                state: Arc::clone(&state),
            }),
            FieldMap::standard(),
        );
        AgentFixture {
            agent,
            ctx,
            audit,
            state,
        }
    }

    fn clean_domain() -> Domain {
        Domain::new("jobs.site.test", AutomationType::new("hosted_form"))
            .with_captcha_mode(CaptchaMode::None)
    }

    #[tokio::test]
    async fn happy_path_fills_and_submits() {
        let fx = agent_fixture(
            MockState {
                page_text: "Apply for Software Engineer".into(),
                confirmation: Some("APP-2931".into()),
                ..MockState::default()
            },
            profile(),
            clean_domain(),
        );

        let outcome = fx.agent.execute(&fx.ctx).await;
        assert_eq!(outcome.kind, OutcomeKind::Submitted);
        assert_eq!(outcome.confirmation.as_deref(), Some("APP-2931"));

        let filled = fx.state.filled.lock().unwrap().clone();
        let fields: Vec<_> = filled.iter().map(|(f, _)| f.as_str()).collect();
        assert_eq!(fields, vec!["full_name", "email", "location", "resume"]);

        let trail = fx.audit.entries_for(fx.ctx.task.task_id).await.unwrap();
        let labels: Vec<_> = trail.iter().map(|e| e.step.as_str()).collect();
        assert_eq!(labels.first(), Some(&steps::NAVIGATING));
        assert_eq!(labels.last(), Some(&steps::SUBMITTED));
        assert!(labels.contains(&steps::FIELD_SKIPPED)); // phone has no source
    }

    #[tokio::test]
    async fn field_values_never_reach_the_audit_log() {
        let fx = agent_fixture(
            MockState {
                page_text: "Apply here".into(),
                ..MockState::default()
            },
            profile(),
            clean_domain(),
        );

        fx.agent.execute(&fx.ctx).await;

        let trail = fx.audit.entries_for(fx.ctx.task.task_id).await.unwrap();
        for entry in trail.iter().filter(|e| e.step == steps::FIELD_FILLED) {
            assert_eq!(entry.payload["value_redacted"], true);
            let rendered = entry.payload.to_string();
            assert!(!rendered.contains("Dana"));
            assert!(!rendered.contains("dana@example.net"));
        }
    }

    #[tokio::test]
    async fn missing_required_field_fails_honestly() {
        let mut incomplete = profile();
        incomplete.resume_reference = None;
        let fx = agent_fixture(
            MockState {
                page_text: "Apply here".into(),
                ..MockState::default()
            },
            incomplete,
            clean_domain(),
        );

        let outcome = fx.agent.execute(&fx.ctx).await;
        assert_eq!(outcome.kind, OutcomeKind::NonRecoverable);
        assert!(outcome.reason.as_deref().unwrap().contains("resume"));

        // Nothing was submitted with placeholder data.
        let filled = fx.state.filled.lock().unwrap().clone();
        assert!(!filled.iter().any(|(f, _)| f == "resume"));
    }

    #[tokio::test]
    async fn captcha_marker_escalates_with_evidence() {
        let fx = agent_fixture(
            MockState {
                page_text: "This site is protected by reCAPTCHA".into(),
                ..MockState::default()
            },
            profile(),
            clean_domain(),
        );

        let outcome = fx.agent.execute(&fx.ctx).await;
        assert_eq!(outcome.kind, OutcomeKind::ReviewRequired);
        assert_eq!(outcome.artifacts.len(), 1);

        let trail = fx.audit.entries_for(fx.ctx.task.task_id).await.unwrap();
        let detected = trail
            .iter()
            .find(|e| e.step == steps::CAPTCHA_DETECTED)
            .expect("captcha step logged");
        assert_eq!(detected.artifacts.len(), 1);

        // Detection happens before any field is touched.
        assert!(fx.state.filled.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn always_mode_escalates_even_on_a_clean_page() {
        let fx = agent_fixture(
            MockState {
                page_text: "Apply for Software Engineer".into(),
                ..MockState::default()
            },
            profile(),
            clean_domain().with_captcha_mode(CaptchaMode::Always),
        );

        let outcome = fx.agent.execute(&fx.ctx).await;
        assert_eq!(outcome.kind, OutcomeKind::ReviewRequired);
    }

    #[tokio::test]
    async fn transport_failure_is_recoverable() {
        let fx = agent_fixture(
            MockState {
                page_text: "irrelevant".into(),
                fail_navigate: Mutex::new(Some(BrowserError::Transport("connect reset".into()))),
                ..MockState::default()
            },
            profile(),
            clean_domain(),
        );

        let outcome = fx.agent.execute(&fx.ctx).await;
        assert_eq!(outcome.kind, OutcomeKind::Recoverable);
    }

    #[tokio::test]
    async fn gone_posting_is_non_recoverable() {
        let fx = agent_fixture(
            MockState {
                page_text: "irrelevant".into(),
                fail_navigate: Mutex::new(Some(BrowserError::Gone("410".into()))),
                ..MockState::default()
            },
            profile(),
            clean_domain(),
        );

        let outcome = fx.agent.execute(&fx.ctx).await;
        assert_eq!(outcome.kind, OutcomeKind::NonRecoverable);
    }

    #[tokio::test]
    async fn submit_rejection_is_classified() {
        let fx = agent_fixture(
            MockState {
                page_text: "Apply here".into(),
                fail_submit: Mutex::new(Some(BrowserError::AuthRejected("session expired".into()))),
                ..MockState::default()
            },
            profile(),
            clean_domain(),
        );

        let outcome = fx.agent.execute(&fx.ctx).await;
        assert_eq!(outcome.kind, OutcomeKind::NonRecoverable);
        assert!(outcome.reason.as_deref().unwrap().contains("authentication"));
    }
}
