//! Outcome model: the single result an agent reports per execution.
//!
//! Agents never raise raw transport errors past their boundary; every failure
//! is classified into one of the kinds below before the outcome is returned.
//! Retries are the dispatcher's business, so an outcome carries no retry
//! scheduling of its own.

use serde::{Deserialize, Serialize};

/// Classification of one execution attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    /// The application was submitted successfully. Terminal.
    Submitted,

    /// Transient failure (network, timeout, flaky site). Retry-eligible.
    Recoverable,

    /// The attempt can never succeed as-is (missing required data, posting
    /// gone, credentials rejected). Fails immediately.
    NonRecoverable,

    /// A human decision is required (typically a CAPTCHA). Never auto-retried.
    ReviewRequired,
}

/// Reference to externally stored binary evidence. The engine only ever
/// holds URIs; bytes live in the object store behind the browser driver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "uri", rename_all = "snake_case")]
pub enum ArtifactRef {
    Screenshot(String),
    PageSnapshot(String),
}

impl ArtifactRef {
    pub fn uri(&self) -> &str {
        match self {
            ArtifactRef::Screenshot(uri) | ArtifactRef::PageSnapshot(uri) => uri,
        }
    }
}

/// Result of one agent execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    pub kind: OutcomeKind,

    /// Short, non-sensitive description. Always present on failures.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub artifacts: Vec<ArtifactRef>,

    /// Submission confirmation reference, when the target site issued one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmation: Option<String>,
}

impl Outcome {
    pub fn submitted() -> Self {
        Self {
            kind: OutcomeKind::Submitted,
            reason: None,
            artifacts: Vec::new(),
            confirmation: None,
        }
    }

    pub fn recoverable(reason: impl Into<String>) -> Self {
        Self {
            kind: OutcomeKind::Recoverable,
            reason: Some(reason.into()),
            artifacts: Vec::new(),
            confirmation: None,
        }
    }

    pub fn non_recoverable(reason: impl Into<String>) -> Self {
        Self {
            kind: OutcomeKind::NonRecoverable,
            reason: Some(reason.into()),
            artifacts: Vec::new(),
            confirmation: None,
        }
    }

    pub fn review_required(reason: impl Into<String>) -> Self {
        Self {
            kind: OutcomeKind::ReviewRequired,
            reason: Some(reason.into()),
            artifacts: Vec::new(),
            confirmation: None,
        }
    }

    pub fn with_artifact(mut self, artifact: ArtifactRef) -> Self {
        self.artifacts.push(artifact);
        self
    }

    pub fn with_confirmation(mut self, confirmation: impl Into<String>) -> Self {
        self.confirmation = Some(confirmation.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_serialize_snake_case() {
        let s = serde_json::to_string(&OutcomeKind::ReviewRequired).unwrap();
        assert_eq!(s, "\"review_required\"");
    }

    #[test]
    fn builders_set_kind_and_reason() {
        let o = Outcome::review_required("captcha challenge presented")
            .with_artifact(ArtifactRef::Screenshot("s3://evidence/1.png".into()));
        assert_eq!(o.kind, OutcomeKind::ReviewRequired);
        assert_eq!(o.reason.as_deref(), Some("captcha challenge presented"));
        assert_eq!(o.artifacts.len(), 1);
        assert_eq!(o.artifacts[0].uri(), "s3://evidence/1.png");
    }

    #[test]
    fn outcome_roundtrip_json() {
        let o = Outcome::submitted().with_confirmation("APP-2931");
        let s = serde_json::to_string(&o).unwrap();
        let back: Outcome = serde_json::from_str(&s).unwrap();
        assert_eq!(back.kind, OutcomeKind::Submitted);
        assert_eq!(back.confirmation.as_deref(), Some("APP-2931"));
    }
}
