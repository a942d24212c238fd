//! Browser-driver port: the agent-facing seam to the actual automation
//! driver. Binary evidence (screenshots, snapshots) is stored by the driver
//! in an external object store; only URIs come back through this interface.

use async_trait::async_trait;
use thiserror::Error;

/// Driver-side failures, pre-sorted so agents can classify them without
/// string matching.
#[derive(Debug, Error)]
pub enum BrowserError {
    /// Network-level trouble: connect/read failures, 5xx, driver hiccups.
    #[error("transport: {0}")]
    Transport(String),

    /// The page is gone for good (404/410, posting closed).
    #[error("page no longer available: {0}")]
    Gone(String),

    /// A form field the mapping expects is not present on the page.
    #[error("form field not present: {0}")]
    MissingField(String),

    /// The target site rejected the stored credentials.
    #[error("authentication rejected: {0}")]
    AuthRejected(String),
}

/// What the target site handed back after a submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionReceipt {
    pub confirmation: Option<String>,
}

/// One live page interaction. Sessions are single-use: open, drive, drop.
#[async_trait]
pub trait BrowserSession: Send {
    async fn navigate(&mut self, url: &str) -> Result<(), BrowserError>;

    /// Visible text of the current page (CAPTCHA heuristics run on this).
    async fn page_text(&mut self) -> Result<String, BrowserError>;

    async fn fill(&mut self, field: &str, value: &str) -> Result<(), BrowserError>;

    /// Capture a screenshot into the external object store; returns its URI.
    async fn screenshot(&mut self) -> Result<String, BrowserError>;

    async fn submit(&mut self) -> Result<SubmissionReceipt, BrowserError>;
}

/// Hands out fresh sessions, one per execution attempt.
#[async_trait]
pub trait BrowserProvider: Send + Sync {
    async fn open(&self) -> Result<Box<dyn BrowserSession>, BrowserError>;
}
