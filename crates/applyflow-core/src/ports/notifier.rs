//! Notifier port: terminal-transition event hook.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::TaskEvent;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("delivery: {0}")]
    Delivery(String),
}

/// Receives exactly one event per terminal transition. Delivery mechanics
/// (push, email, webhook) are the collaborator's concern; a failure here is
/// logged by the dispatcher but never changes task state.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, event: TaskEvent) -> Result<(), NotifyError>;
}
