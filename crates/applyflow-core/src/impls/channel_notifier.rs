//! Notifier adapters.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::domain::TaskEvent;
use crate::ports::{Notifier, NotifyError};

/// Forwards terminal events onto an in-process channel: the shape a webhook
/// or push bridge consumes in a real deployment, and what tests listen on.
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<TaskEvent>,
}

impl ChannelNotifier {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TaskEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl Notifier for ChannelNotifier {
    async fn notify(&self, event: TaskEvent) -> Result<(), NotifyError> {
        self.tx
            .send(event)
            .map_err(|e| NotifyError::Delivery(e.to_string()))
    }
}

/// Swallows events. For deployments that poll `get_status` instead.
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn notify(&self, _event: TaskEvent) -> Result<(), NotifyError> {
        Ok(())
    }
}
