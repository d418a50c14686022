//! Lifecycle notifications for proxied requests

use crate::protocol::TokenUsage;
use crate::providers::FailureClass;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// One request lifecycle event.
///
/// Every request that starts produces exactly one `RequestCompleted` or one
/// `RequestFailed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProxyEvent {
    RequestStarted {
        request_id: Uuid,
        model: String,
        provider: String,
        stream: bool,
    },
    RequestCompleted {
        request_id: Uuid,
        provider: String,
        usage: Option<TokenUsage>,
        attempts: u32,
    },
    RequestFailed {
        request_id: Uuid,
        /// Absent when the request never reached a provider
        provider: Option<String>,
        classification: FailureClass,
        message: String,
        partial_usage: Option<TokenUsage>,
        recommendations: Vec<String>,
    },
}

impl ProxyEvent {
    pub fn request_id(&self) -> Uuid {
        match self {
            ProxyEvent::RequestStarted { request_id, .. }
            | ProxyEvent::RequestCompleted { request_id, .. }
            | ProxyEvent::RequestFailed { request_id, .. } => *request_id,
        }
    }

    /// Whether this event ends the request
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ProxyEvent::RequestStarted { .. })
    }
}

/// Receives lifecycle events. Delivery problems stay inside the sink.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, event: &ProxyEvent);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl NotificationSink for NullSink {
    fn notify(&self, _event: &ProxyEvent) {}
}

/// Fans events out over a `tokio::sync::broadcast` channel
#[derive(Debug, Clone)]
pub struct BroadcastSink {
    tx: broadcast::Sender<ProxyEvent>,
}

impl BroadcastSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProxyEvent> {
        self.tx.subscribe()
    }
}

impl Default for BroadcastSink {
    fn default() -> Self {
        Self::new(256)
    }
}

impl NotificationSink for BroadcastSink {
    fn notify(&self, event: &ProxyEvent) {
        // no subscribers is not an error
        let _ = self.tx.send(event.clone());
    }
}
