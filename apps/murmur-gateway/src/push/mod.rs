//! Out-of-band delivery for recipients without a live session.

pub mod bridge;
pub mod relay;

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::db::subscriptions::PushSubscription;

/// Router-facing escalation boundary.
///
/// Implementations must return immediately; any I/O happens off the
/// routing path.
pub trait Escalator: Send + Sync {
    fn escalate(&self, user_id: &str, payload: &Value);
}

/// Escalator used when no push transport is configured.
pub struct DisabledEscalator;

impl Escalator for DisabledEscalator {
    fn escalate(&self, user_id: &str, _payload: &Value) {
        tracing::debug!(%user_id, "push disabled, escalation dropped");
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PushError {
    /// The endpoint expired or was revoked (HTTP 404/410).
    #[error("push endpoint gone (status {0})")]
    Gone(u16),
    #[error("push relay rejected delivery (status {0})")]
    Rejected(u16),
    #[error("push request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("push delivery timed out")]
    Timeout,
}

/// Sends one payload to one subscription endpoint.
#[async_trait]
pub trait PushService: Send + Sync {
    async fn send(
        &self,
        subscription: &PushSubscription,
        payload: &PushPayload,
        ttl: Duration,
    ) -> Result<(), PushError>;
}

/// Notification envelope shown by the client's service worker.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PushPayload {
    pub title: String,
    pub body: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    pub data: PushData,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PushData {
    pub url: String,
}

impl PushPayload {
    /// Build the envelope from a message-shaped event payload.
    pub fn from_event(event: &Value) -> Self {
        let sender = &event["sender"];
        Self {
            title: sender["name"]
                .as_str()
                .unwrap_or("Notification")
                .to_string(),
            body: event["content"].as_str().unwrap_or_default().to_string(),
            image: sender["avatar"]["url"].as_str().map(str::to_string),
            data: PushData {
                url: "/chat".to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_uses_sender_and_content() {
        let payload = PushPayload::from_event(&serde_json::json!({
            "content": "hello",
            "sender": { "_id": "m", "name": "Mina", "avatar": { "url": "https://img/m.png" } }
        }));
        assert_eq!(payload.title, "Mina");
        assert_eq!(payload.body, "hello");
        assert_eq!(payload.image.as_deref(), Some("https://img/m.png"));
        assert_eq!(payload.data.url, "/chat");
    }

    #[test]
    fn payload_falls_back_for_sparse_events() {
        let payload = PushPayload::from_event(&serde_json::json!({ "kind": "ping" }));
        assert_eq!(payload.title, "Notification");
        assert_eq!(payload.body, "");
        assert!(payload.image.is_none());

        let json = serde_json::to_value(&payload).unwrap();
        assert!(json.get("image").is_none());
    }
}
