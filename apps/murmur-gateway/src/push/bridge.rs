//! Escalation to push for recipients that resolved offline.
//!
//! Each escalation runs in its own task: one attempt per stored endpoint,
//! bounded by a timeout, no retries. Endpoints reported gone are pruned.
//! Nothing here ever reports back to the routing path.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::db::subscriptions::SubscriptionStore;

use super::{Escalator, PushError, PushPayload, PushService};

/// Time-to-live handed to the push service.
pub const PUSH_TTL: Duration = Duration::from_secs(60 * 60);

/// Per-escalation outcome, used for logging and tests.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DeliveryReport {
    pub sent: usize,
    pub pruned: usize,
    pub failed: usize,
}

#[derive(Clone)]
pub struct PushBridge {
    store: Arc<dyn SubscriptionStore>,
    service: Arc<dyn PushService>,
    timeout: Duration,
}

impl PushBridge {
    pub fn new(
        store: Arc<dyn SubscriptionStore>,
        service: Arc<dyn PushService>,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            service,
            timeout,
        }
    }

    /// Deliver one payload to every endpoint of `user_id`.
    pub async fn deliver(&self, user_id: &str, payload: &PushPayload) -> DeliveryReport {
        let mut report = DeliveryReport::default();

        let subscriptions = match self.store.list(user_id).await {
            Ok(subs) => subs,
            Err(err) => {
                tracing::warn!(%user_id, %err, "failed to load push subscriptions");
                return report;
            }
        };

        for sub in &subscriptions {
            let attempt = tokio::time::timeout(
                self.timeout,
                self.service.send(sub, payload, PUSH_TTL),
            )
            .await
            .unwrap_or(Err(PushError::Timeout));

            match attempt {
                Ok(()) => report.sent += 1,
                Err(PushError::Gone(status)) => {
                    tracing::info!(%user_id, endpoint = %sub.endpoint, status, "pruning expired push endpoint");
                    match self.store.remove(user_id, &sub.endpoint).await {
                        Ok(_) => report.pruned += 1,
                        Err(err) => {
                            tracing::warn!(%user_id, %err, "failed to prune push endpoint");
                            report.failed += 1;
                        }
                    }
                }
                Err(err) => {
                    tracing::warn!(%user_id, endpoint = %sub.endpoint, %err, "push send failed");
                    report.failed += 1;
                }
            }
        }

        report
    }
}

impl Escalator for PushBridge {
    fn escalate(&self, user_id: &str, payload: &Value) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(%user_id, "no runtime available, escalation dropped");
            return;
        };

        let bridge = self.clone();
        let user_id = user_id.to_string();
        let payload = PushPayload::from_event(payload);

        handle.spawn(async move {
            let report = bridge.deliver(&user_id, &payload).await;
            tracing::debug!(
                %user_id,
                sent = report.sent,
                pruned = report.pruned,
                failed = report.failed,
                "push escalation finished"
            );
        });
    }
}
