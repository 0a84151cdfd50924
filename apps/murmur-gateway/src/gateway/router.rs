//! Event routing: live delivery through the registry, escalation otherwise.

use std::collections::HashSet;
use std::sync::Arc;

use crate::db::chats::{ChatDirectory, ChatMembership};
use crate::push::Escalator;

use super::events::ChatRef;
use super::fanout::PendingEvent;
use super::registry::ConnectionRegistry;

/// Per-event outcome counts.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RouteReport {
    /// Recipients with at least one live session that accepted the event.
    pub delivered: usize,
    /// Offline recipients handed to the escalation bridge.
    pub escalated: usize,
    /// Offline recipients of a live-only event.
    pub dropped: usize,
}

pub struct EventRouter {
    registry: Arc<ConnectionRegistry>,
    chats: Arc<dyn ChatDirectory>,
    escalator: Arc<dyn Escalator>,
}

impl EventRouter {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        chats: Arc<dyn ChatDirectory>,
        escalator: Arc<dyn Escalator>,
    ) -> Self {
        Self {
            registry,
            chats,
            escalator,
        }
    }

    /// Deliver `event` to each recipient. Never blocks on I/O.
    pub fn route(&self, event: PendingEvent) -> RouteReport {
        let PendingEvent {
            kind,
            actor,
            recipients,
            message,
            escalate,
        } = event;

        let mut report = RouteReport::default();
        let mut seen = HashSet::new();
        let message = Arc::new(message);

        for user_id in &recipients {
            if actor.as_deref() == Some(user_id.as_str()) || !seen.insert(user_id.as_str()) {
                continue;
            }

            if self.registry.send(user_id, message.clone()) > 0 {
                report.delivered += 1;
            } else if escalate {
                self.escalator.escalate(user_id, &message.data);
                report.escalated += 1;
            } else {
                report.dropped += 1;
            }
        }

        tracing::debug!(
            ?kind,
            event = %message.event,
            delivered = report.delivered,
            escalated = report.escalated,
            dropped = report.dropped,
            "event routed"
        );

        report
    }

    /// Membership of the chat a message belongs to. The directory wins; the
    /// client's description is the fallback.
    pub async fn resolve_chat(&self, chat: &ChatRef) -> ChatMembership {
        match self.chats.membership(&chat.id).await {
            Ok(Some(membership)) => membership,
            Ok(None) => ChatMembership::from(chat),
            Err(err) => {
                tracing::warn!(chat_id = %chat.id, %err, "chat lookup failed, using client membership");
                ChatMembership::from(chat)
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    use parking_lot::Mutex;
    use serde_json::{json, Value};

    use crate::db::chats::MemoryChatDirectory;
    use crate::gateway::registry::{outbound_queue, OutboundRx, SessionPolicy, OUTBOUND_CAPACITY};

    /// Escalator that records calls instead of pushing.
    #[derive(Default)]
    pub(crate) struct RecordingEscalator {
        pub calls: Mutex<Vec<(String, Value)>>,
    }

    impl Escalator for RecordingEscalator {
        fn escalate(&self, user_id: &str, payload: &Value) {
            self.calls.lock().push((user_id.to_string(), payload.clone()));
        }
    }

    struct Harness {
        registry: Arc<ConnectionRegistry>,
        chats: Arc<MemoryChatDirectory>,
        escalator: Arc<RecordingEscalator>,
        router: EventRouter,
    }

    fn harness() -> Harness {
        let registry = Arc::new(ConnectionRegistry::new(SessionPolicy::Shared));
        let chats = Arc::new(MemoryChatDirectory::new());
        let escalator = Arc::new(RecordingEscalator::default());
        let router = EventRouter::new(registry.clone(), chats.clone(), escalator.clone());
        Harness {
            registry,
            chats,
            escalator,
            router,
        }
    }

    fn connect(registry: &ConnectionRegistry, user: &str, session: &str) -> OutboundRx {
        let (tx, rx) = outbound_queue();
        registry.register(user, session, tx);
        rx
    }

    fn drain(rx: &mut OutboundRx) -> Vec<String> {
        let mut events = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            events.push(msg.event.clone());
        }
        events
    }

    #[test]
    fn online_recipient_delivered_offline_escalated() {
        let h = harness();
        let mut a = connect(&h.registry, "a", "sa");
        let chat = ChatMembership::group("g1", &["m", "a", "b"], &[]);

        let report = h
            .router
            .route(PendingEvent::message("m", &chat, json!({ "content": "hi" })));

        assert_eq!(report, RouteReport { delivered: 1, escalated: 1, dropped: 0 });
        assert_eq!(drain(&mut a), vec!["message received"]);
        let calls = h.escalator.calls.lock();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "b");
        assert_eq!(calls[0].1["content"], "hi");
    }

    #[test]
    fn stalled_recipient_is_escalated_not_queued() {
        let h = harness();
        let mut a = connect(&h.registry, "a", "sa");
        let chat = ChatMembership::direct("c1", "m", "a");
        for _ in 0..OUTBOUND_CAPACITY {
            h.router
                .route(PendingEvent::message("m", &chat, json!({ "content": "x" })).live_only());
        }

        let report = h
            .router
            .route(PendingEvent::message("m", &chat, json!({ "content": "late" })));

        assert_eq!(report, RouteReport { delivered: 0, escalated: 1, dropped: 0 });
        assert_eq!(drain(&mut a).len(), OUTBOUND_CAPACITY);
        assert_eq!(h.escalator.calls.lock()[0].1["content"], "late");
    }

    #[test]
    fn actor_never_receives_own_event() {
        let h = harness();
        let mut m = connect(&h.registry, "m", "sm");
        let mut a = connect(&h.registry, "a", "sa");

        let report = h.router.route(PendingEvent::notification(
            Some("m"),
            vec!["m".into(), "a".into()],
            json!({}),
        ));

        assert_eq!(report.delivered, 1);
        assert!(drain(&mut m).is_empty());
        assert_eq!(drain(&mut a), vec!["receive_notification"]);
    }

    #[test]
    fn duplicate_recipients_get_one_copy() {
        let h = harness();
        let mut a = connect(&h.registry, "a", "sa");

        let report = h.router.route(PendingEvent::notification(
            None,
            vec!["a".into(), "a".into(), "b".into(), "b".into()],
            json!({}),
        ));

        assert_eq!(report, RouteReport { delivered: 1, escalated: 1, dropped: 0 });
        assert_eq!(drain(&mut a).len(), 1);
        assert_eq!(h.escalator.calls.lock().len(), 1);
    }

    #[test]
    fn every_session_of_a_recipient_receives() {
        let h = harness();
        let mut tab1 = connect(&h.registry, "a", "s1");
        let mut tab2 = connect(&h.registry, "a", "s2");

        h.router
            .route(PendingEvent::typing("b", "a", false, json!({ "name": "Bo" })));

        assert_eq!(drain(&mut tab1), vec!["typing"]);
        assert_eq!(drain(&mut tab2), vec!["typing"]);
    }

    #[test]
    fn live_only_events_drop_offline_recipients() {
        let h = harness();
        let report = h
            .router
            .route(PendingEvent::membership_change(None, "g1", &[], vec!["a".into()]));

        assert_eq!(report, RouteReport { delivered: 0, escalated: 0, dropped: 1 });
        assert!(h.escalator.calls.lock().is_empty());
    }

    #[test]
    fn closed_outbound_counts_as_offline() {
        let h = harness();
        let rx = connect(&h.registry, "a", "sa");
        drop(rx);

        let chat = ChatMembership::direct("c1", "m", "a");
        let report = h.router.route(PendingEvent::message("m", &chat, json!({})));

        assert_eq!(report.escalated, 1);
    }

    #[tokio::test]
    async fn resolve_chat_prefers_directory() {
        let h = harness();
        h.chats
            .upsert(ChatMembership::group("g1", &["m", "a"], &["b"]));

        let client: ChatRef = serde_json::from_value(json!({
            "_id": "g1",
            "users": ["m", "a", "b"]
        }))
        .unwrap();
        let membership = h.router.resolve_chat(&client).await;
        assert_eq!(membership.old_users, vec!["b"]);

        let unknown: ChatRef = serde_json::from_value(json!({
            "_id": "g2",
            "users": ["m", "z"]
        }))
        .unwrap();
        assert_eq!(h.router.resolve_chat(&unknown).await.users, vec!["m", "z"]);
    }
}
