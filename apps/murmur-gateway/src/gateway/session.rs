//! Per-connection gateway session state.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use murmur_common::id::{prefix, prefixed_ulid};

use super::events::ServerMessage;
use super::registry::{outbound_queue, Outbound, OutboundRx};

/// Where a connection is in its lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    /// Transport is up, no `register_user` yet. Invisible to everyone.
    Connecting,
    Registered { user_id: String },
    /// Terminal.
    Disconnected,
}

/// State for a single WebSocket connection, owned by its connection task.
pub struct GatewaySession {
    /// Unique session identifier (`sck_` prefixed ULID).
    pub session_id: String,
    pub connected_at: DateTime<Utc>,
    pub state: ConnectionState,
    outbound: Outbound,
}

impl GatewaySession {
    /// Create a fresh session and the receiving end of its outbound queue.
    pub fn new() -> (Self, OutboundRx) {
        let (outbound, rx) = outbound_queue();
        let session = Self {
            session_id: prefixed_ulid(prefix::SOCKET),
            connected_at: Utc::now(),
            state: ConnectionState::Connecting,
            outbound,
        };
        (session, rx)
    }

    /// The registered user, if any.
    pub fn user_id(&self) -> Option<&str> {
        match &self.state {
            ConnectionState::Registered { user_id } => Some(user_id),
            _ => None,
        }
    }

    pub fn is_registered(&self) -> bool {
        matches!(self.state, ConnectionState::Registered { .. })
    }

    /// Queue a message for this connection only. Fails when the queue is
    /// full or the connection is gone.
    pub fn send(&self, message: ServerMessage) -> bool {
        self.outbound.try_send(Arc::new(message)).is_ok()
    }

    /// Whole seconds since the transport came up.
    pub fn connected_secs(&self) -> i64 {
        (Utc::now() - self.connected_at).num_seconds()
    }

    /// A handle to this connection's queue, handed to the registry.
    pub fn outbound(&self) -> Outbound {
        self.outbound.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_session_is_connecting_and_unregistered() {
        let (session, _rx) = GatewaySession::new();
        assert!(murmur_common::id::has_prefix(&session.session_id, prefix::SOCKET));
        assert_eq!(session.state, ConnectionState::Connecting);
        assert!(session.user_id().is_none());
        assert!(!session.is_registered());
        assert!(session.connected_secs() >= 0);
    }

    #[test]
    fn send_goes_to_own_queue() {
        let (session, mut rx) = GatewaySession::new();
        assert!(session.send(ServerMessage::new_online("a")));
        assert_eq!(rx.try_recv().unwrap().event, "new_online");

        drop(rx);
        assert!(!session.send(ServerMessage::new_online("a")));
    }

    #[test]
    fn registered_state_exposes_user() {
        let (mut session, _rx) = GatewaySession::new();
        session.state = ConnectionState::Registered {
            user_id: "u1".to_string(),
        };
        assert_eq!(session.user_id(), Some("u1"));
        assert!(session.is_registered());
    }
}
