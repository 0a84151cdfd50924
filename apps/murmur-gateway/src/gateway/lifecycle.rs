//! Session lifecycle: `Connecting → Registered → Disconnected`.
//!
//! Reconnecting is the same as registering for the first time. Every path
//! out of `Registered` goes through [`SessionLifecycle::disconnect`], which
//! announces offline only when the user's last session is gone.

use std::sync::Arc;

use super::events::ServerMessage;
use super::presence::{Announcement, PresenceCoordinator};
use super::registry::{ConnectionRegistry, Registration};
use super::session::{ConnectionState, GatewaySession};

/// Why a session is leaving.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The socket closed or errored.
    TransportClosed,
    /// The client sent `user_going_offline` (tab hidden, logout).
    GoingOffline,
    /// No traffic within the ping timeout.
    Timeout,
}

pub struct SessionLifecycle {
    registry: Arc<ConnectionRegistry>,
    presence: Arc<PresenceCoordinator>,
}

impl SessionLifecycle {
    pub fn new(registry: Arc<ConnectionRegistry>, presence: Arc<PresenceCoordinator>) -> Self {
        Self { registry, presence }
    }

    /// Register `session` under `user_id`, acknowledge it and announce.
    ///
    /// The `registered` ack is queued before the session becomes addressable,
    /// so it is always the first frame the client sees.
    pub async fn register_user(
        &self,
        session: &mut GatewaySession,
        user_id: &str,
    ) -> Registration {
        session.send(ServerMessage::registered(user_id, &session.session_id));

        let registration = self
            .registry
            .register(user_id, &session.session_id, session.outbound());
        session.state = ConnectionState::Registered {
            user_id: user_id.to_string(),
        };

        tracing::info!(
            session_id = %session.session_id,
            %user_id,
            generation = registration.generation,
            came_online = registration.came_online,
            "session registered"
        );

        for stale in &registration.displaced {
            tracing::info!(session_id = %stale, %user_id, "session displaced by newer registration");
        }

        if let Some(previous) = &registration.previous_user {
            tracing::info!(
                session_id = %session.session_id,
                previous_user = %previous.user_id,
                "session re-registered under a different user"
            );
            if previous.went_offline {
                self.presence
                    .announce_offline(&previous.user_id, &session.session_id)
                    .await;
            }
        }

        self.presence
            .announce_online(user_id, &session.session_id)
            .await;

        registration
    }

    /// Move `session` to `Disconnected`. Returns the offline announcement when
    /// this was the user's last session.
    pub async fn disconnect(
        &self,
        session: &mut GatewaySession,
        reason: DisconnectReason,
    ) -> Option<Announcement> {
        let previous = std::mem::replace(&mut session.state, ConnectionState::Disconnected);
        let ConnectionState::Registered { user_id } = previous else {
            tracing::debug!(session_id = %session.session_id, ?reason, "unregistered session closed");
            return None;
        };

        let Some(departure) = self.registry.unregister(&session.session_id) else {
            tracing::debug!(session_id = %session.session_id, %user_id, ?reason, "stale session closed");
            return None;
        };

        tracing::info!(
            session_id = %session.session_id,
            %user_id,
            ?reason,
            went_offline = departure.went_offline,
            connected_secs = session.connected_secs(),
            "session disconnected"
        );

        if !departure.went_offline {
            return None;
        }

        Some(
            self.presence
                .announce_offline(&departure.user_id, &session.session_id)
                .await,
        )
    }
}
