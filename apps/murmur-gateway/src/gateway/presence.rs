//! Presence announcements to interested peers.
//!
//! Presence is per-**user**, not per-session: a user goes offline only when
//! its last session leaves the registry. Interested peers are the user's
//! direct-chat partners, looked up on demand.
//!
//! Announcements are checked for staleness on both sides of the directory
//! lookup, so an `online` for a session that already left or a late
//! `offline` for a user who came back is dropped. Each offline → online
//! transition is broadcast exactly once, by whichever live session of the
//! user gets past its lookup first.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::db::chats::ChatDirectory;

use super::events::ServerMessage;
use super::registry::ConnectionRegistry;

/// Outcome of an announce call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Announcement {
    /// Sent to `notified` online peers.
    Sent { notified: usize },
    /// The session left, or the user came back, before the lookup finished.
    Stale,
    /// Parked until the grace window runs out.
    Deferred,
}

/// An offline transition waiting out the grace window.
struct PendingOffline {
    session_id: String,
    since: Instant,
}

pub struct PresenceCoordinator {
    registry: Arc<ConnectionRegistry>,
    chats: Arc<dyn ChatDirectory>,
    grace: Duration,
    pending: DashMap<String, PendingOffline>,
}

impl PresenceCoordinator {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        chats: Arc<dyn ChatDirectory>,
        grace: Duration,
    ) -> Self {
        Self {
            registry,
            chats,
            grace,
            pending: DashMap::new(),
        }
    }

    /// Users who care about `user_id`'s presence. Lookup failures yield an
    /// empty set.
    pub async fn interest_set(&self, user_id: &str) -> Vec<String> {
        match self.chats.direct_partners(user_id).await {
            Ok(partners) => partners,
            Err(err) => {
                tracing::warn!(%user_id, %err, "interest set lookup failed");
                Vec::new()
            }
        }
    }

    /// Send the registering session its snapshot and, when the user's
    /// transition to online has not been announced yet, tell its online
    /// partners.
    pub async fn announce_online(&self, user_id: &str, session_id: &str) -> Announcement {
        if !self.registry.is_registered(user_id, session_id) {
            return Announcement::Stale;
        }

        // A reconnect inside the grace window cancels the parked offline;
        // partners never saw the user leave.
        let resumed = self.pending.remove(user_id).is_some();

        let interest = self.interest_set(user_id).await;

        if !self.registry.is_registered(user_id, session_id) {
            tracing::debug!(%user_id, %session_id, "online announcement superseded");
            return Announcement::Stale;
        }

        let online = self.registry.resolve_many(&interest);
        self.registry
            .send_to_session(session_id, Arc::new(ServerMessage::online_users(&online)));

        let mut notified = 0;
        if self.registry.claim_online(user_id, session_id) && !resumed {
            let msg = Arc::new(ServerMessage::new_online(user_id));
            for peer in &online {
                if self.registry.send(peer, msg.clone()) > 0 {
                    notified += 1;
                }
            }
        }

        tracing::debug!(%user_id, %session_id, notified, resumed, "announced online");
        Announcement::Sent { notified }
    }

    /// Announce that `user_id` lost its last session, or park the transition
    /// when a grace window is configured.
    pub async fn announce_offline(&self, user_id: &str, session_id: &str) -> Announcement {
        if self.registry.is_online(user_id) {
            return Announcement::Stale;
        }

        if !self.grace.is_zero() {
            self.pending.insert(
                user_id.to_string(),
                PendingOffline {
                    session_id: session_id.to_string(),
                    since: Instant::now(),
                },
            );
            tracing::debug!(%user_id, %session_id, "offline deferred");
            return Announcement::Deferred;
        }

        self.broadcast_offline(user_id).await
    }

    /// Emit `new_offline` to the user's online partners unless it is back.
    pub async fn broadcast_offline(&self, user_id: &str) -> Announcement {
        let interest = self.interest_set(user_id).await;

        if self.registry.is_online(user_id) {
            tracing::debug!(%user_id, "offline announcement superseded");
            return Announcement::Stale;
        }

        let msg = Arc::new(ServerMessage::new_offline(user_id));
        let mut notified = 0;
        for peer in self.registry.resolve_many(&interest) {
            if self.registry.send(&peer, msg.clone()) > 0 {
                notified += 1;
            }
        }

        tracing::debug!(%user_id, notified, "announced offline");
        Announcement::Sent { notified }
    }

    /// Answer a bulk presence query from `caller`.
    ///
    /// The caller's session gets the online subset of `users`; each of those
    /// peers learns that `caller` is online. Returns the online subset.
    pub fn check_online_users(
        &self,
        caller: &str,
        session_id: &str,
        users: &[String],
    ) -> Vec<String> {
        let listed: Vec<&str> = users
            .iter()
            .map(String::as_str)
            .filter(|u| *u != caller)
            .collect();
        let online = self.registry.resolve_many(&listed);

        self.registry
            .send_to_session(session_id, Arc::new(ServerMessage::online_users(&online)));

        let msg = Arc::new(ServerMessage::new_online_users(caller));
        for peer in &online {
            self.registry.send(peer, msg.clone());
        }

        online
    }

    /// Number of offline transitions waiting out the grace window.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Announce every parked offline whose grace window has run out.
    /// Returns the users that were announced.
    pub async fn sweep_expired(&self) -> Vec<String> {
        let now = Instant::now();
        let expired: Vec<String> = self
            .pending
            .iter()
            .filter(|e| now.duration_since(e.since) >= self.grace)
            .map(|e| e.key().clone())
            .collect();

        let mut announced = Vec::new();
        for user_id in expired {
            let Some((_, parked)) = self
                .pending
                .remove_if(&user_id, |_, p| now.duration_since(p.since) >= self.grace)
            else {
                continue;
            };

            match self.broadcast_offline(&user_id).await {
                Announcement::Sent { .. } => announced.push(user_id),
                _ => {
                    tracing::debug!(%user_id, session_id = %parked.session_id, "parked offline dropped");
                }
            }
        }
        announced
    }

    /// Run [`sweep_expired`](Self::sweep_expired) every `every`.
    pub fn spawn_sweeper(self: Arc<Self>, every: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            loop {
                ticker.tick().await;
                let gone = self.sweep_expired().await;
                if !gone.is_empty() {
                    tracing::debug!(count = gone.len(), "presence sweep announced offline users");
                }
            }
        })
    }
}
