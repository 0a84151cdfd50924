//! Connection registry: which users are online and which sessions address them.
//!
//! A single `parking_lot::RwLock` guards the whole registry. Every operation is
//! a handful of map lookups and never awaits while the lock is held; lookups
//! share the read lock.

use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::mpsc::{self, error::TrySendError};

use super::events::ServerMessage;

/// Frames a connection may have queued before further events for it are
/// dropped. A client that stops reading fills this and stops receiving.
pub const OUTBOUND_CAPACITY: usize = 256;

/// Outbound queue of one connection, drained by its writer loop.
pub type Outbound = mpsc::Sender<Arc<ServerMessage>>;

/// Receiving end of an [`Outbound`] queue.
pub type OutboundRx = mpsc::Receiver<Arc<ServerMessage>>;

/// A fresh bounded outbound queue.
pub fn outbound_queue() -> (Outbound, OutboundRx) {
    mpsc::channel(OUTBOUND_CAPACITY)
}

/// How concurrent sessions of the same user are tracked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SessionPolicy {
    /// Every registered session stays addressable (multi-tab, multi-device).
    #[default]
    Shared,
    /// Last registration wins; earlier sessions are displaced.
    Exclusive,
}

impl FromStr for SessionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "shared" => Ok(Self::Shared),
            "exclusive" => Ok(Self::Exclusive),
            other => Err(format!("unknown session policy `{other}`")),
        }
    }
}

/// Outcome of [`ConnectionRegistry::register`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    /// Monotonic registration counter value assigned to this session.
    pub generation: u64,
    /// The user had no live session before this registration.
    pub came_online: bool,
    /// Sessions of the same user displaced under [`SessionPolicy::Exclusive`].
    pub displaced: Vec<String>,
    /// Set when the session was previously registered under another user.
    pub previous_user: Option<Departure>,
}

/// A session leaving a user's set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Departure {
    pub user_id: String,
    /// The user's set became empty.
    pub went_offline: bool,
}

struct LiveSession {
    user_id: String,
    outbound: Outbound,
}

#[derive(Default)]
struct RegistryInner {
    /// user → session ids, oldest first. The last entry is the current session.
    users: HashMap<String, Vec<String>>,
    sessions: HashMap<String, LiveSession>,
    /// Users whose offline → online transition nobody has announced yet.
    unannounced: HashSet<String>,
    next_generation: u64,
}

impl RegistryInner {
    /// Detach a session from its user. Returns the departure, if it was registered.
    fn detach(&mut self, session_id: &str) -> Option<Departure> {
        let session = self.sessions.remove(session_id)?;
        let went_offline = match self.users.get_mut(&session.user_id) {
            Some(list) => {
                list.retain(|s| s != session_id);
                list.is_empty()
            }
            None => true,
        };
        if went_offline {
            self.users.remove(&session.user_id);
            self.unannounced.remove(&session.user_id);
        }
        Some(Departure {
            user_id: session.user_id,
            went_offline,
        })
    }
}

/// Shared registry of all registered gateway sessions.
pub struct ConnectionRegistry {
    policy: SessionPolicy,
    inner: RwLock<RegistryInner>,
}

impl ConnectionRegistry {
    pub fn new(policy: SessionPolicy) -> Self {
        Self {
            policy,
            inner: RwLock::new(RegistryInner::default()),
        }
    }

    /// Associate `session_id` with `user_id`. Re-registering makes the session
    /// the user's current one again and assigns a fresh generation.
    pub fn register(&self, user_id: &str, session_id: &str, outbound: Outbound) -> Registration {
        let mut inner = self.inner.write();

        let was_online = inner.users.get(user_id).is_some_and(|l| !l.is_empty());
        let was_unannounced = inner.unannounced.contains(user_id);

        let previous_user = match inner.detach(session_id) {
            Some(dep) if dep.user_id != user_id => Some(dep),
            _ => None,
        };

        let mut displaced = Vec::new();
        if self.policy == SessionPolicy::Exclusive {
            if let Some(list) = inner.users.get_mut(user_id) {
                displaced = std::mem::take(list);
            }
            for stale in &displaced {
                inner.sessions.remove(stale);
            }
        }

        // Detaching a user's only session clears its mark; keep it for a re-register.
        if !was_online || was_unannounced {
            inner.unannounced.insert(user_id.to_string());
        }

        inner.next_generation += 1;
        let generation = inner.next_generation;

        inner
            .users
            .entry(user_id.to_string())
            .or_default()
            .push(session_id.to_string());
        inner.sessions.insert(
            session_id.to_string(),
            LiveSession {
                user_id: user_id.to_string(),
                outbound,
            },
        );

        Registration {
            generation,
            came_online: !was_online,
            displaced,
            previous_user,
        }
    }

    /// Remove a session. No-op when the session is unknown or was displaced.
    pub fn unregister(&self, session_id: &str) -> Option<Departure> {
        self.inner.write().detach(session_id)
    }

    pub fn is_online(&self, user_id: &str) -> bool {
        self.inner.read().users.contains_key(user_id)
    }

    /// The user's current (most recently registered) session.
    pub fn resolve(&self, user_id: &str) -> Option<String> {
        self.inner
            .read()
            .users
            .get(user_id)
            .and_then(|l| l.last().cloned())
    }

    /// The subset of `user_ids` that is online, in input order, without duplicates.
    pub fn resolve_many<S: AsRef<str>>(&self, user_ids: &[S]) -> Vec<String> {
        let inner = self.inner.read();
        let mut seen = HashSet::new();
        user_ids
            .iter()
            .map(AsRef::as_ref)
            .filter(|u| inner.users.contains_key(*u) && seen.insert(*u))
            .map(str::to_string)
            .collect()
    }

    /// Whether `session_id` is still the current registration of `user_id`.
    pub fn is_current(&self, user_id: &str, session_id: &str) -> bool {
        self.inner
            .read()
            .users
            .get(user_id)
            .and_then(|l| l.last())
            .is_some_and(|s| s == session_id)
    }

    /// Whether `session_id` is still addressable as one of `user_id`'s sessions.
    pub fn is_registered(&self, user_id: &str, session_id: &str) -> bool {
        self.inner
            .read()
            .sessions
            .get(session_id)
            .is_some_and(|s| s.user_id == user_id)
    }

    /// Take the right to announce `user_id` coming online.
    ///
    /// Succeeds at most once per offline → online transition, and only for a
    /// session that is still registered under `user_id`.
    pub fn claim_online(&self, user_id: &str, session_id: &str) -> bool {
        let mut inner = self.inner.write();
        let owned = inner
            .sessions
            .get(session_id)
            .is_some_and(|s| s.user_id == user_id);
        owned && inner.unannounced.remove(user_id)
    }

    /// Enqueue `message` on every session of `user_id`. Returns how many
    /// sessions accepted it; zero means the user is effectively offline.
    pub fn send(&self, user_id: &str, message: Arc<ServerMessage>) -> usize {
        let targets: Vec<(String, Outbound)> = {
            let inner = self.inner.read();
            match inner.users.get(user_id) {
                Some(list) => list
                    .iter()
                    .filter_map(|sid| {
                        inner
                            .sessions
                            .get(sid)
                            .map(|s| (sid.clone(), s.outbound.clone()))
                    })
                    .collect(),
                None => return 0,
            }
        };

        targets
            .into_iter()
            .filter(|(session_id, outbound)| enqueue(session_id, outbound, message.clone()))
            .count()
    }

    /// Enqueue `message` on a single registered session.
    pub fn send_to_session(&self, session_id: &str, message: Arc<ServerMessage>) -> bool {
        let outbound = match self.inner.read().sessions.get(session_id) {
            Some(s) => s.outbound.clone(),
            None => return false,
        };
        enqueue(session_id, &outbound, message)
    }

    pub fn online_user_count(&self) -> usize {
        self.inner.read().users.len()
    }

    pub fn session_count(&self) -> usize {
        self.inner.read().sessions.len()
    }
}

/// Non-blocking enqueue. A full queue drops the message for that session.
fn enqueue(session_id: &str, outbound: &Outbound, message: Arc<ServerMessage>) -> bool {
    match outbound.try_send(message) {
        Ok(()) => true,
        Err(TrySendError::Full(dropped)) => {
            tracing::warn!(%session_id, event = %dropped.event, "outbound queue full, event dropped");
            false
        }
        Err(TrySendError::Closed(_)) => {
            tracing::debug!(%session_id, "outbound queue closed");
            false
        }
    }
}
