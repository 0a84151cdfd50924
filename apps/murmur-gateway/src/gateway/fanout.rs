//! Pending events and the recipient rules for each event kind.
//!
//! A [`PendingEvent`] is built here, consumed immediately by the
//! [`EventRouter`](super::router::EventRouter) and then discarded.

use serde_json::Value;

use crate::db::chats::ChatMembership;

use super::events::{ChatRef, EventName, ServerMessage};

/// What an event is about. Decides whether offline recipients escalate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Message,
    Typing,
    ReadReceipt,
    BlockState,
    MembershipChange,
    Notification,
}

impl EventKind {
    /// Kinds that reach offline recipients through push.
    pub fn escalates(self) -> bool {
        matches!(self, EventKind::Message | EventKind::Notification)
    }
}

/// An event on its way to a set of users.
#[derive(Debug, Clone)]
pub struct PendingEvent {
    pub kind: EventKind,
    /// The acting user. Never receives its own event.
    pub actor: Option<String>,
    pub recipients: Vec<String>,
    pub message: ServerMessage,
    /// Hand offline recipients to the escalation bridge.
    pub escalate: bool,
}

impl PendingEvent {
    fn build(
        kind: EventKind,
        actor: Option<&str>,
        recipients: Vec<String>,
        message: ServerMessage,
    ) -> Self {
        Self {
            kind,
            actor: actor.map(str::to_string),
            recipients,
            message,
            escalate: kind.escalates(),
        }
    }

    /// `message received` to every current member except the sender.
    pub fn message(sender: &str, chat: &ChatMembership, payload: Value) -> Self {
        Self::build(
            EventKind::Message,
            Some(sender),
            message_recipients(sender, chat),
            ServerMessage::new(EventName::MESSAGE_RECEIVED, payload),
        )
    }

    /// `typing` / `stop typing` to the receiver only.
    pub fn typing(actor: &str, receiver: &str, stopped: bool, user: Value) -> Self {
        let event = if stopped {
            EventName::STOP_TYPING
        } else {
            EventName::TYPING
        };
        Self::build(
            EventKind::Typing,
            Some(actor),
            vec![receiver.to_string()],
            ServerMessage::new(event, user),
        )
    }

    /// `message_read` or `all_messages_read` to the original sender.
    pub fn read_receipt(actor: &str, original_sender: &str, all: bool, payload: Value) -> Self {
        let event = if all {
            EventName::ALL_MESSAGES_READ
        } else {
            EventName::MESSAGE_READ
        };
        Self::build(
            EventKind::ReadReceipt,
            Some(actor),
            vec![original_sender.to_string()],
            ServerMessage::new(event, payload),
        )
    }

    /// `user_blocked` / `user_unblocked` to the counterpart.
    pub fn block_state(actor: &str, counterpart: &str, blocked: bool, payload: Value) -> Self {
        let event = if blocked {
            EventName::USER_BLOCKED
        } else {
            EventName::USER_UNBLOCKED
        };
        Self::build(
            EventKind::BlockState,
            Some(actor),
            vec![counterpart.to_string()],
            ServerMessage::new(event, payload),
        )
    }

    /// `update_chat_users` to each affected user individually.
    pub fn membership_change(
        actor: Option<&str>,
        chat_id: &str,
        users: &[String],
        affected: Vec<String>,
    ) -> Self {
        Self::build(
            EventKind::MembershipChange,
            actor,
            affected,
            ServerMessage::update_chat_users(chat_id, users),
        )
    }

    /// `receive_notification` to the listed users.
    pub fn notification(actor: Option<&str>, users: Vec<String>, payload: Value) -> Self {
        Self::build(
            EventKind::Notification,
            actor,
            users,
            ServerMessage::new(EventName::RECEIVE_NOTIFICATION, payload),
        )
    }

    /// Deliver to live sessions only, never escalate.
    pub fn live_only(mut self) -> Self {
        self.escalate = false;
        self
    }
}

/// Current members minus the sender minus anyone who left the chat.
pub fn message_recipients(sender: &str, chat: &ChatMembership) -> Vec<String> {
    chat.users
        .iter()
        .filter(|u| u.as_str() != sender && !chat.old_users.contains(u))
        .cloned()
        .collect()
}

/// Membership as the client described it, used when the directory does not
/// know the chat.
impl From<&ChatRef> for ChatMembership {
    fn from(chat: &ChatRef) -> Self {
        Self {
            chat_id: chat.id.clone(),
            is_group: chat.is_group,
            users: chat.users.iter().map(|u| u.id().to_string()).collect(),
            old_users: chat.old_users.iter().map(|u| u.id().to_string()).collect(),
        }
    }
}
