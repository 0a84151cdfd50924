//! Event names and wire-format messages.
//!
//! Every WebSocket text frame carries one event: `{"event": <name>, "data": <json>}`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Event names
// ---------------------------------------------------------------------------

/// Event names exchanged with clients. Names containing spaces are kept as-is
/// for compatibility with existing clients.
pub struct EventName;

impl EventName {
    // Client → server.
    pub const REGISTER_USER: &'static str = "register_user";
    pub const TYPING: &'static str = "typing";
    pub const STOP_TYPING: &'static str = "stop typing";
    pub const NEW_MESSAGE: &'static str = "new message";
    pub const CHECK_ONLINE_USERS: &'static str = "check_online_users";
    pub const READ_MESSAGE: &'static str = "read_message";
    pub const ALL_READ_MESSAGES: &'static str = "all_read_messages";
    pub const USER_GOING_OFFLINE: &'static str = "user_going_offline";
    pub const BLOCK_USER: &'static str = "block user";
    pub const UNBLOCK_USER: &'static str = "unblock user";
    pub const SEND_NOTIFICATION: &'static str = "send_notification";

    // Server → client.
    pub const REGISTERED: &'static str = "registered";
    pub const ONLINE_USERS: &'static str = "online_users";
    pub const NEW_ONLINE: &'static str = "new_online";
    pub const NEW_OFFLINE: &'static str = "new_offline";
    pub const NEW_ONLINE_USERS: &'static str = "new_online_users";
    pub const MESSAGE_RECEIVED: &'static str = "message received";
    pub const MESSAGE_READ: &'static str = "message_read";
    pub const ALL_MESSAGES_READ: &'static str = "all_messages_read";
    pub const USER_BLOCKED: &'static str = "user_blocked";
    pub const USER_UNBLOCKED: &'static str = "user_unblocked";
    pub const UPDATE_CHAT_USERS: &'static str = "update_chat_users";
    pub const RECEIVE_NOTIFICATION: &'static str = "receive_notification";
}

// ---------------------------------------------------------------------------
// Server → Client message
// ---------------------------------------------------------------------------

/// A message sent from the server to one client session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServerMessage {
    pub event: String,
    pub data: Value,
}

impl ServerMessage {
    pub fn new(event: &str, data: Value) -> Self {
        Self {
            event: event.to_string(),
            data,
        }
    }

    /// Registration acknowledgment, sent before any presence data.
    pub fn registered(user_id: &str, session_id: &str) -> Self {
        Self::new(
            EventName::REGISTERED,
            serde_json::json!({ "userId": user_id, "sessionId": session_id }),
        )
    }

    /// Bulk presence snapshot for the requesting session.
    pub fn online_users(online_user_ids: &[String]) -> Self {
        Self::new(
            EventName::ONLINE_USERS,
            serde_json::json!({ "onlineUserIds": online_user_ids }),
        )
    }

    pub fn new_online(user_id: &str) -> Self {
        Self::new(EventName::NEW_ONLINE, Value::String(user_id.to_string()))
    }

    pub fn new_offline(user_id: &str) -> Self {
        Self::new(EventName::NEW_OFFLINE, Value::String(user_id.to_string()))
    }

    /// Tells a listed peer that `sender` is online and asked about them.
    pub fn new_online_users(sender: &str) -> Self {
        Self::new(
            EventName::NEW_ONLINE_USERS,
            serde_json::json!({ "onlineUserIds": [sender], "sender": sender }),
        )
    }

    pub fn update_chat_users(chat_id: &str, users: &[String]) -> Self {
        Self::new(
            EventName::UPDATE_CHAT_USERS,
            serde_json::json!({ "_id": chat_id, "users": users }),
        )
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

// ---------------------------------------------------------------------------
// Client → Server message
// ---------------------------------------------------------------------------

/// A message received from the client over WebSocket.
#[derive(Debug, Deserialize)]
pub struct ClientMessage {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

/// A user reference as clients send it: either a bare id or a populated
/// document with an `_id` field.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum UserRef {
    Id(String),
    Doc {
        #[serde(rename = "_id")]
        id: String,
    },
}

impl UserRef {
    pub fn id(&self) -> &str {
        match self {
            UserRef::Id(id) => id,
            UserRef::Doc { id } => id,
        }
    }
}

/// `register_user` accepts the bare user id or `{ "userId": .. }`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum RegisterPayload {
    Id(String),
    Object {
        #[serde(rename = "userId")]
        user_id: String,
    },
}

impl RegisterPayload {
    pub fn into_user_id(self) -> String {
        match self {
            RegisterPayload::Id(id) => id,
            RegisterPayload::Object { user_id } => user_id,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct TypingPayload {
    pub receiver: String,
    /// Forwarded verbatim to the receiver.
    #[serde(default)]
    pub user: Value,
}

#[derive(Debug, Deserialize)]
pub struct ChatRef {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default, rename = "isGroup")]
    pub is_group: bool,
    #[serde(default)]
    pub users: Vec<UserRef>,
    #[serde(default, rename = "oldUsers")]
    pub old_users: Vec<UserRef>,
}

#[derive(Debug, Deserialize)]
pub struct NewMessagePayload {
    pub sender: UserRef,
    pub chat: ChatRef,
}

#[derive(Debug, Deserialize)]
pub struct CheckOnlineUsersPayload {
    pub users: Vec<String>,
    #[serde(default)]
    pub sender: Option<String>,
}

/// Any payload addressed to a single user through its `userId` field
/// (read receipts, going-offline, block notices).
#[derive(Debug, Deserialize)]
pub struct UserTarget {
    #[serde(rename = "userId")]
    pub user_id: String,
}

#[derive(Debug, Deserialize)]
pub struct NotificationPayload {
    #[serde(rename = "userId")]
    pub user_id: String,
    #[serde(default)]
    pub notification: Value,
}
