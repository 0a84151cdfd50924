//! Chat membership lookups consumed by presence and fan-out.
//!
//! The chat collection is owned and mutated by the chat service; the gateway
//! only reads it. Backed by Postgres in production and an in-memory map in
//! tests and local development.

use std::collections::HashMap;

use async_trait::async_trait;
use diesel::prelude::*;
use diesel::result::OptionalExtension;
use parking_lot::RwLock;

use super::pool::DbPool;
use super::schema::chats;
use super::StoreError;

/// Read-only projection of one chat.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChatMembership {
    pub chat_id: String,
    pub is_group: bool,
    /// Current members.
    pub users: Vec<String>,
    /// Members who left, were removed or were blocked. Never receive new events.
    pub old_users: Vec<String>,
}

impl ChatMembership {
    pub fn direct(chat_id: &str, a: &str, b: &str) -> Self {
        Self {
            chat_id: chat_id.to_string(),
            is_group: false,
            users: vec![a.to_string(), b.to_string()],
            old_users: Vec::new(),
        }
    }

    pub fn group(chat_id: &str, users: &[&str], old_users: &[&str]) -> Self {
        Self {
            chat_id: chat_id.to_string(),
            is_group: true,
            users: users.iter().map(|u| u.to_string()).collect(),
            old_users: old_users.iter().map(|u| u.to_string()).collect(),
        }
    }
}

#[async_trait]
pub trait ChatDirectory: Send + Sync {
    /// Users sharing a direct (non-group) chat with `user_id`.
    async fn direct_partners(&self, user_id: &str) -> Result<Vec<String>, StoreError>;

    /// Membership of a chat, if the directory knows it.
    async fn membership(&self, chat_id: &str) -> Result<Option<ChatMembership>, StoreError>;
}

/// Collect the distinct counterparts of `user_id` across direct chats.
fn partners_of<'a>(user_id: &str, chats: impl Iterator<Item = &'a [String]>) -> Vec<String> {
    let mut partners: Vec<String> = Vec::new();
    for users in chats {
        if !users.iter().any(|u| u == user_id) {
            continue;
        }
        for u in users {
            if u != user_id && !partners.contains(u) {
                partners.push(u.clone());
            }
        }
    }
    partners
}

// ---------------------------------------------------------------------------
// In-memory implementation
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryChatDirectory {
    chats: RwLock<HashMap<String, ChatMembership>>,
}

impl MemoryChatDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(&self, chat: ChatMembership) {
        self.chats.write().insert(chat.chat_id.clone(), chat);
    }

    pub fn remove(&self, chat_id: &str) {
        self.chats.write().remove(chat_id);
    }
}

#[async_trait]
impl ChatDirectory for MemoryChatDirectory {
    async fn direct_partners(&self, user_id: &str) -> Result<Vec<String>, StoreError> {
        let chats = self.chats.read();
        let mut direct: Vec<&ChatMembership> = chats.values().filter(|c| !c.is_group).collect();
        // HashMap order is random; keep results stable for callers.
        direct.sort_by(|a, b| a.chat_id.cmp(&b.chat_id));
        Ok(partners_of(user_id, direct.into_iter().map(|c| c.users.as_slice())))
    }

    async fn membership(&self, chat_id: &str) -> Result<Option<ChatMembership>, StoreError> {
        Ok(self.chats.read().get(chat_id).cloned())
    }
}

// ---------------------------------------------------------------------------
// Postgres implementation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = chats)]
struct ChatRow {
    id: String,
    is_group: bool,
    users: Vec<String>,
    old_users: Vec<String>,
}

impl From<ChatRow> for ChatMembership {
    fn from(row: ChatRow) -> Self {
        Self {
            chat_id: row.id,
            is_group: row.is_group,
            users: row.users,
            old_users: row.old_users,
        }
    }
}

pub struct PgChatDirectory {
    db: DbPool,
}

impl PgChatDirectory {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ChatDirectory for PgChatDirectory {
    async fn direct_partners(&self, user_id: &str) -> Result<Vec<String>, StoreError> {
        let mut conn = self.db.get().await?;

        let rows: Vec<Vec<String>> = diesel_async::RunQueryDsl::load(
            chats::table
                .filter(chats::is_group.eq(false))
                .filter(chats::users.contains(vec![user_id.to_string()]))
                .order(chats::id.asc())
                .select(chats::users),
            &mut conn,
        )
        .await?;

        Ok(partners_of(user_id, rows.iter().map(Vec::as_slice)))
    }

    async fn membership(&self, chat_id: &str) -> Result<Option<ChatMembership>, StoreError> {
        let mut conn = self.db.get().await?;

        let row: Option<ChatRow> = diesel_async::RunQueryDsl::get_result(
            chats::table.find(chat_id).select(ChatRow::as_select()),
            &mut conn,
        )
        .await
        .optional()?;

        Ok(row.map(ChatMembership::from))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn direct_partners_ignores_groups_and_strangers() {
        let dir = MemoryChatDirectory::new();
        dir.upsert(ChatMembership::direct("c1", "x", "a"));
        dir.upsert(ChatMembership::direct("c2", "b", "x"));
        dir.upsert(ChatMembership::direct("c3", "c", "d"));
        dir.upsert(ChatMembership::group("g1", &["x", "c", "e"], &[]));

        let partners = dir.direct_partners("x").await.unwrap();
        assert_eq!(partners, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn direct_partners_deduplicates() {
        let dir = MemoryChatDirectory::new();
        dir.upsert(ChatMembership::direct("c1", "x", "a"));
        dir.upsert(ChatMembership::direct("c2", "a", "x"));

        assert_eq!(dir.direct_partners("x").await.unwrap(), vec!["a"]);
    }

    #[tokio::test]
    async fn membership_round_trips_and_removes() {
        let dir = MemoryChatDirectory::new();
        let chat = ChatMembership::group("g1", &["m", "a"], &["c"]);
        dir.upsert(chat.clone());

        assert_eq!(dir.membership("g1").await.unwrap(), Some(chat));
        dir.remove("g1");
        assert!(dir.membership("g1").await.unwrap().is_none());
    }
}
