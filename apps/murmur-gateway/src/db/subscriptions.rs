//! Durable push subscriptions, read by the escalation bridge.

use std::collections::HashMap;

use async_trait::async_trait;
use diesel::prelude::*;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::pool::DbPool;
use super::schema::push_subscriptions;
use super::StoreError;

/// A browser push subscription as registered by the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushSubscription {
    pub endpoint: String,
    pub keys: SubscriptionKeys,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionKeys {
    pub p256dh: String,
    pub auth: String,
}

#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    async fn list(&self, user_id: &str) -> Result<Vec<PushSubscription>, StoreError>;

    /// Remove one endpoint. Returns `true` if it existed.
    async fn remove(&self, user_id: &str, endpoint: &str) -> Result<bool, StoreError>;
}

// ---------------------------------------------------------------------------
// In-memory implementation
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemorySubscriptionStore {
    data: Mutex<HashMap<String, Vec<PushSubscription>>>,
}

impl MemorySubscriptionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a subscription; an existing entry with the same endpoint is replaced.
    pub fn add(&self, user_id: &str, subscription: PushSubscription) {
        let mut data = self.data.lock();
        let subs = data.entry(user_id.to_string()).or_default();
        subs.retain(|s| s.endpoint != subscription.endpoint);
        subs.push(subscription);
    }
}

#[async_trait]
impl SubscriptionStore for MemorySubscriptionStore {
    async fn list(&self, user_id: &str) -> Result<Vec<PushSubscription>, StoreError> {
        Ok(self.data.lock().get(user_id).cloned().unwrap_or_default())
    }

    async fn remove(&self, user_id: &str, endpoint: &str) -> Result<bool, StoreError> {
        let mut data = self.data.lock();
        let Some(subs) = data.get_mut(user_id) else {
            return Ok(false);
        };
        let before = subs.len();
        subs.retain(|s| s.endpoint != endpoint);
        Ok(subs.len() != before)
    }
}

// ---------------------------------------------------------------------------
// Postgres implementation
// ---------------------------------------------------------------------------

#[derive(Debug, Queryable, Selectable)]
#[diesel(table_name = push_subscriptions)]
struct SubscriptionRow {
    endpoint: String,
    p256dh: String,
    auth: String,
}

impl From<SubscriptionRow> for PushSubscription {
    fn from(row: SubscriptionRow) -> Self {
        Self {
            endpoint: row.endpoint,
            keys: SubscriptionKeys {
                p256dh: row.p256dh,
                auth: row.auth,
            },
        }
    }
}

pub struct PgSubscriptionStore {
    db: DbPool,
}

impl PgSubscriptionStore {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl SubscriptionStore for PgSubscriptionStore {
    async fn list(&self, user_id: &str) -> Result<Vec<PushSubscription>, StoreError> {
        let mut conn = self.db.get().await?;

        let rows: Vec<SubscriptionRow> = diesel_async::RunQueryDsl::load(
            push_subscriptions::table
                .filter(push_subscriptions::user_id.eq(user_id))
                .order(push_subscriptions::created_at.asc())
                .select(SubscriptionRow::as_select()),
            &mut conn,
        )
        .await?;

        Ok(rows.into_iter().map(PushSubscription::from).collect())
    }

    async fn remove(&self, user_id: &str, endpoint: &str) -> Result<bool, StoreError> {
        let mut conn = self.db.get().await?;

        let deleted = diesel_async::RunQueryDsl::execute(
            diesel::delete(
                push_subscriptions::table
                    .filter(push_subscriptions::user_id.eq(user_id))
                    .filter(push_subscriptions::endpoint.eq(endpoint)),
            ),
            &mut conn,
        )
        .await?;

        Ok(deleted > 0)
    }
}
