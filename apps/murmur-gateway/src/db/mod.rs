pub mod chats;
pub mod pool;
pub mod schema;
pub mod subscriptions;

use diesel_async::pooled_connection::deadpool::PoolError;

/// Failure reading from or writing to an external collaborator store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),
}

impl From<PoolError> for StoreError {
    fn from(err: PoolError) -> Self {
        Self::Unavailable(err.to_string())
    }
}
