pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod gateway;
pub mod push;
pub mod routes;

use std::sync::Arc;

use config::Config;
use db::chats::ChatDirectory;
use gateway::lifecycle::SessionLifecycle;
use gateway::presence::PresenceCoordinator;
use gateway::registry::ConnectionRegistry;
use gateway::router::EventRouter;
use push::Escalator;

/// Shared application state available to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub registry: Arc<ConnectionRegistry>,
    pub presence: Arc<PresenceCoordinator>,
    pub router: Arc<EventRouter>,
    pub lifecycle: Arc<SessionLifecycle>,
}

impl AppState {
    /// Wire the gateway components around one registry.
    pub fn new(
        config: Config,
        chats: Arc<dyn ChatDirectory>,
        escalator: Arc<dyn Escalator>,
    ) -> Self {
        let registry = Arc::new(ConnectionRegistry::new(config.session_policy));
        let presence = Arc::new(PresenceCoordinator::new(
            registry.clone(),
            chats.clone(),
            config.presence_grace,
        ));
        let router = Arc::new(EventRouter::new(registry.clone(), chats, escalator));
        let lifecycle = Arc::new(SessionLifecycle::new(registry.clone(), presence.clone()));

        Self {
            config: Arc::new(config),
            registry,
            presence,
            router,
            lifecycle,
        }
    }
}
