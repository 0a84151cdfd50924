use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use axum::http::HeaderValue;
use axum::Router;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use murmur_gateway::config::Config;
use murmur_gateway::db::chats::{ChatDirectory, MemoryChatDirectory, PgChatDirectory};
use murmur_gateway::db::subscriptions::{
    MemorySubscriptionStore, PgSubscriptionStore, SubscriptionStore,
};
use murmur_gateway::push::bridge::PushBridge;
use murmur_gateway::push::relay::HttpPushService;
use murmur_gateway::push::{DisabledEscalator, Escalator};
use murmur_gateway::AppState;

#[tokio::main]
async fn main() {
    // Fall back to the crate-local .env; variables may also come from the environment.
    if dotenvy::dotenv().is_err() {
        let env_path = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
        let _ = dotenvy::from_path(env_path);
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    let port = config.port;

    let (chats, subscriptions): (Arc<dyn ChatDirectory>, Arc<dyn SubscriptionStore>) =
        match &config.database_url {
            Some(url) => {
                let db = murmur_gateway::db::pool::connect(url, 20)
                    .expect("failed to build connection pool");
                (
                    Arc::new(PgChatDirectory::new(db.clone())),
                    Arc::new(PgSubscriptionStore::new(db)),
                )
            }
            None => {
                tracing::warn!("DATABASE_URL not set, using in-memory chat directory");
                (
                    Arc::new(MemoryChatDirectory::new()),
                    Arc::new(MemorySubscriptionStore::new()),
                )
            }
        };

    let escalator: Arc<dyn Escalator> = match &config.push_relay_url {
        Some(url) => {
            let service = HttpPushService::new(url.as_str(), config.push_timeout)
                .expect("failed to build push client");
            Arc::new(PushBridge::new(
                subscriptions,
                Arc::new(service),
                config.push_timeout,
            ))
        }
        None => {
            tracing::warn!("PUSH_RELAY_URL not set, offline recipients will not be notified");
            Arc::new(DisabledEscalator)
        }
    };

    tracing::info!(
        policy = ?config.session_policy,
        grace_ms = config.presence_grace.as_millis() as u64,
        internal_hooks = config.internal_token.is_some(),
        "murmur-gateway configured"
    );

    let cors = CorsLayer::new()
        .allow_origin(allowed_origins(&config.cors_origins))
        .allow_methods(Any)
        .allow_headers(Any);

    let sweep_every = config.presence_sweep;
    let state = AppState::new(config, chats, escalator);

    if !state.config.presence_grace.is_zero() {
        state.presence.clone().spawn_sweeper(sweep_every);
    }

    let app = Router::new()
        .merge(murmur_gateway::routes::router())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!(%addr, "murmur-gateway listening");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");
}

fn allowed_origins(origins: &[String]) -> AllowOrigin {
    if origins.is_empty() {
        return AllowOrigin::any();
    }
    AllowOrigin::list(origins.iter().map(|o| {
        o.parse::<HeaderValue>()
            .unwrap_or_else(|_| panic!("invalid CORS origin: {o}"))
    }))
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(%err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
