#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::time;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use murmur_gateway::config::Config;
use murmur_gateway::db::chats::MemoryChatDirectory;
use murmur_gateway::push::Escalator;
use murmur_gateway::AppState;

pub const INTERNAL_TOKEN: &str = "test-internal-token";

pub type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Escalator that records every call instead of pushing.
#[derive(Default)]
pub struct RecordingEscalator {
    pub calls: Mutex<Vec<(String, Value)>>,
}

impl RecordingEscalator {
    pub fn users(&self) -> Vec<String> {
        self.calls.lock().iter().map(|(u, _)| u.clone()).collect()
    }
}

impl Escalator for RecordingEscalator {
    fn escalate(&self, user_id: &str, payload: &Value) {
        self.calls.lock().push((user_id.to_string(), payload.clone()));
    }
}

/// In-memory collaborators behind a test `AppState`.
pub struct TestContext {
    pub state: AppState,
    pub chats: Arc<MemoryChatDirectory>,
    pub escalator: Arc<RecordingEscalator>,
}

pub fn test_config() -> Config {
    Config {
        internal_token: Some(INTERNAL_TOKEN.to_string()),
        ..Config::default()
    }
}

pub fn test_context(config: Config) -> TestContext {
    let chats = Arc::new(MemoryChatDirectory::new());
    let escalator = Arc::new(RecordingEscalator::default());
    let state = AppState::new(config, chats.clone(), escalator.clone());
    TestContext {
        state,
        chats,
        escalator,
    }
}

/// Start an actual TCP server for WebSocket testing. The server runs in the
/// background for the rest of the test.
pub async fn start_ws_server(config: Config) -> (SocketAddr, TestContext) {
    let ctx = test_context(config);
    let app = murmur_gateway::routes::router().with_state(ctx.state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (addr, ctx)
}

pub async fn connect(addr: SocketAddr) -> WsClient {
    let url = format!("ws://{addr}/socket");
    let (ws, _) = tokio_tungstenite::connect_async(&url)
        .await
        .expect("ws connect");
    ws
}

pub async fn send_event(ws: &mut WsClient, event: &str, data: Value) {
    let frame = serde_json::json!({ "event": event, "data": data });
    ws.send(Message::Text(frame.to_string().into()))
        .await
        .expect("send event");
}

/// Next non-control frame, or `None` on timeout.
pub async fn next_frame(ws: &mut WsClient, wait: Duration) -> Option<Message> {
    let deadline = time::Instant::now() + wait;
    loop {
        let msg = time::timeout_at(deadline, ws.next()).await.ok()?;
        match msg {
            Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
            Some(Ok(msg)) => return Some(msg),
            Some(Err(_)) | None => return None,
        }
    }
}

/// Receive the next event frame as `(event, data)`.
pub async fn recv_event(ws: &mut WsClient) -> (String, Value) {
    let msg = next_frame(ws, Duration::from_secs(5))
        .await
        .expect("timeout waiting for event");
    let text = msg.into_text().expect("not text");
    let frame: Value = serde_json::from_str(&text).expect("parse frame");
    (
        frame["event"].as_str().expect("event name").to_string(),
        frame["data"].clone(),
    )
}

/// Assert that no event arrives within `wait`.
pub async fn expect_silence(ws: &mut WsClient, wait: Duration) {
    if let Some(msg) = next_frame(ws, wait).await {
        panic!("expected no event, got: {msg:?}");
    }
}

/// Connect and register `user_id`, consuming the ack and the snapshot.
/// Returns the socket and the snapshot's online user ids.
pub async fn register(addr: SocketAddr, user_id: &str) -> (WsClient, Vec<String>) {
    let mut ws = connect(addr).await;
    send_event(&mut ws, "register_user", Value::String(user_id.to_string())).await;

    let (event, data) = recv_event(&mut ws).await;
    assert_eq!(event, "registered");
    assert_eq!(data["userId"], user_id);

    let (event, data) = recv_event(&mut ws).await;
    assert_eq!(event, "online_users");
    let online = serde_json::from_value(data["onlineUserIds"].clone()).expect("online ids");

    (ws, online)
}

/// Poll until `check` holds or a second passes.
pub async fn eventually(check: impl Fn() -> bool) -> bool {
    for _ in 0..50 {
        if check() {
            return true;
        }
        time::sleep(Duration::from_millis(20)).await;
    }
    check()
}
