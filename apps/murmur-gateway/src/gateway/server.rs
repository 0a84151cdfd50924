//! WebSocket upgrade handler and per-connection event loop.

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::time::{self, Instant};

use crate::AppState;

use super::events::ClientMessage;
use super::handler::{handle_client_message, Flow};
use super::lifecycle::DisconnectReason;
use super::session::GatewaySession;

/// Close codes (4000-range for application-level).
const CLOSE_NORMAL: u16 = 1000;
const CLOSE_NOT_REGISTERED: u16 = 4003;
const CLOSE_SESSION_TIMEOUT: u16 = 4009;

type WsSink = SplitSink<WebSocket, Message>;

pub fn router() -> Router<AppState> {
    Router::new().route("/socket", get(ws_upgrade))
}

async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_connection(socket, state))
}

async fn handle_connection(socket: WebSocket, state: AppState) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (mut session, mut outbound_rx) = GatewaySession::new();

    tracing::debug!(session_id = %session.session_id, "connection opened");

    let ping_timeout = state.config.ping_timeout;
    let mut ping_timer = time::interval(ping_timeout / 2);
    ping_timer.tick().await; // First tick fires immediately; skip it.
    let mut last_seen = Instant::now();

    let register_deadline = time::sleep(state.config.register_timeout);
    tokio::pin!(register_deadline);

    let reason = loop {
        tokio::select! {
            // Client sends us a frame.
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        last_seen = Instant::now();
                        let client_msg: ClientMessage = match serde_json::from_str(&text) {
                            Ok(m) => m,
                            Err(err) => {
                                tracing::debug!(session_id = %session.session_id, %err, "invalid frame dropped");
                                continue;
                            }
                        };

                        if let Flow::Close(reason) = handle_client_message(&state, &mut session, client_msg).await {
                            let _ = send_close(&mut ws_tx, CLOSE_NORMAL, "Going offline").await;
                            break reason;
                        }
                    }
                    Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {
                        last_seen = Instant::now();
                    }
                    Some(Ok(Message::Close(_))) | None => break DisconnectReason::TransportClosed,
                    Some(Err(e)) => {
                        tracing::debug!(?e, session_id = %session.session_id, "ws read error");
                        break DisconnectReason::TransportClosed;
                    }
                    _ => continue,
                }
            }

            // Event queued for this session by the router or presence.
            Some(out) = outbound_rx.recv() => {
                let json = match out.to_json() {
                    Ok(json) => json,
                    Err(err) => {
                        tracing::warn!(session_id = %session.session_id, event = %out.event, %err, "failed to encode event");
                        continue;
                    }
                };
                if ws_tx.send(Message::Text(json.into())).await.is_err() {
                    break DisconnectReason::TransportClosed;
                }
            }

            // Liveness: ping the client, give up when nothing came back in time.
            _ = ping_timer.tick() => {
                if last_seen.elapsed() >= ping_timeout {
                    tracing::debug!(session_id = %session.session_id, "ping timeout, closing connection");
                    let _ = send_close(&mut ws_tx, CLOSE_SESSION_TIMEOUT, "Ping timeout").await;
                    break DisconnectReason::Timeout;
                }
                if ws_tx.send(Message::Ping(Default::default())).await.is_err() {
                    break DisconnectReason::TransportClosed;
                }
            }

            // Connections must register within the deadline.
            _ = &mut register_deadline, if !session.is_registered() => {
                let _ = send_close(&mut ws_tx, CLOSE_NOT_REGISTERED, "Register timeout").await;
                break DisconnectReason::Timeout;
            }
        }
    };

    state.lifecycle.disconnect(&mut session, reason).await;

    tracing::debug!(session_id = %session.session_id, ?reason, "connection closed");
}

/// Send a WebSocket close frame with a code and reason.
async fn send_close(ws_tx: &mut WsSink, code: u16, reason: &str) -> Result<(), axum::Error> {
    let close_msg = Message::Close(Some(CloseFrame {
        code,
        reason: reason.to_string().into(),
    }));
    ws_tx.send(close_msg).await
}
