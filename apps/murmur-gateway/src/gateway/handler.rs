//! Dispatch of client events received on a session.

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::AppState;

use super::events::{
    CheckOnlineUsersPayload, ClientMessage, EventName, NewMessagePayload, NotificationPayload,
    RegisterPayload, TypingPayload, UserTarget,
};
use super::fanout::PendingEvent;
use super::lifecycle::DisconnectReason;
use super::session::GatewaySession;

/// What the connection loop should do after an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Close(DisconnectReason),
}

/// Decode an event payload. Malformed payloads are logged and dropped.
fn payload<T: DeserializeOwned>(session: &GatewaySession, event: &str, data: Value) -> Option<T> {
    match serde_json::from_value(data) {
        Ok(p) => Some(p),
        Err(err) => {
            tracing::debug!(session_id = %session.session_id, %event, %err, "malformed payload dropped");
            None
        }
    }
}

/// Process one client event.
pub async fn handle_client_message(
    state: &AppState,
    session: &mut GatewaySession,
    msg: ClientMessage,
) -> Flow {
    let ClientMessage { event, data } = msg;

    if event == EventName::REGISTER_USER {
        let Some(p) = payload::<RegisterPayload>(session, &event, data) else {
            return Flow::Continue;
        };
        let user_id = p.into_user_id();
        if user_id.is_empty() {
            tracing::debug!(session_id = %session.session_id, "empty user id in register_user");
            return Flow::Continue;
        }
        state.lifecycle.register_user(session, &user_id).await;
        return Flow::Continue;
    }

    let Some(user_id) = session.user_id().map(str::to_string) else {
        tracing::debug!(session_id = %session.session_id, %event, "event before register_user dropped");
        return Flow::Continue;
    };

    match event.as_str() {
        EventName::TYPING | EventName::STOP_TYPING => {
            if let Some(p) = payload::<TypingPayload>(session, &event, data) {
                let stopped = event == EventName::STOP_TYPING;
                state
                    .router
                    .route(PendingEvent::typing(&user_id, &p.receiver, stopped, p.user));
            }
        }

        EventName::NEW_MESSAGE => {
            let Some(p) = payload::<NewMessagePayload>(session, &event, data.clone()) else {
                return Flow::Continue;
            };
            if p.sender.id() != user_id {
                tracing::warn!(
                    session_id = %session.session_id,
                    %user_id,
                    claimed = %p.sender.id(),
                    "message sender does not match session user"
                );
                return Flow::Continue;
            }
            let chat = state.router.resolve_chat(&p.chat).await;
            state.router.route(PendingEvent::message(&user_id, &chat, data));
        }

        EventName::CHECK_ONLINE_USERS => {
            if let Some(p) = payload::<CheckOnlineUsersPayload>(session, &event, data) {
                if p.sender.as_deref().is_some_and(|s| s != user_id) {
                    tracing::debug!(%user_id, "check_online_users sender ignored");
                }
                state
                    .presence
                    .check_online_users(&user_id, &session.session_id, &p.users);
            }
        }

        EventName::READ_MESSAGE | EventName::ALL_READ_MESSAGES => {
            if let Some(p) = payload::<UserTarget>(session, &event, data.clone()) {
                let all = event == EventName::ALL_READ_MESSAGES;
                state
                    .router
                    .route(PendingEvent::read_receipt(&user_id, &p.user_id, all, data));
            }
        }

        EventName::BLOCK_USER | EventName::UNBLOCK_USER => {
            if let Some(p) = payload::<UserTarget>(session, &event, data.clone()) {
                let blocked = event == EventName::BLOCK_USER;
                state
                    .router
                    .route(PendingEvent::block_state(&user_id, &p.user_id, blocked, data));
            }
        }

        EventName::SEND_NOTIFICATION => {
            if let Some(p) = payload::<NotificationPayload>(session, &event, data) {
                state.router.route(
                    PendingEvent::notification(Some(&user_id), vec![p.user_id], p.notification)
                        .live_only(),
                );
            }
        }

        EventName::USER_GOING_OFFLINE => {
            if let Some(p) = payload::<UserTarget>(session, &event, data) {
                if p.user_id != user_id {
                    tracing::warn!(
                        session_id = %session.session_id,
                        %user_id,
                        target = %p.user_id,
                        "going-offline signal for another user ignored"
                    );
                    return Flow::Continue;
                }
                return Flow::Close(DisconnectReason::GoingOffline);
            }
        }

        _ => {
            tracing::debug!(session_id = %session.session_id, %event, "unknown event");
        }
    }

    Flow::Continue
}
