//! Hooks called by the chat service after it changes persisted state.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::auth::middleware::InternalCaller;
use crate::error::{ApiError, FieldError};
use crate::gateway::events::UserRef;
use crate::gateway::fanout::PendingEvent;
use crate::gateway::router::RouteReport;
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/membership", post(membership_changed))
        .route("/notifications", post(notify))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MembershipHook {
    pub chat_id: String,
    /// Members after the change.
    #[serde(default)]
    pub users: Vec<UserRef>,
    /// Users added, removed or leaving; each gets its own update.
    pub affected: Vec<UserRef>,
    #[serde(default)]
    pub actor_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationHook {
    #[serde(default)]
    pub actor_id: Option<String>,
    pub users: Vec<UserRef>,
    pub message: Value,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct HookResponse {
    pub delivered: usize,
    pub escalated: usize,
    pub dropped: usize,
}

impl From<RouteReport> for HookResponse {
    fn from(report: RouteReport) -> Self {
        Self {
            delivered: report.delivered,
            escalated: report.escalated,
            dropped: report.dropped,
        }
    }
}

fn ids(users: &[UserRef]) -> Vec<String> {
    users.iter().map(|u| u.id().to_string()).collect()
}

async fn membership_changed(
    _caller: InternalCaller,
    State(state): State<AppState>,
    body: Result<Json<MembershipHook>, JsonRejection>,
) -> Result<(StatusCode, Json<HookResponse>), ApiError> {
    let Json(hook) = body?;

    let mut errors = Vec::new();
    if hook.chat_id.trim().is_empty() {
        errors.push(FieldError::new("chatId", "must not be empty"));
    }
    if hook.affected.is_empty() {
        errors.push(FieldError::new("affected", "must list at least one user"));
    }
    if !errors.is_empty() {
        return Err(ApiError::validation(errors));
    }

    let event = PendingEvent::membership_change(
        hook.actor_id.as_deref(),
        &hook.chat_id,
        &ids(&hook.users),
        ids(&hook.affected),
    );
    let report = state.router.route(event);

    tracing::info!(chat_id = %hook.chat_id, delivered = report.delivered, "membership change routed");

    Ok((StatusCode::ACCEPTED, Json(report.into())))
}

async fn notify(
    _caller: InternalCaller,
    State(state): State<AppState>,
    body: Result<Json<NotificationHook>, JsonRejection>,
) -> Result<(StatusCode, Json<HookResponse>), ApiError> {
    let Json(hook) = body?;

    if hook.users.is_empty() {
        return Err(ApiError::validation(vec![FieldError::new(
            "users",
            "must list at least one user",
        )]));
    }

    let event = PendingEvent::notification(hook.actor_id.as_deref(), ids(&hook.users), hook.message);
    let report = state.router.route(event);

    Ok((StatusCode::ACCEPTED, Json(report.into())))
}
