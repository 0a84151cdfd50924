mod common;

use axum::http::header::AUTHORIZATION;
use axum::http::StatusCode;
use axum_test::TestServer;
use serde_json::{json, Value};
use murmur_gateway::gateway::registry::{outbound_queue, OutboundRx};

use common::{TestContext, INTERNAL_TOKEN};

fn server(ctx: &TestContext) -> TestServer {
    let app = murmur_gateway::routes::router().with_state(ctx.state.clone());
    TestServer::new(app).unwrap()
}

/// Put `user_id` online with a bare outbound queue.
fn online(ctx: &TestContext, user_id: &str, session_id: &str) -> OutboundRx {
    let (tx, rx) = outbound_queue();
    ctx.state.registry.register(user_id, session_id, tx);
    rx
}

fn bearer() -> String {
    format!("Bearer {INTERNAL_TOKEN}")
}

#[tokio::test]
async fn health_reports_registry_counts() {
    let ctx = common::test_context(common::test_config());
    let _a1 = online(&ctx, "a", "s1");
    let _a2 = online(&ctx, "a", "s2");
    let _b = online(&ctx, "b", "s3");

    let resp = server(&ctx).get("/health").await;
    resp.assert_status_ok();

    let body = resp.json::<Value>();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["online_users"], 2);
    assert_eq!(body["sessions"], 3);
}

#[tokio::test]
async fn membership_update_goes_to_each_affected_user() {
    let ctx = common::test_context(common::test_config());
    let mut a = online(&ctx, "a", "sa");
    let mut b = online(&ctx, "b", "sb");
    let mut m = online(&ctx, "m", "sm");

    let resp = server(&ctx)
        .post("/internal/v1/membership")
        .add_header(AUTHORIZATION, bearer())
        .json(&json!({
            "chatId": "g1",
            "users": ["m", "a"],
            "affected": ["a", { "_id": "b" }, "gone"],
            "actorId": "m"
        }))
        .await;

    resp.assert_status(StatusCode::ACCEPTED);
    let body = resp.json::<Value>();
    assert_eq!(body["delivered"], 2);
    assert_eq!(body["escalated"], 0);
    assert_eq!(body["dropped"], 1);

    let update = a.try_recv().unwrap();
    assert_eq!(update.event, "update_chat_users");
    assert_eq!(update.data["_id"], "g1");
    assert_eq!(update.data["users"], json!(["m", "a"]));
    assert_eq!(b.try_recv().unwrap().event, "update_chat_users");

    // Remaining members are not broadcast to.
    assert!(m.try_recv().is_err());
    assert!(ctx.escalator.users().is_empty());
}

#[tokio::test]
async fn notification_escalates_offline_users_except_actor() {
    let ctx = common::test_context(common::test_config());
    let mut a = online(&ctx, "a", "sa");

    let resp = server(&ctx)
        .post("/internal/v1/notifications")
        .add_header(AUTHORIZATION, bearer())
        .json(&json!({
            "actorId": "m",
            "users": ["m", "a", "b"],
            "message": { "content": "Mina added you", "sender": { "name": "Mina" } }
        }))
        .await;

    resp.assert_status(StatusCode::ACCEPTED);
    let body = resp.json::<Value>();
    assert_eq!(body["delivered"], 1);
    assert_eq!(body["escalated"], 1);

    let note = a.try_recv().unwrap();
    assert_eq!(note.event, "receive_notification");
    assert_eq!(note.data["content"], "Mina added you");

    let calls = ctx.escalator.calls.lock();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, "b");
    assert_eq!(calls[0].1["sender"]["name"], "Mina");
}

#[tokio::test]
async fn hooks_require_internal_token() {
    let ctx = common::test_context(common::test_config());
    let server = server(&ctx);
    let payload = json!({ "users": ["a"], "message": {} });

    let resp = server.post("/internal/v1/notifications").json(&payload).await;
    resp.assert_status(StatusCode::UNAUTHORIZED);
    assert_eq!(resp.json::<Value>()["error"]["code"], "UNAUTHORIZED");

    let resp = server
        .post("/internal/v1/notifications")
        .add_header(AUTHORIZATION, "Bearer wrong")
        .json(&payload)
        .await;
    resp.assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn hooks_disabled_without_token() {
    let ctx = common::test_context(murmur_gateway::config::Config::default());

    let resp = server(&ctx)
        .post("/internal/v1/notifications")
        .add_header(AUTHORIZATION, bearer())
        .json(&json!({ "users": ["a"], "message": {} }))
        .await;

    resp.assert_status(StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn invalid_hook_bodies_are_rejected() {
    let ctx = common::test_context(common::test_config());
    let server = server(&ctx);

    let resp = server
        .post("/internal/v1/membership")
        .add_header(AUTHORIZATION, bearer())
        .json(&json!({ "chatId": " ", "affected": [] }))
        .await;
    resp.assert_status(StatusCode::BAD_REQUEST);
    let body = resp.json::<Value>();
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    assert_eq!(body["error"]["details"].as_array().unwrap().len(), 2);

    let resp = server
        .post("/internal/v1/notifications")
        .add_header(AUTHORIZATION, bearer())
        .json(&json!({ "message": {} }))
        .await;
    resp.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(resp.json::<Value>()["error"]["code"], "BAD_REQUEST");
}
