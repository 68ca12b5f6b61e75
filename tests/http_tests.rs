// Tests for the kiosk control API

mod common;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use blossom_kiosk::http::{create_router, AppState};
use blossom_kiosk::session::{Phase, UiIntent};
use common::Kiosk;
use serde_json::{json, Value};
use tower::ServiceExt;

fn router(kiosk: &Kiosk) -> Router {
    create_router(AppState::new(kiosk.handle.clone()))
}

async fn post(app: Router, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    let request = match body {
        Some(body) => request.body(Body::from(body.to_string())).unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

async fn get(app: Router, uri: &str) -> (StatusCode, Value) {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

#[tokio::test]
async fn test_health_check() {
    let kiosk = Kiosk::start();
    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();

    let response = router(&kiosk).oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_session_snapshot() {
    let kiosk = Kiosk::start();

    let (status, body) = get(router(&kiosk), "/session").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["phase"], "unauthenticated");
    assert_eq!(body["user_id"], "guest");
    assert_eq!(body["language"], "ko");
    assert_eq!(body["speaking"], false);
    assert_eq!(body["transcript"], json!([]));
}

#[tokio::test]
async fn test_login_is_accepted() {
    let kiosk = Kiosk::start();

    let (status, body) = post(router(&kiosk), "/session/login", None).await;

    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["status"], "accepted");
    kiosk.wait_phase(Phase::Authenticating).await;
}

#[tokio::test]
async fn test_text_and_transcript() {
    let kiosk = Kiosk::start();
    kiosk.login("u1", "Kim").await;

    let (status, _) = post(
        router(&kiosk),
        "/session/text",
        Some(json!({ "text": "불 켜줘" })),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    kiosk.wait_phase(Phase::AwaitingBackend).await;

    let (status, body) = get(router(&kiosk), "/session/transcript").await;
    assert_eq!(status, StatusCode::OK);
    let entries = body.as_array().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[1]["sender"], "user");
    assert_eq!(entries[1]["text"], "불 켜줘");
}

#[tokio::test]
async fn test_empty_text_rejected() {
    let kiosk = Kiosk::start();

    let (status, body) = post(
        router(&kiosk),
        "/session/text",
        Some(json!({ "text": "   " })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().is_some());
}

#[tokio::test]
async fn test_confirm_through_api() {
    let kiosk = Kiosk::start();
    kiosk.login("u1", "Kim").await;
    kiosk.channel.inject(
        "command-response",
        json!({ "text": "끌까요?", "type": "confirm", "meta": "turn_off_light" }),
    );
    let snapshot = kiosk.wait_phase(Phase::AwaitingConfirmation).await;
    let entry_id = snapshot.pending_confirmation.unwrap().transcript_entry_id;

    let (status, _) = post(
        router(&kiosk),
        "/session/confirm",
        Some(json!({ "entry_id": entry_id, "accept": true })),
    )
    .await;

    assert_eq!(status, StatusCode::ACCEPTED);
    let confirm = kiosk.channel.next_emit("action-confirm").await;
    assert_eq!(confirm["command"], "turn_off_light");
}

#[tokio::test]
async fn test_language_switch() {
    let kiosk = Kiosk::start();

    let (status, _) = post(
        router(&kiosk),
        "/session/language",
        Some(json!({ "language": "zh" })),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);

    kiosk
        .wait_for("language", |s| s.session.language.code() == "zh")
        .await;
    let (_, body) = get(router(&kiosk), "/session").await;
    assert_eq!(body["language"], "zh");
}

#[tokio::test]
async fn test_unknown_language_rejected() {
    let kiosk = Kiosk::start();

    let (status, _) = post(
        router(&kiosk),
        "/session/language",
        Some(json!({ "language": "xx" })),
    )
    .await;

    assert!(status.is_client_error());
}

#[tokio::test]
async fn test_emergency_stop_route() {
    let kiosk = Kiosk::start();
    kiosk.login("u1", "Kim").await;

    let (status, _) = post(router(&kiosk), "/session/stop", None).await;

    assert_eq!(status, StatusCode::ACCEPTED);
    kiosk.wait_phase(Phase::Emergency).await;
    let pause = kiosk.channel.next_emit("pause").await;
    assert_eq!(pause["userId"], "u1");
}

#[tokio::test]
async fn test_stopped_session_is_unavailable() {
    let kiosk = Kiosk::start();
    let app = router(&kiosk);

    kiosk.handle.send(UiIntent::Shutdown).unwrap();
    kiosk.task.await.unwrap();

    let (status, body) = post(app, "/session/mic", None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(body["error"].as_str().is_some());
}
