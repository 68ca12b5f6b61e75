// Tests for the typed command protocol over an in-memory channel

mod common;

use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use blossom_kiosk::error::Error;
use blossom_kiosk::language::Language;
use blossom_kiosk::protocol::{AuthSuccess, CommandProtocolClient, InboundEvent, UserSpeech};
use common::{eventually, FakeChannel};
use serde_json::json;
use tokio::sync::mpsc;

fn client() -> (Arc<FakeChannel>, CommandProtocolClient) {
    let channel = FakeChannel::new();
    let client = CommandProtocolClient::new(channel.clone());
    (channel, client)
}

async fn recv(rx: &mut mpsc::UnboundedReceiver<InboundEvent>) -> InboundEvent {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for inbound event")
        .expect("listener closed")
}

#[tokio::test]
async fn test_outbound_payloads() {
    let (channel, client) = client();

    client
        .emit_identify_frame(b"\xff\xd8jpeg", Language::Korean)
        .await
        .unwrap();
    client
        .emit_action_confirm("u1", "turn_off_light", Language::Japanese)
        .await
        .unwrap();
    client
        .emit_pause("u1", "로봇 비상 정지", Language::Korean)
        .await
        .unwrap();
    client
        .emit_audio_upload(&[0, 1, 2, 3], "m4a", "u1", Language::Chinese)
        .await
        .unwrap();

    let emitted = channel.emitted();
    let names: Vec<&str> = emitted.iter().map(|(name, _)| name.as_str()).collect();
    assert_eq!(
        names,
        vec!["identify-frame", "action-confirm", "pause", "audio-upload"]
    );

    assert_eq!(
        emitted[0].1,
        json!({
            "image": base64::engine::general_purpose::STANDARD.encode(b"\xff\xd8jpeg"),
            "lang": "ko"
        })
    );
    assert_eq!(
        emitted[1].1,
        json!({ "userId": "u1", "command": "turn_off_light", "lang": "ja" })
    );
    assert_eq!(
        emitted[2].1,
        json!({ "userId": "u1", "text": "로봇 비상 정지", "lang": "ko" })
    );
    assert_eq!(
        emitted[3].1,
        json!({ "audioData": "AAECAw==", "format": "m4a", "userId": "u1", "lang": "zh" })
    );
}

#[tokio::test]
async fn test_disconnected_sends_are_dropped() {
    let (channel, client) = client();
    channel.set_connected(false);

    client
        .emit_command("u1", "불 켜줘", Language::Korean)
        .await
        .unwrap();

    assert!(!client.is_connected());
    assert!(channel.emitted().is_empty());
}

#[tokio::test]
async fn test_attach_requires_connection() {
    let (channel, client) = client();
    channel.set_connected(false);
    let (tx, _rx) = mpsc::unbounded_channel();

    let err = client.attach(Language::Korean, tx).await.unwrap_err();
    assert!(matches!(err, Error::ChannelUnavailable));
    assert!(!client.is_attached().await);
}

#[tokio::test]
async fn test_inbound_events_in_order() {
    let (channel, client) = client();
    let (tx, mut rx) = mpsc::unbounded_channel();
    client.attach(Language::Korean, tx).await.unwrap();

    channel.inject("auth-fail", json!({}));
    channel.inject("auth-success", json!({ "id": "u1", "name": "Kim" }));
    // Malformed and unknown events are dropped without stopping the listener
    channel.inject("user-speech", json!({ "words": "?" }));
    channel.inject("battery-low", json!({ "level": 5 }));
    channel.inject("user-speech", json!({ "text": "불 켜줘" }));

    assert_eq!(recv(&mut rx).await, InboundEvent::AuthFail);
    assert_eq!(
        recv(&mut rx).await,
        InboundEvent::AuthSuccess(AuthSuccess {
            id: "u1".to_string(),
            name: "Kim".to_string(),
        })
    );
    assert_eq!(
        recv(&mut rx).await,
        InboundEvent::UserSpeech(UserSpeech {
            text: "불 켜줘".to_string(),
        })
    );
}

#[tokio::test]
async fn test_attach_same_language_is_noop() {
    let (channel, client) = client();
    let (tx, mut rx) = mpsc::unbounded_channel();

    client.attach(Language::Korean, tx.clone()).await.unwrap();
    client.attach(Language::Korean, tx).await.unwrap();
    assert_eq!(channel.listeners(), 1);

    // One listener means one delivery
    channel.inject("auth-fail", json!({}));
    assert_eq!(recv(&mut rx).await, InboundEvent::AuthFail);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_language_change_replaces_listener() {
    let (channel, client) = client();
    let (tx, mut rx) = mpsc::unbounded_channel();

    client.attach(Language::Korean, tx.clone()).await.unwrap();
    client.attach(Language::English, tx).await.unwrap();
    eventually("old listener gone", || channel.listeners() == 1).await;

    channel.inject("auth-fail", json!({}));
    assert_eq!(recv(&mut rx).await, InboundEvent::AuthFail);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_detach_is_idempotent() {
    let (channel, client) = client();
    let (tx, _rx) = mpsc::unbounded_channel();

    client.attach(Language::Korean, tx).await.unwrap();
    assert!(client.is_attached().await);

    client.detach().await;
    client.detach().await;

    assert!(!client.is_attached().await);
    eventually("listener dropped", || channel.listeners() == 0).await;
}
