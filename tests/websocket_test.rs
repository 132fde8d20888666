//! WebSocket transport integration tests

use callwatch::application::SessionOrchestrator;
use callwatch::config::EngineConfig;
use callwatch::domain::session::SessionTrigger;
use callwatch::domain::shared::{SessionId, Topic};
use callwatch::infrastructure::broadcast::EventBroadcaster;
use callwatch::interface::{router, WsState};
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

type Client = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

async fn start_server() -> (Arc<SessionOrchestrator>, String) {
    let broadcaster = Arc::new(EventBroadcaster::new());
    let orchestrator = Arc::new(SessionOrchestrator::new(
        EngineConfig::default(),
        broadcaster.clone(),
    ));
    let app = router(WsState {
        broadcaster,
        queue_capacity: 32,
    });

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (orchestrator, format!("ws://{}/ws", addr))
}

/// Poll until `check` holds, for up to two seconds
async fn eventually(mut check: impl FnMut() -> bool) {
    for _ in 0..200 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}

async fn next_text(client: &mut Client) -> Value {
    loop {
        let message = timeout(Duration::from_secs(2), client.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("stream ended")
            .unwrap();
        if let Message::Text(text) = message {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

#[tokio::test]
async fn test_subscriber_receives_state_changes() {
    let (orchestrator, url) = start_server().await;
    let (mut client, _) = connect_async(url.as_str()).await.unwrap();

    client
        .send(Message::Text(r#"{"action":"subscribe","topic":"calls"}"#.to_string()))
        .await
        .unwrap();
    let broadcaster = orchestrator.broadcaster().clone();
    eventually(|| broadcaster.topic_subscribers(&Topic::calls()).len() == 1).await;

    let id = SessionId::new("s1");
    orchestrator.create_session(id.clone(), "+15551234567").unwrap();
    orchestrator.transition(&id, SessionTrigger::Ringing).unwrap();

    let event = next_text(&mut client).await;
    assert_eq!(event["type"], "session_state_changed");
    assert_eq!(event["sessionId"], "s1");
    assert_eq!(event["payload"]["from"], "connecting");
    assert_eq!(event["payload"]["to"], "ringing");
    assert!(event["timestamp"].is_string());
}

#[tokio::test]
async fn test_unsubscribed_topics_are_not_delivered() {
    let (orchestrator, url) = start_server().await;
    let (mut client, _) = connect_async(url.as_str()).await.unwrap();

    client
        .send(Message::Text(r#"{"action":"subscribe","topic":"metrics"}"#.to_string()))
        .await
        .unwrap();
    let broadcaster = orchestrator.broadcaster().clone();
    eventually(|| broadcaster.topic_subscribers(&Topic::metrics()).len() == 1).await;

    let id = SessionId::new("s1");
    orchestrator.create_session(id.clone(), "+1").unwrap();
    orchestrator.transition(&id, SessionTrigger::Ringing).unwrap();
    orchestrator.publish_system_metrics();

    let event = next_text(&mut client).await;
    assert_eq!(event["type"], "system_metrics");
    assert_eq!(event["payload"]["totalSessions"], 1);
    assert!(event.get("sessionId").is_none());
}

#[tokio::test]
async fn test_malformed_control_message_keeps_connection() {
    let (orchestrator, url) = start_server().await;
    let (mut client, _) = connect_async(url.as_str()).await.unwrap();

    client.send(Message::Text("not json".to_string())).await.unwrap();
    client
        .send(Message::Text(r#"{"action":"subscribe","topic":"calls"}"#.to_string()))
        .await
        .unwrap();

    let broadcaster = orchestrator.broadcaster().clone();
    eventually(|| broadcaster.topic_subscribers(&Topic::calls()).len() == 1).await;
    assert_eq!(broadcaster.subscriber_count(), 1);
}

#[tokio::test]
async fn test_heartbeat_ping_and_pong() {
    let (orchestrator, url) = start_server().await;
    let (mut client, _) = connect_async(url.as_str()).await.unwrap();

    let broadcaster = orchestrator.broadcaster().clone();
    eventually(|| broadcaster.subscriber_count() == 1).await;

    assert_eq!(broadcaster.heartbeat().probed, 1);
    let ping = next_text(&mut client).await;
    assert_eq!(ping["type"], "ping");

    client
        .send(Message::Text(r#"{"action":"pong"}"#.to_string()))
        .await
        .unwrap();
    // Give the pong time to land before the next round
    tokio::time::sleep(Duration::from_millis(100)).await;

    let report = broadcaster.heartbeat();
    assert!(report.disconnected.is_empty());
    assert_eq!(report.probed, 1);
}

#[tokio::test]
async fn test_websocket_pong_frame_answers_probe() {
    let (orchestrator, url) = start_server().await;
    let (mut client, _) = connect_async(url.as_str()).await.unwrap();

    let broadcaster = orchestrator.broadcaster().clone();
    eventually(|| broadcaster.subscriber_count() == 1).await;

    assert_eq!(broadcaster.heartbeat().probed, 1);
    assert_eq!(next_text(&mut client).await["type"], "ping");

    client.send(Message::Pong(Vec::new())).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let report = broadcaster.heartbeat();
    assert!(report.disconnected.is_empty());
    assert_eq!(broadcaster.subscriber_count(), 1);
}

#[tokio::test]
async fn test_close_disconnects_subscriber() {
    let (orchestrator, url) = start_server().await;
    let (mut client, _) = connect_async(url.as_str()).await.unwrap();

    let broadcaster = orchestrator.broadcaster().clone();
    eventually(|| broadcaster.subscriber_count() == 1).await;

    client.close(None).await.unwrap();
    eventually(|| broadcaster.subscriber_count() == 0).await;
}
