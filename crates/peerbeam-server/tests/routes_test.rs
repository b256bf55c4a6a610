/// Integration tests: HTTP probes through the router, and the signaling
/// WebSocket through a real listener.

use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use futures_util::{SinkExt, StreamExt};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};
use tower::ServiceExt;

use peerbeam_server::{AppState, ServerConfig, app};
use peerbeam_types::ServerMessage;

type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn get_json(uri: &str) -> (StatusCode, Value) {
    let state = AppState::new(&ServerConfig::default());
    let response = app(state)
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&body).unwrap())
}

#[tokio::test]
async fn identity_route() {
    let (status, body) = get_json("/").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["service"], "peerbeam-relay");
    assert!(body["version"].is_string());
}

#[tokio::test]
async fn health_route() {
    let (status, body) = get_json("/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert!(body["uptime"].as_f64().unwrap() >= 0.0);
    let timestamp = body["timestamp"].as_str().unwrap();
    assert!(chrono::DateTime::parse_from_rfc3339(timestamp).is_ok());
}

async fn spawn_relay() -> String {
    let state = AppState::new(&ServerConfig::default());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app(state)).await.unwrap();
    });
    format!("ws://{}/ws", addr)
}

async fn send(ws: &mut Ws, value: Value) {
    ws.send(Message::Text(value.to_string().into())).await.unwrap();
}

async fn next_message(ws: &mut Ws) -> Option<ServerMessage> {
    let wait = tokio::time::timeout(Duration::from_millis(500), async {
        while let Some(Ok(msg)) = ws.next().await {
            if let Message::Text(text) = msg {
                return Some(serde_json::from_str::<ServerMessage>(text.as_str()).unwrap());
            }
        }
        None
    });
    wait.await.ok().flatten()
}

#[tokio::test]
async fn signaling_round_trip_over_websocket() {
    let url = spawn_relay().await;
    let (mut sender, _) = connect_async(&url).await.unwrap();
    let (mut receiver, _) = connect_async(&url).await.unwrap();

    send(&mut sender, json!({"type": "join-room", "roomId": "ab12cd34", "isSender": true})).await;
    // Give the relay a moment so the sender is registered before the receiver joins.
    tokio::time::sleep(Duration::from_millis(50)).await;
    send(&mut receiver, json!({"type": "join-room", "roomId": "ab12cd34", "isSender": false})).await;

    assert_eq!(next_message(&mut sender).await, Some(ServerMessage::ReceiverJoined));

    send(&mut sender, json!({"type": "offer", "roomId": "ab12cd34", "offer": {"sdp": "v=0"}})).await;
    assert_eq!(
        next_message(&mut receiver).await,
        Some(ServerMessage::Offer { offer: json!({"sdp": "v=0"}) })
    );

    send(&mut receiver, json!({"type": "answer", "roomId": "ab12cd34", "answer": {"sdp": "v=1"}})).await;
    assert_eq!(
        next_message(&mut sender).await,
        Some(ServerMessage::Answer { answer: json!({"sdp": "v=1"}) })
    );

    // Garbage is dropped and the connection stays usable
    sender.send(Message::Text("{{{".into())).await.unwrap();
    send(&mut sender, json!({"type": "ice-candidate", "roomId": "ab12cd34", "candidate": {"c": 1}})).await;
    assert_eq!(
        next_message(&mut receiver).await,
        Some(ServerMessage::IceCandidate { candidate: json!({"c": 1}) })
    );

    sender.close(None).await.unwrap();
    assert_eq!(next_message(&mut receiver).await, Some(ServerMessage::PeerDisconnected));
}

#[tokio::test]
async fn receiver_with_unused_code_hears_nothing() {
    let url = spawn_relay().await;
    let (mut receiver, _) = connect_async(&url).await.unwrap();

    send(&mut receiver, json!({"type": "join-room", "roomId": "unused00", "isSender": false})).await;
    assert_eq!(next_message(&mut receiver).await, None);
}
