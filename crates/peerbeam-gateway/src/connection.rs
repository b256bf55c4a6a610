use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, info, warn};

use crate::relay::Relay;

/// Default heartbeat interval: the relay sends a Ping this often.
/// If 2 consecutive Pongs are missed, the connection is dropped.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Run one client's WebSocket until it closes, stops answering pings, or
/// the relay drops it. Room cleanup happens exactly once on the way out.
pub async fn handle_connection(socket: WebSocket, relay: Relay, heartbeat_interval: Duration) {
    let (mut sender, mut receiver) = socket.split();
    let (conn_id, mut outbound_rx) = relay.register_connection().await;

    info!("{} connected to relay", conn_id);

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    // Forward routed messages -> client, with heartbeat
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(heartbeat_interval);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                msg = outbound_rx.recv() => {
                    let Some(msg) = msg else { break };
                    let text = match serde_json::to_string(&msg) {
                        Ok(text) => text,
                        Err(e) => {
                            warn!("{} failed to encode {}: {}", conn_id, msg.kind(), e);
                            continue;
                        }
                    };
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("{} heartbeat timeout (missed {} pongs), dropping connection", conn_id, missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(Bytes::new())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Read signaling messages from client
    let relay_recv = relay.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => {
                    relay_recv.handle_text(conn_id, text.as_str()).await;
                }
                Message::Binary(data) => {
                    debug!("{} sent {} byte binary frame, ignored", conn_id, data.len());
                }
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                Message::Ping(_) => {}
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    relay.on_disconnect(conn_id).await;
    info!("{} disconnected from relay", conn_id);
}
