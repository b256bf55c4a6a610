use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use peerbeam_types::{ClientMessage, ServerMessage};

use crate::error::SessionError;

/// A relay connection seen as two queues. `inbound` ends (`recv` yields
/// `None`) when the relay connection is gone.
pub struct SignalingLink {
    pub outbound: mpsc::UnboundedSender<ClientMessage>,
    pub inbound: mpsc::UnboundedReceiver<ServerMessage>,
}

impl SignalingLink {
    /// A link whose relay is already gone.
    pub fn closed() -> Self {
        let (outbound, _) = mpsc::unbounded_channel();
        let (_, inbound) = mpsc::unbounded_channel();
        Self { outbound, inbound }
    }
}

/// Open a WebSocket to the relay at `url`.
pub async fn connect(url: &str) -> Result<SignalingLink, SessionError> {
    let (ws_stream, _) = connect_async(url)
        .await
        .map_err(|e| SessionError::SignalingUnavailable(e.to_string()))?;
    tracing::info!("Connected to signaling relay at {}", url);

    let (mut ws_sender, mut ws_receiver) = ws_stream.split();
    let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<ClientMessage>();
    let (inbound_tx, inbound) = mpsc::unbounded_channel::<ServerMessage>();

    // Writer: queued client messages -> WebSocket
    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = outbound_rx.recv().await {
            let text = match serde_json::to_string(&msg) {
                Ok(t) => t,
                Err(e) => {
                    tracing::warn!("Failed to serialize {}: {}", msg.kind(), e);
                    continue;
                }
            };
            tracing::debug!("-> relay {}", msg.kind());
            if ws_sender.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
        let _ = ws_sender.close().await;
    });

    // Reader: WebSocket -> parsed server messages
    let mut recv_task = tokio::spawn(async move {
        while let Some(msg) = ws_receiver.next().await {
            let text = match msg {
                Ok(Message::Text(text)) => text,
                Ok(Message::Close(_)) => break,
                Ok(_) => continue,
                Err(e) => {
                    tracing::warn!("Signaling connection error: {}", e);
                    break;
                }
            };
            match serde_json::from_str::<ServerMessage>(text.as_str()) {
                Ok(parsed) => {
                    tracing::debug!("<- relay {}", parsed.kind());
                    if inbound_tx.send(parsed).is_err() {
                        break;
                    }
                }
                Err(e) => tracing::warn!("Dropping malformed relay message: {}", e),
            }
        }
    });

    // Whichever side stops first takes the other down with it
    tokio::spawn(async move {
        tokio::select! {
            _ = &mut send_task => recv_task.abort(),
            _ = &mut recv_task => send_task.abort(),
        }
        tracing::info!("Signaling relay connection closed");
    });

    Ok(SignalingLink { outbound, inbound })
}
