use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock, mpsc};
use tracing::{debug, info, trace, warn};

use peerbeam_types::{ClientMessage, Role, ServerMessage, ShareCode};

use crate::registry::{ConnectionId, RejoinPolicy, RoomRegistry};

/// Routes signaling messages between the two occupants of a room.
#[derive(Clone)]
pub struct Relay {
    inner: Arc<RelayInner>,
}

struct RelayInner {
    /// Room slots. Held only for the duration of a single join/leave/lookup.
    registry: Mutex<RoomRegistry>,

    /// Per-connection outbound channels: conn_id -> sender
    connections: RwLock<HashMap<ConnectionId, mpsc::UnboundedSender<ServerMessage>>>,
}

impl Relay {
    pub fn new(policy: RejoinPolicy) -> Self {
        Self {
            inner: Arc::new(RelayInner {
                registry: Mutex::new(RoomRegistry::new(policy)),
                connections: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Register a new client connection. Returns its id and the receiver for
    /// messages the relay routes to it.
    pub async fn register_connection(&self) -> (ConnectionId, mpsc::UnboundedReceiver<ServerMessage>) {
        let conn_id = ConnectionId::new();
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.connections.write().await.insert(conn_id, tx);
        (conn_id, rx)
    }

    /// Number of live connections.
    pub async fn connection_count(&self) -> usize {
        self.inner.connections.read().await.len()
    }

    /// Number of rooms with at least one occupant.
    pub async fn room_count(&self) -> usize {
        self.inner.registry.lock().await.len()
    }

    async fn send_to(&self, conn_id: ConnectionId, msg: ServerMessage) {
        let connections = self.inner.connections.read().await;
        if let Some(tx) = connections.get(&conn_id) {
            trace!("-> {} {}", conn_id, msg.kind());
            let _ = tx.send(msg);
        }
    }

    /// Handle one raw text frame from a client. Frames that do not parse are
    /// logged and dropped.
    pub async fn handle_text(&self, conn_id: ConnectionId, text: &str) {
        match serde_json::from_str::<ClientMessage>(text) {
            Ok(msg) => self.handle_message(conn_id, msg).await,
            Err(e) => {
                warn!(
                    "{} malformed signaling message: {} -- raw: {}",
                    conn_id,
                    e,
                    truncate(text, 200)
                );
            }
        }
    }

    pub async fn handle_message(&self, conn_id: ConnectionId, msg: ClientMessage) {
        match msg {
            ClientMessage::JoinRoom { room_id, is_sender } => {
                self.on_join(conn_id, room_id, Role::from_is_sender(is_sender)).await;
            }
            ClientMessage::Offer { room_id, offer } => {
                self.forward(conn_id, &room_id, ServerMessage::Offer { offer }).await;
            }
            ClientMessage::Answer { room_id, answer } => {
                self.forward(conn_id, &room_id, ServerMessage::Answer { answer }).await;
            }
            ClientMessage::IceCandidate { room_id, candidate } => {
                self.forward(conn_id, &room_id, ServerMessage::IceCandidate { candidate })
                    .await;
            }
        }
    }

    /// Put a connection into a room. A receiver arriving while a sender waits
    /// is what starts negotiation, so the sender alone is told about it.
    pub async fn on_join(&self, conn_id: ConnectionId, code: ShareCode, role: Role) {
        let joined = self.inner.registry.lock().await.join(code.clone(), role, conn_id);

        let room = match joined {
            Ok(room) => room,
            Err(rejected) => {
                warn!("{} join refused: {}", conn_id, rejected);
                self.send_to(conn_id, ServerMessage::RoomOccupied { room_id: code }).await;
                return;
            }
        };

        info!("{} joined room {} as {:?}", conn_id, code, role);

        match role {
            Role::Receiver => {
                if let Some(sender) = room.sender {
                    self.send_to(sender, ServerMessage::ReceiverJoined).await;
                }
            }
            // Sender showed up after the receiver: it still needs the trigger.
            Role::Sender => {
                if room.receiver.is_some() {
                    self.send_to(conn_id, ServerMessage::ReceiverJoined).await;
                }
            }
        }
    }

    /// Deliver `msg` to the other occupant of `code`. Nothing is queued when
    /// there is no other occupant yet.
    async fn forward(&self, conn_id: ConnectionId, code: &ShareCode, msg: ServerMessage) {
        let peer = self.inner.registry.lock().await.peer_of(code, conn_id);
        match peer {
            Some(peer) => {
                debug!("{} -> {} {} [room={}]", conn_id, peer, msg.kind(), code);
                self.send_to(peer, msg).await;
            }
            None => {
                debug!("{} {} for room {} dropped: no peer", conn_id, msg.kind(), code);
            }
        }
    }

    /// Forget a connection and tell whoever shared a room with it.
    pub async fn on_disconnect(&self, conn_id: ConnectionId) {
        self.inner.connections.write().await.remove(&conn_id);

        let departures = self.inner.registry.lock().await.leave(conn_id);
        for departure in departures {
            info!("{} left room {}", conn_id, departure.code);
            if let Some(peer) = departure.remaining {
                self.send_to(peer, ServerMessage::PeerDisconnected).await;
            }
        }
    }
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
