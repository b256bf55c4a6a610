use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::code::ShareCode;

/// Which side of a room a connection occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Sender,
    Receiver,
}

impl Role {
    pub fn from_is_sender(is_sender: bool) -> Self {
        if is_sender { Self::Sender } else { Self::Receiver }
    }

    pub fn opposite(self) -> Self {
        match self {
            Self::Sender => Self::Receiver,
            Self::Receiver => Self::Sender,
        }
    }
}

/// Messages sent FROM a client TO the relay.
///
/// SDP blobs and ICE candidate descriptors are carried as opaque JSON; the
/// relay checks the envelope shape and nothing else.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    /// Occupy the sender or receiver slot of a room
    JoinRoom { room_id: ShareCode, is_sender: bool },

    /// Session description offer for the other occupant
    Offer { room_id: ShareCode, offer: Value },

    /// Session description answer for the other occupant
    Answer { room_id: ShareCode, answer: Value },

    /// Connectivity candidate for the other occupant
    IceCandidate { room_id: ShareCode, candidate: Value },
}

impl ClientMessage {
    pub fn room_id(&self) -> &ShareCode {
        match self {
            Self::JoinRoom { room_id, .. }
            | Self::Offer { room_id, .. }
            | Self::Answer { room_id, .. }
            | Self::IceCandidate { room_id, .. } => room_id,
        }
    }

    /// Wire tag, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::JoinRoom { .. } => "join-room",
            Self::Offer { .. } => "offer",
            Self::Answer { .. } => "answer",
            Self::IceCandidate { .. } => "ice-candidate",
        }
    }
}

/// Messages sent FROM the relay TO a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    /// A receiver is now present in the sender's room
    ReceiverJoined,

    /// The other occupant of the room left
    PeerDisconnected,

    /// Relayed offer
    Offer { offer: Value },

    /// Relayed answer
    Answer { answer: Value },

    /// Relayed connectivity candidate
    IceCandidate { candidate: Value },

    /// The requested slot is held by another connection and the relay is
    /// configured to reject re-joins
    RoomOccupied { room_id: ShareCode },
}

impl ServerMessage {
    /// Wire tag, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ReceiverJoined => "receiver-joined",
            Self::PeerDisconnected => "peer-disconnected",
            Self::Offer { .. } => "offer",
            Self::Answer { .. } => "answer",
            Self::IceCandidate { .. } => "ice-candidate",
            Self::RoomOccupied { .. } => "room-occupied",
        }
    }
}
