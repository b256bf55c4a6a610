use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use peerbeam_types::{Role, ShareCode};
use uuid::Uuid;

/// Identifies one relay connection for its whole lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // First 8 hex digits are plenty to tell connections apart in logs.
        let simple = self.0.simple().to_string();
        f.write_str(&simple[..8])
    }
}

/// What to do when a join targets a slot another connection already holds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RejoinPolicy {
    /// Last writer wins: treat the join as a reconnect of the same peer.
    #[default]
    Replace,
    /// Keep the current occupant: treat the join as a stranger reusing the code.
    Reject,
}

impl FromStr for RejoinPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "replace" => Ok(Self::Replace),
            "reject" => Ok(Self::Reject),
            other => Err(format!("unknown rejoin policy {other:?} (expected \"replace\" or \"reject\")")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{role:?} slot of room {code} is held by connection {occupant}")]
pub struct JoinRejected {
    pub code: ShareCode,
    pub role: Role,
    pub occupant: ConnectionId,
}

/// Slots of one room. A room with both slots empty never stays in the registry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Room {
    pub sender: Option<ConnectionId>,
    pub receiver: Option<ConnectionId>,
}

impl Room {
    pub fn slot(&self, role: Role) -> Option<ConnectionId> {
        match role {
            Role::Sender => self.sender,
            Role::Receiver => self.receiver,
        }
    }

    fn slot_mut(&mut self, role: Role) -> &mut Option<ConnectionId> {
        match role {
            Role::Sender => &mut self.sender,
            Role::Receiver => &mut self.receiver,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.sender.is_none() && self.receiver.is_none()
    }

    /// Occupant of the slot opposite to `id`, if `id` is in this room.
    fn opposite_of(&self, id: ConnectionId) -> Option<ConnectionId> {
        if self.sender == Some(id) {
            self.receiver
        } else if self.receiver == Some(id) {
            self.sender
        } else {
            None
        }
    }
}

/// A room `leave` removed a connection from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Departure {
    pub code: ShareCode,
    /// Whoever still occupies the other slot.
    pub remaining: Option<ConnectionId>,
}

/// Share code -> room mapping. Every mutation goes through `join`/`leave`.
#[derive(Debug, Default)]
pub struct RoomRegistry {
    rooms: HashMap<ShareCode, Room>,
    policy: RejoinPolicy,
}

impl RoomRegistry {
    pub fn new(policy: RejoinPolicy) -> Self {
        Self {
            rooms: HashMap::new(),
            policy,
        }
    }

    pub fn policy(&self) -> RejoinPolicy {
        self.policy
    }

    /// Put `id` into the `role` slot of room `code`, creating the room if needed.
    /// Returns the room as it looks after the join.
    pub fn join(&mut self, code: ShareCode, role: Role, id: ConnectionId) -> Result<Room, JoinRejected> {
        let policy = self.policy;
        let room = self.rooms.entry(code.clone()).or_default();

        match room.slot(role) {
            Some(occupant) if occupant != id && policy == RejoinPolicy::Reject => {
                return Err(JoinRejected { code, role, occupant });
            }
            _ => {}
        }

        *room.slot_mut(role) = Some(id);

        // A connection switching sides must not end up in both slots.
        let other = room.slot_mut(role.opposite());
        if *other == Some(id) {
            *other = None;
        }

        Ok(*room)
    }

    /// Remove `id` from every slot it holds. Rooms left empty are deleted.
    pub fn leave(&mut self, id: ConnectionId) -> Vec<Departure> {
        let mut departures = Vec::new();

        self.rooms.retain(|code, room| {
            let mut touched = false;
            for role in [Role::Sender, Role::Receiver] {
                let slot = room.slot_mut(role);
                if *slot == Some(id) {
                    *slot = None;
                    touched = true;
                }
            }
            if touched {
                departures.push(Departure {
                    code: code.clone(),
                    remaining: room.sender.or(room.receiver),
                });
            }
            !room.is_empty()
        });

        departures
    }

    /// The occupant on the other side of `id` in room `code`.
    pub fn peer_of(&self, code: &ShareCode, id: ConnectionId) -> Option<ConnectionId> {
        self.rooms.get(code)?.opposite_of(id)
    }

    pub fn room(&self, code: &ShareCode) -> Option<Room> {
        self.rooms.get(code).copied()
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }
}
