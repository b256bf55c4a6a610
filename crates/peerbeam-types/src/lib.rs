/// Types shared by the PeerBeam relay and its clients.
///
/// - `code`: share codes that name a rendezvous room
/// - `events`: the JSON messages exchanged with the signaling relay

pub mod code;
pub mod events;

pub use code::{InvalidShareCode, ShareCode};
pub use events::{ClientMessage, Role, ServerMessage};
