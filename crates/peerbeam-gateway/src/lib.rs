/// PeerBeam signaling gateway.
///
/// Pairs a sender and a receiver under a share code and forwards their
/// connection-negotiation messages to each other. The relay never looks
/// inside offers, answers or candidates.
///
/// - `registry`: share code -> room slots, pure data
/// - `relay`: per-connection routing on top of the registry
/// - `connection`: the WebSocket loop that feeds the relay

pub mod connection;
pub mod registry;
pub mod relay;

pub use registry::{ConnectionId, Departure, JoinRejected, RejoinPolicy, Room, RoomRegistry};
pub use relay::Relay;
