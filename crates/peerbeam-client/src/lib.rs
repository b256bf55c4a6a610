/// PeerBeam client: pairs with a peer through the signaling relay, negotiates
/// a direct channel, then hands it to the transfer engine.
///
/// - `negotiator`: pure offer/answer/candidate state machine
/// - `connector`: seam to the peer-connection capability (`loopback` is an
///   in-memory implementation)
/// - `signaling`: relay WebSocket client
/// - `session`: the actor that wires all of the above to a UI

pub mod config;
pub mod connector;
pub mod error;
pub mod loopback;
pub mod negotiator;
pub mod session;
pub mod signaling;

pub use config::ClientConfig;
pub use connector::{ConnectorEvent, PeerConnector};
pub use error::{NegotiationError, SessionError};
pub use loopback::{LoopbackConnector, LoopbackHub};
pub use negotiator::{Effect, Input, NegotiationState, Negotiator};
pub use session::{
    SelectedFile, Session, SessionHandle, SessionView, SinkFactory, disk_sinks, memory_sinks, sinks_for,
};
pub use signaling::SignalingLink;
