use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use peerbeam_transfer::DirectChannel;
use peerbeam_types::Role;

use crate::error::NegotiationError;

/// Signals the peer-connection capability raises on its own schedule.
#[derive(Debug)]
pub enum ConnectorEvent {
    /// A locally discovered connectivity candidate, to be relayed.
    LocalCandidate(Value),
    /// The direct channel is up.
    ChannelOpen(DirectChannel),
    /// The direct channel went down or failed.
    ChannelClosed,
}

/// Seam to whatever actually builds the direct peer connection.
///
/// Offers, answers and candidates are opaque values; the session only
/// carries them between this trait and the relay.
#[async_trait]
pub trait PeerConnector: Send + 'static {
    /// Create the local endpoint for `role`. Later events for it go to `events`.
    async fn open(
        &mut self,
        role: Role,
        events: mpsc::UnboundedSender<ConnectorEvent>,
    ) -> Result<(), NegotiationError>;

    async fn create_offer(&mut self) -> Result<Value, NegotiationError>;

    /// Apply the remote offer and return the answer to send back.
    async fn accept_offer(&mut self, offer: Value) -> Result<Value, NegotiationError>;

    async fn apply_answer(&mut self, answer: Value) -> Result<(), NegotiationError>;

    async fn add_remote_candidate(&mut self, candidate: Value) -> Result<(), NegotiationError>;

    /// Drop the endpoint. Safe to call when nothing is open.
    async fn close(&mut self);
}
