use std::io;

use peerbeam_transfer::TransferError;
use peerbeam_types::InvalidShareCode;

/// Failure reported by the peer-connection capability.
#[derive(Debug, Clone, thiserror::Error)]
pub enum NegotiationError {
    #[error("could not create session description: {0}")]
    Description(String),

    #[error("remote session description rejected: {0}")]
    RemoteDescription(String),

    #[error("connectivity candidate rejected: {0}")]
    Candidate(String),

    #[error("no local endpoint is open")]
    NoEndpoint,
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("file is {size} bytes, the limit is {max} bytes")]
    OversizedInput { size: u64, max: u64 },

    #[error("no file selected")]
    NoFileSelected,

    #[error(transparent)]
    InvalidCode(#[from] InvalidShareCode),

    #[error("a connection is already in progress, reset it first")]
    AlreadyActive,

    #[error("signaling server unavailable: {0}")]
    SignalingUnavailable(String),

    #[error("session has shut down")]
    SessionClosed,

    #[error(transparent)]
    Transfer(#[from] TransferError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}
