use std::io;

#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("file is {size} bytes, the limit is {max} bytes")]
    OversizedInput { size: u64, max: u64 },

    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    #[error("chunk {0} arrived before any file-info")]
    UnexpectedChunk(u32),

    #[error("chunk {got} arrived, expected chunk {expected}")]
    OutOfOrder { expected: u32, got: u32 },

    #[error("received {received} bytes, more than the advertised {expected}")]
    Overrun { expected: u64, received: u64 },

    #[error("file-complete after {received} of {expected} bytes")]
    Truncated { expected: u64, received: u64 },

    #[error("direct channel closed")]
    ChannelLost,

    #[error("transfer cancelled")]
    Cancelled,

    #[error("frame encoding failed: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl TransferError {
    /// The offending frame is dropped; whatever transfer is in progress keeps going.
    pub fn is_frame_local(&self) -> bool {
        matches!(self, Self::MalformedFrame(_) | Self::UnexpectedChunk(_))
    }
}
