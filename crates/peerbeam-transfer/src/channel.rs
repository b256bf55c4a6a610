use bytes::Bytes;
use tokio::sync::mpsc;

/// One message on the direct channel. Text vs binary is decided by the
/// transport, not by a header byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Bytes),
}

/// Local end of an open direct channel.
///
/// `outbound` is bounded: once `window` frames are queued and not yet taken
/// by the transport, `send().await` suspends the sender. Dropping either
/// half signals channel loss to the other side.
#[derive(Debug)]
pub struct DirectChannel {
    pub outbound: mpsc::Sender<Frame>,
    pub inbound: mpsc::Receiver<Frame>,
}

impl DirectChannel {
    /// Two cross-connected in-memory ends.
    pub fn pair(window: usize) -> (Self, Self) {
        let window = window.max(1);
        let (a_tx, b_rx) = mpsc::channel(window);
        let (b_tx, a_rx) = mpsc::channel(window);
        (
            Self {
                outbound: a_tx,
                inbound: a_rx,
            },
            Self {
                outbound: b_tx,
                inbound: b_rx,
            },
        )
    }

    pub fn into_split(self) -> (mpsc::Sender<Frame>, mpsc::Receiver<Frame>) {
        (self.outbound, self.inbound)
    }
}
