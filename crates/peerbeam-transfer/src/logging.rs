/// Transfer logging trait for structured lifecycle logs.
///
/// Sender and receiver report what happened to a transfer through a
/// `TransferLogger`, so an embedding application can route these somewhere
/// other than the process log.

use std::fmt;

/// Structured log entry for a transfer operation.
#[derive(Debug, Clone)]
pub struct TransferLog {
    pub component: &'static str,
    pub file_name: String,
    pub event: TransferEvent,
}

/// Transfer events that can be logged.
#[derive(Debug, Clone)]
pub enum TransferEvent {
    /// Sender or receiver: metadata exchanged, clock started
    Started { size: u64, chunks: u64 },
    /// Sender: chunk handed to the transport
    ChunkSent { chunk_idx: u32, len: usize },
    /// Receiver: chunk appended to the sink
    ChunkReceived { chunk_idx: u32, len: usize },
    /// All bytes moved and end marker handled
    Completed { bytes: u64, duration_ms: u64 },
    /// Receiver: a new file-info replaced an unfinished transfer
    StaleDiscarded { bytes: u64 },
    /// Receiver: frame dropped without touching transfer state
    FrameRejected { reason: String },
    /// Transfer abandoned, partial data discarded
    Aborted { reason: String },
}

impl fmt::Display for TransferEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Started { size, chunks } => write!(f, "started size={} chunks={}", size, chunks),
            Self::ChunkSent { chunk_idx, len } => write!(f, "chunk_sent idx={} len={}", chunk_idx, len),
            Self::ChunkReceived { chunk_idx, len } => {
                write!(f, "chunk_received idx={} len={}", chunk_idx, len)
            }
            Self::Completed { bytes, duration_ms } => {
                write!(f, "completed bytes={} duration_ms={}", bytes, duration_ms)
            }
            Self::StaleDiscarded { bytes } => write!(f, "stale_discarded bytes={}", bytes),
            Self::FrameRejected { reason } => write!(f, "frame_rejected: {}", reason),
            Self::Aborted { reason } => write!(f, "aborted: {}", reason),
        }
    }
}

/// Trait for transfer logging. Implementations can forward logs elsewhere,
/// write to tracing, or discard them.
pub trait TransferLogger: Send + Sync {
    fn log(&self, entry: TransferLog);
}

/// Logger that uses the `tracing` crate.
pub struct TracingLogger;

impl TransferLogger for TracingLogger {
    fn log(&self, entry: TransferLog) {
        // Per-chunk events go to debug, everything else to info
        match &entry.event {
            TransferEvent::ChunkSent { .. } | TransferEvent::ChunkReceived { .. } => {
                tracing::debug!(
                    component = entry.component,
                    file = %entry.file_name,
                    "{}",
                    entry.event,
                );
            }
            TransferEvent::FrameRejected { .. } | TransferEvent::Aborted { .. } => {
                tracing::warn!(
                    component = entry.component,
                    file = %entry.file_name,
                    "{}",
                    entry.event,
                );
            }
            _ => {
                tracing::info!(
                    component = entry.component,
                    file = %entry.file_name,
                    "{}",
                    entry.event,
                );
            }
        }
    }
}

/// No-op logger that discards all log entries.
pub struct NullLogger;

impl TransferLogger for NullLogger {
    fn log(&self, _entry: TransferLog) {}
}
