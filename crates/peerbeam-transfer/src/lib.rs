/// PeerBeam transfer engine: streams one file at a time over an already
/// established direct channel.
///
/// - Text frames carry JSON control messages (`file-info`, `file-complete`)
/// - Binary frames carry `[chunk index u32 BE][up to 1 MiB of payload]`
/// - The bounded outbound queue of the channel is the in-flight window
/// - The receiver streams chunks into a `PayloadSink` and rejects gaps,
///   repeats and overruns instead of accumulating them
/// - Progress and ETA are published on a `watch` channel

pub mod channel;
pub mod error;
pub mod logging;
pub mod progress;
pub mod protocol;
pub mod receiver;
pub mod sender;
pub mod sink;

// Re-export key types for convenience.
pub use channel::{DirectChannel, Frame};
pub use error::TransferError;
pub use logging::{NullLogger, TracingLogger, TransferEvent, TransferLog, TransferLogger};
pub use progress::{Eta, ProgressReport, ProgressTracker};
pub use protocol::{
    CHUNK_HEADER, CHUNK_SIZE, ControlFrame, DEFAULT_MAX_FILE_SIZE, DEFAULT_SEND_WINDOW, FileMeta,
    check_size, chunk_count, decode_chunk, encode_chunk,
};
pub use receiver::{Assembler, ReceiverConfig, ReceiverEvent, Step, run_receiver};
pub use sender::{SenderConfig, run_sender};
pub use sink::{DiskSink, MemorySink, Payload, PayloadSink, ReceivedFile};
