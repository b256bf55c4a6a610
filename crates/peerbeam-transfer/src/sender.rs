use std::sync::Arc;
use std::time::Instant;

use bytes::{BufMut, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use crate::channel::Frame;
use crate::error::TransferError;
use crate::logging::{TransferEvent, TransferLog, TransferLogger};
use crate::progress::{ProgressReport, ProgressTracker};
use crate::protocol::{CHUNK_HEADER, CHUNK_SIZE, ControlFrame, FileMeta, chunk_count};

const COMPONENT: &str = "sender";

pub struct SenderConfig {
    pub meta: FileMeta,
    pub logger: Option<Arc<dyn TransferLogger>>,
}

impl SenderConfig {
    pub fn new(meta: FileMeta) -> Self {
        Self { meta, logger: None }
    }

    pub fn with_logger(mut self, logger: Arc<dyn TransferLogger>) -> Self {
        self.logger = Some(logger);
        self
    }

    fn log(&self, event: TransferEvent) {
        if let Some(logger) = &self.logger {
            logger.log(TransferLog {
                component: COMPONENT,
                file_name: self.meta.name.clone(),
                event,
            });
        }
    }
}

/// Stream one file over `outbound`: `file-info`, the chunks in order, then
/// `file-complete`. Returns the number of payload bytes sent.
///
/// Each chunk is fully handed to the channel before the next read starts,
/// so a full outbound queue stops reads from `reader` too.
pub async fn run_sender<R>(
    config: SenderConfig,
    mut reader: R,
    outbound: &mpsc::Sender<Frame>,
    progress: &watch::Sender<ProgressReport>,
    cancel: &CancellationToken,
) -> Result<u64, TransferError>
where
    R: AsyncRead + Unpin,
{
    let total_size = config.meta.size;
    let chunks = chunk_count(total_size);

    let info = ControlFrame::from(&config.meta).to_json()?;
    send(outbound, Frame::Text(info), cancel).await?;

    let start_time = Instant::now();
    let mut tracker = ProgressTracker::new(total_size, start_time);
    progress.send_replace(tracker.report_at(start_time));
    config.log(TransferEvent::Started { size: total_size, chunks });

    let mut chunk_index: u32 = 0;
    while tracker.bytes_moved() < total_size {
        let remaining = total_size - tracker.bytes_moved();
        let len = remaining.min(CHUNK_SIZE as u64) as usize;

        let mut buf = BytesMut::with_capacity(CHUNK_HEADER + len);
        buf.put_u32(chunk_index);
        buf.resize(CHUNK_HEADER + len, 0);

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(TransferError::Cancelled),
            read = reader.read_exact(&mut buf[CHUNK_HEADER..]) => {
                read?;
            }
        }

        send(outbound, Frame::Binary(buf.freeze()), cancel).await?;
        config.log(TransferEvent::ChunkSent { chunk_idx: chunk_index, len });

        tracker.advance(len as u64);
        progress.send_replace(tracker.report());
        chunk_index = chunk_index.wrapping_add(1);
    }

    let done = ControlFrame::FileComplete.to_json()?;
    send(outbound, Frame::Text(done), cancel).await?;

    progress.send_replace(tracker.complete());
    config.log(TransferEvent::Completed {
        bytes: tracker.bytes_moved(),
        duration_ms: start_time.elapsed().as_millis() as u64,
    });

    Ok(tracker.bytes_moved())
}

/// Queue one frame, suspending while the in-flight window is full.
async fn send(
    outbound: &mpsc::Sender<Frame>,
    frame: Frame,
    cancel: &CancellationToken,
) -> Result<(), TransferError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(TransferError::Cancelled),
        sent = outbound.send(frame) => sent.map_err(|_| TransferError::ChannelLost),
    }
}
