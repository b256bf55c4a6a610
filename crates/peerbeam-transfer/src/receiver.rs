use std::io;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use crate::channel::Frame;
use crate::error::TransferError;
use crate::logging::{TransferEvent, TransferLog, TransferLogger};
use crate::progress::{ProgressReport, ProgressTracker};
use crate::protocol::{ControlFrame, DEFAULT_MAX_FILE_SIZE, FileMeta, check_size, chunk_count, decode_chunk};
use crate::sink::{PayloadSink, ReceivedFile};

const COMPONENT: &str = "receiver";

#[derive(Clone)]
pub struct ReceiverConfig {
    pub max_file_size: u64,
    pub logger: Option<Arc<dyn TransferLogger>>,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            logger: None,
        }
    }
}

impl ReceiverConfig {
    pub fn with_logger(mut self, logger: Arc<dyn TransferLogger>) -> Self {
        self.logger = Some(logger);
        self
    }
}

/// What one frame did to the receiver.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    Started(FileMeta),
    Progress(ProgressReport),
    Completed { file: ReceivedFile, report: ProgressReport },
}

/// Emitted by `run_receiver` for the layer above.
#[derive(Debug, Clone, PartialEq)]
pub enum ReceiverEvent {
    Started(FileMeta),
    Delivered(ReceivedFile),
    Aborted { name: Option<String>, reason: String },
}

struct Active {
    meta: FileMeta,
    tracker: ProgressTracker,
    next_index: u32,
}

/// Receiver state machine. Feeds chunks into the sink in order and hands
/// back the finished file on `file-complete`. Never holds more than one
/// transfer; anything that breaks ordering or size aborts it.
pub struct Assembler<S> {
    config: ReceiverConfig,
    sink: S,
    current: Option<Active>,
    last_file_name: Option<String>,
}

impl<S: PayloadSink> Assembler<S> {
    pub fn new(config: ReceiverConfig, sink: S) -> Self {
        Self {
            config,
            sink,
            current: None,
            last_file_name: None,
        }
    }

    pub fn is_receiving(&self) -> bool {
        self.current.is_some()
    }

    /// Name from the most recent `file-info`, accepted or not.
    pub fn last_file_name(&self) -> Option<&str> {
        self.last_file_name.as_deref()
    }

    pub fn handle(&mut self, frame: Frame, now: Instant) -> Result<Step, TransferError> {
        let result = self.dispatch(frame, now);

        if let Err(e) = &result {
            if e.is_frame_local() {
                self.log(TransferEvent::FrameRejected { reason: e.to_string() });
            } else if self.current.is_some() {
                self.abort(&e.to_string());
            }
        }
        result
    }

    /// Abandon the transfer in progress, if any, and drop its partial data.
    pub fn abort(&mut self, reason: &str) {
        if self.current.take().is_some() {
            self.sink.discard();
            self.log(TransferEvent::Aborted { reason: reason.to_string() });
        }
    }

    fn dispatch(&mut self, frame: Frame, now: Instant) -> Result<Step, TransferError> {
        match frame {
            Frame::Text(text) => match ControlFrame::parse(&text)? {
                ControlFrame::FileInfo { name, size, file_type } => self.on_file_info(
                    FileMeta {
                        name,
                        size,
                        mime_type: file_type,
                    },
                    now,
                ),
                ControlFrame::FileComplete => self.on_file_complete(),
            },
            Frame::Binary(bytes) => {
                let (index, payload) = decode_chunk(&bytes)?;
                self.on_chunk(index, &payload, now)
            }
        }
    }

    fn on_file_info(&mut self, meta: FileMeta, now: Instant) -> Result<Step, TransferError> {
        if let Some(stale) = self.current.take() {
            self.sink.discard();
            self.log(TransferEvent::StaleDiscarded {
                bytes: stale.tracker.bytes_moved(),
            });
        }
        self.last_file_name = Some(meta.name.clone());

        if let Err(e) = check_size(meta.size, self.config.max_file_size) {
            self.log(TransferEvent::Aborted { reason: e.to_string() });
            return Err(e);
        }

        self.sink.begin(&meta)?;
        self.current = Some(Active {
            meta: meta.clone(),
            tracker: ProgressTracker::new(meta.size, now),
            next_index: 0,
        });
        self.log(TransferEvent::Started {
            size: meta.size,
            chunks: chunk_count(meta.size),
        });
        Ok(Step::Started(meta))
    }

    fn on_chunk(&mut self, index: u32, payload: &[u8], now: Instant) -> Result<Step, TransferError> {
        let active = self.current.as_mut().ok_or(TransferError::UnexpectedChunk(index))?;

        if index != active.next_index {
            return Err(TransferError::OutOfOrder {
                expected: active.next_index,
                got: index,
            });
        }
        let received = active.tracker.bytes_moved() + payload.len() as u64;
        if received > active.meta.size {
            return Err(TransferError::Overrun {
                expected: active.meta.size,
                received,
            });
        }

        self.sink.append(payload)?;
        active.tracker.advance(payload.len() as u64);
        active.next_index = active.next_index.wrapping_add(1);
        let report = active.tracker.report_at(now);

        self.log(TransferEvent::ChunkReceived {
            chunk_idx: index,
            len: payload.len(),
        });
        Ok(Step::Progress(report))
    }

    fn on_file_complete(&mut self) -> Result<Step, TransferError> {
        let active = self
            .current
            .as_ref()
            .ok_or_else(|| TransferError::MalformedFrame("file-complete without file-info".into()))?;

        let received = active.tracker.bytes_moved();
        if received != active.meta.size {
            return Err(TransferError::Truncated {
                expected: active.meta.size,
                received,
            });
        }

        let payload = self.sink.commit()?;
        let Some(active) = self.current.take() else {
            return Err(TransferError::MalformedFrame("file-complete without file-info".into()));
        };
        self.log(TransferEvent::Completed {
            bytes: received,
            duration_ms: active.tracker.elapsed_at(Instant::now()).as_millis() as u64,
        });

        Ok(Step::Completed {
            report: active.tracker.complete(),
            file: ReceivedFile {
                meta: active.meta,
                payload,
            },
        })
    }

    fn log(&self, event: TransferEvent) {
        if let Some(logger) = &self.config.logger {
            let file_name = match &self.current {
                Some(active) => active.meta.name.clone(),
                None => self.last_file_name.clone().unwrap_or_default(),
            };
            logger.log(TransferLog {
                component: COMPONENT,
                file_name,
                event,
            });
        }
    }
}

/// Receive files from `inbound` until the channel closes or `cancel` fires.
///
/// Every completed file goes out as `ReceiverEvent::Delivered`; transfers that
/// break the protocol are reported as `Aborted` and the loop keeps listening.
/// Returns how many files were delivered, or `ChannelLost`/`Cancelled` if the
/// loop ended with a transfer half done (its partial data is discarded).
///
/// Frames for a blocking sink are assembled on the blocking thread pool.
pub async fn run_receiver<S: PayloadSink + 'static>(
    config: ReceiverConfig,
    inbound: &mut mpsc::Receiver<Frame>,
    sink: S,
    events: &mpsc::UnboundedSender<ReceiverEvent>,
    progress: &watch::Sender<ProgressReport>,
    cancel: &CancellationToken,
) -> Result<usize, TransferError> {
    let mut assembler = Assembler::new(config, sink);
    let mut delivered = 0;

    loop {
        let frame = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return finish(&mut assembler, TransferError::Cancelled, delivered);
            }
            frame = inbound.recv() => match frame {
                Some(frame) => frame,
                None => return finish(&mut assembler, TransferError::ChannelLost, delivered),
            },
        };

        let now = Instant::now();
        let step = if assembler.sink.blocking() {
            let mut moved = assembler;
            let (back, step) = tokio::task::spawn_blocking(move || {
                let step = moved.handle(frame, now);
                (moved, step)
            })
            .await
            .map_err(|e| TransferError::Io(io::Error::other(e)))?;
            assembler = back;
            step
        } else {
            assembler.handle(frame, now)
        };

        match step {
            Ok(Step::Started(meta)) => {
                progress.send_replace(ProgressReport {
                    total_size: meta.size,
                    ..Default::default()
                });
                let _ = events.send(ReceiverEvent::Started(meta));
            }
            Ok(Step::Progress(report)) => {
                progress.send_replace(report);
            }
            Ok(Step::Completed { file, report }) => {
                progress.send_replace(report);
                delivered += 1;
                let _ = events.send(ReceiverEvent::Delivered(file));
            }
            // Already logged, transfer state untouched
            Err(e) if e.is_frame_local() => {}
            Err(e) => {
                let _ = events.send(ReceiverEvent::Aborted {
                    name: assembler.last_file_name().map(str::to_string),
                    reason: e.to_string(),
                });
            }
        }
    }
}

fn finish<S: PayloadSink>(
    assembler: &mut Assembler<S>,
    reason: TransferError,
    delivered: usize,
) -> Result<usize, TransferError> {
    if assembler.is_receiving() {
        assembler.abort(&reason.to_string());
        return Err(reason);
    }
    Ok(delivered)
}
