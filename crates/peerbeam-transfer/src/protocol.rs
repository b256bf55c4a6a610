/// Direct-channel frame formats.
///
/// Control frame (text, JSON):
/// ```text
/// {"type":"file-info","name":"a.pdf","size":3145728,"fileType":"application/pdf"}
/// {"type":"file-complete"}
/// ```
///
/// Chunk frame (binary):
/// ```text
/// [0..4]   Chunk index (u32 BE), starts at 0, +1 per chunk
/// [4..]    Payload: CHUNK_SIZE bytes, last chunk may be shorter
/// ```

use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use crate::error::TransferError;

/// Payload bytes per chunk frame (1 MiB).
pub const CHUNK_SIZE: usize = 1024 * 1024;

/// Chunk frame header size in bytes.
pub const CHUNK_HEADER: usize = 4;

/// Largest file accepted by default (1 GiB).
pub const DEFAULT_MAX_FILE_SIZE: u64 = 1024 * 1024 * 1024;

/// Chunks the sender may queue ahead of the transport by default.
pub const DEFAULT_SEND_WINDOW: usize = 8;

/// Metadata announced before the first chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMeta {
    pub name: String,
    pub size: u64,
    pub mime_type: String,
}

/// Text frames on the direct channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ControlFrame {
    FileInfo {
        name: String,
        size: u64,
        file_type: String,
    },
    FileComplete,
}

impl ControlFrame {
    pub fn parse(text: &str) -> Result<Self, TransferError> {
        serde_json::from_str(text).map_err(|e| TransferError::MalformedFrame(e.to_string()))
    }

    pub fn to_json(&self) -> Result<String, TransferError> {
        Ok(serde_json::to_string(self)?)
    }
}

impl From<&FileMeta> for ControlFrame {
    fn from(meta: &FileMeta) -> Self {
        Self::FileInfo {
            name: meta.name.clone(),
            size: meta.size,
            file_type: meta.mime_type.clone(),
        }
    }
}

/// Build a chunk frame.
pub fn encode_chunk(chunk_index: u32, payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(CHUNK_HEADER + payload.len());
    buf.put_u32(chunk_index);
    buf.put_slice(payload);
    buf.freeze()
}

/// Split a chunk frame into its index and payload (zero-copy).
pub fn decode_chunk(frame: &Bytes) -> Result<(u32, Bytes), TransferError> {
    if frame.len() < CHUNK_HEADER {
        return Err(TransferError::MalformedFrame(format!(
            "binary frame of {} bytes has no chunk header",
            frame.len()
        )));
    }
    let mut index = [0u8; CHUNK_HEADER];
    index.copy_from_slice(&frame[..CHUNK_HEADER]);
    Ok((u32::from_be_bytes(index), frame.slice(CHUNK_HEADER..)))
}

/// Number of chunk frames a file of `size` bytes is split into.
pub fn chunk_count(size: u64) -> u64 {
    size.div_ceil(CHUNK_SIZE as u64)
}

/// Reject inputs above the configured ceiling.
pub fn check_size(size: u64, max: u64) -> Result<(), TransferError> {
    if size > max {
        return Err(TransferError::OversizedInput { size, max });
    }
    Ok(())
}
