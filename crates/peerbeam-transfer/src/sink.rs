use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use bytes::Bytes;

use crate::protocol::FileMeta;

/// In-memory buffers are pre-sized up to this much; larger files grow on demand.
const MAX_PRESIZE: u64 = 64 * 1024 * 1024;

/// Where a finished file ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Memory(Bytes),
    Disk(PathBuf),
}

/// A fully received file, ready for the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedFile {
    pub meta: FileMeta,
    pub payload: Payload,
}

impl ReceivedFile {
    /// In-memory content, if this file was received into memory.
    pub fn bytes(&self) -> Option<&Bytes> {
        match &self.payload {
            Payload::Memory(bytes) => Some(bytes),
            Payload::Disk(_) => None,
        }
    }
}

/// Final storage for received chunks. One file at a time: `begin`, any
/// number of `append`s, then exactly one of `commit` or `discard`.
pub trait PayloadSink: Send {
    fn begin(&mut self, meta: &FileMeta) -> io::Result<()>;
    fn append(&mut self, chunk: &[u8]) -> io::Result<()>;
    fn commit(&mut self) -> io::Result<Payload>;
    /// Drop partial data. Must be safe to call with nothing in progress.
    fn discard(&mut self);

    /// `append` and `commit` do blocking I/O and must stay off the async
    /// workers.
    fn blocking(&self) -> bool {
        false
    }
}

impl<S: PayloadSink + ?Sized> PayloadSink for Box<S> {
    fn begin(&mut self, meta: &FileMeta) -> io::Result<()> {
        (**self).begin(meta)
    }

    fn append(&mut self, chunk: &[u8]) -> io::Result<()> {
        (**self).append(chunk)
    }

    fn commit(&mut self) -> io::Result<Payload> {
        (**self).commit()
    }

    fn discard(&mut self) {
        (**self).discard()
    }

    fn blocking(&self) -> bool {
        (**self).blocking()
    }
}

/// Collects the file in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    buf: Vec<u8>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PayloadSink for MemorySink {
    fn begin(&mut self, meta: &FileMeta) -> io::Result<()> {
        self.buf = Vec::with_capacity(meta.size.min(MAX_PRESIZE) as usize);
        Ok(())
    }

    fn append(&mut self, chunk: &[u8]) -> io::Result<()> {
        self.buf.extend_from_slice(chunk);
        Ok(())
    }

    fn commit(&mut self) -> io::Result<Payload> {
        Ok(Payload::Memory(Bytes::from(std::mem::take(&mut self.buf))))
    }

    fn discard(&mut self) {
        self.buf = Vec::new();
    }
}

/// Streams the file into `<dir>/<name>.part` and renames it on commit.
#[derive(Debug)]
pub struct DiskSink {
    dir: PathBuf,
    current: Option<PartFile>,
}

#[derive(Debug)]
struct PartFile {
    file: File,
    part_path: PathBuf,
    name: String,
}

impl DiskSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            current: None,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl PayloadSink for DiskSink {
    fn begin(&mut self, meta: &FileMeta) -> io::Result<()> {
        self.discard();
        fs::create_dir_all(&self.dir)?;

        let name = safe_file_name(&meta.name);
        let part_path = self.dir.join(format!("{name}.part"));
        let file = File::create(&part_path)?;
        self.current = Some(PartFile { file, part_path, name });
        Ok(())
    }

    fn append(&mut self, chunk: &[u8]) -> io::Result<()> {
        let part = self
            .current
            .as_mut()
            .ok_or_else(|| io::Error::other("append without begin"))?;
        part.file.write_all(chunk)
    }

    fn commit(&mut self) -> io::Result<Payload> {
        let part = self
            .current
            .take()
            .ok_or_else(|| io::Error::other("commit without begin"))?;
        part.file.sync_all()?;
        drop(part.file);

        let final_path = unique_path(&self.dir, &part.name);
        fs::rename(&part.part_path, &final_path)?;
        Ok(Payload::Disk(final_path))
    }

    fn discard(&mut self) {
        if let Some(part) = self.current.take() {
            drop(part.file);
            let _ = fs::remove_file(&part.part_path);
        }
    }

    fn blocking(&self) -> bool {
        true
    }
}

impl Drop for DiskSink {
    fn drop(&mut self) {
        self.discard();
    }
}

/// Reduce a peer-supplied name to a bare file name.
pub fn safe_file_name(name: &str) -> String {
    let normalized = name.replace('\\', "/");
    match Path::new(&normalized).file_name().and_then(|n| n.to_str()) {
        Some(n) if !n.trim().is_empty() => n.to_string(),
        _ => "download".to_string(),
    }
}

/// `dir/name`, or `dir/stem (n).ext` if that already exists.
fn unique_path(dir: &Path, name: &str) -> PathBuf {
    let candidate = dir.join(name);
    if !candidate.exists() {
        return candidate;
    }

    let path = Path::new(name);
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or(name);
    let ext = path.extension().and_then(|e| e.to_str());
    for n in 1.. {
        let file_name = match ext {
            Some(ext) => format!("{stem} ({n}).{ext}"),
            None => format!("{stem} ({n})"),
        };
        let candidate = dir.join(file_name);
        if !candidate.exists() {
            return candidate;
        }
    }
    unreachable!("u32 range exhausted looking for a free file name")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(name: &str, size: u64) -> FileMeta {
        FileMeta {
            name: name.into(),
            size,
            mime_type: "application/octet-stream".into(),
        }
    }

    fn temp_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("peerbeam_sink_{}_{}", tag, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn test_safe_file_name() {
        assert_eq!(safe_file_name("report.pdf"), "report.pdf");
        assert_eq!(safe_file_name("../../etc/passwd"), "passwd");
        assert_eq!(safe_file_name("C:\\Users\\me\\photo.jpg"), "photo.jpg");
        assert_eq!(safe_file_name(".."), "download");
        assert_eq!(safe_file_name(""), "download");
    }

    #[test]
    fn test_memory_sink() {
        let mut sink = MemorySink::new();
        sink.begin(&meta("a.bin", 6)).unwrap();
        sink.append(b"abc").unwrap();
        sink.append(b"def").unwrap();
        assert_eq!(sink.commit().unwrap(), Payload::Memory(Bytes::from_static(b"abcdef")));

        sink.begin(&meta("b.bin", 3)).unwrap();
        sink.append(b"xyz").unwrap();
        sink.discard();
        sink.begin(&meta("c.bin", 0)).unwrap();
        assert_eq!(sink.commit().unwrap(), Payload::Memory(Bytes::new()));
    }

    #[test]
    fn test_disk_sink_commit_and_collision() {
        let dir = temp_dir("commit");
        let mut sink = DiskSink::new(&dir);

        sink.begin(&meta("notes.txt", 5)).unwrap();
        sink.append(b"hello").unwrap();
        let first = sink.commit().unwrap();
        assert_eq!(first, Payload::Disk(dir.join("notes.txt")));
        assert_eq!(fs::read(dir.join("notes.txt")).unwrap(), b"hello");

        sink.begin(&meta("notes.txt", 5)).unwrap();
        sink.append(b"again").unwrap();
        assert_eq!(sink.commit().unwrap(), Payload::Disk(dir.join("notes (1).txt")));

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_disk_sink_discard_removes_part_file() {
        let dir = temp_dir("discard");
        let mut sink = DiskSink::new(&dir);

        sink.begin(&meta("big.iso", 10)).unwrap();
        sink.append(b"12345").unwrap();
        assert!(dir.join("big.iso.part").exists());
        sink.discard();
        assert!(!dir.join("big.iso.part").exists());
        assert!(!dir.join("big.iso").exists());

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_only_disk_sink_blocks() {
        assert!(DiskSink::new(temp_dir("blocks")).blocking());
        assert!(!MemorySink::new().blocking());
        let boxed: Box<dyn PayloadSink> = Box::new(DiskSink::new(temp_dir("boxed")));
        assert!(boxed.blocking());
    }

    #[test]
    fn test_disk_sink_append_without_begin() {
        let mut sink = DiskSink::new(temp_dir("nobegin"));
        assert!(sink.append(b"x").is_err());
        assert!(sink.commit().is_err());
    }
}
