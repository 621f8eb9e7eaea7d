//! Destination for received segment payloads.
//!
//! The transfer client only knows this interface; the CLI plugs in a file
//! writer, the tests an in-memory buffer.

use std::fs::File;
use std::io;
use std::os::unix::fs::FileExt;
use std::path::Path;

/// Consumes segment payloads as they arrive, in any order.
pub trait ContentSink: Send {
    fn write_segment(&mut self, segment: u64, payload: &[u8]) -> io::Result<()>;
}

/// Writes each segment at its file offset.
pub struct FileSink {
    file: File,
    segment_size: u64,
}

impl FileSink {
    pub fn create(path: impl AsRef<Path>, segment_size: u64) -> io::Result<Self> {
        Ok(Self {
            file: File::create(path)?,
            segment_size,
        })
    }
}

impl ContentSink for FileSink {
    fn write_segment(&mut self, segment: u64, payload: &[u8]) -> io::Result<()> {
        self.file.write_all_at(payload, segment * self.segment_size)
    }
}

/// Discards everything; used when only transfer statistics matter.
#[derive(Debug, Default)]
pub struct NullSink;

impl ContentSink for NullSink {
    fn write_segment(&mut self, _segment: u64, _payload: &[u8]) -> io::Result<()> {
        Ok(())
    }
}

/// Collects segments into one contiguous buffer.
#[derive(Debug)]
pub struct MemorySink {
    segment_size: u64,
    buffer: Vec<u8>,
}

impl MemorySink {
    pub fn new(segment_size: u64) -> Self {
        Self {
            segment_size,
            buffer: Vec::new(),
        }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }

    pub fn bytes(&self) -> &[u8] {
        &self.buffer
    }
}

impl ContentSink for MemorySink {
    fn write_segment(&mut self, segment: u64, payload: &[u8]) -> io::Result<()> {
        let offset = (segment * self.segment_size) as usize;
        let end = offset + payload.len();
        if self.buffer.len() < end {
            self.buffer.resize(end, 0);
        }
        self.buffer[offset..end].copy_from_slice(payload);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_sink_accepts_out_of_order_segments() {
        let mut sink = MemorySink::new(4);
        sink.write_segment(1, b"BBBB").unwrap();
        sink.write_segment(0, b"AAAA").unwrap();
        sink.write_segment(2, b"C").unwrap();

        assert_eq!(sink.bytes(), b"AAAABBBBC");
    }

    #[test]
    fn file_sink_writes_at_offsets() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.bin");

        let mut sink = FileSink::create(&path, 4).unwrap();
        sink.write_segment(1, b"3456").unwrap();
        sink.write_segment(0, b"012").unwrap();
        drop(sink);

        let written = std::fs::read(&path).unwrap();
        assert_eq!(&written[..3], b"012");
        assert_eq!(&written[4..8], b"3456");
    }
}
