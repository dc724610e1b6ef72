use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::ops::Range;
use std::path::Path;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

/// Largest chunk handed to a sink in one call. The gzip stream interface takes
/// 32-bit signed lengths.
pub const MAX_CHUNK: u64 = i32::MAX as u64;

/// A compressed output stream that accepts the memory image chunk by chunk.
pub trait CheckpointSink {
    /// Returns the number of bytes the stream accepted.
    fn write_chunk(&mut self, chunk: &[u8]) -> io::Result<usize>;
    fn close(self: Box<Self>) -> io::Result<()>;
}

pub trait Compressor: std::fmt::Debug {
    fn create(&self, path: &Path) -> io::Result<Box<dyn CheckpointSink>>;
}

#[derive(Debug, Clone, Copy)]
pub struct GzipCompressor {
    level: u32,
}

impl Default for GzipCompressor {
    fn default() -> Self {
        Self::new(6)
    }
}

impl GzipCompressor {
    pub fn new(level: u32) -> Self {
        Self {
            level: level.min(9),
        }
    }
}

impl Compressor for GzipCompressor {
    fn create(&self, path: &Path) -> io::Result<Box<dyn CheckpointSink>> {
        let file = File::create(path)?;
        let encoder = GzEncoder::new(BufWriter::new(file), Compression::new(self.level));
        Ok(Box::new(GzipSink { encoder }))
    }
}

struct GzipSink {
    encoder: GzEncoder<BufWriter<File>>,
}

impl CheckpointSink for GzipSink {
    fn write_chunk(&mut self, chunk: &[u8]) -> io::Result<usize> {
        self.encoder.write_all(chunk)?;
        Ok(chunk.len())
    }

    fn close(self: Box<Self>) -> io::Result<()> {
        let writer = self.encoder.finish()?;
        let file = writer.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()
    }
}

pub fn open_gzip(path: &Path) -> io::Result<GzDecoder<BufReader<File>>> {
    Ok(GzDecoder::new(BufReader::new(File::open(path)?)))
}

/// Reads until `buf` is full or the reader is exhausted.
pub fn read_fully<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Splits `[0, total)` into consecutive spans no longer than [`MAX_CHUNK`].
pub fn chunk_spans(total: u64) -> ChunkSpans {
    ChunkSpans { next: 0, total }
}

#[derive(Debug, Clone)]
pub struct ChunkSpans {
    next: u64,
    total: u64,
}

impl Iterator for ChunkSpans {
    type Item = Range<u64>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.total {
            return None;
        }
        let pass = MAX_CHUNK.min(self.total - self.next);
        let span = self.next..self.next + pass;
        self.next += pass;
        Some(span)
    }
}
