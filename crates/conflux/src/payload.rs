//! Payload sources: byte-producing origins for request bodies.
//!
//! A payload source exposes its content type, length (if known), a stable
//! content fingerprint used in request de-duplication, and a chunked write
//! operation with progress callbacks.

use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use bytes::Bytes;
use sha2::{Digest, Sha256};

/// Default chunk size for streaming payload writes.
pub const DEFAULT_CHUNK_SIZE: usize = 8 * 1024;

/// Progress callback invoked per written chunk with
/// `(bytes_written, total_bytes)`; total is `None` when unknown.
pub type WriteProgress<'a> = &'a mut dyn FnMut(u64, Option<u64>);

/// A byte-producing origin for a request body.
pub trait PayloadSource: Send {
    /// The payload's content type.
    fn content_type(&self) -> &str;

    /// The payload's length in bytes, or `None` if unknown.
    fn content_length(&self) -> Option<u64>;

    /// A stable fingerprint of the payload's content, used in request
    /// de-duplication keys.
    fn hash(&self) -> String;

    /// Write the payload to `sink`, invoking `progress` per chunk.
    /// Returns the number of bytes written.
    fn write_to(&mut self, sink: &mut dyn Write, progress: WriteProgress<'_>)
        -> std::io::Result<u64>;

    /// Release any resources held by the source.
    fn close(&mut self) {}
}

/// An in-memory payload.
pub struct BytesPayload {
    bytes: Bytes,
    content_type: String,
    chunk_size: usize,
}

impl BytesPayload {
    /// Create a payload from bytes with the given content type.
    pub fn new(bytes: impl Into<Bytes>, content_type: impl Into<String>) -> Self {
        Self {
            bytes: bytes.into(),
            content_type: content_type.into(),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Override the chunk size used for progress granularity.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }
}

impl PayloadSource for BytesPayload {
    fn content_type(&self) -> &str {
        &self.content_type
    }

    fn content_length(&self) -> Option<u64> {
        Some(self.bytes.len() as u64)
    }

    fn hash(&self) -> String {
        hex::encode(Sha256::digest(&self.bytes))
    }

    fn write_to(
        &mut self,
        sink: &mut dyn Write,
        progress: WriteProgress<'_>,
    ) -> std::io::Result<u64> {
        let total = self.bytes.len() as u64;
        let mut written = 0u64;
        for chunk in self.bytes.chunks(self.chunk_size) {
            sink.write_all(chunk)?;
            written += chunk.len() as u64;
            progress(written, Some(total));
        }
        Ok(written)
    }
}

impl std::fmt::Debug for BytesPayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BytesPayload")
            .field("content_type", &self.content_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// A payload streamed from a file.
pub struct FilePayload {
    path: PathBuf,
    content_type: String,
    chunk_size: usize,
}

impl FilePayload {
    /// Create a payload streaming the file at `path`.
    pub fn new(path: impl AsRef<Path>, content_type: impl Into<String>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            content_type: content_type.into(),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Override the chunk size used for reads and progress granularity.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// The file path backing this payload.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PayloadSource for FilePayload {
    fn content_type(&self) -> &str {
        &self.content_type
    }

    fn content_length(&self) -> Option<u64> {
        std::fs::metadata(&self.path).ok().map(|meta| meta.len())
    }

    fn hash(&self) -> String {
        // Path + length + mtime is a stable fingerprint without reading
        // the whole file.
        let mut hasher = Sha256::new();
        hasher.update(self.path.to_string_lossy().as_bytes());
        if let Ok(meta) = std::fs::metadata(&self.path) {
            hasher.update(meta.len().to_le_bytes());
            if let Ok(mtime) = meta.modified() {
                let stamp = mtime
                    .duration_since(UNIX_EPOCH)
                    .map(|d| d.as_nanos())
                    .unwrap_or(0);
                hasher.update(stamp.to_le_bytes());
            }
        }
        hex::encode(hasher.finalize())
    }

    fn write_to(
        &mut self,
        sink: &mut dyn Write,
        progress: WriteProgress<'_>,
    ) -> std::io::Result<u64> {
        let total = self.content_length();
        let mut file = File::open(&self.path)?;
        let mut buffer = vec![0u8; self.chunk_size];
        let mut written = 0u64;
        loop {
            let read = file.read(&mut buffer)?;
            if read == 0 {
                break;
            }
            sink.write_all(&buffer[..read])?;
            written += read as u64;
            progress(written, total);
        }
        Ok(written)
    }
}

impl std::fmt::Debug for FilePayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilePayload")
            .field("path", &self.path)
            .field("content_type", &self.content_type)
            .finish()
    }
}
