//! Named byte-stream store
//!
//! Every pipeline stage talks to intermediate data through a [`RecordStore`]
//! rather than a filesystem. A stream is an append-only byte buffer addressed
//! by name; it can be truncated, read at any offset and removed.
//!
//! Readers and writers are cursors ([`StreamReader`], [`StreamWriter`]) that
//! only borrow the store for the duration of a call, so one stage can read a
//! bucket while appending to several others.
//!
//! Two backends exist:
//! - [`MemoryStore`]: a map from name to buffer, fast and test friendly.
//! - [`DirStore`]: one file per stream under a directory, for inputs that do
//!   not fit in memory.

mod dir;
mod memory;

pub use dir::DirStore;
pub use memory::MemoryStore;

use std::fs::File;
use std::io::{BufWriter, SeekFrom, Write};
use std::path::Path;

use crate::constants::COPY_CHUNK_SIZE;
use crate::encoding::reverse_complement;
use crate::error::Result;

/// Backend holding named byte streams
pub trait RecordStore {
    /// Length of a stream in bytes, `None` if it does not exist
    fn stream_len(&mut self, name: &str) -> Result<Option<u64>>;

    /// Read up to `len` bytes starting at `offset` (fewer at end of stream)
    fn read_at(&mut self, name: &str, offset: u64, len: usize) -> Result<Vec<u8>>;

    /// Append bytes, creating the stream if needed
    fn append(&mut self, name: &str, bytes: &[u8]) -> Result<()>;

    /// Create the stream, or reset it to empty if it exists
    fn truncate(&mut self, name: &str) -> Result<()>;

    /// Delete a stream; deleting a missing stream is not an error
    fn remove(&mut self, name: &str) -> Result<()>;

    /// Delete every stream whose name starts with `prefix`
    fn clear_all(&mut self, prefix: &str) -> Result<()>;

    /// Names of all existing streams
    fn stream_names(&self) -> Vec<String>;

    /// True if the stream exists
    fn exists(&mut self, name: &str) -> Result<bool> {
        Ok(self.stream_len(name)?.is_some())
    }

    /// Open a stream for appending, keeping its content
    fn open_append(&mut self, name: &str) -> Result<StreamWriter>
    where
        Self: Sized,
    {
        if self.stream_len(name)?.is_none() {
            self.truncate(name)?;
        }
        Ok(StreamWriter::new(name))
    }

    /// Open a stream for writing, discarding its content
    fn open_truncate(&mut self, name: &str) -> Result<StreamWriter>
    where
        Self: Sized,
    {
        self.truncate(name)?;
        Ok(StreamWriter::new(name))
    }

    /// Open a stream for reading at offset 0, `None` if it does not exist
    fn open_read(&mut self, name: &str) -> Result<Option<StreamReader>>
    where
        Self: Sized,
    {
        Ok(self
            .stream_len(name)?
            .map(|len| StreamReader { name: name.to_string(), pos: 0, len }))
    }

    /// Stream the content of `name` into a real file at `path`.
    ///
    /// Returns `false` (and writes nothing) if the stream does not exist.
    fn export(&mut self, name: &str, path: &Path) -> Result<bool>
    where
        Self: Sized,
    {
        let Some(mut reader) = self.open_read(name)? else {
            return Ok(false);
        };
        let file = File::create(path)?;
        let mut out = BufWriter::with_capacity(1024 * 1024, file);
        loop {
            let chunk = reader.read_exactly(self, COPY_CHUNK_SIZE)?;
            if chunk.is_empty() {
                break;
            }
            out.write_all(&chunk)?;
        }
        out.flush()?;
        Ok(true)
    }
}

/// Append cursor over a named stream
#[derive(Debug, Clone)]
pub struct StreamWriter {
    name: String,
    written: u64,
}

impl StreamWriter {
    fn new(name: &str) -> Self {
        Self { name: name.to_string(), written: 0 }
    }

    /// Stream name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Bytes appended through this writer
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Append bytes to the stream
    pub fn write<S: RecordStore + ?Sized>(&mut self, store: &mut S, bytes: &[u8]) -> Result<()> {
        if bytes.is_empty() {
            return Ok(());
        }
        store.append(&self.name, bytes)?;
        self.written += bytes.len() as u64;
        Ok(())
    }
}

/// Seekable read cursor over a named stream.
///
/// The stream length is captured when the reader is opened; streams being
/// read are never appended to at the same time.
#[derive(Debug, Clone)]
pub struct StreamReader {
    name: String,
    pos: u64,
    len: u64,
}

impl StreamReader {
    /// Stream name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stream length when the reader was opened
    pub fn len(&self) -> u64 {
        self.len
    }

    /// True if the stream was empty when opened
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Current position
    pub fn tell(&self) -> u64 {
        self.pos
    }

    /// Move the cursor; the result is clamped to `[0, len]`
    pub fn seek(&mut self, target: SeekFrom) -> u64 {
        let wanted: i128 = match target {
            SeekFrom::Start(offset) => offset as i128,
            SeekFrom::Current(delta) => self.pos as i128 + delta as i128,
            SeekFrom::End(delta) => self.len as i128 + delta as i128,
        };
        self.pos = wanted.clamp(0, self.len as i128) as u64;
        self.pos
    }

    /// Read `n` bytes from the cursor, fewer if the stream ends first
    pub fn read_exactly<S: RecordStore + ?Sized>(&mut self, store: &mut S, n: usize) -> Result<Vec<u8>> {
        let available = (self.len - self.pos) as usize;
        let take = n.min(available);
        if take == 0 {
            return Ok(Vec::new());
        }
        let bytes = store.read_at(&self.name, self.pos, take)?;
        self.pos += bytes.len() as u64;
        Ok(bytes)
    }
}

/// Copy `n` bytes from the reader's position to the writer, in bounded chunks
pub fn copy<S: RecordStore + ?Sized>(
    store: &mut S,
    reader: &mut StreamReader,
    n: u64,
    writer: &mut StreamWriter,
) -> Result<()> {
    let mut remaining = n;
    while remaining > 0 {
        let take = remaining.min(COPY_CHUNK_SIZE as u64) as usize;
        let chunk = reader.read_exactly(store, take)?;
        if chunk.is_empty() {
            break;
        }
        remaining -= chunk.len() as u64;
        writer.write(store, &chunk)?;
    }
    Ok(())
}

/// Append the reverse complement of the `n` bytes starting at the reader's
/// position.
///
/// Chunks are taken back to front and each one is reverse-complemented before
/// being appended, so no more than one chunk is held at a time. The reader
/// ends just past the span.
pub fn copy_reverse_complement<S: RecordStore + ?Sized>(
    store: &mut S,
    reader: &mut StreamReader,
    n: u64,
    writer: &mut StreamWriter,
) -> Result<()> {
    let chunk_size = COPY_CHUNK_SIZE as u64;
    let start = reader.tell();
    let full_chunks = n / chunk_size;
    for j in 1..=full_chunks {
        reader.seek(SeekFrom::Start(start + n - j * chunk_size));
        let chunk = reader.read_exactly(store, COPY_CHUNK_SIZE)?;
        writer.write(store, &reverse_complement(&chunk)?)?;
    }
    let rest = n - full_chunks * chunk_size;
    if rest != 0 {
        reader.seek(SeekFrom::Start(start));
        let chunk = reader.read_exactly(store, rest as usize)?;
        writer.write(store, &reverse_complement(&chunk)?)?;
    }
    reader.seek(SeekFrom::Start(start + n));
    Ok(())
}
