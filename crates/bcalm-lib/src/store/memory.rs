//! In-memory record store, used for tests and small inputs

use ahash::AHashMap;

use super::RecordStore;
use crate::error::Result;

/// In-memory stream store
#[derive(Debug, Default)]
pub struct MemoryStore {
    streams: AHashMap<String, Vec<u8>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Borrow the whole content of a stream
    pub fn contents(&self, name: &str) -> Option<&[u8]> {
        self.streams.get(name).map(Vec::as_slice)
    }

    /// Total bytes held across all streams
    pub fn total_bytes(&self) -> usize {
        self.streams.values().map(Vec::len).sum()
    }
}

impl RecordStore for MemoryStore {
    fn stream_len(&mut self, name: &str) -> Result<Option<u64>> {
        Ok(self.streams.get(name).map(|buf| buf.len() as u64))
    }

    fn read_at(&mut self, name: &str, offset: u64, len: usize) -> Result<Vec<u8>> {
        let Some(buf) = self.streams.get(name) else {
            return Ok(Vec::new());
        };
        let start = (offset as usize).min(buf.len());
        let end = start.saturating_add(len).min(buf.len());
        Ok(buf[start..end].to_vec())
    }

    fn append(&mut self, name: &str, bytes: &[u8]) -> Result<()> {
        match self.streams.get_mut(name) {
            Some(buf) => buf.extend_from_slice(bytes),
            None => {
                self.streams.insert(name.to_string(), bytes.to_vec());
            }
        }
        Ok(())
    }

    fn truncate(&mut self, name: &str) -> Result<()> {
        match self.streams.get_mut(name) {
            Some(buf) => buf.clear(),
            None => {
                self.streams.insert(name.to_string(), Vec::new());
            }
        }
        Ok(())
    }

    fn remove(&mut self, name: &str) -> Result<()> {
        self.streams.remove(name);
        Ok(())
    }

    fn clear_all(&mut self, prefix: &str) -> Result<()> {
        self.streams.retain(|name, _| !name.starts_with(prefix));
        Ok(())
    }

    fn stream_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.streams.keys().cloned().collect();
        names.sort_unstable();
        names
    }
}
