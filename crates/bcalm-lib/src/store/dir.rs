//! Record store keeping one file per stream under a directory

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use ahash::AHashMap;
use tracing::debug;

use super::RecordStore;
use crate::error::Result;

/// File name prefix of every stream file, so clearing never touches foreign files
const FILE_PREFIX: &str = "bcalm.tmp.";

/// Cached handles per kind; partitioning alone writes `4^m` streams at once
const MAX_OPEN_FILES: usize = 256;

/// Stream store keeping one file per stream under a directory.
///
/// Write handles are buffered and cached; they are flushed before any read or
/// length query on the same stream.
pub struct DirStore {
    root: PathBuf,
    writers: AHashMap<String, BufWriter<File>>,
    readers: AHashMap<String, File>,
}

impl DirStore {
    /// Open (and create if needed) a store rooted at `root`
    pub fn new(root: impl AsRef<Path>) -> io::Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        debug!("Stream store rooted at {:?}", root);
        Ok(Self {
            root,
            writers: AHashMap::new(),
            readers: AHashMap::new(),
        })
    }

    /// Directory holding the stream files
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_of(&self, name: &str) -> PathBuf {
        self.root.join(format!("{}{}", FILE_PREFIX, name))
    }

    fn flush_writer(&mut self, name: &str) -> io::Result<()> {
        if let Some(writer) = self.writers.get_mut(name) {
            writer.flush()?;
        }
        Ok(())
    }

    fn close_all_writers(&mut self) -> io::Result<()> {
        for (_, mut writer) in self.writers.drain() {
            writer.flush()?;
        }
        Ok(())
    }

    fn close(&mut self, name: &str) -> io::Result<()> {
        if let Some(mut writer) = self.writers.remove(name) {
            writer.flush()?;
        }
        self.readers.remove(name);
        Ok(())
    }
}

impl RecordStore for DirStore {
    fn stream_len(&mut self, name: &str) -> Result<Option<u64>> {
        self.flush_writer(name)?;
        match fs::metadata(self.path_of(name)) {
            Ok(meta) => Ok(Some(meta.len())),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn read_at(&mut self, name: &str, offset: u64, len: usize) -> Result<Vec<u8>> {
        self.flush_writer(name)?;
        if !self.readers.contains_key(name) {
            if self.readers.len() >= MAX_OPEN_FILES {
                self.readers.clear();
            }
            let file = match File::open(self.path_of(name)) {
                Ok(file) => file,
                Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
                Err(e) => return Err(e.into()),
            };
            self.readers.insert(name.to_string(), file);
        }
        let file = self
            .readers
            .get_mut(name)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, name.to_string()))?;
        file.seek(SeekFrom::Start(offset))?;
        let mut buf = Vec::with_capacity(len);
        file.take(len as u64).read_to_end(&mut buf)?;
        Ok(buf)
    }

    fn append(&mut self, name: &str, bytes: &[u8]) -> Result<()> {
        if !self.writers.contains_key(name) {
            if self.writers.len() >= MAX_OPEN_FILES {
                self.close_all_writers()?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(self.path_of(name))?;
            self.writers
                .insert(name.to_string(), BufWriter::with_capacity(64 * 1024, file));
        }
        if let Some(writer) = self.writers.get_mut(name) {
            writer.write_all(bytes)?;
        }
        Ok(())
    }

    fn truncate(&mut self, name: &str) -> Result<()> {
        self.close(name)?;
        File::create(self.path_of(name))?;
        Ok(())
    }

    fn remove(&mut self, name: &str) -> Result<()> {
        self.close(name)?;
        match fs::remove_file(self.path_of(name)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn clear_all(&mut self, prefix: &str) -> Result<()> {
        for name in self.stream_names() {
            if name.starts_with(prefix) {
                self.remove(&name)?;
            }
        }
        Ok(())
    }

    fn stream_names(&self) -> Vec<String> {
        let Ok(entries) = fs::read_dir(&self.root) else {
            return Vec::new();
        };
        let mut names: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                entry
                    .file_name()
                    .to_str()
                    .and_then(|file| file.strip_prefix(FILE_PREFIX))
                    .map(str::to_string)
            })
            .collect();
        names.sort_unstable();
        names
    }
}

impl Drop for DirStore {
    fn drop(&mut self) {
        for writer in self.writers.values_mut() {
            let _ = writer.flush();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_dir_store_roundtrip() {
        let tmp_dir = TempDir::new().unwrap();
        let mut store = DirStore::new(tmp_dir.path()).unwrap();

        store.append("7", b"acgt;").unwrap();
        store.append("7", b"ttt;").unwrap();
        assert_eq!(store.stream_len("7").unwrap(), Some(9));
        assert_eq!(store.read_at("7", 5, 100).unwrap(), b"ttt;");

        // appends after a read must be visible to the next read
        store.append("7", b"g;").unwrap();
        assert_eq!(store.read_at("7", 0, 100).unwrap(), b"acgt;ttt;g;");

        store.truncate("7").unwrap();
        assert_eq!(store.stream_len("7").unwrap(), Some(0));

        store.remove("7").unwrap();
        assert_eq!(store.stream_len("7").unwrap(), None);
        assert!(store.read_at("7", 0, 10).unwrap().is_empty());
    }

    #[test]
    fn test_dir_store_clear_leaves_foreign_files() {
        let tmp_dir = TempDir::new().unwrap();
        fs::write(tmp_dir.path().join("keep.txt"), b"mine").unwrap();
        let mut store = DirStore::new(tmp_dir.path()).unwrap();
        store.append("z0", b"x").unwrap();
        store.append("tags", b"x").unwrap();
        assert_eq!(store.stream_names(), vec!["tags".to_string(), "z0".to_string()]);

        store.clear_all("").unwrap();
        assert!(store.stream_names().is_empty());
        assert!(tmp_dir.path().join("keep.txt").exists());
    }

    #[test]
    fn test_dir_store_many_streams() {
        let tmp_dir = TempDir::new().unwrap();
        let mut store = DirStore::new(tmp_dir.path()).unwrap();
        for round in 0..2 {
            for i in 0..(MAX_OPEN_FILES + 10) {
                store.append(&i.to_string(), &[b'a' + round]).unwrap();
            }
        }
        assert_eq!(store.stream_names().len(), MAX_OPEN_FILES + 10);
        assert_eq!(store.read_at("0", 0, 10).unwrap(), b"ab");
        assert_eq!(store.read_at(&(MAX_OPEN_FILES + 9).to_string(), 0, 10).unwrap(), b"ab");
    }

    #[test]
    fn test_dir_store_export() {
        let tmp_dir = TempDir::new().unwrap();
        let mut store = DirStore::new(tmp_dir.path().join("streams")).unwrap();
        store.append("result", b"acgt;\n").unwrap();
        let out = tmp_dir.path().join("out.txt");
        assert!(store.export("result", &out).unwrap());
        assert_eq!(fs::read(&out).unwrap(), b"acgt;\n");
        assert!(!store.export("missing", &out).unwrap());
    }
}
