//! Storage medium abstraction for shard files.
//!
//! [`ShardFile`] is an open handle supporting positional reads and appends;
//! [`Medium`] owns the namespace those handles live in (open, remove, list).
//! Shards and the library only ever see these traits, so the backing store
//! can be swapped without touching either.
//!
//! Two media are provided:
//!
//! - [`DiskMedium`]: plain files via `std::fs`, the production medium.
//! - [`MemMedium`]: in-process byte buffers, for tests and embedders that do
//!   not want to touch the filesystem.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// An open, append-only shard file.
///
/// All methods take `&self`: writers are serialized by the owning shard, and
/// readers use positional reads so they never share a cursor.
pub trait ShardFile: Send + Sync {
    /// Read up to `buf.len()` bytes starting at `offset`.
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize>;

    /// Append `buf` to the end of the file.
    fn append(&self, buf: &[u8]) -> io::Result<()>;

    /// Truncate to `len` bytes. Only used to undo a partial append.
    fn set_len(&self, len: u64) -> io::Result<()>;

    /// Flush written data to durable storage.
    fn sync(&self) -> io::Result<()>;

    /// Current length in bytes.
    fn len(&self) -> io::Result<u64>;
}

/// Namespace of shard files.
pub trait Medium: Send + Sync {
    /// Open `path` for reading and appending, creating it if missing.
    fn open(&self, path: &Path) -> io::Result<Arc<dyn ShardFile>>;

    fn remove(&self, path: &Path) -> io::Result<()>;

    fn create_dir_all(&self, dir: &Path) -> io::Result<()>;

    /// File names (not paths) directly under `dir`.
    fn list(&self, dir: &Path) -> io::Result<Vec<String>>;
}

// ---------------------------------------------------------------------------
// Disk
// ---------------------------------------------------------------------------

/// A shard file on the local filesystem, opened in append mode.
#[derive(Debug)]
pub struct DiskFile {
    file: File,
}

impl DiskFile {
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().read(true).append(true).create(true).open(path)?;
        Ok(Self { file })
    }
}

impl ShardFile for DiskFile {
    #[cfg(unix)]
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        use std::os::unix::fs::FileExt;
        self.file.read_at(buf, offset)
    }

    #[cfg(windows)]
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        use std::os::windows::fs::FileExt;
        self.file.seek_read(buf, offset)
    }

    fn append(&self, buf: &[u8]) -> io::Result<()> {
        (&self.file).write_all(buf)
    }

    fn set_len(&self, len: u64) -> io::Result<()> {
        self.file.set_len(len)
    }

    fn sync(&self) -> io::Result<()> {
        self.file.sync_all()
    }

    fn len(&self) -> io::Result<u64> {
        Ok(self.file.metadata()?.len())
    }
}

/// The local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiskMedium;

impl Medium for DiskMedium {
    fn open(&self, path: &Path) -> io::Result<Arc<dyn ShardFile>> {
        Ok(Arc::new(DiskFile::open(path)?))
    }

    fn remove(&self, path: &Path) -> io::Result<()> {
        std::fs::remove_file(path)
    }

    fn create_dir_all(&self, dir: &Path) -> io::Result<()> {
        std::fs::create_dir_all(dir)
    }

    fn list(&self, dir: &Path) -> io::Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
        Ok(names)
    }
}

// ---------------------------------------------------------------------------
// Memory
// ---------------------------------------------------------------------------

/// A growable in-memory byte buffer behaving like an append-mode file.
#[derive(Debug, Default)]
pub struct MemFile {
    data: RwLock<Vec<u8>>,
}

impl MemFile {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite bytes at `offset`, used by tests to simulate corruption.
    pub fn overwrite(&self, offset: usize, bytes: &[u8]) {
        let mut data = self.data.write();
        let end = offset + bytes.len();
        if data.len() < end {
            data.resize(end, 0);
        }
        data[offset..end].copy_from_slice(bytes);
    }
}

impl ShardFile for MemFile {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        let data = self.data.read();
        let start = (offset as usize).min(data.len());
        (&data[start..]).read(buf)
    }

    fn append(&self, buf: &[u8]) -> io::Result<()> {
        self.data.write().extend_from_slice(buf);
        Ok(())
    }

    fn set_len(&self, len: u64) -> io::Result<()> {
        self.data.write().resize(len as usize, 0);
        Ok(())
    }

    fn sync(&self) -> io::Result<()> {
        Ok(())
    }

    fn len(&self) -> io::Result<u64> {
        Ok(self.data.read().len() as u64)
    }
}

/// An in-memory directory tree of [`MemFile`]s.
///
/// Handles returned by [`Medium::open`] share the same buffer, so reopening a
/// path sees everything written before it was "closed".
#[derive(Debug, Default)]
pub struct MemMedium {
    files: Mutex<HashMap<PathBuf, Arc<MemFile>>>,
}

impl MemMedium {
    pub fn new() -> Self {
        Self::default()
    }

    /// Direct access to a file's buffer.
    pub fn file(&self, path: &Path) -> Option<Arc<MemFile>> {
        self.files.lock().get(path).cloned()
    }

    pub fn exists(&self, path: &Path) -> bool {
        self.files.lock().contains_key(path)
    }
}

impl Medium for MemMedium {
    fn open(&self, path: &Path) -> io::Result<Arc<dyn ShardFile>> {
        let file = self.files.lock().entry(path.to_path_buf()).or_default().clone();
        Ok(file)
    }

    fn remove(&self, path: &Path) -> io::Result<()> {
        match self.files.lock().remove(path) {
            Some(_) => Ok(()),
            None => Err(io::Error::new(io::ErrorKind::NotFound, format!("{} not found", path.display()))),
        }
    }

    fn create_dir_all(&self, _dir: &Path) -> io::Result<()> {
        Ok(())
    }

    fn list(&self, dir: &Path) -> io::Result<Vec<String>> {
        let files = self.files.lock();
        Ok(files
            .keys()
            .filter(|p| p.parent() == Some(dir))
            .filter_map(|p| p.file_name()?.to_str().map(str::to_string))
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Bounded reader
// ---------------------------------------------------------------------------

/// `Read` adapter over the byte range `[pos, end)` of a shard file.
///
/// `end` is fixed when the reader is created, so bytes appended afterwards
/// are never observed.
pub struct SectionReader {
    file: Arc<dyn ShardFile>,
    pos: u64,
    end: u64,
}

impl SectionReader {
    pub fn new(file: Arc<dyn ShardFile>, start: u64, end: u64) -> Self {
        Self { file, pos: start.min(end), end }
    }
}

impl Read for SectionReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = self.end - self.pos;
        if remaining == 0 || buf.is_empty() {
            return Ok(0);
        }
        let want = buf.len().min(remaining.min(usize::MAX as u64) as usize);
        let n = self.file.read_at(&mut buf[..want], self.pos)?;
        self.pos += n as u64;
        Ok(n)
    }
}
