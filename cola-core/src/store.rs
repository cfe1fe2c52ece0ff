use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::RwLock;

/// A positional byte store: everything the COLA core needs from "a file".
///
/// This generalizes the block-oriented, write-once `FileStore` abstraction
/// this crate's lineage uses for immutable SST blocks: a COLA file is read
/// and overwritten at arbitrary offsets throughout its life, so the trait
/// here is `pread`/`pwrite`-shaped rather than open-for-write-once. Every
/// method takes `&self` — interior mutability (a lock around the OS handle
/// or buffer) keeps the `Cola` handle itself simple, matching how this
/// lineage wraps `File`/`HashMap` state in `RwLock` rather than threading
/// `&mut` through every layer.
pub trait PositionalStore {
    /// Reads exactly `buf.len()` bytes starting at `offset`.
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> std::io::Result<()>;

    /// Writes all of `buf` starting at `offset`, overwriting whatever was
    /// there and growing the store if `offset + buf.len()` is past the
    /// current end.
    fn write_at(&self, offset: u64, buf: &[u8]) -> std::io::Result<()>;

    /// Current length in bytes.
    fn len(&self) -> std::io::Result<u64>;
}

impl<S: PositionalStore + ?Sized> PositionalStore for &S {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> std::io::Result<()> {
        (**self).read_at(offset, buf)
    }

    fn write_at(&self, offset: u64, buf: &[u8]) -> std::io::Result<()> {
        (**self).write_at(offset, buf)
    }

    fn len(&self) -> std::io::Result<u64> {
        (**self).len()
    }
}

/// On-disk store backed by a single `std::fs::File`.
pub struct LocalFile {
    file: RwLock<File>,
}

impl LocalFile {
    /// Opens `path` for positional read/write, creating it if absent.
    /// Returns whether the file already existed, so the caller knows
    /// whether to read back a header or start from one that is zeroed.
    pub fn open(path: impl AsRef<Path>) -> std::io::Result<(Self, bool)> {
        let existed = path.as_ref().exists();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;
        Ok((LocalFile { file: RwLock::new(file) }, existed))
    }
}

impl PositionalStore for LocalFile {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> std::io::Result<()> {
        let mut file = self.file.write().expect("local file lock poisoned");
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(buf)
    }

    fn write_at(&self, offset: u64, buf: &[u8]) -> std::io::Result<()> {
        let mut file = self.file.write().expect("local file lock poisoned");
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(buf)
    }

    fn len(&self) -> std::io::Result<u64> {
        let file = self.file.write().expect("local file lock poisoned");
        Ok(file.metadata()?.len())
    }
}

/// In-memory store, used for tests and for embedders that want a COLA file
/// that never touches disk (e.g. scratch indexes rebuilt each process).
#[derive(Default)]
pub struct MemoryStore {
    data: RwLock<Vec<u8>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }
}

impl PositionalStore for MemoryStore {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> std::io::Result<()> {
        let data = self.data.read().expect("memory store lock poisoned");
        let start = offset as usize;
        let end = start + buf.len();
        if end > data.len() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "read past end of memory store",
            ));
        }
        buf.copy_from_slice(&data[start..end]);
        Ok(())
    }

    fn write_at(&self, offset: u64, buf: &[u8]) -> std::io::Result<()> {
        let mut data = self.data.write().expect("memory store lock poisoned");
        let start = offset as usize;
        let end = start + buf.len();
        if end > data.len() {
            data.resize(end, 0);
        }
        data[start..end].copy_from_slice(buf);
        Ok(())
    }

    fn len(&self) -> std::io::Result<u64> {
        Ok(self.data.read().expect("memory store lock poisoned").len() as u64)
    }
}
