//! File registry with cached sizes and positional I/O.

use std::fs::File;
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use riptide_common::types::FileId;

use super::error::{IoError, IoResult};
use super::options::OpenOptions;

/// A registered file: OS handle, path, cached length, validity flag.
struct FileEntry {
    file: File,
    path: PathBuf,
    /// Cached byte length, maintained on resize and on extending writes.
    size: AtomicU64,
    /// Cleared on close; the slot itself is never reused.
    valid: AtomicBool,
    reads: AtomicU64,
    writes: AtomicU64,
}

/// Opens files, tracks their sizes, and performs positional reads/writes.
///
/// Handles are assigned monotonically; a closed handle stays invalid
/// forever. The cached file length makes the hot `file_size` query a single
/// atomic load, the way the pool's miss path wants it.
pub struct DiskManager {
    files: RwLock<Vec<Arc<FileEntry>>>,
}

impl DiskManager {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            files: RwLock::new(Vec::new()),
        }
    }

    /// Opens a file and registers it, returning its handle.
    pub fn open(&self, path: impl AsRef<Path>, options: OpenOptions) -> IoResult<FileId> {
        let path = path.as_ref();
        let std_opts = options.to_std_options();

        #[cfg(target_os = "linux")]
        let file = {
            let mut std_opts = std_opts;
            if options.is_direct_io() {
                use std::os::unix::fs::OpenOptionsExt;
                std_opts.custom_flags(libc::O_DIRECT);
            }
            std_opts
                .open(path)
                .map_err(|e| IoError::from_io_with_path(e, path))?
        };

        #[cfg(not(target_os = "linux"))]
        let file = {
            let file = std_opts
                .open(path)
                .map_err(|e| IoError::from_io_with_path(e, path))?;
            #[cfg(target_os = "macos")]
            if options.is_direct_io() {
                use std::os::unix::io::AsRawFd;
                // SAFETY: fd is owned by `file` and valid for the call
                unsafe {
                    libc::fcntl(file.as_raw_fd(), libc::F_NOCACHE, 1);
                }
            }
            file
        };

        let size = file.metadata().map(|m| m.len())?;

        let mut files = self.files.write();
        let id = FileId::new(files.len() as u32);
        files.push(Arc::new(FileEntry {
            file,
            path: path.to_path_buf(),
            size: AtomicU64::new(size),
            valid: AtomicBool::new(true),
            reads: AtomicU64::new(0),
            writes: AtomicU64::new(0),
        }));

        tracing::debug!(file = %id, path = %path.display(), size, "registered file");
        Ok(id)
    }

    /// Marks a handle invalid. The slot is not reused.
    ///
    /// The underlying descriptor stays open until the registry is dropped so
    /// that in-flight I/O against it can complete.
    pub fn close(&self, file: FileId) -> IoResult<()> {
        let entry = self.entry_any(file)?;
        entry.valid.store(false, Ordering::Release);
        tracing::debug!(file = %file, "closed file");
        Ok(())
    }

    /// Returns true if the handle refers to an open file.
    pub fn is_valid(&self, file: FileId) -> bool {
        let files = self.files.read();
        files
            .get(file.index())
            .map(|e| e.valid.load(Ordering::Acquire))
            .unwrap_or(false)
    }

    /// Returns the number of handles ever issued (valid or not).
    pub fn file_count(&self) -> usize {
        self.files.read().len()
    }

    /// Returns the cached byte length of a file.
    pub fn file_size(&self, file: FileId) -> IoResult<u64> {
        Ok(self.entry(file)?.size.load(Ordering::Acquire))
    }

    /// Returns the registered path of a file.
    pub fn path(&self, file: FileId) -> IoResult<PathBuf> {
        Ok(self.entry(file)?.path.clone())
    }

    /// Truncates or extends a file to `new_size` bytes.
    ///
    /// Extension zero-fills. Callers must have drained pins on pages past
    /// the new size before shrinking.
    pub fn resize(&self, file: FileId, new_size: u64) -> IoResult<()> {
        let entry = self.entry(file)?;
        entry.file.set_len(new_size)?;
        entry.size.store(new_size, Ordering::Release);
        Ok(())
    }

    /// Reads up to `buf.len()` bytes at `offset`, zero-filling past EOF.
    ///
    /// Returns the number of bytes that actually came from the file.
    pub fn read_at(&self, file: FileId, buf: &mut [u8], offset: u64) -> IoResult<usize> {
        let entry = self.entry(file)?;
        entry.reads.fetch_add(1, Ordering::Relaxed);

        let mut total = 0;
        while total < buf.len() {
            match entry.file.read_at(&mut buf[total..], offset + total as u64) {
                Ok(0) => break,
                Ok(n) => total += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }

        // File ended before the buffer was filled.
        if total < buf.len() {
            buf[total..].fill(0);
        }
        Ok(total)
    }

    /// Writes all of `buf` at `offset`, extending the file if needed.
    pub fn write_at(&self, file: FileId, buf: &[u8], offset: u64) -> IoResult<()> {
        let entry = self.entry(file)?;
        entry.writes.fetch_add(1, Ordering::Relaxed);

        entry.file.write_all_at(buf, offset)?;

        let end = offset + buf.len() as u64;
        // Maintain the cached length on extending writes.
        entry.size.fetch_max(end, Ordering::AcqRel);
        Ok(())
    }

    /// Flushes file data (not metadata) to stable storage.
    pub fn sync_data(&self, file: FileId) -> IoResult<()> {
        self.entry(file)?.file.sync_data()?;
        Ok(())
    }

    /// Returns (reads, writes) issued against a file.
    pub fn io_counts(&self, file: FileId) -> IoResult<(u64, u64)> {
        let entry = self.entry_any(file)?;
        Ok((
            entry.reads.load(Ordering::Relaxed),
            entry.writes.load(Ordering::Relaxed),
        ))
    }

    /// Returns the raw descriptor of a file, for ring submission.
    #[cfg(all(target_os = "linux", feature = "ring"))]
    pub(crate) fn raw_fd(&self, file: FileId) -> IoResult<std::os::unix::io::RawFd> {
        use std::os::unix::io::AsRawFd;
        Ok(self.entry(file)?.file.as_raw_fd())
    }

    fn entry(&self, file: FileId) -> IoResult<Arc<FileEntry>> {
        let entry = self.entry_any(file)?;
        if !entry.valid.load(Ordering::Acquire) {
            return Err(IoError::stale_handle(file));
        }
        Ok(entry)
    }

    /// Looks up an entry regardless of validity (close, counters).
    fn entry_any(&self, file: FileId) -> IoResult<Arc<FileEntry>> {
        let files = self.files.read();
        files
            .get(file.index())
            .cloned()
            .ok_or(IoError::stale_handle(file))
    }
}

impl Default for DiskManager {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for DiskManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiskManager")
            .field("files", &self.file_count())
            .finish()
    }
}
