//! I/O backends: blocking positional syscalls and the io_uring ring.
//!
//! Both variants present the same submit/progress contract so the I/O
//! server can drive either one:
//!
//! - [`SyscallBackend`] performs the request inline with `pread`/`pwrite`
//!   and posts the completion before returning.
//! - [`RingBackend`] appends submission entries to a fixed-depth ring;
//!   [`IoBackend::progress`] submits pending entries and reaps completions,
//!   posting each one. Completion order across requests is not guaranteed.
//!
//! A backend never posts a completion for a request it failed to accept:
//! submission errors surface through the returned `Result` and the caller
//! decides what to tell the waiter.

use std::sync::Arc;

use riptide_common::types::FileId;

use crate::completion::Completion;
use crate::disk::{DiskManager, IoResult};

/// A single scatter/gather segment pointing into a frame arena.
///
/// Layout-compatible with `libc::iovec` so a slice of these can be handed
/// to vectored syscalls directly.
#[derive(Clone, Copy)]
#[repr(C)]
pub struct IoVec {
    ptr: *mut u8,
    len: usize,
}

impl IoVec {
    /// Creates a segment over raw frame memory.
    ///
    /// # Safety
    ///
    /// `ptr` must be valid for reads and writes of `len` bytes for as long
    /// as the request referencing this segment is in flight. The pool
    /// guarantees this by keeping the target frame in the loading state (or
    /// pinned, for write-back) until the completion is posted.
    pub unsafe fn new(ptr: *mut u8, len: usize) -> Self {
        Self { ptr, len }
    }

    /// Returns the segment length in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if the segment is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the segment base address.
    #[inline]
    pub fn addr(&self) -> usize {
        self.ptr as usize
    }

    /// Reborrows the segment as a mutable slice.
    ///
    /// # Safety
    ///
    /// Caller must be the only party accessing the segment, per the
    /// contract of [`IoVec::new`].
    #[allow(clippy::mut_from_ref)]
    pub(crate) unsafe fn as_mut_slice(&self) -> &mut [u8] {
        std::slice::from_raw_parts_mut(self.ptr, self.len)
    }

    /// Reborrows the segment as an immutable slice.
    ///
    /// # Safety
    ///
    /// See [`IoVec::as_mut_slice`].
    pub(crate) unsafe fn as_slice(&self) -> &[u8] {
        std::slice::from_raw_parts(self.ptr, self.len)
    }
}

// SAFETY: an IoVec is a plain (pointer, length) pair; the threading
// discipline around the pointed-to frame is enforced by the pool's
// loading/pin states, not by this type.
unsafe impl Send for IoVec {}
unsafe impl Sync for IoVec {}

impl std::fmt::Debug for IoVec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IoVec")
            .field("addr", &format_args!("{:#x}", self.ptr as usize))
            .field("len", &self.len)
            .finish()
    }
}

/// Backend submission interface.
///
/// `submit_read`/`submit_write` return `Ok(false)` when the backend cannot
/// accept the request right now (ring full); the caller should call
/// [`IoBackend::progress`] and retry.
pub trait IoBackend: Send {
    /// Submits a read of the pages covering `iovecs`, starting at `offset`.
    fn submit_read(
        &mut self,
        file: FileId,
        offset: u64,
        iovecs: &[IoVec],
        completion: &Arc<Completion>,
    ) -> IoResult<bool>;

    /// Submits a write of `iovecs` starting at `offset`.
    fn submit_write(
        &mut self,
        file: FileId,
        offset: u64,
        iovecs: &[IoVec],
        completion: &Arc<Completion>,
    ) -> IoResult<bool>;

    /// Submits pending entries and reaps completions.
    ///
    /// Returns the number of requests still in flight.
    fn progress(&mut self) -> IoResult<usize>;
}

/// Blocking positional-syscall backend.
///
/// Requests complete inline: the completion is posted before `submit_*`
/// returns. Writes are followed by a data sync so the on-disk state is
/// durable when the completion fires.
pub struct SyscallBackend {
    disk: Arc<DiskManager>,
}

impl SyscallBackend {
    /// Creates a syscall backend over the given file registry.
    pub fn new(disk: Arc<DiskManager>) -> Self {
        Self { disk }
    }
}

impl IoBackend for SyscallBackend {
    fn submit_read(
        &mut self,
        file: FileId,
        offset: u64,
        iovecs: &[IoVec],
        completion: &Arc<Completion>,
    ) -> IoResult<bool> {
        let mut pos = offset;
        for iov in iovecs {
            // SAFETY: the pool keeps the frame reserved for this request
            // until the completion is posted (IoVec contract).
            let buf = unsafe { iov.as_mut_slice() };
            self.disk.read_at(file, buf, pos)?;
            pos += iov.len() as u64;
        }
        completion.post();
        Ok(true)
    }

    fn submit_write(
        &mut self,
        file: FileId,
        offset: u64,
        iovecs: &[IoVec],
        completion: &Arc<Completion>,
    ) -> IoResult<bool> {
        let mut pos = offset;
        for iov in iovecs {
            // SAFETY: see submit_read.
            let buf = unsafe { iov.as_slice() };
            self.disk.write_at(file, buf, pos)?;
            pos += iov.len() as u64;
        }
        self.disk.sync_data(file)?;
        completion.post();
        Ok(true)
    }

    fn progress(&mut self) -> IoResult<usize> {
        Ok(0)
    }
}

#[cfg(all(target_os = "linux", feature = "ring"))]
pub use ring::RingBackend;

#[cfg(all(target_os = "linux", feature = "ring"))]
mod ring {
    //! io_uring submission-ring backend (Linux 5.1+).

    use super::*;
    use crate::disk::IoError;
    use io_uring::{opcode, types, IoUring};

    /// Asynchronous submission-ring backend.
    ///
    /// Each accepted request becomes one submission entry whose user data
    /// is the address of its completion signal. `progress` submits whatever
    /// is queued and walks the completion queue, posting each request's
    /// signal with the outcome the kernel reported.
    pub struct RingBackend {
        disk: Arc<DiskManager>,
        ring: IoUring,
        page_size: usize,
        /// Entries pushed but not yet submitted to the kernel.
        unsubmitted: usize,
        /// Entries submitted and awaiting a completion.
        in_flight: usize,
    }

    impl RingBackend {
        /// Creates a ring with the given submission depth.
        pub fn new(disk: Arc<DiskManager>, depth: u32, page_size: usize) -> IoResult<Self> {
            let ring = IoUring::new(depth).map_err(|e| IoError::Ring {
                message: format!("failed to create io_uring: {e}"),
            })?;
            Ok(Self {
                disk,
                ring,
                page_size,
                unsubmitted: 0,
                in_flight: 0,
            })
        }

        fn check_aligned(&self, offset: u64, iovecs: &[IoVec]) -> IoResult<()> {
            if offset as usize % self.page_size != 0 {
                return Err(IoError::misaligned(self.page_size, offset as usize));
            }
            for iov in iovecs {
                if iov.addr() % self.page_size != 0 {
                    return Err(IoError::misaligned(self.page_size, iov.addr()));
                }
            }
            Ok(())
        }

        fn push(&mut self, entry: io_uring::squeue::Entry) -> IoResult<bool> {
            // SAFETY: the entry's buffers (iovec array and frame memory) are
            // owned by the in-flight request slot, which the I/O server keeps
            // alive until this entry's completion is reaped.
            let pushed = unsafe { self.ring.submission().push(&entry).is_ok() };
            if pushed {
                self.unsubmitted += 1;
            }
            Ok(pushed)
        }
    }

    impl IoBackend for RingBackend {
        fn submit_read(
            &mut self,
            file: FileId,
            offset: u64,
            iovecs: &[IoVec],
            completion: &Arc<Completion>,
        ) -> IoResult<bool> {
            self.check_aligned(offset, iovecs)?;
            let fd = self.disk.raw_fd(file)?;
            let entry = opcode::Readv::new(
                types::Fd(fd),
                iovecs.as_ptr() as *const libc::iovec,
                iovecs.len() as u32,
            )
            .offset(offset)
            .build()
            .user_data(Arc::as_ptr(completion) as u64);
            self.push(entry)
        }

        fn submit_write(
            &mut self,
            file: FileId,
            offset: u64,
            iovecs: &[IoVec],
            completion: &Arc<Completion>,
        ) -> IoResult<bool> {
            self.check_aligned(offset, iovecs)?;
            let fd = self.disk.raw_fd(file)?;
            let entry = opcode::Writev::new(
                types::Fd(fd),
                iovecs.as_ptr() as *const libc::iovec,
                iovecs.len() as u32,
            )
            .offset(offset)
            .build()
            .user_data(Arc::as_ptr(completion) as u64);
            self.push(entry)
        }

        fn progress(&mut self) -> IoResult<usize> {
            if self.unsubmitted > 0 {
                let submitted = self.ring.submit().map_err(|e| IoError::Ring {
                    message: format!("io_uring submit failed: {e}"),
                })?;
                self.in_flight += submitted;
                self.unsubmitted -= submitted.min(self.unsubmitted);
            }

            let mut reaped = 0;
            for cqe in self.ring.completion() {
                let completion = cqe.user_data() as *const Completion;
                let result = cqe.result();
                // SAFETY: user_data was set to the address of an Arc'd
                // Completion whose owning request slot outlives the reap.
                let completion = unsafe { &*completion };
                if result < 0 {
                    completion.post_error(IoError::Io {
                        source: std::io::Error::from_raw_os_error(-result),
                    });
                } else {
                    completion.post();
                }
                reaped += 1;
            }
            self.in_flight -= reaped.min(self.in_flight);
            Ok(self.in_flight + self.unsubmitted)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disk::OpenOptions;
    use tempfile::tempdir;

    fn setup() -> (tempfile::TempDir, Arc<DiskManager>, FileId) {
        let dir = tempdir().unwrap();
        let disk = Arc::new(DiskManager::new());
        let fd = disk
            .open(dir.path().join("backend.db"), OpenOptions::for_create())
            .unwrap();
        (dir, disk, fd)
    }

    #[test]
    fn test_syscall_write_then_read() {
        let (_dir, disk, fd) = setup();
        let mut backend = SyscallBackend::new(Arc::clone(&disk));

        let mut src = vec![7u8; 4096];
        let write_done = Arc::new(Completion::new());
        // SAFETY: src outlives the (synchronous) request
        let iov = unsafe { IoVec::new(src.as_mut_ptr(), src.len()) };
        assert!(backend
            .submit_write(fd, 0, &[iov], &write_done)
            .unwrap());
        assert!(write_done.is_complete());

        let mut dst = vec![0u8; 4096];
        let read_done = Arc::new(Completion::new());
        // SAFETY: dst outlives the (synchronous) request
        let iov = unsafe { IoVec::new(dst.as_mut_ptr(), dst.len()) };
        assert!(backend.submit_read(fd, 0, &[iov], &read_done).unwrap());
        assert!(read_done.wait().is_ok());
        assert_eq!(dst, src);
    }

    #[test]
    fn test_syscall_read_past_eof_zero_fills() {
        let (_dir, disk, fd) = setup();
        let mut backend = SyscallBackend::new(Arc::clone(&disk));
        disk.write_at(fd, b"xy", 0).unwrap();

        let mut dst = vec![0xFFu8; 8];
        let done = Arc::new(Completion::new());
        // SAFETY: dst outlives the request
        let iov = unsafe { IoVec::new(dst.as_mut_ptr(), dst.len()) };
        backend.submit_read(fd, 0, &[iov], &done).unwrap();
        done.wait().unwrap();
        assert_eq!(&dst, &[b'x', b'y', 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_syscall_error_leaves_completion_pending() {
        let (_dir, disk, fd) = setup();
        disk.close(fd).unwrap();
        let mut backend = SyscallBackend::new(Arc::clone(&disk));

        let mut dst = vec![0u8; 16];
        let done = Arc::new(Completion::new());
        // SAFETY: dst outlives the request
        let iov = unsafe { IoVec::new(dst.as_mut_ptr(), dst.len()) };
        let result = backend.submit_read(fd, 0, &[iov], &done);
        assert!(result.is_err());
        assert!(!done.is_complete());
    }

    #[test]
    fn test_iovec_layout_matches_libc() {
        assert_eq!(
            std::mem::size_of::<IoVec>(),
            std::mem::size_of::<libc::iovec>()
        );
        assert_eq!(
            std::mem::align_of::<IoVec>(),
            std::mem::align_of::<libc::iovec>()
        );
    }

    #[cfg(all(target_os = "linux", feature = "ring"))]
    #[test]
    fn test_ring_write_then_read() {
        let (_dir, disk, fd) = setup();
        let mut backend = RingBackend::new(Arc::clone(&disk), 8, 4096).unwrap();

        let mut src = vec![3u8; 4096];
        let write_done = Arc::new(Completion::new());
        // SAFETY: src outlives the request; we drive progress to completion
        let iov = unsafe { IoVec::new(src.as_mut_ptr(), src.len()) };
        let iovs = [iov];
        assert!(backend.submit_write(fd, 0, &iovs, &write_done).unwrap());
        while !write_done.is_complete() {
            backend.progress().unwrap();
        }
        write_done.wait().unwrap();

        let mut dst = vec![0u8; 4096];
        let read_done = Arc::new(Completion::new());
        // SAFETY: dst outlives the request
        let iov = unsafe { IoVec::new(dst.as_mut_ptr(), dst.len()) };
        let iovs = [iov];
        assert!(backend.submit_read(fd, 0, &iovs, &read_done).unwrap());
        while !read_done.is_complete() {
            backend.progress().unwrap();
        }
        read_done.wait().unwrap();
        assert_eq!(dst, src);
    }

    #[cfg(all(target_os = "linux", feature = "ring"))]
    #[test]
    fn test_ring_rejects_misaligned() {
        use crate::disk::IoError;

        let (_dir, disk, fd) = setup();
        let mut backend = RingBackend::new(Arc::clone(&disk), 8, 4096).unwrap();

        let mut buf = vec![0u8; 4096];
        let done = Arc::new(Completion::new());
        // SAFETY: buf outlives the request
        let iov = unsafe { IoVec::new(buf.as_mut_ptr(), buf.len()) };
        let result = backend.submit_read(fd, 13, &[iov], &done);
        assert!(matches!(result, Err(IoError::InvalidAlignment { .. })));
    }
}
