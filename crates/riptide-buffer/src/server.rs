//! The I/O server: a dedicated worker draining a submission channel.
//!
//! Each server owns one backend and one OS thread. Producers push
//! [`IoRequest`]s onto a bounded lock-free channel; the worker moves them
//! into a small in-flight window (sized to the backend depth) and advances
//! each occupied slot through `Commit → Poll → End`. A request's completion
//! is posted exactly once: by the backend on success, or by the server when
//! the backend refuses the request.
//!
//! Requests are never reordered within a slot but may complete in any order
//! across slots.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_queue::ArrayQueue;
use parking_lot::Mutex;
use riptide_common::constants::{IO_CHANNEL_CAPACITY, SPIN_YIELD_THRESHOLD};
use riptide_common::types::{FileId, FilePageId};

use crate::backend::{IoBackend, IoVec, SyscallBackend};
use crate::completion::Completion;
use crate::config::IoBackendKind;
use crate::disk::{DiskManager, IoResult};

/// Direction of an I/O request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoKind {
    /// Load pages from disk into frames.
    Read,
    /// Write frames back to disk.
    Write,
}

/// A page-granular I/O request.
///
/// The iovec segments point into frame memory that the submitting partition
/// keeps reserved (loading or pinned) until `completion` is posted.
pub struct IoRequest {
    /// Target file.
    pub file: FileId,
    /// First file page covered by the request.
    pub fpage_start: FilePageId,
    /// Number of pages covered.
    pub page_count: u32,
    /// Byte offset of `fpage_start` within the file.
    pub offset: u64,
    /// One segment per page, in file order.
    pub iovecs: Vec<IoVec>,
    /// Read or write.
    pub kind: IoKind,
    /// Posted exactly once when the request finishes.
    pub completion: Arc<Completion>,
}

impl std::fmt::Debug for IoRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IoRequest")
            .field("file", &self.file)
            .field("fpage_start", &self.fpage_start)
            .field("page_count", &self.page_count)
            .field("kind", &self.kind)
            .finish()
    }
}

/// Per-slot request state.
enum SlotState {
    /// Not yet accepted by the backend.
    Commit,
    /// Accepted; waiting for the backend to post the completion.
    Poll,
}

struct InFlight {
    req: IoRequest,
    state: SlotState,
}

/// A single-consumer I/O worker over a lock-free submission channel.
pub struct IoServer {
    channel: Arc<ArrayQueue<IoRequest>>,
    stop: Arc<AtomicBool>,
    worker: Mutex<Option<JoinHandle<()>>>,
    reads: AtomicU64,
    writes: AtomicU64,
}

impl IoServer {
    /// Spawns a server thread with the given backend configuration.
    pub fn new(
        index: usize,
        disk: Arc<DiskManager>,
        backend_kind: IoBackendKind,
        ring_depth: usize,
        page_size: usize,
    ) -> IoResult<Self> {
        let channel = Arc::new(ArrayQueue::new(IO_CHANNEL_CAPACITY));
        let stop = Arc::new(AtomicBool::new(false));

        let backend = Self::build_backend(&disk, backend_kind, ring_depth, page_size)?;

        let worker = {
            let channel = Arc::clone(&channel);
            let stop = Arc::clone(&stop);
            std::thread::Builder::new()
                .name(format!("riptide-io-{index}"))
                .spawn(move || run(backend, channel, stop, ring_depth))
                .map_err(|e| crate::disk::IoError::Io { source: e })?
        };

        tracing::debug!(index, ?backend_kind, ring_depth, "I/O server started");
        Ok(Self {
            channel,
            stop,
            worker: Mutex::new(Some(worker)),
            reads: AtomicU64::new(0),
            writes: AtomicU64::new(0),
        })
    }

    fn build_backend(
        disk: &Arc<DiskManager>,
        kind: IoBackendKind,
        ring_depth: usize,
        page_size: usize,
    ) -> IoResult<Box<dyn IoBackend>> {
        match kind {
            IoBackendKind::Syscall => {
                let _ = (ring_depth, page_size);
                Ok(Box::new(SyscallBackend::new(Arc::clone(disk))))
            }
            #[cfg(all(target_os = "linux", feature = "ring"))]
            IoBackendKind::Ring => Ok(Box::new(crate::backend::RingBackend::new(
                Arc::clone(disk),
                ring_depth as u32,
                page_size,
            )?)),
            #[cfg(not(all(target_os = "linux", feature = "ring")))]
            IoBackendKind::Ring => Err(crate::disk::IoError::Ring {
                message: "ring backend requires Linux and the `ring` feature".to_string(),
            }),
        }
    }

    /// Enqueues a request, spinning while the channel is full.
    pub fn submit(&self, req: IoRequest) {
        match req.kind {
            IoKind::Read => self.reads.fetch_add(1, Ordering::Relaxed),
            IoKind::Write => self.writes.fetch_add(1, Ordering::Relaxed),
        };

        let mut req = req;
        let mut spins = 0usize;
        loop {
            match self.channel.push(req) {
                Ok(()) => return,
                Err(rejected) => {
                    req = rejected;
                    spins += 1;
                    if spins > SPIN_YIELD_THRESHOLD {
                        std::thread::yield_now();
                        spins = 0;
                    } else {
                        std::hint::spin_loop();
                    }
                }
            }
        }
    }

    /// Number of read requests submitted so far.
    pub fn read_count(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }

    /// Number of write requests submitted so far.
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    /// Signals the worker to stop and joins it.
    ///
    /// The worker drains both its channel and its in-flight window before
    /// exiting, so every submitted request still gets its completion.
    pub fn shutdown(&self) {
        self.stop.store(true, Ordering::Release);
        if let Some(worker) = self.worker.lock().take() {
            if worker.join().is_err() {
                tracing::error!("I/O server thread panicked");
            }
        }
    }
}

impl Drop for IoServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Worker loop: fill empty slots from the channel, advance occupied slots,
/// exit once stopped with nothing pending.
fn run(
    mut backend: Box<dyn IoBackend>,
    channel: Arc<ArrayQueue<IoRequest>>,
    stop: Arc<AtomicBool>,
    depth: usize,
) {
    let mut slots: Vec<Option<InFlight>> = Vec::new();
    slots.resize_with(depth.max(1), || None);
    let mut spins = 0usize;

    loop {
        let mut active = 0usize;

        for slot in slots.iter_mut() {
            if slot.is_none() {
                match channel.pop() {
                    Some(req) => {
                        *slot = Some(InFlight {
                            req,
                            state: SlotState::Commit,
                        });
                    }
                    None => continue,
                }
            }

            if step(backend.as_mut(), slot.as_mut().expect("slot filled above")) {
                *slot = None;
            } else {
                active += 1;
            }
        }

        if active == 0 {
            if stop.load(Ordering::Acquire) && channel.is_empty() {
                break;
            }
            spins += 1;
            if spins > SPIN_YIELD_THRESHOLD {
                std::thread::yield_now();
                spins = 0;
            } else {
                std::hint::spin_loop();
            }
        } else {
            spins = 0;
        }
    }
}

/// Advances one in-flight request. Returns true when its slot can be freed.
fn step(backend: &mut dyn IoBackend, inflight: &mut InFlight) -> bool {
    match inflight.state {
        SlotState::Commit => {
            let req = &inflight.req;
            let submitted = match req.kind {
                IoKind::Read => {
                    backend.submit_read(req.file, req.offset, &req.iovecs, &req.completion)
                }
                IoKind::Write => {
                    backend.submit_write(req.file, req.offset, &req.iovecs, &req.completion)
                }
            };
            match submitted {
                Ok(true) => {
                    if req.completion.is_complete() {
                        true
                    } else {
                        inflight.state = SlotState::Poll;
                        poll(backend, inflight)
                    }
                }
                Ok(false) => {
                    // Backend full: make room and retry this slot next pass.
                    drive_progress(backend);
                    false
                }
                Err(e) => {
                    // The backend did not accept the request, so it will
                    // never post the completion; surface the error to the
                    // waiter here.
                    tracing::warn!(request = ?inflight.req, error = %e, "I/O submission failed");
                    inflight.req.completion.post_error(e);
                    true
                }
            }
        }
        SlotState::Poll => poll(backend, inflight),
    }
}

fn poll(backend: &mut dyn IoBackend, inflight: &mut InFlight) -> bool {
    drive_progress(backend);
    inflight.req.completion.is_complete()
}

fn drive_progress(backend: &mut dyn IoBackend) {
    if let Err(e) = backend.progress() {
        tracing::error!(error = %e, "I/O backend progress failed");
    }
}
