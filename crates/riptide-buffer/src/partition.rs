//! A buffer pool partition: arena, page table, replacer, and free list
//! under one shard.
//!
//! Pages route to a partition by `fpage % partitions`; within its shard a
//! partition is self-contained. The fast path (`try_pin`) is a wait-free
//! lookup plus an optimistic pin; the miss path allocates or evicts a
//! frame, installs the mapping under the slot's busy bit, and hands the
//! read to the I/O server, returning a [`PageFuture`] that resolves to a
//! pinned frame.
//!
//! Eviction follows a fixed protocol: the replacer returns a victim with
//! its eviction claim taken and its mapping slot locked; the partition
//! writes it back if dirty, deletes the mapping, clears the frame, and
//! only then releases the slot.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use parking_lot::Mutex;
use riptide_common::types::{FileId, FrameId, PageKey};

use crate::backend::IoVec;
use crate::completion::Completion;
use crate::disk::{DiskManager, IoResult};
use crate::error::{BufferError, BufferResult};
use crate::frame::Frame;
use crate::free_list::FreeList;
use crate::mempool::MemoryPool;
use crate::page_table::PageTable;
use crate::replacer::FifoReplacer;
use crate::server::{IoKind, IoRequest, IoServer};

/// Counters exported by a partition.
#[derive(Debug, Clone, Copy, Default)]
pub struct PartitionStats {
    /// Lookups satisfied from a resident frame.
    pub hits: u64,
    /// Lookups that submitted a load.
    pub misses: u64,
    /// Frames recycled through eviction.
    pub evictions: u64,
    /// Dirty pages written back.
    pub flushes: u64,
}

/// One shard of the buffer pool.
pub struct Partition {
    index: usize,
    disk: Arc<DiskManager>,
    io: Arc<IoServer>,
    mempool: MemoryPool,
    table: PageTable,
    frames: Box<[Frame]>,
    replacer: FifoReplacer,
    free_list: FreeList,
    /// Completion of each in-flight load, by frame. Read and torn down
    /// under the frame's mapping-slot lock.
    loads: Mutex<HashMap<u32, Arc<Completion>>>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    flushes: AtomicU64,
}

impl Partition {
    /// Creates a partition with every frame on the free list.
    pub fn new(
        index: usize,
        partitions: usize,
        num_frames: usize,
        page_size: usize,
        disk: Arc<DiskManager>,
        io: Arc<IoServer>,
    ) -> Self {
        let frames: Box<[Frame]> = (0..num_frames)
            .map(|i| Frame::new(FrameId::new(i as u32)))
            .collect();
        let free_list = FreeList::new(num_frames);
        for i in 0..num_frames {
            free_list.push(FrameId::new(i as u32));
        }

        Self {
            index,
            disk,
            io,
            mempool: MemoryPool::new(num_frames, page_size),
            table: PageTable::new(index, partitions),
            frames,
            replacer: FifoReplacer::new(num_frames),
            free_list,
            loads: Mutex::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            flushes: AtomicU64::new(0),
        }
    }

    /// Returns this partition's index.
    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Returns the page size.
    #[inline]
    pub fn page_size(&self) -> usize {
        self.mempool.page_size()
    }

    /// Returns the number of frames.
    #[inline]
    pub fn num_frames(&self) -> usize {
        self.frames.len()
    }

    /// Returns the number of free frames.
    #[inline]
    pub fn free_frames(&self) -> usize {
        self.free_list.len()
    }

    #[inline]
    fn frame(&self, id: FrameId) -> &Frame {
        &self.frames[id.index()]
    }

    /// Returns the recycle epoch of a frame, for direct-cache validation.
    #[inline]
    pub fn frame_epoch(&self, id: FrameId) -> u64 {
        self.frame(id).epoch()
    }

    /// Makes a file's pages mappable in this partition.
    pub fn register_file(&self, file: FileId, file_pages: usize) {
        self.table.register_file(file, file_pages);
    }

    /// Returns true if the page is resident (not mid-transition).
    pub fn contains(&self, key: PageKey) -> bool {
        self.table.lookup(key).is_some()
    }

    /// Snapshot of this partition's counters.
    pub fn stats(&self) -> PartitionStats {
        PartitionStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            flushes: self.flushes.load(Ordering::Relaxed),
        }
    }

    /// Counts frames in the given condition, for stats and assertions.
    pub(crate) fn count_frames(&self, predicate: impl Fn(&Frame) -> bool) -> usize {
        self.frames.iter().filter(|f| predicate(f)).count()
    }

    /// Number of pinned frames right now.
    pub fn pinned_frames(&self) -> usize {
        self.count_frames(|f| f.is_pinned())
    }

    /// Number of dirty frames right now.
    pub fn dirty_frames(&self) -> usize {
        self.count_frames(|f| f.is_dirty())
    }

    /// Asserts that no frame is pinned. For quiescent checks in tests.
    pub fn assert_unpinned(&self) {
        for frame in self.frames.iter() {
            assert_eq!(frame.pin_count(), 0, "frame still pinned: {frame:?}");
        }
    }

    // -------------------------------------------------------------------------
    // Pin / fetch / unpin
    // -------------------------------------------------------------------------

    /// Lock-free pin attempt. `None` means the caller must fetch.
    pub fn try_pin(self: &Arc<Self>, key: PageKey) -> Option<PagePin> {
        let frame_id = self.table.lookup(key)?;
        let frame = self.frame(frame_id);
        if frame.try_pin(key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            Some(PagePin {
                partition: Arc::clone(self),
                frame: frame_id,
            })
        } else {
            None
        }
    }

    /// Pin attempt against a specific frame, for the direct-cache path.
    ///
    /// Validates identity exactly like [`Partition::try_pin`] but skips the
    /// page-table probe.
    pub fn try_pin_frame(self: &Arc<Self>, key: PageKey, frame_id: FrameId) -> Option<PagePin> {
        if frame_id.index() >= self.frames.len() {
            return None;
        }
        let frame = self.frame(frame_id);
        if frame.try_pin(key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            Some(PagePin {
                partition: Arc::clone(self),
                frame: frame_id,
            })
        } else {
            None
        }
    }

    /// Resolves a page to a pinned frame, loading it on a miss.
    ///
    /// On a miss this allocates or evicts a frame, installs the mapping as
    /// loading under the slot's busy bit, submits the read, and returns a
    /// future that resolves when the I/O server signals. Concurrent
    /// requests for the same page share the in-flight load.
    pub fn fetch_page(self: &Arc<Self>, key: PageKey) -> BufferResult<PageFuture> {
        let file_size = self
            .disk
            .file_size(key.file)
            .map_err(|_| BufferError::invalid_handle(key.file, "not open"))?;

        let Some(existing) = self.table.lock_mapping_create(key) else {
            return Err(BufferError::invalid_handle(
                key.file,
                "not registered with the pool",
            ));
        };

        if let Some(frame_id) = existing {
            // Resident, possibly still loading.
            let frame = self.frame(frame_id);
            frame.pin_locked();
            let completion = if frame.is_loading() {
                self.loads.lock().get(&frame_id.as_u32()).cloned()
            } else {
                None
            };
            self.table.unlock_mapping(key);
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(match completion {
                Some(completion) => PageFuture::pending(self, frame_id, completion, false),
                None => PageFuture::ready(self, frame_id),
            });
        }

        let frame_id = match self.allocate_frame() {
            Ok(frame_id) => frame_id,
            Err(e) => {
                self.table.unlock_mapping(key);
                return Err(e);
            }
        };
        let frame = self.frame(frame_id);
        frame.prepare_load(key);
        self.table.create_mapping(key, frame_id);
        let completion = Arc::new(Completion::new());
        self.loads
            .lock()
            .insert(frame_id.as_u32(), Arc::clone(&completion));
        self.table.unlock_mapping(key);
        self.misses.fetch_add(1, Ordering::Relaxed);

        let page_size = self.page_size();
        let offset = key.fpage.index() as u64 * page_size as u64;
        let in_file = file_size.saturating_sub(offset);
        if in_file == 0 {
            // Wholly past EOF: zero-fill without touching the disk.
            // SAFETY: the loading reservation grants exclusive access.
            unsafe { self.mempool.zero_frame(frame_id) };
            completion.post();
        } else {
            if (in_file as usize) < page_size {
                // The tail past EOF must read as zeroes even if the backend
                // leaves it untouched on a short read.
                // SAFETY: as above.
                unsafe { self.mempool.zero_frame(frame_id) };
            }
            // SAFETY: the frame stays reserved (loading) until the
            // completion posts.
            let iov = unsafe { IoVec::new(self.mempool.frame_ptr(frame_id), page_size) };
            self.io.submit(IoRequest {
                file: key.file,
                fpage_start: key.fpage,
                page_count: 1,
                offset,
                iovecs: vec![iov],
                kind: IoKind::Read,
                completion: Arc::clone(&completion),
            });
        }
        Ok(PageFuture::pending(self, frame_id, completion, true))
    }

    /// Releases one pin; at zero the frame becomes an eviction candidate
    /// (or returns to the free list if its identity was dropped).
    pub(crate) fn unpin(&self, frame_id: FrameId) {
        let frame = self.frame(frame_id);
        // Identity is stable while we still hold the pin; after the
        // decrement an eviction may already be recycling the frame.
        let mapped = frame.key().is_valid();
        if frame.unpin() == 0 {
            if mapped {
                self.replacer.insert(frame_id);
            } else {
                // Poisoned load: the mapping is gone, hand the frame back.
                self.free_list.push(frame_id);
            }
        }
    }

    // -------------------------------------------------------------------------
    // Allocation and eviction
    // -------------------------------------------------------------------------

    fn allocate_frame(&self) -> BufferResult<FrameId> {
        let max_rounds = 4 * self.frames.len().max(16);
        let mut rounds = 0usize;
        loop {
            if let Some(frame_id) = self.free_list.pop() {
                return Ok(frame_id);
            }
            if let Some(frame_id) = self.evict_one()? {
                return Ok(frame_id);
            }
            rounds += 1;
            if rounds >= max_rounds {
                tracing::warn!(partition = self.index, "no evictable frame after retries");
                return Err(BufferError::ResourceExhausted);
            }
            std::thread::yield_now();
        }
    }

    /// Runs the eviction protocol once. `Ok(None)` if the replacer has no
    /// claimable victim right now.
    fn evict_one(&self) -> BufferResult<Option<FrameId>> {
        let Some(frame_id) = self.replacer.victim(&self.table, &self.frames) else {
            return Ok(None);
        };
        // The victim arrives claimed, with its mapping slot locked.
        let frame = self.frame(frame_id);
        let key = frame.key();

        if frame.is_dirty() {
            if let Err(e) = self.write_back(key, frame_id) {
                frame.abort_evict();
                self.table.unlock_mapping(key);
                self.replacer.insert(frame_id);
                return Err(e.into());
            }
            frame.set_dirty(false);
            self.flushes.fetch_add(1, Ordering::Relaxed);
        }

        self.table.delete_mapping(key);
        frame.clear();
        self.table.unlock_mapping(key);
        self.evictions.fetch_add(1, Ordering::Relaxed);
        Ok(Some(frame_id))
    }

    /// Moves up to `batch` evictable frames onto the free list. Used by the
    /// eviction server to keep allocation off the miss path.
    pub fn refill_free_list(&self, batch: usize) -> usize {
        let victims = self.replacer.victim_batch(&self.table, &self.frames, batch);
        let mut freed = 0;
        for frame_id in victims {
            let frame = self.frame(frame_id);
            let key = frame.key();
            if frame.is_dirty() {
                if let Err(e) = self.write_back(key, frame_id) {
                    tracing::warn!(partition = self.index, error = %e, "write-back failed; keeping page");
                    frame.abort_evict();
                    self.table.unlock_mapping(key);
                    self.replacer.insert(frame_id);
                    continue;
                }
                frame.set_dirty(false);
                self.flushes.fetch_add(1, Ordering::Relaxed);
            }
            self.table.delete_mapping(key);
            frame.clear();
            self.table.unlock_mapping(key);
            self.evictions.fetch_add(1, Ordering::Relaxed);
            self.free_list.push(frame_id);
            freed += 1;
        }
        freed
    }

    /// Submits a write-back of one frame and waits for it.
    ///
    /// The caller holds either the frame's eviction claim or its mapping
    /// slot lock, so the bytes cannot change under the write. The write is
    /// clamped to the file length so flushes do not extend the file.
    fn write_back(&self, key: PageKey, frame_id: FrameId) -> IoResult<()> {
        let page_size = self.page_size();
        let offset = key.fpage.index() as u64 * page_size as u64;
        let file_size = self.disk.file_size(key.file)?;
        let len = (file_size.saturating_sub(offset) as usize).min(page_size);
        if len == 0 {
            return Ok(());
        }

        let completion = Arc::new(Completion::new());
        // SAFETY: see the method contract.
        let iov = unsafe { IoVec::new(self.mempool.frame_ptr(frame_id), len) };
        self.io.submit(IoRequest {
            file: key.file,
            fpage_start: key.fpage,
            page_count: 1,
            offset,
            iovecs: vec![iov],
            kind: IoKind::Write,
            completion: Arc::clone(&completion),
        });
        completion.wait()
    }

    // -------------------------------------------------------------------------
    // Flush / close / resize
    // -------------------------------------------------------------------------

    /// Writes a page back if dirty; optionally evicts it afterwards.
    ///
    /// Returns true if the page was resident.
    pub fn flush_page(&self, key: PageKey, evict: bool) -> BufferResult<bool> {
        let frame_id = match self.table.lock_mapping(key) {
            None => return Ok(false),
            Some(None) => {
                self.table.unlock_mapping(key);
                return Ok(false);
            }
            Some(Some(frame_id)) => frame_id,
        };
        let frame = self.frame(frame_id);

        if frame.is_loading() {
            // Nothing durable in the frame yet.
            self.table.unlock_mapping(key);
            return Ok(false);
        }

        if frame.is_dirty() {
            if let Err(e) = self.write_back(key, frame_id) {
                self.table.unlock_mapping(key);
                return Err(e.into());
            }
            frame.set_dirty(false);
            self.flushes.fetch_add(1, Ordering::Relaxed);
        }

        if evict && frame.try_begin_evict() {
            self.table.delete_mapping(key);
            frame.clear();
            self.table.unlock_mapping(key);
            self.replacer.erase(frame_id);
            self.free_list.push(frame_id);
            self.evictions.fetch_add(1, Ordering::Relaxed);
        } else {
            self.table.unlock_mapping(key);
        }
        Ok(true)
    }

    /// Flushes every resident page of a file. Returns how many were
    /// resident.
    pub fn flush_file(&self, file: FileId, evict: bool) -> BufferResult<usize> {
        let mut flushed = 0;
        for (fpage, _) in self.table.resident_pages(file) {
            if self.flush_page(PageKey::new(file, fpage), evict)? {
                flushed += 1;
            }
        }
        Ok(flushed)
    }

    /// Flushes then tears down all mappings for a file.
    pub fn close_file(&self, file: FileId) -> BufferResult<()> {
        self.flush_file(file, true)?;
        let leftover = self.table.resident_count(file);
        if leftover > 0 {
            tracing::warn!(
                partition = self.index,
                file = %file,
                leftover,
                "closing file with pinned pages; their frames are abandoned"
            );
        }
        self.table.forget_file(file);
        Ok(())
    }

    /// Prepares for a file resize.
    ///
    /// Growth just widens the mapping table. Shrinking drops resident pages
    /// past the new end without write-back; those pages must be unpinned.
    pub fn resize_file(&self, file: FileId, new_file_pages: usize) -> BufferResult<()> {
        self.table.register_file(file, new_file_pages);
        for (fpage, _) in self.table.resident_pages(file) {
            if fpage.index() < new_file_pages {
                continue;
            }
            let key = PageKey::new(file, fpage);
            let frame_id = match self.table.lock_mapping(key) {
                Some(Some(frame_id)) => frame_id,
                Some(None) => {
                    self.table.unlock_mapping(key);
                    continue;
                }
                None => continue,
            };
            let frame = self.frame(frame_id);
            if !frame.try_begin_evict() {
                self.table.unlock_mapping(key);
                return Err(BufferError::invalid_handle(
                    file,
                    "page past the new size is still pinned",
                ));
            }
            self.table.delete_mapping(key);
            frame.clear();
            self.table.unlock_mapping(key);
            self.replacer.erase(frame_id);
            self.free_list.push(frame_id);
            self.evictions.fetch_add(1, Ordering::Relaxed);
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Load completion bookkeeping
    // -------------------------------------------------------------------------

    fn note_load_success(&self, frame_id: FrameId) {
        if self.frame(frame_id).finish_loading() {
            self.loads.lock().remove(&frame_id.as_u32());
        }
    }

    /// Tears down a failed load. Only the loading request unmaps; waiters
    /// that piggybacked just drop their pins.
    fn note_load_failure(&self, frame_id: FrameId, is_loader: bool) {
        if !is_loader {
            return;
        }
        let frame = self.frame(frame_id);
        let key = frame.key();
        if key.is_valid() {
            if let Some(occupant) = self.table.lock_mapping(key) {
                if occupant == Some(frame_id) {
                    self.table.delete_mapping(key);
                }
                frame.poison();
                frame.finish_loading();
                self.loads.lock().remove(&frame_id.as_u32());
                self.table.unlock_mapping(key);
                return;
            }
        }
        frame.poison();
        frame.finish_loading();
        self.loads.lock().remove(&frame_id.as_u32());
    }
}

impl std::fmt::Debug for Partition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Partition")
            .field("index", &self.index)
            .field("frames", &self.frames.len())
            .field("free", &self.free_frames())
            .field("stats", &self.stats())
            .finish()
    }
}

/// An owned pin on one resident frame.
///
/// Holding a `PagePin` keeps the page resident; dropping it releases the
/// pin exactly once.
pub struct PagePin {
    partition: Arc<Partition>,
    frame: FrameId,
}

impl PagePin {
    /// Returns the pinned frame's ID.
    #[inline]
    pub fn frame_id(&self) -> FrameId {
        self.frame
    }

    /// Returns the identity of the pinned page.
    #[inline]
    pub fn key(&self) -> PageKey {
        self.partition.frame(self.frame).key()
    }

    /// Returns the page size.
    #[inline]
    pub fn page_size(&self) -> usize {
        self.partition.page_size()
    }

    /// Returns the frame's recycle epoch, for direct-cache registration.
    #[inline]
    pub fn epoch(&self) -> u64 {
        self.partition.frame_epoch(self.frame)
    }

    /// Borrows the page bytes.
    ///
    /// The pin guarantees residency. The pool does not enforce
    /// reader/writer exclusion on page bytes; callers that write
    /// concurrently must coordinate above the pool.
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: the pin keeps the frame resident for &self's lifetime.
        unsafe { self.partition.mempool.frame_slice(self.frame) }
    }

    /// Copies `src` into the page at `page_offset` and marks it dirty.
    pub fn write(&self, page_offset: usize, src: &[u8]) {
        assert!(page_offset + src.len() <= self.page_size());
        self.partition.frame(self.frame).set_dirty(true);
        // SAFETY: the pin keeps the frame resident; exclusion among
        // writers is the caller's contract (see as_slice).
        unsafe {
            self.partition.mempool.frame_slice_mut(self.frame)
                [page_offset..page_offset + src.len()]
                .copy_from_slice(src);
        }
    }
}

impl Drop for PagePin {
    fn drop(&mut self) {
        self.partition.unpin(self.frame);
    }
}

impl std::fmt::Debug for PagePin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PagePin")
            .field("frame", &self.frame)
            .field("key", &self.key())
            .finish()
    }
}

/// A pending page resolution: completes when the page's load (if any) has
/// been signalled by the I/O server.
///
/// Resolve it with [`PageFuture::wait`] or by awaiting it. An unconsumed
/// future waits for its load and releases its pin on drop, so abandoning a
/// request cannot leak a frame.
pub struct PageFuture {
    partition: Arc<Partition>,
    frame: FrameId,
    completion: Option<Arc<Completion>>,
    is_loader: bool,
    done: bool,
}

impl PageFuture {
    fn ready(partition: &Arc<Partition>, frame: FrameId) -> Self {
        Self {
            partition: Arc::clone(partition),
            frame,
            completion: None,
            is_loader: false,
            done: false,
        }
    }

    fn pending(
        partition: &Arc<Partition>,
        frame: FrameId,
        completion: Arc<Completion>,
        is_loader: bool,
    ) -> Self {
        Self {
            partition: Arc::clone(partition),
            frame,
            completion: Some(completion),
            is_loader,
            done: false,
        }
    }

    /// Returns true if `wait` will not block.
    pub fn is_ready(&self) -> bool {
        self.completion.as_ref().map_or(true, |c| c.is_complete())
    }

    /// Blocks until the page is loaded and returns the pin.
    pub fn wait(mut self) -> BufferResult<PagePin> {
        let outcome = match &self.completion {
            Some(completion) => completion.wait(),
            None => Ok(()),
        };
        self.settle(outcome)
    }

    fn settle(&mut self, outcome: IoResult<()>) -> BufferResult<PagePin> {
        self.done = true;
        match outcome {
            Ok(()) => {
                if self.completion.is_some() {
                    self.partition.note_load_success(self.frame);
                }
                Ok(PagePin {
                    partition: Arc::clone(&self.partition),
                    frame: self.frame,
                })
            }
            Err(e) => {
                self.partition.note_load_failure(self.frame, self.is_loader);
                self.partition.unpin(self.frame);
                Err(e.into())
            }
        }
    }
}

impl Future for PageFuture {
    type Output = BufferResult<PagePin>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        debug_assert!(!this.done, "polled a settled PageFuture");
        match &this.completion {
            None => Poll::Ready(this.settle(Ok(()))),
            Some(completion) => match completion.poll(cx) {
                Poll::Pending => Poll::Pending,
                Poll::Ready(outcome) => Poll::Ready(this.settle(outcome)),
            },
        }
    }
}

impl Drop for PageFuture {
    fn drop(&mut self) {
        if self.done {
            return;
        }
        // An abandoned request still consumes its completion: the frame
        // stays reserved until the load finishes, then is released here.
        let outcome = match &self.completion {
            Some(completion) => completion.wait(),
            None => Ok(()),
        };
        match outcome {
            Ok(()) => {
                if self.completion.is_some() {
                    self.partition.note_load_success(self.frame);
                }
                self.partition.unpin(self.frame);
            }
            Err(_) => {
                self.partition.note_load_failure(self.frame, self.is_loader);
                self.partition.unpin(self.frame);
            }
        }
    }
}

impl std::fmt::Debug for PageFuture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageFuture")
            .field("frame", &self.frame)
            .field("ready", &self.is_ready())
            .finish()
    }
}
