//! The buffer pool manager: partition routing and block assembly.
//!
//! The manager owns the partitions, the I/O servers, the eviction server,
//! and an optional direct cache. Client byte ranges are decomposed into
//! page plans, each routed to `partitions[fpage % P]`, pinned (or loaded)
//! there, and stitched back into a [`BufferBlock`] without copying.
//!
//! Synchronous requests resolve on the caller's thread. Asynchronous and
//! batched requests flow through a bounded channel to a dedicated worker
//! that interleaves many requests through a phased state machine
//! (`Begin → Waiting → FinishWaiting → End`), bounded by the configured
//! batch window.

use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::task::{Context, Poll};
use std::thread::JoinHandle;

use crossbeam_queue::ArrayQueue;
use parking_lot::Mutex;
use riptide_common::constants::SPIN_YIELD_THRESHOLD;
use riptide_common::types::{FileId, FilePageId, PageKey};

use crate::block::{BufferBlock, PageView};
use crate::completion::Completion;
use crate::config::PoolConfig;
use crate::direct_cache::DirectCache;
use crate::disk::{DiskManager, OpenOptions};
use crate::error::{BufferError, BufferResult};
use crate::eviction::EvictionServer;
use crate::partition::{PageFuture, PagePin, Partition};
use crate::server::IoServer;
use crate::PoolStats;

/// One request of a batched block fetch.
#[derive(Debug, Clone, Copy)]
pub struct BlockRequest {
    /// Target file.
    pub file: FileId,
    /// Byte offset of the range.
    pub offset: u64,
    /// Length of the range in bytes.
    pub len: usize,
}

impl BlockRequest {
    /// Creates a block request.
    pub fn new(file: FileId, offset: u64, len: usize) -> Self {
        Self { file, offset, len }
    }
}

/// The range of one page covered by a block request.
#[derive(Debug, Clone, Copy)]
struct PagePlan {
    key: PageKey,
    page_offset: usize,
    len: usize,
}

fn plan(page_size: usize, file: FileId, offset: u64, len: usize) -> Vec<PagePlan> {
    let mut plans = Vec::with_capacity(len / page_size + 2);
    let mut fpage = (offset / page_size as u64) as u32;
    let mut page_offset = (offset % page_size as u64) as usize;
    let mut remaining = len;
    while remaining > 0 {
        let take = remaining.min(page_size - page_offset);
        plans.push(PagePlan {
            key: PageKey::new(file, FilePageId::new(fpage)),
            page_offset,
            len: take,
        });
        remaining -= take;
        fpage += 1;
        page_offset = 0;
    }
    plans
}

enum PinOrFuture {
    Pinned(PagePin),
    Loading(PageFuture),
}

fn pin_or_fetch(
    partitions: &[Arc<Partition>],
    cache: Option<&DirectCache>,
    key: PageKey,
) -> BufferResult<PinOrFuture> {
    let partition = &partitions[key.fpage.index() % partitions.len()];
    if let Some(cache) = cache {
        if let Some(pin) = cache.probe(key, partition) {
            return Ok(PinOrFuture::Pinned(pin));
        }
    }
    if let Some(pin) = partition.try_pin(key) {
        if let Some(cache) = cache {
            cache.record(key, &pin);
        }
        return Ok(PinOrFuture::Pinned(pin));
    }
    partition.fetch_page(key).map(PinOrFuture::Loading)
}

// -----------------------------------------------------------------------------
// Async plumbing
// -----------------------------------------------------------------------------

struct BatchSlot {
    result: Mutex<Option<BufferResult<BufferBlock>>>,
    done: Completion,
}

impl BatchSlot {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            result: Mutex::new(None),
            done: Completion::new(),
        })
    }

    fn post(&self, result: BufferResult<BufferBlock>) {
        *self.result.lock() = Some(result);
        self.done.post();
    }
}

struct BatchTask {
    req: BlockRequest,
    slot: Arc<BatchSlot>,
}

/// Pending result of [`BufferPoolManager::get_block_async`] or one batch
/// entry. Await it or block on [`BlockFuture::wait`].
pub struct BlockFuture {
    slot: Arc<BatchSlot>,
}

impl BlockFuture {
    fn immediate(result: BufferResult<BufferBlock>) -> Self {
        let slot = BatchSlot::new();
        slot.post(result);
        Self { slot }
    }

    /// Returns true if `wait` will not block.
    pub fn is_ready(&self) -> bool {
        self.slot.done.is_complete()
    }

    /// Blocks until the block is assembled.
    pub fn wait(self) -> BufferResult<BufferBlock> {
        let _ = self.slot.done.wait();
        self.take_result()
    }

    fn take_result(&self) -> BufferResult<BufferBlock> {
        self.slot
            .result
            .lock()
            .take()
            .unwrap_or(Err(BufferError::ShuttingDown))
    }
}

impl Future for BlockFuture {
    type Output = BufferResult<BufferBlock>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.slot.done.poll(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(_) => Poll::Ready(self.take_result()),
        }
    }
}

impl std::fmt::Debug for BlockFuture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockFuture")
            .field("ready", &self.is_ready())
            .finish()
    }
}

// -----------------------------------------------------------------------------
// Batch worker
// -----------------------------------------------------------------------------

enum PageSlot {
    Ready(PageView),
    Pending {
        future: PageFuture,
        page_offset: usize,
        len: usize,
    },
}

impl PageSlot {
    fn is_ready(&self) -> bool {
        match self {
            Self::Ready(_) => true,
            Self::Pending { future, .. } => future.is_ready(),
        }
    }

    fn resolve(self, cache: Option<&DirectCache>, key: PageKey) -> BufferResult<PageView> {
        match self {
            Self::Ready(view) => Ok(view),
            Self::Pending {
                future,
                page_offset,
                len,
            } => {
                let pin = future.wait()?;
                if let Some(cache) = cache {
                    cache.record(key, &pin);
                }
                Ok(PageView::new(pin, page_offset, len))
            }
        }
    }
}

/// One batch request in flight on the worker, past its `Begin` phase.
struct InFlightRequest {
    task: BatchTask,
    plans: Vec<PagePlan>,
    pages: Vec<PageSlot>,
}

fn begin_request(
    partitions: &[Arc<Partition>],
    cache: Option<&DirectCache>,
    page_size: usize,
    task: BatchTask,
) -> Option<InFlightRequest> {
    let plans = plan(page_size, task.req.file, task.req.offset, task.req.len);
    let mut pages = Vec::with_capacity(plans.len());
    let mut pending = false;

    for page in &plans {
        match pin_or_fetch(partitions, cache, page.key) {
            Ok(PinOrFuture::Pinned(pin)) => {
                pages.push(PageSlot::Ready(PageView::new(pin, page.page_offset, page.len)));
            }
            Ok(PinOrFuture::Loading(future)) => {
                pending = true;
                pages.push(PageSlot::Pending {
                    future,
                    page_offset: page.page_offset,
                    len: page.len,
                });
            }
            Err(e) => {
                // Earlier pins and futures release through their drops.
                task.slot.post(Err(e));
                return None;
            }
        }
    }

    let inflight = InFlightRequest { task, plans, pages };
    if pending {
        Some(inflight)
    } else {
        finish_request(cache, inflight);
        None
    }
}

fn finish_request(cache: Option<&DirectCache>, inflight: InFlightRequest) {
    let InFlightRequest { task, plans, pages } = inflight;
    let mut views = Vec::with_capacity(pages.len());
    for (slot, page) in pages.into_iter().zip(plans.iter()) {
        match slot.resolve(cache, page.key) {
            Ok(view) => views.push(view),
            Err(e) => {
                task.slot.post(Err(e));
                return;
            }
        }
    }
    task.slot.post(Ok(BufferBlock::from_views(views)));
}

fn run_batch_worker(
    partitions: Vec<Arc<Partition>>,
    cache: Option<Arc<DirectCache>>,
    page_size: usize,
    window: usize,
    queue: Arc<ArrayQueue<BatchTask>>,
    stop: Arc<AtomicBool>,
) {
    let cache = cache.as_deref();
    let mut slots: Vec<Option<InFlightRequest>> = Vec::new();
    slots.resize_with(window.max(1), || None);
    let mut spins = 0usize;

    loop {
        let mut active = 0usize;

        for slot in slots.iter_mut() {
            if slot.is_none() {
                match queue.pop() {
                    Some(task) => {
                        *slot = begin_request(&partitions, cache, page_size, task);
                    }
                    None => continue,
                }
            }
            if let Some(inflight) = slot.as_ref() {
                if inflight.pages.iter().all(PageSlot::is_ready) {
                    let inflight = slot.take().expect("checked above");
                    finish_request(cache, inflight);
                } else {
                    active += 1;
                }
            }
        }

        if active == 0 {
            if stop.load(Ordering::Acquire) && queue.is_empty() {
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

// -----------------------------------------------------------------------------
// The manager
// -----------------------------------------------------------------------------

/// Top-level coordinator over partitions, I/O servers, and workers.
pub struct BufferPoolManager {
    config: PoolConfig,
    disk: Arc<DiskManager>,
    servers: Vec<Arc<IoServer>>,
    partitions: Vec<Arc<Partition>>,
    cache: Option<Arc<DirectCache>>,
    batch_queue: Arc<ArrayQueue<BatchTask>>,
    batch_stop: Arc<AtomicBool>,
    batch_worker: Mutex<Option<JoinHandle<()>>>,
    eviction: EvictionServer,
    stopping: AtomicBool,
    open_lock: Mutex<()>,
}

impl BufferPoolManager {
    /// Builds a pool from the configuration and starts its workers.
    pub fn new(config: PoolConfig) -> BufferResult<Self> {
        config.validate().map_err(BufferError::config)?;

        let disk = Arc::new(DiskManager::new());

        let mut servers = Vec::with_capacity(config.io_servers);
        for index in 0..config.io_servers {
            servers.push(Arc::new(IoServer::new(
                index,
                Arc::clone(&disk),
                config.io_backend,
                config.ring_depth,
                config.page_size,
            )?));
        }

        let partitions: Vec<Arc<Partition>> = (0..config.partitions)
            .map(|index| {
                Arc::new(Partition::new(
                    index,
                    config.partitions,
                    config.frames_per_partition,
                    config.page_size,
                    Arc::clone(&disk),
                    Arc::clone(&servers[index % servers.len()]),
                ))
            })
            .collect();

        let cache = DirectCache::new(config.direct_cache_capacity).map(Arc::new);

        let batch_queue = Arc::new(ArrayQueue::new(config.batch_channel_capacity()));
        let batch_stop = Arc::new(AtomicBool::new(false));
        let batch_worker = {
            let partitions = partitions.clone();
            let cache = cache.clone();
            let queue = Arc::clone(&batch_queue);
            let stop = Arc::clone(&batch_stop);
            let page_size = config.page_size;
            let window = config.batch_window;
            std::thread::Builder::new()
                .name("riptide-batch".to_string())
                .spawn(move || run_batch_worker(partitions, cache, page_size, window, queue, stop))
                .map_err(|e| BufferError::Io { source: e })?
        };

        let eviction = EvictionServer::new(
            partitions.clone(),
            config.low_water_frames(),
            config.eviction_batch_size,
        )
        .map_err(|e| BufferError::Io { source: e })?;

        tracing::info!(
            partitions = config.partitions,
            frames_per_partition = config.frames_per_partition,
            page_size = config.page_size,
            backend = ?config.io_backend,
            "buffer pool initialised"
        );

        Ok(Self {
            config,
            disk,
            servers,
            partitions,
            cache,
            batch_queue,
            batch_stop,
            batch_worker: Mutex::new(Some(batch_worker)),
            eviction,
            stopping: AtomicBool::new(false),
            open_lock: Mutex::new(()),
        })
    }

    /// Returns the pool configuration.
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Returns the page size.
    #[inline]
    pub fn page_size(&self) -> usize {
        self.config.page_size
    }

    fn check_open(&self) -> BufferResult<()> {
        if self.stopping.load(Ordering::Acquire) {
            Err(BufferError::ShuttingDown)
        } else {
            Ok(())
        }
    }

    #[inline]
    fn partition_for(&self, fpage: FilePageId) -> &Arc<Partition> {
        &self.partitions[fpage.index() % self.partitions.len()]
    }

    fn file_pages(&self, bytes: u64) -> usize {
        bytes.div_ceil(self.config.page_size as u64) as usize
    }

    // -------------------------------------------------------------------------
    // Files
    // -------------------------------------------------------------------------

    /// Opens (or creates) a file and registers it with every partition.
    pub fn open_file(&self, path: impl AsRef<Path>) -> BufferResult<FileId> {
        let options = OpenOptions::for_pool().direct_io(self.config.direct_io);
        self.open_file_with(path, options)
    }

    /// Opens a file with explicit options.
    pub fn open_file_with(
        &self,
        path: impl AsRef<Path>,
        options: OpenOptions,
    ) -> BufferResult<FileId> {
        self.check_open()?;
        let _guard = self.open_lock.lock();
        let file = self.disk.open(path, options)?;
        let pages = self.file_pages(self.disk.file_size(file)?).max(1);
        for partition in &self.partitions {
            partition.register_file(file, pages);
        }
        Ok(file)
    }

    /// Flushes a file's pages, tears down its mappings, and invalidates the
    /// handle.
    pub fn close_file(&self, file: FileId) -> BufferResult<()> {
        self.check_open()?;
        if !self.disk.is_valid(file) {
            return Err(BufferError::invalid_handle(file, "already closed"));
        }
        for partition in &self.partitions {
            partition.close_file(file)?;
        }
        self.disk.close(file)?;
        Ok(())
    }

    /// Truncates or extends a file.
    ///
    /// Pages past a shrunken end are dropped from the pool and must be
    /// unpinned beforehand.
    pub fn resize(&self, file: FileId, new_bytes: u64) -> BufferResult<()> {
        self.check_open()?;
        if !self.disk.is_valid(file) {
            return Err(BufferError::invalid_handle(file, "not open"));
        }
        let old_bytes = self.disk.file_size(file)?;
        let new_pages = self.file_pages(new_bytes).max(1);
        if new_bytes < old_bytes {
            for partition in &self.partitions {
                partition.resize_file(file, new_pages)?;
            }
            self.disk.resize(file, new_bytes)?;
        } else {
            self.disk.resize(file, new_bytes)?;
            for partition in &self.partitions {
                partition.resize_file(file, new_pages)?;
            }
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Blocks
    // -------------------------------------------------------------------------

    fn validate_range(&self, file: FileId, offset: u64, len: usize) -> BufferResult<()> {
        if !self.disk.is_valid(file) {
            return Err(BufferError::invalid_handle(file, "not open"));
        }
        if len == 0 {
            return Ok(());
        }
        let size = self.disk.file_size(file)?;
        if offset >= size {
            return Err(BufferError::invalid_handle(
                file,
                "range starts past end of file",
            ));
        }
        Ok(())
    }

    /// Reads a byte range as a pinned block, loading misses synchronously.
    ///
    /// A range inside one page is zero-copy; a spanning range holds one pin
    /// per page and exposes per-page segments.
    pub fn get_block(&self, file: FileId, offset: u64, len: usize) -> BufferResult<BufferBlock> {
        self.check_open()?;
        self.validate_range(file, offset, len)?;
        if len == 0 {
            return Ok(BufferBlock::empty());
        }

        let cache = self.cache.as_deref();
        let plans = plan(self.page_size(), file, offset, len);
        let mut slots = Vec::with_capacity(plans.len());
        // First pass pins what is resident and starts every load.
        for page in &plans {
            match pin_or_fetch(&self.partitions, cache, page.key)? {
                PinOrFuture::Pinned(pin) => {
                    slots.push(PageSlot::Ready(PageView::new(pin, page.page_offset, page.len)));
                }
                PinOrFuture::Loading(future) => slots.push(PageSlot::Pending {
                    future,
                    page_offset: page.page_offset,
                    len: page.len,
                }),
            }
        }
        // Second pass awaits the loads in file order.
        let mut views = Vec::with_capacity(slots.len());
        for (slot, page) in slots.into_iter().zip(plans.iter()) {
            views.push(slot.resolve(cache, page.key)?);
        }
        Ok(BufferBlock::from_views(views))
    }

    /// Reads a byte range asynchronously through the batch worker.
    pub fn get_block_async(&self, file: FileId, offset: u64, len: usize) -> BlockFuture {
        if let Err(e) = self.check_open().and_then(|()| self.validate_range(file, offset, len)) {
            return BlockFuture::immediate(Err(e));
        }
        if len == 0 {
            return BlockFuture::immediate(Ok(BufferBlock::empty()));
        }

        let slot = BatchSlot::new();
        let future = BlockFuture {
            slot: Arc::clone(&slot),
        };
        let mut task = BatchTask {
            req: BlockRequest::new(file, offset, len),
            slot,
        };
        let mut spins = 0usize;
        loop {
            if self.stopping.load(Ordering::Acquire) {
                task.slot.post(Err(BufferError::ShuttingDown));
                return future;
            }
            match self.batch_queue.push(task) {
                Ok(()) => return future,
                Err(rejected) => {
                    task = rejected;
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

    /// Resolves many block requests through the batch worker.
    ///
    /// Results are in input order; each request fails or succeeds on its
    /// own.
    pub fn get_block_batch(&self, requests: &[BlockRequest]) -> Vec<BufferResult<BufferBlock>> {
        let futures: Vec<BlockFuture> = requests
            .iter()
            .map(|req| self.get_block_async(req.file, req.offset, req.len))
            .collect();
        futures.into_iter().map(BlockFuture::wait).collect()
    }

    /// Writes a byte range through the pool, extending the file if the
    /// range ends past EOF. With `flush`, the touched pages are written
    /// back before returning.
    pub fn set_block(
        &self,
        file: FileId,
        offset: u64,
        data: &[u8],
        flush: bool,
    ) -> BufferResult<()> {
        self.check_open()?;
        if !self.disk.is_valid(file) {
            return Err(BufferError::invalid_handle(file, "not open"));
        }
        if data.is_empty() {
            return Ok(());
        }

        let end = offset + data.len() as u64;
        if end > self.disk.file_size(file)? {
            // Implicit extension; the gap reads as zeroes.
            self.resize(file, end)?;
        }

        let cache = self.cache.as_deref();
        let plans = plan(self.page_size(), file, offset, data.len());
        let mut cursor = 0usize;
        for page in &plans {
            let pin = match pin_or_fetch(&self.partitions, cache, page.key)? {
                PinOrFuture::Pinned(pin) => pin,
                PinOrFuture::Loading(future) => future.wait()?,
            };
            pin.write(page.page_offset, &data[cursor..cursor + page.len]);
            cursor += page.len;
        }

        if flush {
            for page in &plans {
                self.partition_for(page.key.fpage)
                    .flush_page(page.key, false)?;
            }
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Flush / warmup / stats
    // -------------------------------------------------------------------------

    /// Writes back every dirty page of a file.
    pub fn flush_file(&self, file: FileId) -> BufferResult<()> {
        self.check_open()?;
        if !self.disk.is_valid(file) {
            return Err(BufferError::invalid_handle(file, "not open"));
        }
        for partition in &self.partitions {
            partition.flush_file(file, false)?;
        }
        Ok(())
    }

    /// Writes back every dirty page of every open file.
    pub fn flush_all(&self) -> BufferResult<()> {
        self.check_open()?;
        self.flush_all_unchecked()
    }

    fn flush_all_unchecked(&self) -> BufferResult<()> {
        for index in 0..self.disk.file_count() {
            let file = FileId::new(index as u32);
            if !self.disk.is_valid(file) {
                continue;
            }
            for partition in &self.partitions {
                partition.flush_file(file, false)?;
            }
        }
        Ok(())
    }

    /// Loads every open file into the pool, one worker per file.
    pub fn warmup(&self) -> BufferResult<()> {
        self.check_open()?;
        std::thread::scope(|scope| {
            let mut workers = Vec::new();
            for index in 0..self.disk.file_count() {
                let file = FileId::new(index as u32);
                if self.disk.is_valid(file) {
                    workers.push(scope.spawn(move || self.load_file(file)));
                }
            }
            for worker in workers {
                worker
                    .join()
                    .map_err(|_| BufferError::config("warmup worker panicked"))??;
            }
            Ok(())
        })
    }

    fn load_file(&self, file: FileId) -> BufferResult<()> {
        let pages = self.file_pages(self.disk.file_size(file)?);
        for fpage in 0..pages {
            let key = PageKey::new(file, FilePageId::new(fpage as u32));
            let partition = self.partition_for(key.fpage);
            if partition.contains(key) {
                continue;
            }
            let pin = partition.fetch_page(key)?.wait()?;
            drop(pin);
        }
        Ok(())
    }

    /// Aggregated pool statistics.
    pub fn stats(&self) -> PoolStats {
        let mut stats = PoolStats::default();
        for partition in &self.partitions {
            let p = partition.stats();
            stats.hits += p.hits;
            stats.misses += p.misses;
            stats.evictions += p.evictions;
            stats.flushes += p.flushes;
            stats.free_frames += partition.free_frames();
            stats.pinned_frames += partition.pinned_frames();
            stats.dirty_frames += partition.dirty_frames();
        }
        stats.fetches = stats.hits + stats.misses;
        for server in &self.servers {
            stats.io_reads += server.read_count();
            stats.io_writes += server.write_count();
        }
        stats
    }

    /// Total free frames across partitions.
    pub fn free_frame_count(&self) -> usize {
        self.partitions.iter().map(|p| p.free_frames()).sum()
    }

    /// Total arena bytes.
    pub fn memory_usage(&self) -> usize {
        self.config.memory_usage()
    }

    /// Reads submitted to the I/O servers so far.
    pub fn io_read_count(&self) -> u64 {
        self.servers.iter().map(|s| s.read_count()).sum()
    }

    /// Writes submitted to the I/O servers so far.
    pub fn io_write_count(&self) -> u64 {
        self.servers.iter().map(|s| s.write_count()).sum()
    }

    /// Asserts that no frame is pinned. For quiescent checks in tests.
    pub fn assert_unpinned(&self) {
        for partition in &self.partitions {
            partition.assert_unpinned();
        }
    }

    /// Flushes everything and joins every worker. Further operations
    /// return [`BufferError::ShuttingDown`].
    pub fn shutdown(&self) -> BufferResult<()> {
        if self.stopping.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        tracing::info!("buffer pool shutting down");

        // Batch worker first: it drains queued requests, then exits.
        self.batch_stop.store(true, Ordering::Release);
        if let Some(worker) = self.batch_worker.lock().take() {
            if worker.join().is_err() {
                tracing::error!("batch worker thread panicked");
            }
        }
        self.eviction.shutdown();

        let flushed = self.flush_all_unchecked();

        for server in &self.servers {
            server.shutdown();
        }
        flushed
    }
}

impl Drop for BufferPoolManager {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            tracing::error!(error = %e, "flush during shutdown failed");
        }
    }
}

impl std::fmt::Debug for BufferPoolManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferPoolManager")
            .field("partitions", &self.partitions.len())
            .field("page_size", &self.config.page_size)
            .field("stats", &self.stats())
            .finish()
    }
}

// -----------------------------------------------------------------------------
// Optional process-wide instance
// -----------------------------------------------------------------------------

static GLOBAL: OnceLock<Arc<BufferPoolManager>> = OnceLock::new();

/// Initialises the process-wide pool. Fails if called twice.
pub fn init_global(config: PoolConfig) -> BufferResult<Arc<BufferPoolManager>> {
    let manager = Arc::new(BufferPoolManager::new(config)?);
    match GLOBAL.set(Arc::clone(&manager)) {
        Ok(()) => Ok(manager),
        Err(_) => Err(BufferError::config("global buffer pool already initialised")),
    }
}

/// Returns the process-wide pool, if initialised.
pub fn global() -> Option<Arc<BufferPoolManager>> {
    GLOBAL.get().cloned()
}
