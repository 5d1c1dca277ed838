//! System-wide constants for Riptide.
//!
//! Tuning defaults for the buffer pool. Anything configurable at runtime is
//! duplicated in `PoolConfig`; the values here are the defaults.

// =============================================================================
// Page and Memory Constants
// =============================================================================

/// Default page size in bytes (4 KB).
///
/// Matches the common OS page size and SSD sector granularity, and is the
/// unit of both file I/O and frame residency.
pub const DEFAULT_PAGE_SIZE: usize = 4 * 1024;

/// Minimum supported page size in bytes.
pub const MIN_PAGE_SIZE: usize = 512;

/// Maximum supported page size in bytes (64 KB).
pub const MAX_PAGE_SIZE: usize = 64 * 1024;

// =============================================================================
// Partitioning
// =============================================================================

/// Default number of pool partitions.
///
/// Partitions shard the page table, free list, and replacer to reduce lock
/// contention; pages route to `fpage % partitions`.
pub const DEFAULT_PARTITIONS: usize = 4;

/// Default number of frames per partition (16 MB of 4 KB pages).
pub const DEFAULT_FRAMES_PER_PARTITION: usize = 4096;

// =============================================================================
// I/O
// =============================================================================

/// Default number of I/O server threads.
pub const DEFAULT_IO_SERVERS: usize = 1;

/// Default maximum in-flight requests per I/O server.
pub const DEFAULT_RING_DEPTH: usize = 64;

/// Capacity of each I/O server's submission channel.
pub const IO_CHANNEL_CAPACITY: usize = 1024;

// =============================================================================
// Eviction
// =============================================================================

/// Number of frames reclaimed per eviction sweep.
pub const EVICTION_BATCH_SIZE: usize = 32;

/// Free-list fill level (as a fraction of partition frames, in percent)
/// below which the eviction server refills proactively.
pub const EVICTION_LOW_WATER_PERCENT: usize = 10;

/// Interval between eviction server sweeps, in microseconds.
pub const EVICTION_SWEEP_INTERVAL_US: u64 = 500;

// =============================================================================
// Batch requests
// =============================================================================

/// Default number of batch requests a manager worker drives concurrently.
pub const DEFAULT_BATCH_WINDOW: usize = 32;

/// Capacity of the manager's batch request channel.
pub const BATCH_CHANNEL_CAPACITY: usize = 1024;

// =============================================================================
// Direct cache
// =============================================================================

/// Default direct-cache capacity in entries; 0 disables the fast path.
pub const DEFAULT_DIRECT_CACHE_CAPACITY: usize = 0;

// =============================================================================
// Spinning
// =============================================================================

/// Spin iterations before a waiter falls back to an OS yield.
pub const SPIN_YIELD_THRESHOLD: usize = 64;
