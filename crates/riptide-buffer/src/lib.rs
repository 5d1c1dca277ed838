//! # riptide-buffer
//!
//! A partitioned, high-concurrency buffer pool over on-disk files.
//!
//! The pool caches fixed-size file pages in a bounded set of aligned
//! memory frames and serves byte-range reads and writes over logical file
//! handles:
//!
//! - **Zero-copy blocks**: a range inside one page is returned as a direct
//!   pinned view; spanning ranges expose per-page segments
//! - **Partitioned state**: page table, free list, and replacer are
//!   sharded by page index to keep locks short and local
//! - **Asynchronous loads**: misses are driven by dedicated I/O server
//!   threads over a syscall or io_uring backend
//! - **FIFO eviction**: unpinned frames recycle through a
//!   reference-bit-aware FIFO with proactive free-list refill
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      BufferPoolManager                       │
//! │     get_block / get_block_async / get_block_batch / set      │
//! │        │ route by fpage % P             │ batch worker       │
//! │        ▼                                ▼                    │
//! │  ┌───────────────┐  ┌───────────────┐  ┌───────────────┐     │
//! │  │  Partition 0  │  │  Partition 1  │  │  Partition …  │     │
//! │  │  page table   │  │  page table   │  │  page table   │     │
//! │  │  frames+arena │  │  frames+arena │  │  frames+arena │     │
//! │  │  replacer     │  │  replacer     │  │  replacer     │     │
//! │  │  free list    │  │  free list    │  │  free list    │     │
//! │  └──────┬────────┘  └──────┬────────┘  └──────┬────────┘     │
//! │         │    loads and write-backs            │              │
//! │         ▼                                     ▼              │
//! │  ┌──────────────────┐              ┌──────────────────┐      │
//! │  │   IoServer 0     │      …       │   IoServer K     │      │
//! │  │ syscall / uring  │              │ syscall / uring  │      │
//! │  └──────────────────┘              └──────────────────┘      │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,no_run
//! use riptide_buffer::{BufferPoolManager, PoolConfig};
//!
//! fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let pool = BufferPoolManager::new(PoolConfig::new(1024))?;
//!     let file = pool.open_file("data.db")?;
//!
//!     pool.set_block(file, 0, b"hello", true)?;
//!     let block = pool.get_block(file, 0, 5)?;
//!     assert!(block.eq_bytes(b"hello"));
//!
//!     pool.shutdown()?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod backend;
mod block;
mod completion;
mod config;
pub mod direct_cache;
pub mod disk;
mod error;
mod eviction;
pub mod frame;
pub mod free_list;
mod manager;
pub mod mempool;
pub mod page_table;
mod partition;
pub mod replacer;
mod server;

pub use block::{BufferBlock, PageView};
pub use completion::Completion;
pub use config::{IoBackendKind, PoolConfig};
pub use error::{BufferError, BufferResult};
pub use eviction::EvictionServer;
pub use manager::{global, init_global, BlockFuture, BlockRequest, BufferPoolManager};
pub use partition::{PageFuture, PagePin, Partition, PartitionStats};
pub use server::{IoKind, IoRequest, IoServer};

/// Statistics for pool monitoring.
#[derive(Debug, Clone, Copy, Default)]
pub struct PoolStats {
    /// Total page resolutions (hits + misses).
    pub fetches: u64,
    /// Resolutions served from resident frames.
    pub hits: u64,
    /// Resolutions that loaded from disk.
    pub misses: u64,
    /// Frames recycled through eviction.
    pub evictions: u64,
    /// Dirty pages written back.
    pub flushes: u64,
    /// Read requests submitted to the I/O servers.
    pub io_reads: u64,
    /// Write requests submitted to the I/O servers.
    pub io_writes: u64,
    /// Frames currently free.
    pub free_frames: usize,
    /// Frames currently pinned.
    pub pinned_frames: usize,
    /// Frames currently dirty.
    pub dirty_frames: usize,
}

impl PoolStats {
    /// Returns the cache hit ratio (0.0 to 1.0).
    pub fn hit_ratio(&self) -> f64 {
        if self.fetches == 0 {
            0.0
        } else {
            self.hits as f64 / self.fetches as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_hit_ratio() {
        let mut stats = PoolStats::default();
        assert_eq!(stats.hit_ratio(), 0.0);

        stats.fetches = 100;
        stats.hits = 80;
        assert!((stats.hit_ratio() - 0.8).abs() < f64::EPSILON);
    }
}
