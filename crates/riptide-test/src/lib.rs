//! Shared fixtures for Riptide integration tests.

use std::path::PathBuf;
use std::sync::Arc;

use riptide_buffer::{BufferPoolManager, PoolConfig};
use riptide_common::types::FileId;
use tempfile::TempDir;

/// A pool over a temporary directory.
pub struct TestPool {
    dir: TempDir,
    manager: Arc<BufferPoolManager>,
}

impl TestPool {
    /// Builds a pool with the given configuration.
    pub fn new(config: PoolConfig) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let manager = Arc::new(BufferPoolManager::new(config).expect("pool"));
        Self { dir, manager }
    }

    /// A small pool: `frames` frames in `partitions` partitions of 4 KiB
    /// pages.
    pub fn small(frames_per_partition: usize, partitions: usize) -> Self {
        Self::new(
            PoolConfig::new(frames_per_partition)
                .with_partitions(partitions)
                .with_page_size(4096),
        )
    }

    /// Returns the pool manager.
    pub fn manager(&self) -> &Arc<BufferPoolManager> {
        &self.manager
    }

    /// Returns the path of a file inside the pool directory.
    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Opens (or creates) a file inside the pool directory.
    pub fn open(&self, name: &str) -> FileId {
        self.manager.open_file(self.path(name)).expect("open file")
    }

    /// Shuts the pool down, keeping the directory for a successor.
    pub fn reopen_with(self, config: PoolConfig) -> Self {
        let TestPool { dir, manager } = self;
        manager.shutdown().expect("shutdown");
        drop(manager);
        let manager = Arc::new(BufferPoolManager::new(config).expect("pool"));
        Self { dir, manager }
    }
}

/// Deterministic page-sized payload: `seed` repeated.
pub fn page_of(seed: u8, page_size: usize) -> Vec<u8> {
    vec![seed; page_size]
}

/// Deterministic byte pattern: `i mod 256` over `len` bytes.
pub fn counting_bytes(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 256) as u8).collect()
}
