//! Benchmark support for the Riptide buffer pool.
//!
//! The actual benchmarks live under `benches/`; this crate exists so the
//! workspace has one place for benchmark helpers and dependencies.

use std::sync::Arc;

use riptide_buffer::{BufferPoolManager, PoolConfig};
use riptide_common::types::FileId;

/// A pool over a temporary directory with one pre-sized data file.
pub struct BenchPool {
    _dir: tempfile::TempDir,
    /// The pool under measurement.
    pub manager: Arc<BufferPoolManager>,
    /// A data file of `pages` pages.
    pub file: FileId,
}

/// Builds a pool and fills `pages` pages with a deterministic pattern.
pub fn bench_pool(config: PoolConfig, pages: usize) -> BenchPool {
    let dir = tempfile::tempdir().expect("tempdir");
    let page_size = config.page_size;
    let manager = Arc::new(BufferPoolManager::new(config).expect("pool"));
    let file = manager.open_file(dir.path().join("bench.db")).expect("open");

    for fpage in 0..pages {
        let payload = vec![(fpage % 256) as u8; page_size];
        manager
            .set_block(file, (fpage * page_size) as u64, &payload, false)
            .expect("seed");
    }
    manager.flush_file(file).expect("flush");

    BenchPool {
        _dir: dir,
        manager,
        file,
    }
}
