//! The eviction server: proactive free-list refill.
//!
//! Misses pay for eviction only when the free list is empty. This
//! background worker sweeps the partitions and, wherever the free list has
//! fallen under the low-water mark, reclaims a batch of victims ahead of
//! demand.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use riptide_common::constants::EVICTION_SWEEP_INTERVAL_US;

use crate::partition::Partition;

/// Background worker keeping partition free lists above a low-water mark.
pub struct EvictionServer {
    stop: Arc<AtomicBool>,
    wakeup: Arc<(Mutex<()>, Condvar)>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl EvictionServer {
    /// Spawns the sweep thread.
    pub fn new(
        partitions: Vec<Arc<Partition>>,
        low_water: usize,
        batch: usize,
    ) -> std::io::Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let wakeup = Arc::new((Mutex::new(()), Condvar::new()));

        let worker = {
            let stop = Arc::clone(&stop);
            let wakeup = Arc::clone(&wakeup);
            std::thread::Builder::new()
                .name("riptide-evict".to_string())
                .spawn(move || run(partitions, low_water, batch, stop, wakeup))?
        };

        tracing::debug!(low_water, batch, "eviction server started");
        Ok(Self {
            stop,
            wakeup,
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Signals the worker to stop and joins it.
    pub fn shutdown(&self) {
        self.stop.store(true, Ordering::Release);
        self.wakeup.1.notify_all();
        if let Some(worker) = self.worker.lock().take() {
            if worker.join().is_err() {
                tracing::error!("eviction server thread panicked");
            }
        }
    }
}

impl Drop for EvictionServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run(
    partitions: Vec<Arc<Partition>>,
    low_water: usize,
    batch: usize,
    stop: Arc<AtomicBool>,
    wakeup: Arc<(Mutex<()>, Condvar)>,
) {
    let interval = Duration::from_micros(EVICTION_SWEEP_INTERVAL_US);
    while !stop.load(Ordering::Acquire) {
        for partition in &partitions {
            if stop.load(Ordering::Acquire) {
                return;
            }
            if partition.free_frames() < low_water {
                let freed = partition.refill_free_list(batch);
                if freed > 0 {
                    tracing::trace!(partition = partition.index(), freed, "refilled free list");
                }
            }
        }
        let mut guard = wakeup.0.lock();
        let _ = wakeup.1.wait_for(&mut guard, interval);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IoBackendKind;
    use crate::disk::{DiskManager, OpenOptions};
    use crate::server::IoServer;
    use riptide_common::types::{FilePageId, PageKey};
    use tempfile::tempdir;

    const PAGE: usize = 4096;

    #[test]
    fn test_refills_under_low_water() {
        let dir = tempdir().unwrap();
        let disk = Arc::new(DiskManager::new());
        let file = disk
            .open(dir.path().join("evict.db"), OpenOptions::for_create())
            .unwrap();
        disk.resize(file, 8 * PAGE as u64).unwrap();

        let io = Arc::new(
            IoServer::new(0, Arc::clone(&disk), IoBackendKind::Syscall, 8, PAGE).unwrap(),
        );
        let partition = Arc::new(Partition::new(0, 1, 8, PAGE, Arc::clone(&disk), io));
        partition.register_file(file, 8);

        // Consume every free frame, all unpinned afterwards.
        for fpage in 0..8u32 {
            let _ = partition
                .fetch_page(PageKey::new(file, FilePageId::new(fpage)))
                .unwrap()
                .wait()
                .unwrap();
        }
        assert_eq!(partition.free_frames(), 0);

        let server = EvictionServer::new(vec![Arc::clone(&partition)], 4, 2).unwrap();
        // The sweep runs every few hundred microseconds; give it a moment.
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while partition.free_frames() < 2 && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(1));
        }
        assert!(partition.free_frames() >= 2);
        server.shutdown();
    }

    #[test]
    fn test_shutdown_is_idempotent() {
        let server = EvictionServer::new(Vec::new(), 0, 1).unwrap();
        server.shutdown();
        server.shutdown();
    }
}
