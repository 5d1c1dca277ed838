//! Direct-mapped lookup cache in front of the page tables.
//!
//! A small fixed array caches recent `(file, fpage) → (frame, epoch)`
//! results. A probe that matches the key attempts a single optimistic pin
//! and re-validates the frame's recycle epoch afterwards; any disagreement
//! falls through to the regular path. Eviction invalidates entries for
//! free by bumping the frame's epoch, so the cache itself is never swept.
//!
//! Collisions simply overwrite the slot.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use riptide_common::types::{FrameId, PageKey};

use crate::partition::{PagePin, Partition};

/// Sentinel for an unoccupied entry.
const NO_KEY: u64 = u64::MAX;

struct Entry {
    /// Packed page key, or `NO_KEY`.
    key: AtomicU64,
    /// Low 32 bits: frame id. High 32 bits: frame epoch at record time.
    value: AtomicU64,
}

/// Epoch-validated direct-mapped cache of page locations.
pub struct DirectCache {
    entries: Box<[Entry]>,
}

impl DirectCache {
    /// Creates a cache with `capacity` entries; `None` when disabled.
    pub fn new(capacity: usize) -> Option<Self> {
        if capacity == 0 {
            return None;
        }
        let mut entries = Vec::with_capacity(capacity);
        entries.resize_with(capacity, || Entry {
            key: AtomicU64::new(NO_KEY),
            value: AtomicU64::new(0),
        });
        Some(Self {
            entries: entries.into_boxed_slice(),
        })
    }

    #[inline]
    fn slot(&self, key: PageKey) -> &Entry {
        // Fibonacci hash spreads sequential page indexes across the table.
        let hash = key.pack().wrapping_mul(0x9E37_79B9_7F4A_7C15);
        let index = (hash >> 32) as usize % self.entries.len();
        &self.entries[index]
    }

    /// Attempts a cached pin. Falls through (returns `None`) on key
    /// mismatch, a recycled frame, or a failed pin.
    pub fn probe(&self, key: PageKey, partition: &Arc<Partition>) -> Option<PagePin> {
        let entry = self.slot(key);
        if entry.key.load(Ordering::Acquire) != key.pack() {
            return None;
        }
        let value = entry.value.load(Ordering::Acquire);
        let frame = FrameId::new(value as u32);
        let epoch = (value >> 32) as u32;

        // A recycled frame has a newer epoch; don't bother pinning.
        if partition.frame_epoch(frame) as u32 != epoch {
            return None;
        }
        let pin = partition.try_pin_frame(key, frame)?;
        // The pin validated identity; re-check the epoch so a recycle
        // that raced the pin cannot serve stale bytes.
        if pin.epoch() as u32 != epoch {
            return None;
        }
        Some(pin)
    }

    /// Records a resolved pin for later probes.
    pub fn record(&self, key: PageKey, pin: &PagePin) {
        let entry = self.slot(key);
        let value = ((pin.epoch() as u32 as u64) << 32) | pin.frame_id().as_u32() as u64;
        entry.value.store(value, Ordering::Release);
        entry.key.store(key.pack(), Ordering::Release);
    }
}

impl std::fmt::Debug for DirectCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectCache")
            .field("capacity", &self.entries.len())
            .finish()
    }
}
