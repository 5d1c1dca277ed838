//! FIFO replacement with reference-bit second chances.
//!
//! The replacer keeps the set of unpinned frames in arrival order. Victim
//! selection revalidates every candidate before returning it: the frame's
//! mapping slot is locked, its pin count re-checked, and the eviction claim
//! taken — so a returned victim is already claimed and its slot lock held,
//! and the caller only has to write back, unmap, and clear.
//!
//! Candidates that fail revalidation are reinstated at the victim end of
//! the queue; a candidate with its reference bit set gets one second chance
//! at the arrival end. A frame inserted and never touched again is
//! therefore selected within one full sweep.

use std::collections::VecDeque;

use parking_lot::Mutex;
use riptide_common::types::FrameId;

use crate::frame::Frame;
use crate::page_table::{PageTable, TryLock};

struct Inner {
    queue: VecDeque<u32>,
    /// One entry per frame: whether the frame currently has a queue entry.
    queued: Box<[bool]>,
}

/// FIFO replacer over a partition's frames.
pub struct FifoReplacer {
    inner: Mutex<Inner>,
}

impl FifoReplacer {
    /// Creates a replacer for `num_frames` frames.
    pub fn new(num_frames: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                queue: VecDeque::with_capacity(num_frames),
                queued: vec![false; num_frames].into_boxed_slice(),
            }),
        }
    }

    /// Makes a frame eligible for eviction. No-op if already queued.
    pub fn insert(&self, frame: FrameId) {
        let mut inner = self.inner.lock();
        if !inner.queued[frame.index()] {
            inner.queued[frame.index()] = true;
            inner.queue.push_back(frame.as_u32());
        }
    }

    /// Withdraws a frame from eviction candidacy.
    ///
    /// The queue entry is dropped lazily at the next sweep.
    pub fn erase(&self, frame: FrameId) {
        let mut inner = self.inner.lock();
        inner.queued[frame.index()] = false;
    }

    /// Number of queued candidates (including lazily erased ones).
    pub fn len(&self) -> usize {
        self.inner.lock().queue.len()
    }

    /// Returns true if no candidates are queued.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Selects one victim, or `None` if every candidate is pinned, busy, or
    /// gone.
    ///
    /// On success the frame's eviction claim is taken and its mapping slot
    /// lock is held by the caller.
    pub fn victim(&self, table: &PageTable, frames: &[Frame]) -> Option<FrameId> {
        let mut victims = self.select(table, frames, 1);
        victims.pop()
    }

    /// Selects up to `max` victims, each claimed with its slot lock held.
    pub fn victim_batch(&self, table: &PageTable, frames: &[Frame], max: usize) -> Vec<FrameId> {
        self.select(table, frames, max)
    }

    fn select(&self, table: &PageTable, frames: &[Frame], max: usize) -> Vec<FrameId> {
        let mut inner = self.inner.lock();
        let mut victims = Vec::new();
        let mut skipped = Vec::new();

        // One pass over the queue as it stood on entry; second-chance
        // re-enqueues are not revisited this call.
        let mut budget = inner.queue.len();
        while budget > 0 && victims.len() < max {
            budget -= 1;
            let Some(candidate) = inner.queue.pop_front() else {
                break;
            };
            if !inner.queued[candidate as usize] {
                // Lazily erased.
                continue;
            }
            let frame = &frames[candidate as usize];

            if frame.ref_bit() {
                frame.clear_ref_bit();
                inner.queue.push_back(candidate);
                continue;
            }

            let key = frame.key();
            if !key.is_valid() {
                // Already freed through another path.
                inner.queued[candidate as usize] = false;
                continue;
            }

            match table.try_lock_mapping(key) {
                TryLock::Locked(Some(mapped)) if mapped.as_u32() == candidate => {
                    if frame.try_begin_evict() {
                        inner.queued[candidate as usize] = false;
                        victims.push(FrameId::new(candidate));
                    } else {
                        // Re-pinned since it was enqueued.
                        table.unlock_mapping(key);
                        skipped.push(candidate);
                    }
                }
                TryLock::Locked(_) => {
                    // The mapping moved on; this entry is stale.
                    table.unlock_mapping(key);
                    inner.queued[candidate as usize] = false;
                }
                TryLock::Absent => {
                    inner.queued[candidate as usize] = false;
                }
                TryLock::Busy => skipped.push(candidate),
            }
        }

        // Skipped candidates go back to the victim end, oldest first.
        for candidate in skipped.into_iter().rev() {
            inner.queue.push_front(candidate);
        }
        victims
    }
}

impl std::fmt::Debug for FifoReplacer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FifoReplacer")
            .field("len", &self.len())
            .finish()
    }
}
