//! The partition free list: clean, unmapped frames ready for allocation.

use crossbeam_queue::ArrayQueue;
use riptide_common::types::FrameId;

/// Bounded lock-free queue of free frames.
///
/// Frames enter at pool initialisation and after eviction; they leave on
/// allocation. Capacity equals the partition's frame count, so a push can
/// only fail on a double-free.
pub struct FreeList {
    queue: ArrayQueue<u32>,
}

impl FreeList {
    /// Creates a free list able to hold every frame of the partition.
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: ArrayQueue::new(capacity.max(1)),
        }
    }

    /// Adds a frame.
    pub fn push(&self, frame: FrameId) {
        let result = self.queue.push(frame.as_u32());
        debug_assert!(result.is_ok(), "free list overflow: frame freed twice?");
    }

    /// Takes a frame, if any.
    pub fn pop(&self) -> Option<FrameId> {
        self.queue.pop().map(FrameId::new)
    }

    /// Current number of free frames.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Returns true if no frames are free.
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

impl std::fmt::Debug for FreeList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FreeList").field("len", &self.len()).finish()
    }
}
