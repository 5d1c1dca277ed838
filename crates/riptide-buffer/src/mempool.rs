//! The partition arena: one aligned allocation, addressed by frame.
//!
//! Frames are fixed-size regions of a single page-aligned allocation;
//! `frame_id * page_size` is the only address arithmetic in the pool. The
//! arena is advised as randomly accessed since frame reuse follows eviction
//! order, not address order.

use riptide_common::memory::AlignedBuffer;
use riptide_common::types::FrameId;

/// A partition's frame memory.
pub struct MemoryPool {
    arena: AlignedBuffer,
    page_size: usize,
    num_frames: usize,
}

impl MemoryPool {
    /// Allocates an arena of `num_frames * page_size` zeroed bytes, aligned
    /// to the page size.
    pub fn new(num_frames: usize, page_size: usize) -> Self {
        assert!(page_size.is_power_of_two());
        assert!(num_frames > 0);

        let arena = AlignedBuffer::new(num_frames * page_size, page_size);

        #[cfg(unix)]
        {
            // SAFETY: the range is exactly the arena we just allocated.
            unsafe {
                libc::madvise(
                    arena.as_mut_ptr().cast(),
                    arena.len(),
                    libc::MADV_RANDOM,
                );
            }
        }

        Self {
            arena,
            page_size,
            num_frames,
        }
    }

    /// Returns the page size.
    #[inline]
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Returns the number of frames.
    #[inline]
    pub fn num_frames(&self) -> usize {
        self.num_frames
    }

    /// Returns the arena size in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.arena.len()
    }

    /// Returns true if the arena is empty (never the case).
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }

    /// Returns the base address of a frame.
    #[inline]
    pub fn frame_ptr(&self, frame: FrameId) -> *mut u8 {
        assert!(frame.index() < self.num_frames, "frame out of range");
        // SAFETY: the offset stays within the arena allocation.
        unsafe { self.arena.as_mut_ptr().add(frame.index() * self.page_size) }
    }

    /// Borrows a frame's bytes.
    ///
    /// # Safety
    ///
    /// The caller must hold a pin (or the loading reservation) on the frame
    /// and must not read it while another party writes it; the pool does
    /// not enforce reader/writer exclusion on page bytes.
    #[inline]
    pub unsafe fn frame_slice(&self, frame: FrameId) -> &[u8] {
        std::slice::from_raw_parts(self.frame_ptr(frame), self.page_size)
    }

    /// Mutably borrows a frame's bytes.
    ///
    /// # Safety
    ///
    /// As [`MemoryPool::frame_slice`], and the caller must be the only
    /// writer for the duration of the borrow.
    #[inline]
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn frame_slice_mut(&self, frame: FrameId) -> &mut [u8] {
        std::slice::from_raw_parts_mut(self.frame_ptr(frame), self.page_size)
    }

    /// Zeroes a frame's bytes.
    ///
    /// # Safety
    ///
    /// As [`MemoryPool::frame_slice_mut`].
    pub unsafe fn zero_frame(&self, frame: FrameId) {
        self.frame_slice_mut(frame).fill(0);
    }
}

impl std::fmt::Debug for MemoryPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryPool")
            .field("num_frames", &self.num_frames)
            .field("page_size", &self.page_size)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_addresses_are_disjoint_and_aligned() {
        let pool = MemoryPool::new(8, 4096);
        for i in 0..8u32 {
            let ptr = pool.frame_ptr(FrameId::new(i));
            assert_eq!(ptr as usize % 4096, 0);
        }
        let a = pool.frame_ptr(FrameId::new(0)) as usize;
        let b = pool.frame_ptr(FrameId::new(1)) as usize;
        assert_eq!(b - a, 4096);
    }

    #[test]
    fn test_frames_start_zeroed() {
        let pool = MemoryPool::new(2, 4096);
        // SAFETY: test is the only accessor
        let data = unsafe { pool.frame_slice(FrameId::new(1)) };
        assert!(data.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_write_then_read_frame() {
        let pool = MemoryPool::new(2, 4096);
        // SAFETY: test is the only accessor
        unsafe {
            pool.frame_slice_mut(FrameId::new(0))[0..4].copy_from_slice(&[9, 8, 7, 6]);
            assert_eq!(&pool.frame_slice(FrameId::new(0))[0..4], &[9, 8, 7, 6]);
            // Neighbouring frame is untouched.
            assert_eq!(pool.frame_slice(FrameId::new(1))[0], 0);
        }
    }

    #[test]
    fn test_zero_frame() {
        let pool = MemoryPool::new(1, 4096);
        // SAFETY: test is the only accessor
        unsafe {
            pool.frame_slice_mut(FrameId::new(0)).fill(0xAB);
            pool.zero_frame(FrameId::new(0));
            assert!(pool.frame_slice(FrameId::new(0)).iter().all(|&b| b == 0));
        }
    }

    #[test]
    #[should_panic(expected = "frame out of range")]
    fn test_out_of_range_frame_panics() {
        let pool = MemoryPool::new(2, 4096);
        let _ = pool.frame_ptr(FrameId::new(2));
    }
}
