//! Per-frame metadata: reverse mapping, pin count, and state flags.
//!
//! Each frame in a partition's arena carries one [`Frame`] record. All
//! fields are atomics; the pin count doubles as the eviction claim through
//! its high bit, so the pin-versus-evict race is decided by a single
//! compare-and-swap:
//!
//! - a pinner increments the count only while the claim bit is clear, then
//!   re-validates the frame identity and undoes the increment on mismatch;
//! - an evictor claims the frame only by swapping a count of exactly zero
//!   for the claim bit, and only while holding the page-table slot lock for
//!   the frame's current mapping.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

use riptide_common::types::{FileId, FilePageId, FrameId, PageKey};

/// High bit of the pin count: set while an evictor owns the frame.
const EVICTING: u32 = 1 << 31;

/// Metadata for one memory frame.
pub struct Frame {
    id: FrameId,
    /// Owning file of the resident page, or `INVALID` when free.
    file: AtomicU32,
    /// Page index of the resident page, or `INVALID` when free.
    fpage: AtomicU32,
    /// Outstanding pins; bit 31 is the eviction claim.
    pin_count: AtomicU32,
    /// Set when the frame was modified since the last write-back.
    dirty: AtomicBool,
    /// Reference hint for the replacer: set on access, cleared on sweep.
    ref_bit: AtomicBool,
    /// Set while the frame's read from disk is in flight.
    loading: AtomicBool,
    /// Bumped every time the frame is recycled; validates direct-cache hits.
    epoch: AtomicU64,
}

impl Frame {
    /// Creates an empty frame.
    pub fn new(id: FrameId) -> Self {
        Self {
            id,
            file: AtomicU32::new(FileId::INVALID.as_u32()),
            fpage: AtomicU32::new(FilePageId::INVALID.as_u32()),
            pin_count: AtomicU32::new(0),
            dirty: AtomicBool::new(false),
            ref_bit: AtomicBool::new(false),
            loading: AtomicBool::new(false),
            epoch: AtomicU64::new(0),
        }
    }

    /// Returns the frame ID.
    #[inline]
    pub fn id(&self) -> FrameId {
        self.id
    }

    /// Returns the identity of the resident page.
    #[inline]
    pub fn key(&self) -> PageKey {
        PageKey::new(
            FileId::new(self.file.load(Ordering::Acquire)),
            FilePageId::new(self.fpage.load(Ordering::Acquire)),
        )
    }

    /// Returns true if no page is resident.
    #[inline]
    pub fn is_empty(&self) -> bool {
        !self.key().is_valid()
    }

    /// Returns the current pin count (claim bit masked out).
    #[inline]
    pub fn pin_count(&self) -> u32 {
        self.pin_count.load(Ordering::Acquire) & !EVICTING
    }

    /// Returns true if the frame is pinned.
    #[inline]
    pub fn is_pinned(&self) -> bool {
        self.pin_count() > 0
    }

    /// Optimistic pin: takes a reference, then re-validates that the frame
    /// still holds `key` and is not mid-load.
    ///
    /// Fails without side effects if the frame is claimed for eviction, was
    /// remapped since the caller looked it up, or is still loading.
    pub fn try_pin(&self, key: PageKey) -> bool {
        let mut current = self.pin_count.load(Ordering::Acquire);
        loop {
            if current & EVICTING != 0 {
                return false;
            }
            match self.pin_count.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(observed) => current = observed,
            }
        }

        // The reference is taken; now confirm we pinned the page we meant
        // to. An eviction that completed between the lookup and the CAS
        // shows up as a changed identity.
        if self.key() != key || self.loading.load(Ordering::Acquire) {
            self.unpin_raw();
            return false;
        }
        self.ref_bit.store(true, Ordering::Release);
        true
    }

    /// Pin under the mapping-slot lock, where the identity is stable.
    ///
    /// Permitted on loading frames; the caller is responsible for awaiting
    /// the load before exposing the data.
    pub fn pin_locked(&self) -> u32 {
        let old = self.pin_count.fetch_add(1, Ordering::AcqRel);
        debug_assert_eq!(old & EVICTING, 0, "pinned a frame claimed for eviction");
        self.ref_bit.store(true, Ordering::Release);
        (old & !EVICTING) + 1
    }

    /// Releases one pin and returns the remaining count.
    pub fn unpin(&self) -> u32 {
        self.unpin_raw()
    }

    #[inline]
    fn unpin_raw(&self) -> u32 {
        let old = self.pin_count.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(old & !EVICTING > 0, "unpinned a frame with pin_count 0");
        (old & !EVICTING) - 1
    }

    /// Claims the frame for eviction. Succeeds only on a pin count of
    /// exactly zero; afterwards no new pins can be taken.
    ///
    /// Callers must hold the page-table slot lock for this frame's mapping.
    pub fn try_begin_evict(&self) -> bool {
        self.pin_count
            .compare_exchange(0, EVICTING, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Abandons an eviction claim, making the frame pinnable again.
    pub fn abort_evict(&self) {
        let prev = self.pin_count.swap(0, Ordering::AcqRel);
        debug_assert_eq!(prev, EVICTING, "abort_evict without a claim");
    }

    /// Returns true if the frame was modified since the last write-back.
    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    /// Sets or clears the dirty flag.
    #[inline]
    pub fn set_dirty(&self, dirty: bool) {
        self.dirty.store(dirty, Ordering::Release);
    }

    /// Returns the replacer reference hint.
    #[inline]
    pub fn ref_bit(&self) -> bool {
        self.ref_bit.load(Ordering::Acquire)
    }

    /// Clears the replacer reference hint.
    #[inline]
    pub fn clear_ref_bit(&self) {
        self.ref_bit.store(false, Ordering::Release);
    }

    /// Returns true while the frame's disk read is in flight.
    #[inline]
    pub fn is_loading(&self) -> bool {
        self.loading.load(Ordering::Acquire)
    }

    /// Clears the loading flag; returns true for the caller that cleared it.
    #[inline]
    pub fn finish_loading(&self) -> bool {
        self.loading.swap(false, Ordering::AcqRel)
    }

    /// Returns the recycle epoch.
    #[inline]
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    /// Prepares a freshly allocated frame for a load of `key`.
    ///
    /// Takes the loader's pin and marks the frame loading. Must happen
    /// before the mapping is published so that lookups never see a mapped
    /// frame without the loading mark.
    pub fn prepare_load(&self, key: PageKey) {
        self.loading.store(true, Ordering::Release);
        self.dirty.store(false, Ordering::Release);
        self.ref_bit.store(true, Ordering::Release);
        // fetch_add, not store: a stale optimistic pin may be mid-undo.
        let old = self.pin_count.fetch_add(1, Ordering::AcqRel);
        debug_assert_eq!(old & EVICTING, 0);
        self.file.store(key.file.as_u32(), Ordering::Release);
        self.fpage.store(key.fpage.as_u32(), Ordering::Release);
    }

    /// Drops the frame's identity after a failed load so no future lookup
    /// trusts its contents. Outstanding pins drain through `unpin`.
    pub fn poison(&self) {
        self.file.store(FileId::INVALID.as_u32(), Ordering::Release);
        self.fpage.store(FilePageId::INVALID.as_u32(), Ordering::Release);
        self.dirty.store(false, Ordering::Release);
        self.epoch.fetch_add(1, Ordering::AcqRel);
    }

    /// Resets the frame to empty at the end of eviction.
    ///
    /// Requires the eviction claim; releases it.
    pub fn clear(&self) {
        debug_assert_eq!(self.pin_count.load(Ordering::Acquire), EVICTING);
        self.file.store(FileId::INVALID.as_u32(), Ordering::Release);
        self.fpage.store(FilePageId::INVALID.as_u32(), Ordering::Release);
        self.dirty.store(false, Ordering::Release);
        self.ref_bit.store(false, Ordering::Release);
        self.loading.store(false, Ordering::Release);
        self.epoch.fetch_add(1, Ordering::AcqRel);
        // Releasing the claim is last: from here the frame is allocatable.
        self.pin_count.store(0, Ordering::Release);
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("id", &self.id)
            .field("key", &self.key())
            .field("pin_count", &self.pin_count())
            .field("dirty", &self.is_dirty())
            .field("ref_bit", &self.ref_bit())
            .field("loading", &self.is_loading())
            .field("epoch", &self.epoch())
            .finish()
    }
}
