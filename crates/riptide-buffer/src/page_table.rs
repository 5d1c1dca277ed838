//! The partition page table: `(file, fpage) → frame` with per-slot locking.
//!
//! Each registered file gets a direct-indexed vector of slots, one per page
//! this partition can own (`fpage / partitions`). A slot is a single
//! `AtomicU32` packing the mapped frame (or an empty sentinel) with a busy
//! bit in the high position. The busy bit is a spinlock on the mapping:
//! while it is set, only the holder may change the binding, and lookups
//! treat the slot as mid-transition.
//!
//! Lookups are a single atomic load on the happy path and may return
//! stale-but-consistent results; callers revalidate against the frame's
//! reverse record after taking their reference.

use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::RwLock;
use riptide_common::constants::SPIN_YIELD_THRESHOLD;
use riptide_common::types::{FileId, FilePageId, FrameId, PageKey};

/// Busy bit: the slot's mapping is mid-transition.
const BUSY: u32 = 1 << 31;
/// Sentinel frame value for an empty slot.
const EMPTY: u32 = BUSY - 1;

/// Outcome of a non-blocking slot lock attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TryLock {
    /// Another holder owns the busy bit right now.
    Busy,
    /// The file is not registered or the page is out of range.
    Absent,
    /// Locked; carries the current occupant.
    Locked(Option<FrameId>),
}

struct FileSlots {
    slots: Box<[AtomicU32]>,
}

impl FileSlots {
    fn new(len: usize) -> Self {
        let mut slots = Vec::with_capacity(len);
        slots.resize_with(len, || AtomicU32::new(EMPTY));
        Self {
            slots: slots.into_boxed_slice(),
        }
    }

    /// Copies slot values (busy bits included) into a larger table.
    ///
    /// Callers hold the registry write lock, so no slot is concurrently
    /// read or written while values move.
    fn grown_to(&self, len: usize) -> Self {
        let grown = Self::new(len);
        for (old, new) in self.slots.iter().zip(grown.slots.iter()) {
            new.store(old.load(Ordering::Acquire), Ordering::Release);
        }
        grown
    }
}

/// Concurrent mapping from page keys to frames for one partition.
pub struct PageTable {
    /// This partition's index in the pool.
    partition: usize,
    /// Total partitions; `fpage / partitions` addresses the slot.
    partitions: usize,
    files: RwLock<Vec<Option<FileSlots>>>,
}

impl PageTable {
    /// Creates an empty table for partition `partition` of `partitions`.
    pub fn new(partition: usize, partitions: usize) -> Self {
        debug_assert!(partition < partitions);
        Self {
            partition,
            partitions,
            files: RwLock::new(Vec::new()),
        }
    }

    #[inline]
    fn slot_index(&self, fpage: FilePageId) -> usize {
        debug_assert_eq!(
            fpage.index() % self.partitions,
            self.partition,
            "page routed to the wrong partition"
        );
        fpage.index() / self.partitions
    }

    /// Registers a file able to hold `file_pages` pages pool-wide.
    ///
    /// Growing an already registered file keeps existing mappings.
    pub fn register_file(&self, file: FileId, file_pages: usize) {
        let slots_needed = file_pages / self.partitions + 1;
        let mut files = self.files.write();
        if files.len() <= file.index() {
            files.resize_with(file.index() + 1, || None);
        }
        let replacement = match &files[file.index()] {
            Some(existing) if existing.slots.len() >= slots_needed => None,
            Some(existing) => Some(existing.grown_to(slots_needed)),
            None => Some(FileSlots::new(slots_needed)),
        };
        if let Some(slots) = replacement {
            files[file.index()] = Some(slots);
        }
    }

    /// Drops every slot of a file. The caller has already torn down the
    /// mappings themselves.
    pub fn forget_file(&self, file: FileId) {
        let mut files = self.files.write();
        if let Some(entry) = files.get_mut(file.index()) {
            *entry = None;
        }
    }

    /// Returns true if the file is registered.
    pub fn knows_file(&self, file: FileId) -> bool {
        let files = self.files.read();
        matches!(files.get(file.index()), Some(Some(_)))
    }

    /// Wait-free lookup. Returns the mapped frame, or `None` if the slot is
    /// empty, absent, or mid-transition.
    pub fn lookup(&self, key: PageKey) -> Option<FrameId> {
        let files = self.files.read();
        let slots = files.get(key.file.index())?.as_ref()?;
        let slot = slots.slots.get(self.slot_index(key.fpage))?;
        let value = slot.load(Ordering::Acquire);
        if value & BUSY != 0 || value == EMPTY {
            None
        } else {
            Some(FrameId::new(value))
        }
    }

    /// Single attempt to take a slot's busy bit without blocking.
    pub fn try_lock_mapping(&self, key: PageKey) -> TryLock {
        let files = self.files.read();
        let Some(Some(slots)) = files.get(key.file.index()) else {
            return TryLock::Absent;
        };
        let Some(slot) = slots.slots.get(self.slot_index(key.fpage)) else {
            return TryLock::Absent;
        };
        let value = slot.load(Ordering::Acquire);
        if value & BUSY != 0 {
            return TryLock::Busy;
        }
        match slot.compare_exchange(value, value | BUSY, Ordering::AcqRel, Ordering::Acquire) {
            Ok(_) => TryLock::Locked(if value == EMPTY {
                None
            } else {
                Some(FrameId::new(value))
            }),
            Err(_) => TryLock::Busy,
        }
    }

    /// Takes a slot's busy bit, spinning while contended.
    ///
    /// Returns `None` if the file is unregistered or the page out of range;
    /// otherwise the current occupant with the busy bit held.
    pub fn lock_mapping(&self, key: PageKey) -> Option<Option<FrameId>> {
        let mut spins = 0usize;
        loop {
            match self.try_lock_mapping(key) {
                TryLock::Locked(frame) => return Some(frame),
                TryLock::Absent => return None,
                TryLock::Busy => {
                    spins += 1;
                    if spins > SPIN_YIELD_THRESHOLD {
                        std::thread::yield_now();
                        spins = 0;
                    } else {
                        std::hint::spin_loop();
                    }
                }
            }
        }
    }

    /// Like [`PageTable::lock_mapping`], but grows the file's slot vector
    /// so the page is in range. `None` only if the file is unregistered.
    pub fn lock_mapping_create(&self, key: PageKey) -> Option<Option<FrameId>> {
        loop {
            match self.lock_mapping(key) {
                Some(frame) => return Some(frame),
                None => {
                    if !self.knows_file(key.file) {
                        return None;
                    }
                    self.grow_file(key.file, self.slot_index(key.fpage) + 1);
                }
            }
        }
    }

    fn grow_file(&self, file: FileId, slots_needed: usize) {
        let mut files = self.files.write();
        let grown = match files.get(file.index()) {
            Some(Some(existing)) if existing.slots.len() < slots_needed => {
                Some(existing.grown_to(slots_needed))
            }
            _ => None,
        };
        if let Some(slots) = grown {
            files[file.index()] = Some(slots);
        }
    }

    /// Installs or updates a binding. The caller holds the slot's busy bit,
    /// which stays held.
    pub fn create_mapping(&self, key: PageKey, frame: FrameId) {
        self.store_locked(key, frame.as_u32());
    }

    /// Clears a binding. The caller holds the slot's busy bit, which stays
    /// held.
    pub fn delete_mapping(&self, key: PageKey) {
        self.store_locked(key, EMPTY);
    }

    /// Releases a slot's busy bit.
    pub fn unlock_mapping(&self, key: PageKey) {
        let files = self.files.read();
        let slot = self.locked_slot(&files, key);
        let prev = slot.fetch_and(!BUSY, Ordering::AcqRel);
        debug_assert!(prev & BUSY != 0, "unlocked a slot that was not busy");
    }

    fn store_locked(&self, key: PageKey, value: u32) {
        let files = self.files.read();
        let slot = self.locked_slot(&files, key);
        debug_assert!(slot.load(Ordering::Acquire) & BUSY != 0);
        slot.store(value | BUSY, Ordering::Release);
    }

    fn locked_slot<'a>(
        &self,
        files: &'a [Option<FileSlots>],
        key: PageKey,
    ) -> &'a AtomicU32 {
        files[key.file.index()]
            .as_ref()
            .expect("slot lock held on unregistered file")
            .slots
            .get(self.slot_index(key.fpage))
            .expect("slot lock held on out-of-range page")
    }

    /// Snapshot of the resident pages of a file, busy or not.
    ///
    /// Callers revalidate each entry under its slot lock before acting.
    pub fn resident_pages(&self, file: FileId) -> Vec<(FilePageId, FrameId)> {
        let files = self.files.read();
        let Some(Some(slots)) = files.get(file.index()) else {
            return Vec::new();
        };
        let mut resident = Vec::new();
        for (index, slot) in slots.slots.iter().enumerate() {
            let value = slot.load(Ordering::Acquire) & !BUSY;
            if value != EMPTY {
                let fpage =
                    FilePageId::new((index * self.partitions + self.partition) as u32);
                resident.push((fpage, FrameId::new(value)));
            }
        }
        resident
    }

    /// Approximate count of mappings held for a file.
    pub fn resident_count(&self, file: FileId) -> usize {
        self.resident_pages(file).len()
    }
}

impl std::fmt::Debug for PageTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageTable")
            .field("partition", &self.partition)
            .field("files", &self.files.read().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(file: u32, fpage: u32) -> PageKey {
        PageKey::new(FileId::new(file), FilePageId::new(fpage))
    }

    fn table() -> PageTable {
        let table = PageTable::new(0, 1);
        table.register_file(FileId::new(0), 64);
        table
    }

    #[test]
    fn test_lookup_empty() {
        let table = table();
        assert_eq!(table.lookup(key(0, 5)), None);
        assert!(!table.knows_file(FileId::new(9)));
    }

    #[test]
    fn test_create_then_lookup() {
        let table = table();
        let k = key(0, 5);

        assert_eq!(table.lock_mapping_create(k), Some(None));
        table.create_mapping(k, FrameId::new(3));
        // Mid-transition: lookups refuse the slot.
        assert_eq!(table.lookup(k), None);
        table.unlock_mapping(k);

        assert_eq!(table.lookup(k), Some(FrameId::new(3)));
    }

    #[test]
    fn test_delete_mapping() {
        let table = table();
        let k = key(0, 7);

        table.lock_mapping_create(k);
        table.create_mapping(k, FrameId::new(1));
        table.unlock_mapping(k);

        assert_eq!(table.lock_mapping(k), Some(Some(FrameId::new(1))));
        table.delete_mapping(k);
        table.unlock_mapping(k);
        assert_eq!(table.lookup(k), None);
    }

    #[test]
    fn test_try_lock_contention() {
        let table = table();
        let k = key(0, 2);

        assert_eq!(table.try_lock_mapping(k), TryLock::Locked(None));
        assert_eq!(table.try_lock_mapping(k), TryLock::Busy);
        table.unlock_mapping(k);
        assert!(matches!(table.try_lock_mapping(k), TryLock::Locked(None)));
        table.unlock_mapping(k);
    }

    #[test]
    fn test_absent_file_and_page() {
        let table = table();
        assert_eq!(table.try_lock_mapping(key(3, 0)), TryLock::Absent);
        assert_eq!(table.lock_mapping(key(0, 10_000)), None);
        assert_eq!(table.lock_mapping_create(key(3, 0)), None);
    }

    #[test]
    fn test_create_grows_out_of_range_page() {
        let table = table();
        let k = key(0, 50_000);
        assert_eq!(table.lock_mapping_create(k), Some(None));
        table.create_mapping(k, FrameId::new(9));
        table.unlock_mapping(k);
        assert_eq!(table.lookup(k), Some(FrameId::new(9)));
    }

    #[test]
    fn test_grow_preserves_mappings_and_locks() {
        let table = table();
        let held = key(0, 1);
        let mapped = key(0, 2);

        table.lock_mapping_create(mapped);
        table.create_mapping(mapped, FrameId::new(4));
        table.unlock_mapping(mapped);

        // Hold a busy bit across a growth.
        assert_eq!(table.lock_mapping(held), Some(None));
        table.register_file(FileId::new(0), 4096);

        assert_eq!(table.lookup(mapped), Some(FrameId::new(4)));
        assert_eq!(table.try_lock_mapping(held), TryLock::Busy);
        table.unlock_mapping(held);
    }

    #[test]
    fn test_partitioned_slot_addressing() {
        let table = PageTable::new(1, 4);
        table.register_file(FileId::new(0), 64);

        // Pages 1, 5, 9 route to partition 1 of 4.
        for fpage in [1u32, 5, 9] {
            let k = key(0, fpage);
            table.lock_mapping_create(k);
            table.create_mapping(k, FrameId::new(fpage));
            table.unlock_mapping(k);
        }
        let resident = table.resident_pages(FileId::new(0));
        let pages: Vec<u32> = resident.iter().map(|(p, _)| p.as_u32()).collect();
        assert_eq!(pages, vec![1, 5, 9]);
    }

    #[test]
    fn test_forget_file() {
        let table = table();
        let k = key(0, 3);
        table.lock_mapping_create(k);
        table.create_mapping(k, FrameId::new(2));
        table.unlock_mapping(k);

        table.forget_file(FileId::new(0));
        assert_eq!(table.lookup(k), None);
        assert!(!table.knows_file(FileId::new(0)));
    }

    #[test]
    fn test_concurrent_lock_excludes() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        let table = Arc::new(table());
        let in_section = Arc::new(AtomicUsize::new(0));
        let k = key(0, 0);

        let mut handles = Vec::new();
        for _ in 0..4 {
            let table = Arc::clone(&table);
            let in_section = Arc::clone(&in_section);
            handles.push(std::thread::spawn(move || {
                for _ in 0..1000 {
                    table.lock_mapping(k).unwrap();
                    assert_eq!(in_section.fetch_add(1, Ordering::SeqCst), 0);
                    in_section.fetch_sub(1, Ordering::SeqCst);
                    table.unlock_mapping(k);
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
    }
}
