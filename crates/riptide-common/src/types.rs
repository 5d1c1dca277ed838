//! Core identifier types for Riptide.
//!
//! These types provide type-safe wrappers around numeric identifiers,
//! preventing accidental misuse of different ID spaces: a logical file
//! handle is not a file page index is not a memory frame index.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Logical file handle issued by the pool at file registration.
///
/// File handles are assigned monotonically and never reused: closing a file
/// invalidates the handle but keeps its slot occupied.
///
/// # Example
///
/// ```rust
/// use riptide_common::types::FileId;
///
/// let fd = FileId::new(3);
/// assert_eq!(fd.index(), 3);
/// ```
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct FileId(u32);

impl FileId {
    /// Invalid file handle, used as a sentinel value.
    pub const INVALID: Self = Self(u32::MAX);

    /// Creates a new `FileId` from a raw value.
    #[inline]
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Returns the raw value.
    #[inline]
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    /// Returns the raw value as a usize index.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// Checks if this is a valid file handle.
    #[inline]
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.0 != Self::INVALID.0
    }
}

impl fmt::Debug for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::INVALID {
            write!(f, "FileId(INVALID)")
        } else {
            write!(f, "FileId({})", self.0)
        }
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for FileId {
    #[inline]
    fn from(id: u32) -> Self {
        Self::new(id)
    }
}

impl From<FileId> for u32 {
    #[inline]
    fn from(id: FileId) -> Self {
        id.0
    }
}

/// Zero-based index of a page-sized region inside a file.
///
/// The on-disk page size equals the in-memory frame size, so a file page
/// index multiplied by the page size yields the byte offset of the page.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct FilePageId(u32);

impl FilePageId {
    /// Invalid file page index, used as a sentinel value.
    pub const INVALID: Self = Self(u32::MAX);

    /// Creates a new `FilePageId` from a raw value.
    #[inline]
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Returns the raw value.
    #[inline]
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    /// Returns the raw value as a usize index.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// Returns the next file page index.
    #[inline]
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }

    /// Checks if this is a valid file page index.
    #[inline]
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.0 != Self::INVALID.0
    }
}

impl fmt::Debug for FilePageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::INVALID {
            write!(f, "FilePageId(INVALID)")
        } else {
            write!(f, "FilePageId({})", self.0)
        }
    }
}

impl fmt::Display for FilePageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for FilePageId {
    #[inline]
    fn from(id: u32) -> Self {
        Self::new(id)
    }
}

impl From<FilePageId> for u32 {
    #[inline]
    fn from(id: FilePageId) -> Self {
        id.0
    }
}

/// Index of a memory frame inside a partition's arena.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct FrameId(u32);

impl FrameId {
    /// Invalid frame ID.
    pub const INVALID: Self = Self(u32::MAX);

    /// Creates a new frame ID.
    #[inline]
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Returns the raw value.
    #[inline]
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    /// Returns the raw index.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// Checks if this is a valid frame ID.
    #[inline]
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.0 != Self::INVALID.0
    }
}

impl fmt::Debug for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::INVALID {
            write!(f, "FrameId(INVALID)")
        } else {
            write!(f, "FrameId({})", self.0)
        }
    }
}

impl fmt::Display for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for FrameId {
    #[inline]
    fn from(id: u32) -> Self {
        Self::new(id)
    }
}

impl From<FrameId> for u32 {
    #[inline]
    fn from(id: FrameId) -> Self {
        id.0
    }
}

/// Composite key identifying a page of a registered file.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PageKey {
    /// The logical file handle.
    pub file: FileId,
    /// The page index within the file.
    pub fpage: FilePageId,
}

impl PageKey {
    /// Creates a new page key.
    #[inline]
    #[must_use]
    pub const fn new(file: FileId, fpage: FilePageId) -> Self {
        Self { file, fpage }
    }

    /// Packs the key into a single 64-bit value (file in the high half).
    #[inline]
    #[must_use]
    pub const fn pack(self) -> u64 {
        ((self.file.as_u32() as u64) << 32) | self.fpage.as_u32() as u64
    }

    /// Checks that both components are valid.
    #[inline]
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.file.is_valid() && self.fpage.is_valid()
    }
}

impl fmt::Debug for PageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PageKey({}:{})", self.file, self.fpage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_id() {
        assert!(!FileId::INVALID.is_valid());
        assert!(FileId::new(0).is_valid());
        assert_eq!(FileId::new(7).index(), 7);
        assert_eq!(u32::from(FileId::new(7)), 7);
    }

    #[test]
    fn test_file_page_id() {
        assert!(!FilePageId::INVALID.is_valid());
        assert_eq!(FilePageId::new(41).next(), FilePageId::new(42));
        assert_eq!(FilePageId::INVALID.next(), FilePageId::INVALID);
    }

    #[test]
    fn test_frame_id() {
        assert!(!FrameId::INVALID.is_valid());
        assert_eq!(FrameId::new(42).index(), 42);
    }

    #[test]
    fn test_page_key_pack() {
        let key = PageKey::new(FileId::new(1), FilePageId::new(2));
        assert_eq!(key.pack(), (1u64 << 32) | 2);
        assert!(key.is_valid());

        let invalid = PageKey::new(FileId::INVALID, FilePageId::new(2));
        assert!(!invalid.is_valid());
    }

    #[test]
    fn test_display() {
        assert_eq!(FileId::new(3).to_string(), "3");
        assert_eq!(format!("{:?}", FrameId::INVALID), "FrameId(INVALID)");
    }
}
