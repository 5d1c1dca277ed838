//! # riptide-common
//!
//! Common types and utilities for the Riptide buffer pool.
//!
//! This crate provides the foundational pieces shared by the Riptide
//! workspace:
//!
//! - **Types**: core identifiers (`FileId`, `FilePageId`, `FrameId`) and the
//!   composite `PageKey`
//! - **Constants**: page sizes, partition counts, and tuning knobs
//! - **Memory**: aligned allocation for direct-I/O-capable page arenas
//!
//! ## Example
//!
//! ```rust
//! use riptide_common::types::{FileId, FilePageId, PageKey};
//!
//! let key = PageKey::new(FileId::new(0), FilePageId::new(42));
//! assert!(key.file.is_valid());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod constants;
pub mod memory;
pub mod types;

pub use constants::*;
pub use types::{FileId, FilePageId, FrameId, PageKey};
