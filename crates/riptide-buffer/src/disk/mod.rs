//! File registry and positional I/O.
//!
//! The disk manager owns every file the pool knows about. Files are
//! registered dynamically and receive a monotonically assigned [`FileId`];
//! closing a file invalidates the handle but never reuses the slot, so a
//! stale handle fails cleanly instead of addressing the wrong file.
//!
//! All I/O is positional (`pread`/`pwrite` style) so that concurrent
//! requests never contend on a shared cursor.
//!
//! [`FileId`]: riptide_common::types::FileId

mod error;
mod manager;
mod options;

pub use error::{IoError, IoResult};
pub use manager::DiskManager;
pub use options::OpenOptions;

/// Required buffer alignment for direct I/O (4 KB).
pub const IO_ALIGNMENT: usize = 4096;
