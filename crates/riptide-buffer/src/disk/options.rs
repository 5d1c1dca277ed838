//! File open options.

use std::fs;

/// Options for opening pool files.
///
/// Similar to `std::fs::OpenOptions`, with direct-I/O support for workloads
/// where the pool replaces the OS page cache.
///
/// # Example
///
/// ```rust
/// use riptide_buffer::disk::OpenOptions;
///
/// let options = OpenOptions::new().read(true).write(true).create(true);
/// ```
#[derive(Debug, Clone)]
pub struct OpenOptions {
    /// Open for reading.
    pub(crate) read: bool,
    /// Open for writing.
    pub(crate) write: bool,
    /// Truncate existing file.
    pub(crate) truncate: bool,
    /// Create file if it doesn't exist.
    pub(crate) create: bool,
    /// Use direct I/O (bypass OS cache).
    pub(crate) direct_io: bool,
}

impl OpenOptions {
    /// Creates a new set of options with all flags cleared.
    #[must_use]
    pub fn new() -> Self {
        Self {
            read: false,
            write: false,
            truncate: false,
            create: false,
            direct_io: false,
        }
    }

    /// Sets the option for read access.
    #[must_use]
    pub fn read(mut self, read: bool) -> Self {
        self.read = read;
        self
    }

    /// Sets the option for write access.
    #[must_use]
    pub fn write(mut self, write: bool) -> Self {
        self.write = write;
        self
    }

    /// Sets the option for truncating an existing file.
    #[must_use]
    pub fn truncate(mut self, truncate: bool) -> Self {
        self.truncate = truncate;
        self
    }

    /// Sets the option to create the file if it doesn't exist.
    #[must_use]
    pub fn create(mut self, create: bool) -> Self {
        self.create = create;
        self
    }

    /// Sets the option for direct I/O (bypass OS page cache).
    ///
    /// # Platform Support
    ///
    /// - **Linux**: `O_DIRECT`
    /// - **macOS**: `F_NOCACHE` fcntl after open
    #[must_use]
    pub fn direct_io(mut self, direct_io: bool) -> Self {
        self.direct_io = direct_io;
        self
    }

    /// Returns true if write access is enabled.
    #[inline]
    pub fn is_write(&self) -> bool {
        self.write
    }

    /// Returns true if direct I/O is enabled.
    #[inline]
    pub fn is_direct_io(&self) -> bool {
        self.direct_io
    }

    /// Converts to `std::fs::OpenOptions`.
    ///
    /// Direct-I/O flags are platform specific and applied separately.
    pub(crate) fn to_std_options(&self) -> fs::OpenOptions {
        let mut opts = fs::OpenOptions::new();
        opts.read(self.read)
            .write(self.write)
            .truncate(self.truncate)
            .create(self.create);
        opts
    }

    /// Options for reading an existing file.
    #[must_use]
    pub fn for_read() -> Self {
        Self::new().read(true)
    }

    /// Options for reading and writing, creating if necessary.
    #[must_use]
    pub fn for_create() -> Self {
        Self::new().read(true).write(true).create(true)
    }

    /// Options for pool data files: read-write, created on demand.
    ///
    /// Direct I/O is left to the pool configuration since it constrains
    /// buffer alignment.
    #[must_use]
    pub fn for_pool() -> Self {
        Self::for_create()
    }
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let opts = OpenOptions::new();
        assert!(!opts.read);
        assert!(!opts.write);
        assert!(!opts.create);
        assert!(!opts.direct_io);
    }

    #[test]
    fn test_builder() {
        let opts = OpenOptions::new().read(true).write(true).direct_io(true);
        assert!(opts.read);
        assert!(opts.is_write());
        assert!(opts.is_direct_io());
    }

    #[test]
    fn test_for_pool() {
        let opts = OpenOptions::for_pool();
        assert!(opts.read);
        assert!(opts.write);
        assert!(opts.create);
    }
}
