//! Buffer pool configuration.

use riptide_common::constants::{
    BATCH_CHANNEL_CAPACITY, DEFAULT_BATCH_WINDOW, DEFAULT_DIRECT_CACHE_CAPACITY,
    DEFAULT_FRAMES_PER_PARTITION, DEFAULT_IO_SERVERS, DEFAULT_PAGE_SIZE, DEFAULT_PARTITIONS,
    DEFAULT_RING_DEPTH, EVICTION_BATCH_SIZE, EVICTION_LOW_WATER_PERCENT, MAX_PAGE_SIZE,
    MIN_PAGE_SIZE,
};

/// Which I/O backend the servers drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoBackendKind {
    /// Blocking positional syscalls; requests complete inline.
    Syscall,
    /// io_uring submission ring (Linux, `ring` feature).
    Ring,
}

/// Configuration for the buffer pool.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Page size in bytes. Power of two, >= 512.
    pub page_size: usize,
    /// Number of independently locked partitions.
    pub partitions: usize,
    /// Frames per partition.
    pub frames_per_partition: usize,
    /// Number of I/O server threads.
    pub io_servers: usize,
    /// Backend driven by each I/O server.
    pub io_backend: IoBackendKind,
    /// Maximum in-flight I/O per server.
    pub ring_depth: usize,
    /// Concurrent batch requests per manager worker.
    pub batch_window: usize,
    /// Direct-cache entries; 0 disables the fast path.
    pub direct_cache_capacity: usize,
    /// Frames reclaimed per eviction sweep.
    pub eviction_batch_size: usize,
    /// Free-list percentage below which the eviction server refills.
    pub eviction_low_water_percent: usize,
    /// Open files with direct I/O.
    pub direct_io: bool,
}

impl PoolConfig {
    /// Creates a configuration with the given frames per partition.
    pub fn new(frames_per_partition: usize) -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            partitions: DEFAULT_PARTITIONS,
            frames_per_partition,
            io_servers: DEFAULT_IO_SERVERS,
            io_backend: IoBackendKind::Syscall,
            ring_depth: DEFAULT_RING_DEPTH,
            batch_window: DEFAULT_BATCH_WINDOW,
            direct_cache_capacity: DEFAULT_DIRECT_CACHE_CAPACITY,
            eviction_batch_size: EVICTION_BATCH_SIZE,
            eviction_low_water_percent: EVICTION_LOW_WATER_PERCENT,
            direct_io: false,
        }
    }

    /// Creates a configuration sized from a memory budget in bytes.
    pub fn from_memory_size(memory_bytes: usize) -> Self {
        let mut config = Self::new(0);
        let frames = (memory_bytes / config.page_size).max(config.partitions);
        config.frames_per_partition = frames / config.partitions;
        config
    }

    /// Sets the page size.
    #[must_use]
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    /// Sets the number of partitions.
    #[must_use]
    pub fn with_partitions(mut self, partitions: usize) -> Self {
        self.partitions = partitions;
        self
    }

    /// Sets the number of I/O server threads.
    #[must_use]
    pub fn with_io_servers(mut self, io_servers: usize) -> Self {
        self.io_servers = io_servers;
        self
    }

    /// Selects the I/O backend.
    #[must_use]
    pub fn with_io_backend(mut self, backend: IoBackendKind) -> Self {
        self.io_backend = backend;
        self
    }

    /// Sets the maximum in-flight I/O per server.
    #[must_use]
    pub fn with_ring_depth(mut self, ring_depth: usize) -> Self {
        self.ring_depth = ring_depth;
        self
    }

    /// Sets the batch concurrency window.
    #[must_use]
    pub fn with_batch_window(mut self, batch_window: usize) -> Self {
        self.batch_window = batch_window;
        self
    }

    /// Sets the direct-cache capacity (0 disables).
    #[must_use]
    pub fn with_direct_cache(mut self, capacity: usize) -> Self {
        self.direct_cache_capacity = capacity;
        self
    }

    /// Enables or disables direct I/O on pool files.
    #[must_use]
    pub fn with_direct_io(mut self, enabled: bool) -> Self {
        self.direct_io = enabled;
        self
    }

    /// Total arena bytes across all partitions.
    pub fn memory_usage(&self) -> usize {
        self.partitions * self.frames_per_partition * self.page_size
    }

    /// Total frame count across all partitions.
    pub fn total_frames(&self) -> usize {
        self.partitions * self.frames_per_partition
    }

    /// Free-list refill threshold for one partition, in frames.
    pub fn low_water_frames(&self) -> usize {
        self.frames_per_partition * self.eviction_low_water_percent / 100
    }

    /// Capacity of the manager's batch channel.
    pub fn batch_channel_capacity(&self) -> usize {
        BATCH_CHANNEL_CAPACITY
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), &'static str> {
        if !self.page_size.is_power_of_two() {
            return Err("page_size must be a power of 2");
        }
        if self.page_size < MIN_PAGE_SIZE {
            return Err("page_size must be >= 512");
        }
        if self.page_size > MAX_PAGE_SIZE {
            return Err("page_size must be <= 64 KiB");
        }
        if self.partitions == 0 {
            return Err("partitions must be > 0");
        }
        if self.frames_per_partition == 0 {
            return Err("frames_per_partition must be > 0");
        }
        if self.io_servers == 0 {
            return Err("io_servers must be > 0");
        }
        if self.ring_depth == 0 {
            return Err("ring_depth must be > 0");
        }
        if self.batch_window == 0 {
            return Err("batch_window must be > 0");
        }
        if self.eviction_low_water_percent >= 100 {
            return Err("eviction_low_water_percent must be < 100");
        }
        #[cfg(not(all(target_os = "linux", feature = "ring")))]
        if self.io_backend == IoBackendKind::Ring {
            return Err("ring backend requires Linux and the `ring` feature");
        }
        Ok(())
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self::new(DEFAULT_FRAMES_PER_PARTITION)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_new() {
        let config = PoolConfig::new(128);
        assert_eq!(config.frames_per_partition, 128);
        assert_eq!(config.page_size, DEFAULT_PAGE_SIZE);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = PoolConfig::new(64)
            .with_page_size(8192)
            .with_partitions(2)
            .with_io_servers(2)
            .with_ring_depth(16)
            .with_batch_window(8)
            .with_direct_cache(1024);

        assert_eq!(config.page_size, 8192);
        assert_eq!(config.partitions, 2);
        assert_eq!(config.io_servers, 2);
        assert_eq!(config.ring_depth, 16);
        assert_eq!(config.batch_window, 8);
        assert_eq!(config.direct_cache_capacity, 1024);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_memory_usage() {
        let config = PoolConfig::new(16).with_partitions(4).with_page_size(4096);
        assert_eq!(config.memory_usage(), 4 * 16 * 4096);
        assert_eq!(config.total_frames(), 64);
    }

    #[test]
    fn test_from_memory_size() {
        let config = PoolConfig::from_memory_size(64 * 1024 * 1024);
        assert_eq!(
            config.memory_usage(),
            config.partitions * config.frames_per_partition * config.page_size
        );
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        assert!(PoolConfig::new(0).validate().is_err());
        assert!(PoolConfig::new(16).with_page_size(100).validate().is_err());
        assert!(PoolConfig::new(16).with_page_size(256).validate().is_err());
        assert!(PoolConfig::new(16).with_partitions(0).validate().is_err());
        assert!(PoolConfig::new(16).with_io_servers(0).validate().is_err());
    }

    #[test]
    fn test_low_water_frames() {
        let config = PoolConfig::new(100);
        assert_eq!(
            config.low_water_frames(),
            100 * EVICTION_LOW_WATER_PERCENT / 100
        );
    }
}
