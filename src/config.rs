/// Configuration shared by the ring buffer, the node allocator, and the
/// worker pool.
///
/// A single type is used across components (mirroring the teacher crate's
/// `Config`) so that a caller tuning throughput only has one knob set to
/// reason about.
#[derive(Debug, Clone, Copy)]
pub struct Config {
    /// Ring/allocator buffer size as a power of two (e.g. 16 = 64K slots).
    pub ring_bits: u8,
    /// Worker count for [`crate::pool::Pool`], or producer count for a raw `Queue`/`Ring` user.
    pub workers: usize,
    /// Backoff threshold `K` governing the pool's `normal -> idle -> yield -> wait` walk.
    pub backoff_threshold: u32,
    /// Enable atomic metrics collection (slight overhead per operation).
    pub enable_metrics: bool,
}

impl Config {
    /// Creates a new configuration.
    ///
    /// # Panics
    ///
    /// Panics if `ring_bits` is 0 or greater than 20 (1M slots), if `workers`
    /// is 0, or if `backoff_threshold` is 0.
    #[must_use]
    pub const fn new(ring_bits: u8, workers: usize, backoff_threshold: u32, enable_metrics: bool) -> Self {
        assert!(ring_bits > 0 && ring_bits <= 20, "ring_bits must be between 1 and 20 (max 1M slots)");
        assert!(workers > 0, "workers must be at least 1");
        assert!(backoff_threshold > 0, "backoff_threshold must be at least 1");

        Self {
            ring_bits,
            workers,
            backoff_threshold,
            enable_metrics,
        }
    }

    /// Returns the ring/allocator capacity implied by `ring_bits`.
    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> usize {
        1 << self.ring_bits
    }

    /// Returns the index mask used for wrapping (`capacity() - 1`).
    #[inline]
    #[must_use]
    pub const fn mask(&self) -> usize {
        self.capacity() - 1
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ring_bits: 12, // 4K slots
            workers: 4,
            backoff_threshold: 1000,
            enable_metrics: false,
        }
    }
}

/// Low-latency preset: small ring (fits in L1), tight backoff threshold.
pub const LOW_LATENCY_CONFIG: Config = Config::new(10, 4, 200, false);

/// High-throughput preset: large ring, wide backoff threshold so workers
/// stay in `normal` under sustained bursty load.
pub const HIGH_THROUGHPUT_CONFIG: Config = Config::new(18, 16, 10_000, false);
