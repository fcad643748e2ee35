use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters for a single [`crate::ring::Ring`], [`crate::queue::Queue`],
/// or [`crate::alloc::CircularAllocator`] instance.
///
/// All updates use `Relaxed` ordering: these are observational counters, not
/// synchronization points, so they never need to establish happens-before
/// relationships with the data path.
#[derive(Debug, Default)]
pub struct Metrics {
    messages_sent: AtomicU64,
    messages_received: AtomicU64,
    batches_sent: AtomicU64,
    batches_received: AtomicU64,
    allocations: AtomicU64,
    deallocations: AtomicU64,
}

impl Metrics {
    /// Creates a fresh, zeroed set of counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn add_messages_sent(&self, n: u64) {
        self.messages_sent.fetch_add(n, Ordering::Relaxed);
    }

    pub(crate) fn add_messages_received(&self, n: u64) {
        self.messages_received.fetch_add(n, Ordering::Relaxed);
    }

    pub(crate) fn add_batches_sent(&self, n: u64) {
        self.batches_sent.fetch_add(n, Ordering::Relaxed);
    }

    pub(crate) fn add_batches_received(&self, n: u64) {
        self.batches_received.fetch_add(n, Ordering::Relaxed);
    }

    pub(crate) fn add_allocations(&self, n: u64) {
        self.allocations.fetch_add(n, Ordering::Relaxed);
    }

    pub(crate) fn add_deallocations(&self, n: u64) {
        self.deallocations.fetch_add(n, Ordering::Relaxed);
    }

    /// Takes a consistent-enough point-in-time snapshot.
    ///
    /// The individual loads are not synchronized with each other, so under
    /// concurrent writers the snapshot may be slightly torn across fields;
    /// that's acceptable for a monitoring signal.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            batches_sent: self.batches_sent.load(Ordering::Relaxed),
            batches_received: self.batches_received.load(Ordering::Relaxed),
            allocations: self.allocations.load(Ordering::Relaxed),
            deallocations: self.deallocations.load(Ordering::Relaxed),
        }
    }
}

/// A plain-data copy of [`Metrics`] taken at one point in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub messages_sent: u64,
    pub messages_received: u64,
    pub batches_sent: u64,
    pub batches_received: u64,
    pub allocations: u64,
    pub deallocations: u64,
}

impl MetricsSnapshot {
    /// Adds another snapshot's counters into this one, field by field.
    ///
    /// Used to aggregate per-ring metrics into a pool- or channel-wide total.
    pub fn merge(&mut self, other: &MetricsSnapshot) {
        self.messages_sent += other.messages_sent;
        self.messages_received += other.messages_received;
        self.batches_sent += other.batches_sent;
        self.batches_received += other.batches_received;
        self.allocations += other.allocations;
        self.deallocations += other.deallocations;
    }
}
