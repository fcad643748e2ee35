//! C2: SPSC byte-slot ring buffer.
//!
//! Fixed power-of-two capacity, exactly one producer and one consumer. This
//! is the lowest-latency building block in the crate — [`crate::queue::Queue`]
//! is unbounded and allocates per node; `Ring<T>` never allocates after
//! construction and never blocks.

use crate::config::Config;
use crate::invariants::{
    debug_assert_bounded_count, debug_assert_head_not_past_tail, debug_assert_initialized_read,
    debug_assert_monotonic,
};
use crate::metrics::{Metrics, MetricsSnapshot};
use crate::util::{Backoff, CacheAligned};
use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::ptr;
use std::sync::atomic::{AtomicU64, Ordering};

/// A single-producer single-consumer ring buffer of `T`.
///
/// Occupancy is tracked with unbounded `u64` sequence numbers rather than
/// wrapped indices, so there is no ABA concern: the buffer index is only
/// computed as `sequence & mask` at the point of access.
pub struct Ring<T> {
    tail: CacheAligned<AtomicU64>,
    cached_head: CacheAligned<UnsafeCell<u64>>,
    head: CacheAligned<AtomicU64>,
    cached_tail: CacheAligned<UnsafeCell<u64>>,
    metrics: Metrics,
    enable_metrics: bool,
    mask: usize,
    buffer: UnsafeCell<Box<[MaybeUninit<T>]>>,
}

unsafe impl<T: Send> Send for Ring<T> {}
unsafe impl<T: Send> Sync for Ring<T> {}

impl<T> Ring<T> {
    /// Creates a ring with the capacity and metrics toggle from `config`.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self::with_capacity(config.capacity(), config.enable_metrics)
    }

    /// Creates a ring with an explicit power-of-two capacity.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero or not a power of two.
    #[must_use]
    pub fn with_capacity(capacity: usize, enable_metrics: bool) -> Self {
        assert!(capacity > 0 && capacity.is_power_of_two(), "capacity must be a nonzero power of two");

        let mut buffer = Vec::with_capacity(capacity);
        buffer.resize_with(capacity, MaybeUninit::uninit);

        Self {
            tail: CacheAligned(AtomicU64::new(0)),
            cached_head: CacheAligned(UnsafeCell::new(0)),
            head: CacheAligned(AtomicU64::new(0)),
            cached_tail: CacheAligned(UnsafeCell::new(0)),
            metrics: Metrics::new(),
            enable_metrics,
            mask: capacity - 1,
            buffer: UnsafeCell::new(buffer.into_boxed_slice()),
        }
    }

    /// Returns the ring's fixed capacity.
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.mask + 1
    }

    /// Returns the number of items currently in the ring.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        let tail = self.tail.load(Ordering::Relaxed);
        let head = self.head.load(Ordering::Relaxed);
        tail.wrapping_sub(head) as usize
    }

    /// Returns the number of free slots.
    #[inline]
    #[must_use]
    pub fn free(&self) -> usize {
        self.capacity() - self.len()
    }

    /// Returns true if no items are queued.
    #[inline]
    #[must_use]
    pub fn empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns true if there is no free space.
    #[inline]
    #[must_use]
    pub fn full(&self) -> bool {
        self.len() >= self.capacity()
    }

    /// Gets a snapshot of this ring's metrics (zeroed if metrics are disabled).
    #[must_use]
    pub fn metrics(&self) -> MetricsSnapshot {
        if self.enable_metrics {
            self.metrics.snapshot()
        } else {
            MetricsSnapshot::default()
        }
    }

    // -------------------------------------------------------------------
    // Producer side
    // -------------------------------------------------------------------

    /// Moves up to `values.len()` items into the ring, returning how many
    /// were actually accepted. The caller retains ownership of any
    /// unaccepted tail of `values` (this does not drop them).
    #[allow(clippy::cast_possible_truncation)]
    pub fn put_bulk(&self, values: &mut [MaybeUninit<T>]) -> usize {
        let tail = self.tail.load(Ordering::Relaxed);

        // SAFETY: cached_head is single-writer (producer only).
        let cached_head = unsafe { *self.cached_head.get() };
        let mut free = self.capacity() - tail.wrapping_sub(cached_head) as usize;

        if free < values.len() {
            let head = self.head.load(Ordering::Acquire);
            unsafe {
                *self.cached_head.get() = head;
            }
            free = self.capacity() - tail.wrapping_sub(head) as usize;
        }

        let n = values.len().min(free);
        if n == 0 {
            return 0;
        }

        for (i, slot) in values.iter_mut().enumerate().take(n) {
            let idx = (tail as usize).wrapping_add(i) & self.mask;
            // SAFETY: slots [tail, tail+n) are not touched by the consumer
            // until `tail` is published below.
            unsafe {
                let buffer = &mut *self.buffer.get();
                buffer[idx] = MaybeUninit::new(std::mem::replace(slot, MaybeUninit::uninit()).assume_init());
            }
        }

        let new_tail = tail.wrapping_add(n as u64);
        debug_assert_bounded_count!(new_tail.wrapping_sub(self.head.load(Ordering::Relaxed)) as usize, self.capacity());
        debug_assert_monotonic!("tail", tail, new_tail);
        self.tail.store(new_tail, Ordering::Release);

        if self.enable_metrics {
            self.metrics.add_messages_sent(n as u64);
            self.metrics.add_batches_sent(1);
        }

        n
    }

    /// Moves a single item in. Returns the value back if the ring is full.
    #[inline]
    pub fn put_one(&self, value: T) -> Result<(), T> {
        let mut slot = [MaybeUninit::new(value)];
        if self.put_bulk(&mut slot) == 1 {
            Ok(())
        } else {
            // SAFETY: put_bulk leaves slots it didn't consume untouched.
            Err(unsafe { slot[0].assume_init_read() })
        }
    }

    /// `put_one`, spinning with adaptive backoff instead of failing
    /// immediately. Gives up and returns the value back if the backoff is
    /// spent before room opens up.
    pub fn put_one_with_backoff(&self, mut value: T) -> Result<(), T> {
        let mut backoff = Backoff::new();
        loop {
            match self.put_one(value) {
                Ok(()) => return Ok(()),
                Err(rejected) => {
                    if backoff.is_completed() {
                        return Err(rejected);
                    }
                    value = rejected;
                    backoff.snooze();
                }
            }
        }
    }

    // -------------------------------------------------------------------
    // Consumer side
    // -------------------------------------------------------------------

    /// Moves up to `out.len()` items out of the ring, returning how many
    /// were produced.
    #[allow(clippy::cast_possible_truncation)]
    pub fn get_bulk(&self, out: &mut [MaybeUninit<T>]) -> usize {
        let head = self.head.load(Ordering::Relaxed);

        // SAFETY: cached_tail is single-writer (consumer only).
        let mut cached_tail = unsafe { *self.cached_tail.get() };
        let mut avail = cached_tail.wrapping_sub(head) as usize;

        if avail == 0 {
            cached_tail = self.tail.load(Ordering::Acquire);
            unsafe {
                *self.cached_tail.get() = cached_tail;
            }
            avail = cached_tail.wrapping_sub(head) as usize;
        }

        let n = out.len().min(avail);
        if n == 0 {
            return 0;
        }

        for (i, slot) in out.iter_mut().enumerate().take(n) {
            let pos = head.wrapping_add(i as u64);
            debug_assert_initialized_read!(pos, head, cached_tail);
            let idx = (pos as usize) & self.mask;
            // SAFETY: items in [head, tail) were published by the producer;
            // the Acquire load above (or the cached value from an earlier
            // one) synchronizes with its Release store.
            unsafe {
                let buffer = &mut *self.buffer.get();
                let item = buffer[idx].assume_init_read();
                *slot = MaybeUninit::new(item);
            }
        }

        let new_head = head.wrapping_add(n as u64);
        debug_assert_head_not_past_tail!(new_head, cached_tail);
        debug_assert_monotonic!("head", head, new_head);
        self.head.store(new_head, Ordering::Release);

        if self.enable_metrics {
            self.metrics.add_messages_received(n as u64);
            self.metrics.add_batches_received(1);
        }

        n
    }

    /// Moves a single item out, if one is available.
    #[inline]
    pub fn get_one(&self) -> Option<T> {
        let mut out = [MaybeUninit::uninit()];
        if self.get_bulk(&mut out) == 1 {
            // SAFETY: get_bulk wrote exactly one initialized item.
            Some(unsafe { out[0].assume_init_read() })
        } else {
            None
        }
    }
}

impl<T> Drop for Ring<T> {
    fn drop(&mut self) {
        let head = self.head.load(Ordering::Relaxed);
        let tail = self.tail.load(Ordering::Relaxed);
        let count = tail.wrapping_sub(head) as usize;

        if count > 0 {
            let mask = self.mask;
            let buffer = self.buffer.get_mut();
            for i in 0..count {
                let idx = (head as usize).wrapping_add(i) & mask;
                unsafe {
                    ptr::drop_in_place(buffer[idx].as_mut_ptr());
                }
            }
        }
    }
}
