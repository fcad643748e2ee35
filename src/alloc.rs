//! C1: bounded MPSC circular node allocator.
//!
//! Hands out single-slot allocations to any number of producer threads;
//! reclaims them from exactly one consumer thread. Capacity is fixed either
//! at construction ([`CircularAllocator`]) or at compile time
//! ([`StaticCircularAllocator`]). Neither variant ever allocates on the
//! `allocate`/`deallocate` hot path — all storage comes from one buffer
//! carved out up front.
//!
//! One slot beyond the logical capacity is always reserved as a sentinel, so
//! `tail == head` unambiguously means "full" without a separate size
//! counter (`SPEC_FULL.md` §4.1).

use crate::error::CapacityExhausted;
use crate::invariants::debug_assert_allocator_not_overrun;
use crate::metrics::{Metrics, MetricsSnapshot};
use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};

/// A handle to one allocated, uninitialized slot.
///
/// In debug builds this also records which allocator issued it, so
/// [`CircularAllocator::deallocate`] / [`StaticCircularAllocator::deallocate`]
/// can catch a slot being returned to the wrong allocator. It does *not*
/// verify FIFO reclamation order — that precondition (documented in
/// `SPEC_FULL.md` §4.1 and `DESIGN.md`) is the sole responsibility of the
/// single consumer thread.
pub struct Slot<T> {
    ptr: NonNull<MaybeUninit<T>>,
    #[cfg(debug_assertions)]
    owner: usize,
}

impl<T> Slot<T> {
    /// Returns a raw pointer to the uninitialized storage.
    #[inline]
    #[must_use]
    pub fn as_ptr(&self) -> *mut MaybeUninit<T> {
        self.ptr.as_ptr()
    }
}

// Slots are just pointers into allocator-owned storage; sending one across
// threads is what the allocator's multi-producer contract requires.
unsafe impl<T: Send> Send for Slot<T> {}

/// A bounded MPSC circular allocator with capacity fixed at construction.
///
/// See `SPEC_FULL.md` §4.1. Backed by `Box<[UnsafeCell<MaybeUninit<T>>]>` of
/// length `capacity + 1`.
pub struct CircularAllocator<T> {
    buffer: Box<[UnsafeCell<MaybeUninit<T>>]>,
    head: AtomicUsize,
    tail: AtomicUsize,
    metrics: Metrics,
    enable_metrics: bool,
}

// Safety: the buffer is only accessed through the allocate/deallocate
// handshake, which hands each slot to exactly one thread at a time.
unsafe impl<T: Send> Send for CircularAllocator<T> {}
unsafe impl<T: Send> Sync for CircularAllocator<T> {}

impl<T> CircularAllocator<T> {
    /// Creates an allocator with room for `capacity` concurrent outstanding
    /// allocations.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self::with_metrics(capacity, false)
    }

    /// Creates an allocator with metrics collection enabled or disabled.
    #[must_use]
    pub fn with_metrics(capacity: usize, enable_metrics: bool) -> Self {
        let slots = capacity + 1;
        let mut buffer = Vec::with_capacity(slots);
        buffer.resize_with(slots, || UnsafeCell::new(MaybeUninit::uninit()));
        Self {
            buffer: buffer.into_boxed_slice(),
            head: AtomicUsize::new(0),
            tail: AtomicUsize::new(1),
            metrics: Metrics::new(),
            enable_metrics,
        }
    }

    /// Returns the logical capacity (excludes the sentinel slot).
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.buffer.len() - 1
    }

    /// Gets a snapshot of this allocator's metrics (zeroed if metrics are disabled).
    #[must_use]
    pub fn metrics(&self) -> MetricsSnapshot {
        if self.enable_metrics {
            self.metrics.snapshot()
        } else {
            MetricsSnapshot::default()
        }
    }

    fn slots(&self) -> usize {
        self.buffer.len()
    }

    /// Hands out one uninitialized slot. Never blocks.
    pub fn allocate(&self) -> Result<Slot<T>, CapacityExhausted> {
        let slots = self.slots();
        let mut tail = self.tail.load(Ordering::Relaxed);
        loop {
            let head = self.head.load(Ordering::Relaxed);
            if tail == head {
                return Err(CapacityExhausted);
            }
            let new_tail = (tail + 1) % slots;
            match self.tail.compare_exchange_weak(tail, new_tail, Ordering::Release, Ordering::Relaxed) {
                Ok(_) => {
                    // SAFETY: `tail` was exclusively claimed by this CAS; no
                    // other allocation can return the same index until the
                    // consumer deallocates it.
                    let ptr = unsafe { NonNull::new_unchecked(self.buffer[tail].get()) };
                    if self.enable_metrics {
                        self.metrics.add_allocations(1);
                    }
                    return Ok(Slot {
                        ptr,
                        #[cfg(debug_assertions)]
                        owner: std::ptr::from_ref(self) as usize,
                    });
                }
                Err(actual) => tail = actual,
            }
        }
    }

    /// Returns a slot to the pool. Must be called by a single consumer
    /// thread, in the same order the slots were allocated.
    ///
    /// # Panics
    ///
    /// In debug builds, panics if `slot` was issued by a different allocator.
    pub fn deallocate(&self, slot: Slot<T>) {
        #[cfg(debug_assertions)]
        debug_assert_eq!(slot.owner, std::ptr::from_ref(self) as usize, "slot returned to the wrong allocator");

        let slots = self.slots();
        let head = self.head.load(Ordering::Relaxed);
        let tail = self.tail.load(Ordering::Relaxed);
        let occupied = (tail + slots - head - 1) % slots;
        debug_assert_allocator_not_overrun!(occupied, self.capacity());
        let new_head = (head + 1) % slots;
        self.head.store(new_head, Ordering::Release);
        if self.enable_metrics {
            self.metrics.add_deallocations(1);
        }
    }

    /// Raw-pointer variant of `allocate`, for callers (the node-backed
    /// [`crate::queue::Queue`]) that store the pointer inside a larger
    /// structure instead of holding onto a [`Slot`].
    pub(crate) fn allocate_ptr(&self) -> Result<NonNull<MaybeUninit<T>>, CapacityExhausted> {
        self.allocate().map(|slot| {
            let ptr = slot.ptr;
            std::mem::forget(slot);
            ptr
        })
    }

    /// Raw-pointer variant of `deallocate`.
    ///
    /// # Safety
    ///
    /// `ptr` must have come from `allocate_ptr` on this same allocator and
    /// not have already been deallocated.
    pub(crate) unsafe fn deallocate_ptr(&self, ptr: NonNull<MaybeUninit<T>>) {
        let slot = Slot {
            ptr,
            #[cfg(debug_assertions)]
            owner: std::ptr::from_ref(self) as usize,
        };
        self.deallocate(slot);
    }
}

/// A bounded MPSC circular allocator with capacity fixed at compile time.
///
/// `N` is carried in the type (mirroring the teacher crate's `StackRing<T, N>`
/// relationship to `Ring<T>`) so call sites get a distinct type per capacity.
/// The `N + 1` sentinel slot still lives in a once-allocated boxed slice
/// rather than a true inline `[T; N + 1]` array: stable Rust's const generics
/// can't express "one more than a type parameter" as an array length without
/// the unstable `generic_const_exprs` feature.
pub struct StaticCircularAllocator<T, const N: usize> {
    buffer: Box<[UnsafeCell<MaybeUninit<T>>]>,
    head: AtomicUsize,
    tail: AtomicUsize,
    metrics: Metrics,
    enable_metrics: bool,
}

impl<T, const N: usize> StaticCircularAllocator<T, N> {
    /// Creates an allocator with compile-time capacity `N`.
    #[must_use]
    pub fn new() -> Self {
        Self::with_metrics(false)
    }

    /// Creates an allocator with metrics collection enabled or disabled.
    #[must_use]
    pub fn with_metrics(enable_metrics: bool) -> Self {
        let mut vec = Vec::with_capacity(N + 1);
        vec.resize_with(N + 1, || UnsafeCell::new(MaybeUninit::uninit()));
        Self {
            buffer: vec.into_boxed_slice(),
            head: AtomicUsize::new(0),
            tail: AtomicUsize::new(1),
            metrics: Metrics::new(),
            enable_metrics,
        }
    }

    /// Returns the compile-time logical capacity `N`.
    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Gets a snapshot of this allocator's metrics (zeroed if metrics are disabled).
    #[must_use]
    pub fn metrics(&self) -> MetricsSnapshot {
        if self.enable_metrics {
            self.metrics.snapshot()
        } else {
            MetricsSnapshot::default()
        }
    }

    /// Hands out one uninitialized slot. Never blocks.
    pub fn allocate(&self) -> Result<Slot<T>, CapacityExhausted> {
        let slots = N + 1;
        let mut tail = self.tail.load(Ordering::Relaxed);
        loop {
            let head = self.head.load(Ordering::Relaxed);
            if tail == head {
                return Err(CapacityExhausted);
            }
            let new_tail = (tail + 1) % slots;
            match self.tail.compare_exchange_weak(tail, new_tail, Ordering::Release, Ordering::Relaxed) {
                Ok(_) => {
                    let ptr = unsafe { NonNull::new_unchecked(self.buffer[tail].get()) };
                    if self.enable_metrics {
                        self.metrics.add_allocations(1);
                    }
                    return Ok(Slot {
                        ptr,
                        #[cfg(debug_assertions)]
                        owner: std::ptr::from_ref(self) as usize,
                    });
                }
                Err(actual) => tail = actual,
            }
        }
    }

    /// Returns a slot to the pool. Must be called by a single consumer
    /// thread, in the same order the slots were allocated.
    pub fn deallocate(&self, slot: Slot<T>) {
        #[cfg(debug_assertions)]
        debug_assert_eq!(slot.owner, std::ptr::from_ref(self) as usize, "slot returned to the wrong allocator");

        let slots = N + 1;
        let head = self.head.load(Ordering::Relaxed);
        let tail = self.tail.load(Ordering::Relaxed);
        let occupied = (tail + slots - head - 1) % slots;
        debug_assert_allocator_not_overrun!(occupied, N);
        let new_head = (head + 1) % slots;
        self.head.store(new_head, Ordering::Release);
        if self.enable_metrics {
            self.metrics.add_deallocations(1);
        }
    }

    /// Raw-pointer variant of `allocate`. See `CircularAllocator::allocate_ptr`.
    pub(crate) fn allocate_ptr(&self) -> Result<NonNull<MaybeUninit<T>>, CapacityExhausted> {
        self.allocate().map(|slot| {
            let ptr = slot.ptr;
            std::mem::forget(slot);
            ptr
        })
    }

    /// Raw-pointer variant of `deallocate`.
    ///
    /// # Safety
    ///
    /// `ptr` must have come from `allocate_ptr` on this same allocator and
    /// not have already been deallocated.
    pub(crate) unsafe fn deallocate_ptr(&self, ptr: NonNull<MaybeUninit<T>>) {
        let slot = Slot {
            ptr,
            #[cfg(debug_assertions)]
            owner: std::ptr::from_ref(self) as usize,
        };
        self.deallocate(slot);
    }
}

impl<T, const N: usize> Default for StaticCircularAllocator<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

unsafe impl<T: Send, const N: usize> Send for StaticCircularAllocator<T, N> {}
unsafe impl<T: Send, const N: usize> Sync for StaticCircularAllocator<T, N> {}
