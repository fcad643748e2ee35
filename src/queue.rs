//! C3: MPSC unbounded linked queue.
//!
//! Any number of producers, exactly one consumer. Node storage defaults to
//! the global allocator; [`Queue::with_node_allocator`] lets a caller route
//! it through a bounded [`crate::alloc::CircularAllocator`] instead, trading
//! unbounded growth for a fixed memory footprint.
//!
//! A sentinel node is always present, so `head` never observes a fully empty
//! structure: `pop` returning `false` means "nothing past the sentinel yet",
//! not "no nodes at all" (`SPEC_FULL.md` §4.3, `INV-Q-01`).

use crate::alloc::{CircularAllocator, StaticCircularAllocator};
use crate::error::CapacityExhausted;
use crate::invariants::debug_assert_sentinel_present;
use crate::metrics::{Metrics, MetricsSnapshot};
use crate::util::CacheAligned;
use std::mem::MaybeUninit;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicPtr, Ordering};

/// The queue's internal linked-list cell.
///
/// Public only so a bounded backing allocator's type can be spelled from
/// outside this crate (`CircularAllocator<Node<T>>`); its fields stay
/// private, so there is nothing to construct or inspect directly.
pub struct Node<T> {
    value: MaybeUninit<T>,
    next: AtomicPtr<Node<T>>,
}

impl<T> Node<T> {
    fn sentinel() -> Self {
        Self { value: MaybeUninit::uninit(), next: AtomicPtr::new(std::ptr::null_mut()) }
    }
}

/// Supplies node storage for a [`Queue`]. Implemented for the global
/// allocator (the default) and for the two node allocators in
/// [`crate::alloc`].
///
/// # Safety
///
/// `alloc_node` must return a pointer that stays valid and exclusively owned
/// until the matching `dealloc_node` call, and `dealloc_node` must only ever
/// be called once per pointer returned by `alloc_node` on the same instance.
pub unsafe trait NodeAllocator<T> {
    /// Moves `node` into freshly obtained storage, returning a pointer to it.
    fn alloc_node(&self, node: Node<T>) -> Result<NonNull<Node<T>>, CapacityExhausted>;

    /// Reclaims storage previously returned by `alloc_node`.
    ///
    /// # Safety
    /// See the trait's safety section.
    unsafe fn dealloc_node(&self, ptr: NonNull<Node<T>>);
}

/// The default node allocator: one `Box` per node.
#[derive(Debug, Default, Clone, Copy)]
pub struct GlobalNodeAllocator;

unsafe impl<T> NodeAllocator<T> for GlobalNodeAllocator {
    fn alloc_node(&self, node: Node<T>) -> Result<NonNull<Node<T>>, CapacityExhausted> {
        let boxed = Box::new(node);
        Ok(unsafe { NonNull::new_unchecked(Box::into_raw(boxed)) })
    }

    unsafe fn dealloc_node(&self, ptr: NonNull<Node<T>>) {
        drop(unsafe { Box::from_raw(ptr.as_ptr()) });
    }
}

unsafe impl<T> NodeAllocator<T> for CircularAllocator<Node<T>> {
    fn alloc_node(&self, mut node: Node<T>) -> Result<NonNull<Node<T>>, CapacityExhausted> {
        let slot = match self.allocate_ptr() {
            Ok(slot) => slot,
            Err(e) => {
                // alloc_node takes the node by value; on failure the
                // caller never gets it back, so the contained value must
                // be dropped here instead of leaking.
                unsafe {
                    node.value.assume_init_drop();
                }
                return Err(e);
            }
        };
        // SAFETY: slot is freshly allocated, uninitialized storage sized
        // and aligned for `Node<T>` (MaybeUninit<Node<T>> shares its layout).
        unsafe {
            slot.as_ptr().cast::<Node<T>>().write(node);
            Ok(slot.cast::<Node<T>>())
        }
    }

    unsafe fn dealloc_node(&self, ptr: NonNull<Node<T>>) {
        unsafe {
            ptr.as_ptr().drop_in_place();
            self.deallocate_ptr(ptr.cast::<MaybeUninit<Node<T>>>());
        }
    }
}

unsafe impl<T, const N: usize> NodeAllocator<T> for StaticCircularAllocator<Node<T>, N> {
    fn alloc_node(&self, mut node: Node<T>) -> Result<NonNull<Node<T>>, CapacityExhausted> {
        let slot = match self.allocate_ptr() {
            Ok(slot) => slot,
            Err(e) => {
                unsafe {
                    node.value.assume_init_drop();
                }
                return Err(e);
            }
        };
        unsafe {
            slot.as_ptr().cast::<Node<T>>().write(node);
            Ok(slot.cast::<Node<T>>())
        }
    }

    unsafe fn dealloc_node(&self, ptr: NonNull<Node<T>>) {
        unsafe {
            ptr.as_ptr().drop_in_place();
            self.deallocate_ptr(ptr.cast::<MaybeUninit<Node<T>>>());
        }
    }
}

/// A multi-producer single-consumer unbounded linked queue.
pub struct Queue<T, A: NodeAllocator<T> = GlobalNodeAllocator> {
    head: CacheAligned<NonNull<Node<T>>>,
    tail: CacheAligned<AtomicPtr<Node<T>>>,
    allocator: A,
    metrics: Metrics,
    enable_metrics: bool,
}

unsafe impl<T: Send, A: NodeAllocator<T> + Send> Send for Queue<T, A> {}
unsafe impl<T: Send, A: NodeAllocator<T> + Sync> Sync for Queue<T, A> {}

impl<T> Queue<T, GlobalNodeAllocator> {
    /// Creates an empty queue backed by the global allocator.
    #[must_use]
    pub fn new() -> Self {
        Self::with_node_allocator(GlobalNodeAllocator)
    }

    /// Creates an empty queue with metrics collection enabled or disabled.
    #[must_use]
    pub fn with_metrics(enable_metrics: bool) -> Self {
        let mut queue = Self::new();
        queue.enable_metrics = enable_metrics;
        queue
    }
}

impl<T> Default for Queue<T, GlobalNodeAllocator> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, A: NodeAllocator<T>> Queue<T, A> {
    /// Creates an empty queue whose node storage is drawn from `allocator`
    /// (e.g. a bounded [`CircularAllocator`]) instead of the global heap.
    ///
    /// The sentinel node itself is drawn from `allocator` too, so every node
    /// ever held by the queue shares one provenance and `Drop` never has to
    /// special-case which allocator freed which pointer. This costs one slot
    /// of a bounded allocator's capacity for the life of the queue.
    ///
    /// # Panics
    ///
    /// Panics if `allocator` cannot supply even one node up front.
    #[must_use]
    pub fn with_node_allocator(allocator: A) -> Self {
        let sentinel = allocator
            .alloc_node(Node::sentinel())
            .unwrap_or_else(|_| panic!("node allocator has no capacity for the queue's sentinel node"));

        Self {
            head: CacheAligned(sentinel),
            tail: CacheAligned(AtomicPtr::new(sentinel.as_ptr())),
            allocator,
            metrics: Metrics::new(),
            enable_metrics: false,
        }
    }

    /// Gets a snapshot of this queue's metrics (zeroed if metrics are disabled).
    #[must_use]
    pub fn metrics(&self) -> MetricsSnapshot {
        if self.enable_metrics {
            self.metrics.snapshot()
        } else {
            MetricsSnapshot::default()
        }
    }

    /// Pushes a value. Always succeeds with the default global-allocator
    /// backing; surfaces `CapacityExhausted` when a bounded node allocator
    /// is configured and full.
    pub fn push(&self, value: T) -> Result<(), CapacityExhausted> {
        let node = Node { value: MaybeUninit::new(value), next: AtomicPtr::new(std::ptr::null_mut()) };
        let new_tail = self.allocator.alloc_node(node)?;

        // Multiple producers race here; the CAS loop is the only point of
        // mutual exclusion. The window between winning this CAS and the
        // `next` store below is the queue's one well-known blind spot: a
        // concurrent `pop` can observe the old tail with no successor yet
        // and report empty even though a push is mid-flight
        // (`SPEC_FULL.md` §4.3 dangling-tail tolerance).
        let old_tail = self.tail.swap(new_tail.as_ptr(), Ordering::AcqRel);

        // SAFETY: old_tail was the queue's tail and is only ever linked
        // forward once, by whichever producer's swap returned it.
        unsafe {
            (*old_tail).next.store(new_tail.as_ptr(), Ordering::Release);
        }

        if self.enable_metrics {
            self.metrics.add_messages_sent(1);
        }

        Ok(())
    }

    /// Pops a value if one is available past the sentinel.
    ///
    /// Single-consumer only: calling this from more than one thread
    /// concurrently is undefined behavior (not checked outside debug
    /// builds).
    pub fn pop(&mut self) -> Option<T> {
        let head = self.head.0;
        debug_assert_sentinel_present!(head.as_ptr());

        // SAFETY: head is exclusively owned by the single consumer.
        let next = unsafe { (*head.as_ptr()).next.load(Ordering::Acquire) };
        let next = NonNull::new(next)?;

        // SAFETY: next is a live node; its value was initialized by push
        // and has not been read yet (only the consumer ever reads it).
        let value = unsafe { (*next.as_ptr()).value.as_ptr().read() };

        self.head.0 = next;
        // SAFETY: head was the old sentinel, now fully unlinked from the
        // list (no producer holds a reference to it: `tail` was already
        // advanced past it before `next` could become non-null).
        unsafe {
            self.allocator.dealloc_node(head);
        }

        if self.enable_metrics {
            self.metrics.add_messages_received(1);
        }

        Some(value)
    }

    /// Returns true if `pop` would currently return `None`.
    ///
    /// Under concurrent pushes this is a momentary snapshot, not a
    /// linearizable guarantee (dangling-tail tolerance applies here too).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        let head = self.head.0;
        unsafe { (*head.as_ptr()).next.load(Ordering::Acquire).is_null() }
    }
}

impl<T, A: NodeAllocator<T>> Drop for Queue<T, A> {
    fn drop(&mut self) {
        // The first node reached (whatever `head` currently is) is always
        // a dummy whose `value` was already consumed by an earlier `pop`
        // (or never initialized, for the original sentinel); every node
        // after it holds an initialized, un-popped value that must be
        // dropped before the node is freed.
        let mut node = Some(self.head.0);
        let mut is_sentinel = true;
        while let Some(n) = node {
            let next = unsafe { (*n.as_ptr()).next.load(Ordering::Relaxed) };
            if !is_sentinel {
                unsafe {
                    std::ptr::drop_in_place((*n.as_ptr()).value.as_mut_ptr());
                }
            }
            is_sentinel = false;
            unsafe {
                self.allocator.dealloc_node(n);
            }
            node = NonNull::new(next);
        }
    }
}
