use thiserror::Error;

/// The bounded circular node allocator has no free slot.
///
/// Raised by [`crate::alloc::CircularAllocator::allocate`] and
/// [`crate::alloc::StaticCircularAllocator::allocate`], and propagated by
/// [`crate::queue::Queue::push`] when the queue is configured with a bounded
/// node allocator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("circular allocator is full")]
pub struct CapacityExhausted;

/// Invocation was attempted on a [`crate::callable::Callable`] holding nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invoked an empty callable")]
pub struct EmptyCallable;

/// Copy was attempted on a [`crate::callable::Callable`] holding a move-only callable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("callable does not support copy")]
pub struct NotCopyable;

/// A callable invoked through [`crate::callable::Callable::try_invoke`] panicked.
///
/// The original panic payload is not preserved (it is rarely `Send` and never
/// `'static`-safe to store generically); this only records that one occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("callable panicked during invocation")]
pub struct CallablePanic;
