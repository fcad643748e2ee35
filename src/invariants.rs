//! Debug assertion macros for the invariants documented in `SPEC_FULL.md`.
//!
//! Active only in debug builds (`#[cfg(debug_assertions)]`), so there is zero
//! overhead in release builds. Shared by `alloc`, `ring`, `queue`, and `pool`.

// =============================================================================
// INV-ALLOC-01: Bounded occupancy
// =============================================================================

/// `tail - head (mod capacity+1) >= 1` always holds for the circular allocator.
macro_rules! debug_assert_allocator_not_overrun {
    ($occupied:expr, $capacity:expr) => {
        debug_assert!(
            $occupied <= $capacity,
            "INV-ALLOC-01 violated: occupied {} exceeds capacity {}",
            $occupied,
            $capacity
        )
    };
}

// =============================================================================
// INV-SEQ-01: Bounded count (ring buffer)
// =============================================================================

macro_rules! debug_assert_bounded_count {
    ($count:expr, $capacity:expr) => {
        debug_assert!(
            $count <= $capacity,
            "INV-SEQ-01 violated: count {} exceeds capacity {}",
            $count,
            $capacity
        )
    };
}

macro_rules! debug_assert_head_not_past_tail {
    ($new_head:expr, $tail:expr) => {
        debug_assert!(
            $new_head <= $tail,
            "INV-SEQ-01 violated: advancing head {} beyond tail {}",
            $new_head,
            $tail
        )
    };
}

// =============================================================================
// INV-SEQ-02: Monotonic progress
// =============================================================================

macro_rules! debug_assert_monotonic {
    ($name:literal, $old:expr, $new:expr) => {
        debug_assert!(
            $new >= $old,
            "INV-SEQ-02 violated: {} decreased from {} to {}",
            $name,
            $old,
            $new
        )
    };
}

// =============================================================================
// INV-INIT-01: Initialized-range read
// =============================================================================

macro_rules! debug_assert_initialized_read {
    ($pos:expr, $head:expr, $tail:expr) => {
        debug_assert!(
            $pos >= $head && $pos < $tail,
            "INV-INIT-01 violated: reading slot at seq {} outside initialized range [{}, {})",
            $pos,
            $head,
            $tail
        )
    };
}

// =============================================================================
// INV-Q-01: Queue never empty of its sentinel
// =============================================================================

/// The linked queue must always have at least one node (the sentinel).
macro_rules! debug_assert_sentinel_present {
    ($head_ptr:expr) => {
        debug_assert!(!$head_ptr.is_null(), "INV-Q-01 violated: queue has no sentinel node")
    };
}

// =============================================================================
// INV-POOL-01: Backoff counters stay bounded by the threshold
// =============================================================================

macro_rules! debug_assert_backoff_bounded {
    ($count:expr, $threshold:expr) => {
        debug_assert!(
            $count <= $threshold,
            "INV-POOL-01 violated: backoff counter {} exceeds threshold {}",
            $count,
            $threshold
        )
    };
}

pub(crate) use debug_assert_allocator_not_overrun;
pub(crate) use debug_assert_backoff_bounded;
pub(crate) use debug_assert_bounded_count;
pub(crate) use debug_assert_head_not_past_tail;
pub(crate) use debug_assert_initialized_read;
pub(crate) use debug_assert_monotonic;
pub(crate) use debug_assert_sentinel_present;
