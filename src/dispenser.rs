//! C6: round-robin dispenser.
//!
//! Hands out indices in `0..max`, wrapping around. Used by the pool to pick
//! which worker's inbox a submitted task lands in.

use std::sync::atomic::{AtomicUsize, Ordering};

/// A shareable round-robin counter over `0..max`.
///
/// Unlike the original this is modeled on, there is no special case at the
/// wraparound boundary: `next()` is a plain `fetch_add` then `% max`, so
/// every index in `0..max` is handed out in order before repeating.
#[derive(Debug)]
pub struct Dispenser {
    index: AtomicUsize,
    max: usize,
}

impl Dispenser {
    /// Creates a dispenser over `0..max`.
    ///
    /// # Panics
    ///
    /// Panics if `max` is zero.
    #[must_use]
    pub fn new(max: usize) -> Self {
        assert!(max > 0, "dispenser max must be nonzero");
        Self { index: AtomicUsize::new(0), max }
    }

    /// Returns the next index, wrapping around modulo `max`.
    #[inline]
    #[must_use]
    pub fn next(&self) -> usize {
        self.index.fetch_add(1, Ordering::Relaxed) % self.max
    }

    /// The exclusive upper bound indices are drawn from.
    #[inline]
    #[must_use]
    pub fn max(&self) -> usize {
        self.max
    }
}
