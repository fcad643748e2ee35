//! ringkit - lock-free concurrency primitives and a backoff-driven worker pool
//!
//! A small library built from a handful of tightly coupled pieces: a bounded
//! circular node allocator, an SPSC ring buffer, an MPSC unbounded linked
//! queue (optionally node-backed by the allocator), a small-buffer callable
//! container, and a worker pool that dispatches callables across `N`
//! background threads via a round-robin dispenser.
//!
//! # Example
//!
//! ```
//! use ringkit::Pool;
//! use std::sync::atomic::{AtomicU64, Ordering};
//! use std::sync::Arc;
//!
//! let pool = Pool::new(4, 1000);
//! let total = Arc::new(AtomicU64::new(0));
//! for i in 0..100 {
//!     let total = Arc::clone(&total);
//!     pool.submit(move || {
//!         total.fetch_add(i, Ordering::Relaxed);
//!     }).unwrap();
//! }
//! pool.wait_done();
//! assert_eq!(total.load(Ordering::Relaxed), (0..100).sum());
//! ```

mod alloc;
mod callable;
mod config;
mod dispenser;
mod error;
mod invariants;
mod metrics;
mod pool;
mod queue;
mod ring;
mod util;

pub use alloc::{CircularAllocator, Slot, StaticCircularAllocator};
pub use callable::Callable;
pub use config::{Config, HIGH_THROUGHPUT_CONFIG, LOW_LATENCY_CONFIG};
pub use dispenser::Dispenser;
pub use error::{CallablePanic, CapacityExhausted, EmptyCallable, NotCopyable};
pub use metrics::{Metrics, MetricsSnapshot};
pub use pool::Pool;
pub use queue::{GlobalNodeAllocator, Node, NodeAllocator, Queue};
pub use ring::Ring;
pub use util::Backoff;
