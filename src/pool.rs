//! C5: worker pool with a four-state backoff machine.
//!
//! `Pool` owns `N` workers, each with its own C3 inbox. A submitted callable
//! is routed to one worker's inbox via the C6 [`Dispenser`]; that worker
//! drains its own inbox and invokes whatever it pops. When a worker's inbox
//! runs dry it walks `normal -> idle -> yield -> wait`, trading latency for
//! CPU use the longer it stays empty; any successful pop snaps it straight
//! back to `normal`.

use crate::callable::Callable;
use crate::dispenser::Dispenser;
use crate::error::CapacityExhausted;
use crate::invariants::debug_assert_backoff_bounded;
use crate::metrics::MetricsSnapshot;
use crate::queue::Queue;
use crate::util::{report_discarded_panic, Backoff};
use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
enum Phase {
    Normal = 0,
    Idle = 1,
    Yield = 2,
    Wait = 3,
}

impl Phase {
    fn from_tag(tag: u8) -> Self {
        match tag {
            0 => Phase::Normal,
            1 => Phase::Idle,
            2 => Phase::Yield,
            _ => Phase::Wait,
        }
    }
}

/// State shared between a worker's thread and the pool that owns it.
struct Shared {
    id: usize,
    // UnsafeCell, not a plain field: submitters push through a shared `&Shared`
    // while the owning worker thread pops through the same one. Mutable
    // access to the pop side is only ever taken by that single thread.
    inbox: UnsafeCell<Queue<Callable<()>>>,
    close: AtomicBool,
    /// Cleared by a submitter on `submit`/`submit_to`; raised by the worker
    /// itself on `yield -> wait`. Gates `thread::park`.
    wait_flag: AtomicBool,
    /// The worker's current backoff phase, polled by `wait_done`. Written
    /// only by the worker thread (`Relaxed` suffices).
    phase: AtomicU8,
    threshold: u32,
}

impl Shared {
    fn push(&self, task: Callable<()>) -> Result<(), CapacityExhausted> {
        // SAFETY: push only needs `&Queue`, shared by any number of producers.
        unsafe { &*self.inbox.get() }.push(task)
    }

    /// Pops one task and runs it, catching and discarding any panic.
    /// Returns whether a task was actually run.
    ///
    /// # Safety
    ///
    /// `pop` requires a single consumer; only the worker thread owning this
    /// `Shared` ever calls this method, which is the same contract
    /// `Queue::pop` documents.
    fn pop_and_run(&self) -> bool {
        // SAFETY: exclusive consumer access, see method doc.
        let inbox = unsafe { &mut *self.inbox.get() };
        let Some(mut task) = inbox.pop() else {
            return false;
        };
        if task.try_invoke().is_err() {
            report_discarded_panic(self.id);
        }
        true
    }

    fn metrics(&self) -> MetricsSnapshot {
        // SAFETY: metrics() only needs `&Queue`, same as push.
        unsafe { &*self.inbox.get() }.metrics()
    }
}

// SAFETY: `inbox`'s pop side is only ever touched by the one worker thread
// that owns this `Shared` (see `pop_and_run`); its push side is `Queue`'s own
// MPSC contract, already safe to share.
unsafe impl Sync for Shared {}

/// One pool worker: its inbox plus the background thread draining it.
struct Worker {
    shared: Arc<Shared>,
    thread: Option<JoinHandle<()>>,
}

impl Worker {
    fn spawn(id: usize, threshold: u32, enable_metrics: bool) -> Self {
        let shared = Arc::new(Shared {
            id,
            inbox: UnsafeCell::new(Queue::with_metrics(enable_metrics)),
            close: AtomicBool::new(false),
            wait_flag: AtomicBool::new(false),
            phase: AtomicU8::new(Phase::Normal as u8),
            threshold,
        });

        let thread_shared = Arc::clone(&shared);
        let thread = thread::Builder::new()
            .name(format!("ringkit-worker-{id}"))
            .spawn(move || run_loop(&thread_shared))
            .expect("failed to spawn pool worker thread");

        Self { shared, thread: Some(thread) }
    }

    fn submit(&self, task: Callable<()>) -> Result<(), CapacityExhausted> {
        self.shared.push(task)?;
        self.shared.wait_flag.store(false, Ordering::Release);
        if let Some(thread) = &self.thread {
            thread.thread().unpark();
        }
        Ok(())
    }

    fn phase(&self) -> Phase {
        Phase::from_tag(self.shared.phase.load(Ordering::Relaxed))
    }

    fn metrics(&self) -> MetricsSnapshot {
        self.shared.metrics()
    }

    /// Signals shutdown and joins the thread, draining whatever remained in
    /// the inbox first (the worker loop only exits once its inbox is empty
    /// and `close` is set).
    fn shutdown(&mut self) {
        self.shared.close.store(true, Ordering::Relaxed);
        self.shared.wait_flag.store(false, Ordering::Release);
        if let Some(thread) = &self.thread {
            thread.thread().unpark();
        }
        if let Some(thread) = self.thread.take() {
            thread.join().expect("pool worker thread panicked");
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        if self.thread.is_some() {
            self.shutdown();
        }
    }
}

/// Four-state backoff walk. Every non-`Normal` phase snaps back to `Normal`
/// on a successful pop; otherwise the worker advances `Normal -> Idle ->
/// Yield -> Wait` one step at a time, each saturating counter capped at
/// `shared.threshold` (`INV-POOL-01`).
fn run_loop(shared: &Arc<Shared>) {
    let mut phase = Phase::Normal;
    let mut idle_count = 0u32;
    let mut yield_count = 0u32;
    let mut wait_count = 0u32;

    loop {
        let ran = shared.pop_and_run();
        if !ran && shared.close.load(Ordering::Relaxed) {
            return;
        }

        phase = match phase {
            Phase::Normal => {
                if ran {
                    idle_count = 0;
                    Phase::Normal
                } else {
                    idle_count += 1;
                    debug_assert_backoff_bounded!(idle_count, shared.threshold);
                    if idle_count >= shared.threshold {
                        idle_count = 0;
                        Phase::Idle
                    } else {
                        Phase::Normal
                    }
                }
            }
            Phase::Idle => {
                if ran {
                    yield_count = 0;
                    Phase::Normal
                } else {
                    yield_count += 1;
                    debug_assert_backoff_bounded!(yield_count, shared.threshold);
                    if yield_count >= shared.threshold {
                        yield_count = 0;
                        Phase::Yield
                    } else {
                        Phase::Idle
                    }
                }
            }
            Phase::Yield => {
                if ran {
                    wait_count = 0;
                    Phase::Normal
                } else {
                    thread::yield_now();
                    wait_count += 1;
                    debug_assert_backoff_bounded!(wait_count, shared.threshold);
                    if wait_count >= shared.threshold {
                        wait_count = 0;
                        shared.wait_flag.store(true, Ordering::Release);
                        Phase::Wait
                    } else {
                        Phase::Yield
                    }
                }
            }
            Phase::Wait => {
                if ran {
                    shared.wait_flag.store(false, Ordering::Release);
                    Phase::Normal
                } else {
                    // Double-check idiom (spec-equivalent of the source's
                    // Open Question on the yield->wait race): re-poll the
                    // inbox once more before parking. A submitter that ran
                    // between raising the flag and here already cleared it
                    // and unparked us, so this catches the task it left.
                    if shared.pop_and_run() {
                        shared.wait_flag.store(false, Ordering::Release);
                        Phase::Normal
                    } else {
                        thread::park();
                        shared.wait_flag.store(false, Ordering::Release);
                        Phase::Normal
                    }
                }
            }
        };

        shared.phase.store(phase as u8, Ordering::Relaxed);
    }
}

/// A fixed-size pool of background worker threads, each running its own
/// inbox through the four-state backoff walk above.
pub struct Pool {
    workers: Vec<Worker>,
    dispenser: Dispenser,
    threshold: u32,
    enable_metrics: bool,
}

impl Pool {
    /// Spawns `n` workers, each governed by backoff threshold `k`.
    ///
    /// # Panics
    ///
    /// Panics if `n` is zero.
    #[must_use]
    pub fn new(n: usize, k: u32) -> Self {
        Self::with_metrics(n, k, false)
    }

    /// Spawns `n` workers with per-worker inbox metrics collection enabled
    /// or disabled.
    ///
    /// # Panics
    ///
    /// Panics if `n` is zero.
    #[must_use]
    pub fn with_metrics(n: usize, k: u32, enable_metrics: bool) -> Self {
        assert!(n > 0, "pool must have at least one worker");
        let workers = (0..n).map(|id| Worker::spawn(id, k, enable_metrics)).collect();
        Self { workers, dispenser: Dispenser::new(n), threshold: k, enable_metrics }
    }

    /// Returns the number of workers currently in the pool.
    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Gets this pool's inbox metrics, summed across every worker (zeroed if
    /// metrics were not enabled at construction).
    #[must_use]
    pub fn metrics(&self) -> MetricsSnapshot {
        let mut total = MetricsSnapshot::default();
        for worker in &self.workers {
            total.merge(&worker.metrics());
        }
        total
    }

    /// Submits a task to the next worker in round-robin order (C6).
    pub fn submit<F>(&self, f: F) -> Result<(), CapacityExhausted>
    where
        F: FnMut() + Send + 'static,
    {
        let i = self.dispenser.next();
        self.submit_to(i, f)
    }

    /// Submits a task directly to worker `i`.
    ///
    /// # Panics
    ///
    /// Panics if `i >= self.worker_count()`.
    pub fn submit_to<F>(&self, i: usize, f: F) -> Result<(), CapacityExhausted>
    where
        F: FnMut() + Send + 'static,
    {
        self.workers[i].submit(Callable::from_callable(f))
    }

    /// Blocks until every worker has been observed reaching `wait`
    /// simultaneously — i.e. every inbox has drained and every worker has
    /// idled all the way down.
    ///
    /// This is a point-in-time observation, not a fence: a task submitted
    /// concurrently with this call may race it either way, and a worker may
    /// leave `wait` again immediately after being observed there.
    pub fn wait_done(&self) {
        let mut backoff = Backoff::new();
        loop {
            if self.workers.iter().all(|w| w.phase() == Phase::Wait) {
                return;
            }
            backoff.snooze();
            if backoff.is_completed() {
                backoff.reset();
            }
        }
    }

    /// Replaces all current workers with a fresh set of `n`, reusing the
    /// same backoff threshold `k`. Waits for in-flight tasks on the old
    /// workers to finish draining before any are dropped.
    ///
    /// # Panics
    ///
    /// Panics if `n` is zero.
    pub fn reset(&mut self, n: usize) {
        assert!(n > 0, "pool must have at least one worker");
        self.workers.clear(); // each Worker's Drop shuts its thread down cleanly
        self.workers = (0..n).map(|id| Worker::spawn(id, self.threshold, self.enable_metrics)).collect();
        self.dispenser = Dispenser::new(n);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU64;
    use std::sync::Mutex;

    #[test]
    fn metrics_track_submitted_and_drained_tasks_when_enabled() {
        let pool = Pool::with_metrics(2, 200, true);
        for _ in 0..10 {
            pool.submit(|| {}).unwrap();
        }
        pool.wait_done();
        let snap = pool.metrics();
        assert_eq!(snap.messages_sent, 10);
        assert_eq!(snap.messages_received, 10);
    }

    #[test]
    fn scenario_e_single_worker_single_task() {
        // Scenario E (spec.md §8): pool(1); submit sets ret = 4; wait_done; ret == 4.
        let pool = Pool::new(1, 1000);
        let ret = Arc::new(AtomicU64::new(0));
        let ret2 = Arc::clone(&ret);
        pool.submit(move || {
            ret2.store(4, Ordering::SeqCst);
        })
        .unwrap();
        pool.wait_done();
        assert_eq!(ret.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn scenario_f_many_submitters_many_increments() {
        // Scenario F (spec.md §8), shrunk for test runtime: 16 submitter
        // threads each push `per` lock-protected increments into a pool(4).
        let pool = Arc::new(Pool::new(4, 200));
        let submitters = 16;
        let per = 2000u64;
        let accumulator = Arc::new(Mutex::new(0u64));

        let handles: Vec<_> = (0..submitters)
            .map(|_| {
                let pool = Arc::clone(&pool);
                let accumulator = Arc::clone(&accumulator);
                std::thread::spawn(move || {
                    for _ in 0..per {
                        let accumulator = Arc::clone(&accumulator);
                        loop {
                            let accumulator = Arc::clone(&accumulator);
                            if pool
                                .submit(move || {
                                    *accumulator.lock().unwrap() += 1;
                                })
                                .is_ok()
                            {
                                break;
                            }
                        }
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        pool.wait_done();
        assert_eq!(*accumulator.lock().unwrap(), submitters as u64 * per);
    }

    #[test]
    fn submit_to_targets_a_specific_worker() {
        let pool = Pool::new(3, 1000);
        let ran = Arc::new(AtomicBool::new(false));
        let ran2 = Arc::clone(&ran);
        pool.submit_to(1, move || {
            ran2.store(true, Ordering::SeqCst);
        })
        .unwrap();
        pool.wait_done();
        assert!(ran.load(Ordering::SeqCst));
    }

    #[test]
    fn dispenser_spreads_submissions_round_robin() {
        let pool = Pool::new(4, 1000);
        let hits: Arc<Vec<AtomicU64>> = Arc::new((0..4).map(|_| AtomicU64::new(0)).collect());
        for i in 0..4 {
            let hits = Arc::clone(&hits);
            pool.submit_to(i, move || {
                hits[i].fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        }
        pool.wait_done();
        for h in hits.iter() {
            assert_eq!(h.load(Ordering::SeqCst), 1);
        }
    }

    #[test]
    fn reset_swaps_workers_and_keeps_pool_usable() {
        let mut pool = Pool::new(2, 1000);
        assert_eq!(pool.worker_count(), 2);
        pool.reset(5);
        assert_eq!(pool.worker_count(), 5);

        let ret = Arc::new(AtomicU64::new(0));
        let ret2 = Arc::clone(&ret);
        pool.submit(move || {
            ret2.store(9, Ordering::SeqCst);
        })
        .unwrap();
        pool.wait_done();
        assert_eq!(ret.load(Ordering::SeqCst), 9);
    }

    #[test]
    fn discarded_task_panic_does_not_kill_the_worker() {
        let pool = Pool::new(1, 1000);
        pool.submit(|| panic!("boom")).unwrap();
        pool.wait_done();

        let ret = Arc::new(AtomicU64::new(0));
        let ret2 = Arc::clone(&ret);
        pool.submit(move || {
            ret2.store(1, Ordering::SeqCst);
        })
        .unwrap();
        pool.wait_done();
        assert_eq!(ret.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn drop_drains_in_flight_tasks_before_exiting() {
        let ran = Arc::new(AtomicU64::new(0));
        {
            let pool = Pool::new(2, 50);
            for _ in 0..200 {
                let ran = Arc::clone(&ran);
                pool.submit(move || {
                    ran.fetch_add(1, Ordering::SeqCst);
                })
                .unwrap();
            }
            // Dropped here without an explicit wait_done: shutdown must still
            // drain every already-accepted task.
        }
        assert_eq!(ran.load(Ordering::SeqCst), 200);
    }
}
