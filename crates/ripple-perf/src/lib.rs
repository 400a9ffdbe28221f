//! Performance layer for Ripple: frame-batched updates, a namespaced memo
//! cache, and timer-driven rate limiting.
//!
//! This layer drains on animation frames, independently of the runtime's
//! microtask-driven update scheduler. The two are not ordered relative to each
//! other.

use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use ripple_core::{Clock, FrameClock};

mod combinators;
mod frame_batch;
mod memo;
mod timers;

pub use combinators::{batch, debounce, throttle, Batcher, Debounced, Throttled};
pub use frame_batch::{BatchStats, FrameBatcher, Priority};
pub use memo::{CacheStats, MemoCache, Memoized, MemoizeOptions, DEFAULT_MAX_SIZE, DEFAULT_TTL};
pub use timers::{TimerId, Timers};

/// Bundles the frame batcher, memo cache and timers over one frame clock and
/// one time source.
#[derive(Clone)]
pub struct PerformanceLayer {
    timers: Timers,
    frames: FrameBatcher,
    memo: MemoCache,
}

impl PerformanceLayer {
    pub fn new(frame_clock: FrameClock, clock: Rc<dyn Clock>) -> Self {
        Self {
            timers: Timers::new(Rc::clone(&clock)),
            frames: FrameBatcher::new(frame_clock, Rc::clone(&clock)),
            memo: MemoCache::new(clock),
        }
    }

    pub fn timers(&self) -> &Timers {
        &self.timers
    }

    pub fn frame_batcher(&self) -> &FrameBatcher {
        &self.frames
    }

    pub fn memo_cache(&self) -> &MemoCache {
        &self.memo
    }

    pub fn schedule_update(&self, priority: Priority, update: impl FnOnce() + 'static) {
        self.frames.schedule_update(priority, update);
    }

    pub fn batch_stats(&self) -> BatchStats {
        self.frames.stats()
    }

    pub fn memoize<A, R>(
        &self,
        f: impl Fn(&A) -> R + 'static,
        options: MemoizeOptions<A>,
    ) -> Memoized<A, R>
    where
        A: fmt::Debug + 'static,
        R: Clone + 'static,
    {
        self.memo.memoize(f, options)
    }

    pub fn debounce<A: 'static>(&self, f: impl FnMut(A) + 'static, delay: Duration) -> Debounced<A> {
        debounce(&self.timers, delay, f)
    }

    pub fn throttle<A>(&self, f: impl FnMut(A) + 'static, limit: Duration) -> Throttled<A> {
        throttle(&self.timers, limit, f)
    }

    pub fn batch<T: 'static>(
        &self,
        f: impl FnMut(Vec<T>) + 'static,
        size: usize,
        delay: Duration,
    ) -> Batcher<T> {
        batch(&self.timers, size, delay, f)
    }

    /// Fires due timers. Returns how many fired.
    pub fn run_due_timers(&self) -> usize {
        self.timers.run_due()
    }
}

impl fmt::Debug for PerformanceLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PerformanceLayer")
            .field("timers", &self.timers)
            .field("frames", &self.frames)
            .field("memo", &self.memo)
            .finish()
    }
}

#[cfg(test)]
#[path = "tests/perf_tests.rs"]
mod tests;
