//! Platform abstraction traits for Ripple runtime services.
//!
//! These traits let the runtime delegate wake-ups and timekeeping to the host
//! environment, so the same runtime can be driven by a test harness, a
//! `std` event loop, or any other embedder.

use std::time::Duration;

/// Receives wake-up requests from the runtime.
///
/// The runtime never drains its own queues; it asks the host to come back and
/// do so. Implementations must be safe to share across threads even though the
/// runtime itself is single-threaded.
pub trait RuntimeScheduler: Send + Sync {
    /// The microtask queue went from empty to non-empty.
    fn schedule_microtasks(&self);

    /// A frame callback was registered and a display refresh is wanted.
    fn schedule_frame(&self);
}

/// Provides monotonic time to the runtime and the performance layer.
pub trait Clock {
    /// Time elapsed since the clock's origin.
    fn now(&self) -> Duration;

    /// Time elapsed since `earlier`, saturating at zero.
    fn elapsed_since(&self, earlier: Duration) -> Duration {
        self.now().saturating_sub(earlier)
    }
}
