//! Standard runtime services backed by Rust's `std` library.
//!
//! This crate provides concrete implementations of the platform abstraction
//! traits defined in `ripple-core`. Applications construct a [`StdRuntime`]
//! around their host tree and call [`StdRuntime::tick`] from their event loop.

use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};

use ripple_core::{Clock, FrameClock, Runtime, RuntimeHandle, RuntimeScheduler, SharedHost};
use ripple_perf::PerformanceLayer;

type Waker = Arc<dyn Fn() + Send + Sync + 'static>;

/// Scheduler that records wake-up requests in atomic flags and forwards them
/// to an optional waker.
pub struct StdScheduler {
    microtasks_requested: AtomicBool,
    frame_requested: AtomicBool,
    waker: RwLock<Option<Waker>>,
}

impl StdScheduler {
    pub fn new() -> Self {
        Self {
            microtasks_requested: AtomicBool::new(false),
            frame_requested: AtomicBool::new(false),
            waker: RwLock::new(None),
        }
    }

    /// Returns whether microtasks were requested since the last call.
    pub fn take_microtask_request(&self) -> bool {
        self.microtasks_requested.swap(false, Ordering::SeqCst)
    }

    /// Returns whether a frame has been requested since the last call.
    pub fn take_frame_request(&self) -> bool {
        self.frame_requested.swap(false, Ordering::SeqCst)
    }

    /// Registers a waker that will be invoked whenever the runtime asks for
    /// microtasks or a frame.
    pub fn set_waker(&self, waker: impl Fn() + Send + Sync + 'static) {
        *self.waker.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(waker));
    }

    pub fn clear_waker(&self) {
        *self.waker.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    fn wake(&self) {
        let waker = self
            .waker
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(waker) = waker {
            waker();
        }
    }
}

impl Default for StdScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for StdScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StdScheduler")
            .field(
                "microtasks_requested",
                &self.microtasks_requested.load(Ordering::SeqCst),
            )
            .field("frame_requested", &self.frame_requested.load(Ordering::SeqCst))
            .finish()
    }
}

impl RuntimeScheduler for StdScheduler {
    fn schedule_microtasks(&self) {
        self.microtasks_requested.store(true, Ordering::SeqCst);
        self.wake();
    }

    fn schedule_frame(&self) {
        self.frame_requested.store(true, Ordering::SeqCst);
        self.wake();
    }
}

/// Monotonic clock measured from its construction.
#[derive(Debug, Clone)]
pub struct StdClock {
    origin: Instant,
}

impl StdClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    pub fn origin(&self) -> Instant {
        self.origin
    }
}

impl Default for StdClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for StdClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// What one [`StdRuntime::tick`] did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickReport {
    pub microtasks: usize,
    pub timers: usize,
    pub frame_callbacks: usize,
}

impl TickReport {
    pub fn is_empty(&self) -> bool {
        self.microtasks == 0 && self.timers == 0 && self.frame_callbacks == 0
    }
}

/// Convenience container bundling the standard scheduler and clock with a
/// runtime and its performance layer.
#[derive(Clone)]
pub struct StdRuntime {
    scheduler: Arc<StdScheduler>,
    clock: Rc<StdClock>,
    runtime: Runtime,
    performance: PerformanceLayer,
}

impl StdRuntime {
    pub fn new(host: SharedHost) -> Self {
        let scheduler = Arc::new(StdScheduler::default());
        let runtime = Runtime::with_scheduler(host, scheduler.clone());
        let clock = Rc::new(StdClock::default());
        let performance = PerformanceLayer::new(runtime.frame_clock(), clock.clone());
        Self {
            scheduler,
            clock,
            runtime,
            performance,
        }
    }

    pub fn runtime(&self) -> Runtime {
        self.runtime.clone()
    }

    pub fn runtime_handle(&self) -> RuntimeHandle {
        self.runtime.handle()
    }

    pub fn frame_clock(&self) -> FrameClock {
        self.runtime.frame_clock()
    }

    pub fn performance_layer(&self) -> &PerformanceLayer {
        &self.performance
    }

    pub fn scheduler(&self) -> Arc<StdScheduler> {
        Arc::clone(&self.scheduler)
    }

    pub fn clock(&self) -> Rc<StdClock> {
        Rc::clone(&self.clock)
    }

    pub fn take_frame_request(&self) -> bool {
        self.scheduler.take_frame_request()
    }

    pub fn set_waker(&self, waker: impl Fn() + Send + Sync + 'static) {
        self.scheduler.set_waker(waker);
    }

    pub fn clear_waker(&self) {
        self.scheduler.clear_waker();
    }

    /// Current frame timestamp in nanoseconds since the clock's origin.
    pub fn frame_time_nanos(&self) -> u64 {
        self.clock.now().as_nanos() as u64
    }

    /// Drains pending frame callbacks at the current clock time.
    pub fn drain_frame_callbacks(&self) -> usize {
        self.runtime.drain_frame_callbacks(self.frame_time_nanos())
    }

    /// Runs microtasks and due timers until neither has work left. Frame
    /// callbacks are left for [`StdRuntime::tick`].
    pub fn run_until_idle(&self) -> TickReport {
        let mut report = TickReport::default();
        loop {
            self.scheduler.take_microtask_request();
            let microtasks = self.runtime.run_microtasks();
            let timers = self.performance.run_due_timers();
            if microtasks == 0 && timers == 0 {
                break;
            }
            report.microtasks += microtasks;
            report.timers += timers;
        }
        report
    }

    /// One turn of the event loop: settle microtasks and timers, then drive
    /// a frame if one was requested, then settle again.
    pub fn tick(&self) -> TickReport {
        let mut report = self.run_until_idle();
        if self.take_frame_request() || self.runtime.has_frame_callbacks() {
            report.frame_callbacks = self.drain_frame_callbacks();
            let after = self.run_until_idle();
            report.microtasks += after.microtasks;
            report.timers += after.timers;
        }
        if !report.is_empty() {
            log::trace!("tick: {report:?}");
        }
        report
    }

    /// How long an event loop may sleep before the next timer is due.
    /// `None` when nothing is scheduled.
    pub fn time_until_next_timer(&self) -> Option<Duration> {
        self.performance
            .timers()
            .next_deadline()
            .map(|deadline| deadline.saturating_sub(self.clock.now()))
    }

    pub fn is_idle(&self) -> bool {
        self.runtime.is_idle() && self.performance.timers().is_empty()
    }
}

impl fmt::Debug for StdRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StdRuntime")
            .field("scheduler", &self.scheduler)
            .field("clock", &self.clock)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use ripple_core::{
        Component, HostTree, MemoryHost, RenderContext, RenderError, Renderable, StateSetter,
        VNode,
    };
    use ripple_perf::Priority;

    use super::StdRuntime;

    struct Counter {
        setter: Rc<RefCell<Option<StateSetter<i32>>>>,
    }

    impl Component for Counter {
        fn render(&self, ctx: &mut RenderContext<'_>) -> Result<Renderable, RenderError> {
            let (count, set_count) = ctx.use_state(|| 0)?;
            self.setter.borrow_mut().replace(set_count);
            Ok(VNode::element("span").text(count.to_string()).into())
        }
    }

    #[test]
    fn std_runtime_requests_microtasks_and_rerenders_on_state_change() {
        let (host, shared) = MemoryHost::shared();
        let container = host.borrow_mut().create_element("body");
        let runtime = StdRuntime::new(shared);
        let wakes = Arc::new(AtomicUsize::new(0));
        let counter = wakes.clone();
        runtime.set_waker(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let setter = Rc::new(RefCell::new(None));
        let instance = runtime.runtime().create_component(Counter {
            setter: setter.clone(),
        });
        instance.mount(container).expect("mount");
        runtime.run_until_idle();

        let set_count = setter.borrow().clone().expect("setter captured during render");
        set_count.set(1);
        assert!(runtime.scheduler().take_microtask_request());
        assert!(wakes.load(Ordering::SeqCst) >= 1);

        let report = runtime.run_until_idle();
        assert!(report.microtasks >= 1);
        assert_eq!(host.borrow().text_content(container), "1");
        assert!(runtime.is_idle());
    }

    #[test]
    fn tick_drives_frame_batched_updates() {
        let (_host, shared) = MemoryHost::shared();
        let runtime = StdRuntime::new(shared);
        let ran = Rc::new(RefCell::new(Vec::new()));
        let log = ran.clone();
        runtime
            .performance_layer()
            .schedule_update(Priority::Normal, move || log.borrow_mut().push("frame"));

        assert!(runtime.run_until_idle().is_empty());
        assert!(ran.borrow().is_empty());

        let report = runtime.tick();
        assert_eq!(report.frame_callbacks, 1);
        assert_eq!(*ran.borrow(), vec!["frame"]);
        assert_eq!(runtime.performance_layer().batch_stats().batch_count, 1);
    }
}
