//! Two-lane update queue drained once per animation frame.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::rc::{Rc, Weak};
use std::time::Duration;

use ripple_core::{Clock, FrameCallbackRegistration, FrameClock};

const LATENCY_WINDOW: usize = 100;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Priority {
    High,
    #[default]
    Normal,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct BatchStats {
    pub batch_count: u64,
    pub update_count: u64,
    /// Mean execution time of the last 100 batches.
    pub average_latency: Duration,
}

type Job = Box<dyn FnOnce() + 'static>;

struct BatcherInner {
    frame_clock: FrameClock,
    clock: Rc<dyn Clock>,
    high: RefCell<VecDeque<Job>>,
    normal: RefCell<VecDeque<Job>>,
    frame: RefCell<Option<FrameCallbackRegistration>>,
    batch_count: Cell<u64>,
    update_count: Cell<u64>,
    latencies: RefCell<VecDeque<Duration>>,
}

impl BatcherInner {
    fn request_frame(self: &Rc<Self>) {
        if self.frame.borrow().is_some() {
            return;
        }
        let weak: Weak<Self> = Rc::downgrade(self);
        let registration = self.frame_clock.with_frame_nanos(move |_| {
            if let Some(inner) = weak.upgrade() {
                inner.run_batch();
            }
        });
        if !registration.is_active() {
            log::warn!("frame batcher could not register a frame callback; runtime is gone");
            return;
        }
        *self.frame.borrow_mut() = Some(registration);
    }

    fn run_batch(self: &Rc<Self>) {
        if let Some(registration) = self.frame.borrow_mut().take() {
            registration.detach();
        }
        let high = std::mem::take(&mut *self.high.borrow_mut());
        let normal = std::mem::take(&mut *self.normal.borrow_mut());
        let jobs = high.len() + normal.len();
        if jobs == 0 {
            return;
        }

        let started = self.clock.now();
        for job in high.into_iter().chain(normal) {
            job();
        }
        let latency = self.clock.elapsed_since(started);

        self.batch_count.set(self.batch_count.get() + 1);
        self.update_count.set(self.update_count.get() + jobs as u64);
        let mut latencies = self.latencies.borrow_mut();
        if latencies.len() == LATENCY_WINDOW {
            latencies.pop_front();
        }
        latencies.push_back(latency);
        log::debug!("frame batch ran {jobs} update(s) in {latency:?}");
    }
}

/// Batches updates onto the next animation frame. Every high-priority update
/// queued for a frame runs before any normal one. Updates scheduled while a
/// batch is running wait for the following frame.
#[derive(Clone)]
pub struct FrameBatcher {
    inner: Rc<BatcherInner>,
}

impl FrameBatcher {
    pub fn new(frame_clock: FrameClock, clock: Rc<dyn Clock>) -> Self {
        Self {
            inner: Rc::new(BatcherInner {
                frame_clock,
                clock,
                high: RefCell::new(VecDeque::new()),
                normal: RefCell::new(VecDeque::new()),
                frame: RefCell::new(None),
                batch_count: Cell::new(0),
                update_count: Cell::new(0),
                latencies: RefCell::new(VecDeque::with_capacity(LATENCY_WINDOW)),
            }),
        }
    }

    pub fn schedule_update(&self, priority: Priority, update: impl FnOnce() + 'static) {
        let lane = match priority {
            Priority::High => &self.inner.high,
            Priority::Normal => &self.inner.normal,
        };
        lane.borrow_mut().push_back(Box::new(update));
        self.inner.request_frame();
    }

    pub fn pending_count(&self) -> usize {
        self.inner.high.borrow().len() + self.inner.normal.borrow().len()
    }

    pub fn is_frame_requested(&self) -> bool {
        self.inner.frame.borrow().is_some()
    }

    pub fn stats(&self) -> BatchStats {
        let latencies = self.inner.latencies.borrow();
        let average_latency = if latencies.is_empty() {
            Duration::ZERO
        } else {
            latencies.iter().sum::<Duration>() / latencies.len() as u32
        };
        BatchStats {
            batch_count: self.inner.batch_count.get(),
            update_count: self.inner.update_count.get(),
            average_latency,
        }
    }
}

impl fmt::Debug for FrameBatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameBatcher")
            .field("pending", &self.pending_count())
            .field("stats", &self.stats())
            .finish()
    }
}
