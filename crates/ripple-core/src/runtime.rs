use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::{Rc, Weak};
use std::sync::Arc;

use crate::component::{Component, ComponentHandle, ComponentInstance};
use crate::frame_clock::FrameClock;
use crate::host::SharedHost;
use crate::platform::RuntimeScheduler;
use crate::reconciler::Reconciler;
use crate::renderer::Renderer;
use crate::scheduler::UpdateScheduler;
use crate::value::Props;
use crate::FrameCallbackId;

type Microtask = Box<dyn FnOnce() + 'static>;

struct RuntimeInner {
    scheduler: Arc<dyn RuntimeScheduler>,
    renderer: Renderer,
    reconciler: Reconciler,
    updates: UpdateScheduler,
    microtasks: RefCell<VecDeque<Microtask>>,
    frame_callbacks: RefCell<VecDeque<FrameCallbackEntry>>,
    next_frame_callback_id: Cell<u64>,
    needs_frame: Cell<bool>,
}

impl RuntimeInner {
    fn new(host: SharedHost, scheduler: Arc<dyn RuntimeScheduler>) -> Self {
        Self {
            scheduler,
            renderer: Renderer::new(host),
            reconciler: Reconciler::new(),
            updates: UpdateScheduler::new(),
            microtasks: RefCell::new(VecDeque::new()),
            frame_callbacks: RefCell::new(VecDeque::new()),
            next_frame_callback_id: Cell::new(1),
            needs_frame: Cell::new(false),
        }
    }

    fn queue_microtask(&self, task: Microtask) {
        let was_empty = {
            let mut queue = self.microtasks.borrow_mut();
            let was_empty = queue.is_empty();
            queue.push_back(task);
            was_empty
        };
        if was_empty {
            self.scheduler.schedule_microtasks();
        }
    }

    fn run_microtasks(&self) -> usize {
        let mut ran = 0;
        loop {
            // The queue is released before running so tasks can queue more.
            let next = self.microtasks.borrow_mut().pop_front();
            let Some(task) = next else {
                break;
            };
            task();
            ran += 1;
        }
        ran
    }

    fn has_microtasks(&self) -> bool {
        !self.microtasks.borrow().is_empty()
    }

    fn has_frame_callbacks(&self) -> bool {
        !self.frame_callbacks.borrow().is_empty()
    }

    fn register_frame_callback(&self, callback: Box<dyn FnOnce(u64) + 'static>) -> FrameCallbackId {
        let id = self.next_frame_callback_id.get();
        self.next_frame_callback_id.set(id + 1);
        self.frame_callbacks
            .borrow_mut()
            .push_back(FrameCallbackEntry {
                id,
                callback: Some(callback),
            });
        self.needs_frame.set(true);
        self.scheduler.schedule_frame();
        id
    }

    fn cancel_frame_callback(&self, id: FrameCallbackId) {
        let mut callbacks = self.frame_callbacks.borrow_mut();
        if let Some(index) = callbacks.iter().position(|entry| entry.id == id) {
            callbacks.remove(index);
        }
        if callbacks.is_empty() {
            self.needs_frame.set(false);
        }
    }

    fn drain_frame_callbacks(&self, frame_time_nanos: u64) -> usize {
        let mut callbacks = self.frame_callbacks.borrow_mut();
        let mut pending: Vec<Box<dyn FnOnce(u64) + 'static>> = Vec::with_capacity(callbacks.len());
        while let Some(mut entry) = callbacks.pop_front() {
            if let Some(callback) = entry.callback.take() {
                pending.push(callback);
            }
        }
        drop(callbacks);
        let ran = pending.len();
        for callback in pending {
            callback(frame_time_nanos);
        }
        if !self.has_frame_callbacks() {
            self.needs_frame.set(false);
        }
        ran
    }
}

/// Explicitly constructed runtime services: renderer, reconciler, the update
/// scheduler, and the microtask and frame-callback queues.
///
/// The runtime never drains its own queues. Hosts call
/// [`Runtime::run_microtasks`] and [`Runtime::drain_frame_callbacks`] when
/// their [`RuntimeScheduler`] is notified.
#[derive(Clone)]
pub struct Runtime {
    inner: Rc<RuntimeInner>,
}

impl Runtime {
    pub fn new(host: SharedHost) -> Self {
        Self::with_scheduler(host, Arc::new(DefaultScheduler))
    }

    pub fn with_scheduler(host: SharedHost, scheduler: Arc<dyn RuntimeScheduler>) -> Self {
        Self {
            inner: Rc::new(RuntimeInner::new(host, scheduler)),
        }
    }

    pub fn handle(&self) -> RuntimeHandle {
        RuntimeHandle(Rc::downgrade(&self.inner))
    }

    pub fn host(&self) -> &SharedHost {
        self.inner.renderer.host()
    }

    pub fn renderer(&self) -> &Renderer {
        &self.inner.renderer
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.inner.reconciler
    }

    pub fn updates(&self) -> &UpdateScheduler {
        &self.inner.updates
    }

    pub fn create_component(&self, component: impl Component) -> ComponentInstance {
        self.create_component_with_state(component, Props::new())
    }

    /// Creates a component whose class-style state record starts as `state`.
    pub fn create_component_with_state(
        &self,
        component: impl Component,
        state: Props,
    ) -> ComponentInstance {
        ComponentInstance::new(self.handle(), Box::new(component), state)
    }

    pub fn queue_microtask(&self, task: impl FnOnce() + 'static) {
        self.inner.queue_microtask(Box::new(task));
    }

    /// Runs queued microtasks until the queue is empty, including tasks
    /// queued while draining. Returns how many ran.
    pub fn run_microtasks(&self) -> usize {
        self.inner.run_microtasks()
    }

    pub fn has_pending_microtasks(&self) -> bool {
        self.inner.has_microtasks()
    }

    pub fn pending_update_count(&self) -> usize {
        self.inner.updates.pending_count()
    }

    /// Adds `component` to the pending set and, if no flush is queued yet,
    /// queues one.
    pub fn schedule_update(&self, component: ComponentHandle) {
        if !self.inner.updates.enqueue(component) {
            return;
        }
        let runtime = self.handle();
        self.queue_microtask(move || {
            if let Some(runtime) = runtime.upgrade() {
                runtime.flush_updates();
            }
        });
    }

    /// Updates every pending component once. One component failing does not
    /// stop the others.
    pub fn flush_updates(&self) -> usize {
        let pending = self.inner.updates.take_pending();
        log::trace!("flushing {} pending update(s)", pending.len());
        let mut updated = 0;
        for handle in pending {
            let Some(component) = handle.upgrade() else {
                continue;
            };
            if !component.is_mounted() {
                continue;
            }
            match component.update() {
                Ok(()) => updated += 1,
                Err(error) => log::error!("update of component {} failed: {error}", handle.id()),
            }
        }
        updated
    }

    pub fn frame_clock(&self) -> FrameClock {
        FrameClock::new(self.handle())
    }

    pub fn needs_frame(&self) -> bool {
        self.inner.needs_frame.get()
    }

    pub fn has_frame_callbacks(&self) -> bool {
        self.inner.has_frame_callbacks()
    }

    /// Runs every frame callback registered before this call. Callbacks
    /// registered while draining wait for the next frame.
    pub fn drain_frame_callbacks(&self, frame_time_nanos: u64) -> usize {
        self.inner.drain_frame_callbacks(frame_time_nanos)
    }

    pub fn is_idle(&self) -> bool {
        !self.has_pending_microtasks() && !self.has_frame_callbacks()
    }
}

/// Scheduler for embedders that poll the runtime themselves.
#[derive(Default)]
pub struct DefaultScheduler;

impl RuntimeScheduler for DefaultScheduler {
    fn schedule_microtasks(&self) {}

    fn schedule_frame(&self) {}
}

#[derive(Clone)]
pub struct RuntimeHandle(Weak<RuntimeInner>);

impl RuntimeHandle {
    pub fn upgrade(&self) -> Option<Runtime> {
        self.0.upgrade().map(|inner| Runtime { inner })
    }

    pub fn queue_microtask(&self, task: impl FnOnce() + 'static) {
        if let Some(inner) = self.0.upgrade() {
            inner.queue_microtask(Box::new(task));
        }
    }

    pub fn register_frame_callback(
        &self,
        callback: impl FnOnce(u64) + 'static,
    ) -> Option<FrameCallbackId> {
        self.0
            .upgrade()
            .map(|inner| inner.register_frame_callback(Box::new(callback)))
    }

    pub fn cancel_frame_callback(&self, id: FrameCallbackId) {
        if let Some(inner) = self.0.upgrade() {
            inner.cancel_frame_callback(id);
        }
    }

    pub fn frame_clock(&self) -> FrameClock {
        FrameClock::new(self.clone())
    }

    pub fn has_frame_callbacks(&self) -> bool {
        self.0
            .upgrade()
            .map(|inner| inner.has_frame_callbacks())
            .unwrap_or(false)
    }
}

struct FrameCallbackEntry {
    id: FrameCallbackId,
    callback: Option<Box<dyn FnOnce(u64) + 'static>>,
}
