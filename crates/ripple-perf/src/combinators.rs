//! Rate-limiting wrappers built on [`Timers`].

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use std::time::Duration;

use crate::timers::{TimerId, Timers};

struct DebounceInner<A> {
    timers: Timers,
    delay: Duration,
    function: RefCell<Box<dyn FnMut(A)>>,
    pending: Cell<Option<TimerId>>,
}

/// Trailing-edge debounce: `f` runs once, `delay` after the last call, with
/// that call's argument.
pub struct Debounced<A: 'static> {
    inner: Rc<DebounceInner<A>>,
}

pub fn debounce<A: 'static>(
    timers: &Timers,
    delay: Duration,
    f: impl FnMut(A) + 'static,
) -> Debounced<A> {
    Debounced {
        inner: Rc::new(DebounceInner {
            timers: timers.clone(),
            delay,
            function: RefCell::new(Box::new(f)),
            pending: Cell::new(None),
        }),
    }
}

impl<A: 'static> Debounced<A> {
    pub fn call(&self, args: A) {
        self.cancel();
        let weak: Weak<DebounceInner<A>> = Rc::downgrade(&self.inner);
        let id = self.inner.timers.set_timeout(self.inner.delay, move || {
            if let Some(inner) = weak.upgrade() {
                inner.pending.set(None);
                (&mut *inner.function.borrow_mut())(args);
            }
        });
        self.inner.pending.set(Some(id));
    }

    /// Drops the pending trailing call, if any.
    pub fn cancel(&self) {
        if let Some(id) = self.inner.pending.take() {
            self.inner.timers.clear_timeout(id);
        }
    }

    pub fn is_pending(&self) -> bool {
        self.inner.pending.get().is_some()
    }
}

impl<A: 'static> Drop for Debounced<A> {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl<A: 'static> fmt::Debug for Debounced<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Debounced")
            .field("delay", &self.inner.delay)
            .field("pending", &self.is_pending())
            .finish()
    }
}

/// Leading-edge throttle: a call runs `f` immediately unless `f` already ran
/// less than `limit` ago, in which case the call is dropped.
pub struct Throttled<A> {
    timers: Timers,
    limit: Duration,
    function: RefCell<Box<dyn FnMut(A)>>,
    last_run: Cell<Option<Duration>>,
}

pub fn throttle<A>(timers: &Timers, limit: Duration, f: impl FnMut(A) + 'static) -> Throttled<A> {
    Throttled {
        timers: timers.clone(),
        limit,
        function: RefCell::new(Box::new(f)),
        last_run: Cell::new(None),
    }
}

impl<A> Throttled<A> {
    /// Returns whether `f` ran.
    pub fn call(&self, args: A) -> bool {
        let now = self.timers.now();
        if let Some(last) = self.last_run.get() {
            if now.saturating_sub(last) < self.limit {
                return false;
            }
        }
        self.last_run.set(Some(now));
        (&mut *self.function.borrow_mut())(args);
        true
    }
}

impl<A> fmt::Debug for Throttled<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Throttled")
            .field("limit", &self.limit)
            .field("last_run", &self.last_run.get())
            .finish()
    }
}

struct BatchInner<T> {
    timers: Timers,
    size: usize,
    delay: Duration,
    function: RefCell<Box<dyn FnMut(Vec<T>)>>,
    items: RefCell<Vec<T>>,
    timer: Cell<Option<TimerId>>,
    flushing: Cell<bool>,
}

impl<T: 'static> BatchInner<T> {
    fn flush(&self) {
        if let Some(id) = self.timer.take() {
            self.timers.clear_timeout(id);
        }
        // `f` may push back into this batcher; the outer call drains any
        // batch that fills up meanwhile.
        if self.flushing.replace(true) {
            return;
        }
        loop {
            let items = std::mem::take(&mut *self.items.borrow_mut());
            if items.is_empty() {
                break;
            }
            log::trace!("flushing batch of {} item(s)", items.len());
            (&mut *self.function.borrow_mut())(items);
            if self.items.borrow().len() < self.size {
                break;
            }
        }
        self.flushing.set(false);
    }
}

/// Collects items and hands them to `f` together, once `size` items are
/// queued or after `delay` without a new item.
pub struct Batcher<T: 'static> {
    inner: Rc<BatchInner<T>>,
}

pub fn batch<T: 'static>(
    timers: &Timers,
    size: usize,
    delay: Duration,
    f: impl FnMut(Vec<T>) + 'static,
) -> Batcher<T> {
    Batcher {
        inner: Rc::new(BatchInner {
            timers: timers.clone(),
            size: size.max(1),
            delay,
            function: RefCell::new(Box::new(f)),
            items: RefCell::new(Vec::new()),
            timer: Cell::new(None),
            flushing: Cell::new(false),
        }),
    }
}

impl<T: 'static> Batcher<T> {
    pub fn push(&self, item: T) {
        let len = {
            let mut items = self.inner.items.borrow_mut();
            items.push(item);
            items.len()
        };
        if len >= self.inner.size {
            self.inner.flush();
            return;
        }
        if let Some(id) = self.inner.timer.take() {
            self.inner.timers.clear_timeout(id);
        }
        let weak: Weak<BatchInner<T>> = Rc::downgrade(&self.inner);
        let id = self.inner.timers.set_timeout(self.inner.delay, move || {
            if let Some(inner) = weak.upgrade() {
                inner.timer.set(None);
                inner.flush();
            }
        });
        self.inner.timer.set(Some(id));
    }

    /// Hands every queued item to `f` now.
    pub fn flush(&self) {
        self.inner.flush();
    }

    pub fn len(&self) -> usize {
        self.inner.items.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: 'static> Drop for Batcher<T> {
    fn drop(&mut self) {
        if let Some(id) = self.inner.timer.take() {
            self.inner.timers.clear_timeout(id);
        }
    }
}

impl<T: 'static> fmt::Debug for Batcher<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Batcher")
            .field("size", &self.inner.size)
            .field("delay", &self.inner.delay)
            .field("queued", &self.len())
            .finish()
    }
}
