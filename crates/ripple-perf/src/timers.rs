//! Host-time timers. Nothing fires on its own: the embedder calls
//! [`Timers::run_due`] whenever its clock may have passed a deadline.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use ripple_core::Clock;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

struct TimerEntry {
    id: TimerId,
    deadline: Duration,
    callback: Box<dyn FnOnce() + 'static>,
}

struct TimersInner {
    clock: Rc<dyn Clock>,
    entries: RefCell<Vec<TimerEntry>>,
    next_id: Cell<u64>,
}

/// One-shot timeouts against a [`Clock`]. Clones share the same queue.
#[derive(Clone)]
pub struct Timers {
    inner: Rc<TimersInner>,
}

impl Timers {
    pub fn new(clock: Rc<dyn Clock>) -> Self {
        Self {
            inner: Rc::new(TimersInner {
                clock,
                entries: RefCell::new(Vec::new()),
                next_id: Cell::new(1),
            }),
        }
    }

    pub fn now(&self) -> Duration {
        self.inner.clock.now()
    }

    pub fn clock(&self) -> Rc<dyn Clock> {
        Rc::clone(&self.inner.clock)
    }

    pub fn set_timeout(&self, delay: Duration, callback: impl FnOnce() + 'static) -> TimerId {
        let id = TimerId(self.inner.next_id.get());
        self.inner.next_id.set(id.0 + 1);
        let deadline = self.now() + delay;
        self.inner.entries.borrow_mut().push(TimerEntry {
            id,
            deadline,
            callback: Box::new(callback),
        });
        log::trace!("timer {id:?} due at {deadline:?}");
        id
    }

    /// Returns `false` if the timer already fired or was cleared.
    pub fn clear_timeout(&self, id: TimerId) -> bool {
        let mut entries = self.inner.entries.borrow_mut();
        match entries.iter().position(|entry| entry.id == id) {
            Some(index) => {
                entries.remove(index);
                true
            }
            None => false,
        }
    }

    /// Fires every timer whose deadline has passed, earliest deadline first.
    /// Timers set by the callbacks wait for the next call.
    pub fn run_due(&self) -> usize {
        let now = self.now();
        let mut due: Vec<TimerEntry> = {
            let mut entries = self.inner.entries.borrow_mut();
            let (due, pending): (Vec<_>, Vec<_>) =
                entries.drain(..).partition(|entry| entry.deadline <= now);
            *entries = pending;
            due
        };
        due.sort_by_key(|entry| (entry.deadline, entry.id));
        let fired = due.len();
        for entry in due {
            (entry.callback)();
        }
        fired
    }

    pub fn next_deadline(&self) -> Option<Duration> {
        self.inner
            .entries
            .borrow()
            .iter()
            .map(|entry| entry.deadline)
            .min()
    }

    pub fn is_pending(&self, id: TimerId) -> bool {
        self.inner.entries.borrow().iter().any(|entry| entry.id == id)
    }

    pub fn len(&self) -> usize {
        self.inner.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for Timers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Timers")
            .field("pending", &self.len())
            .field("next_deadline", &self.next_deadline())
            .finish()
    }
}
