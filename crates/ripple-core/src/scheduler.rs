//! Microtask-batched update queue.
//!
//! A component sits in the pending set at most once. The first enqueue of a
//! tick asks the runtime for a flush microtask; later enqueues in the same
//! tick only join the set.

use std::cell::{Cell, RefCell};

use indexmap::IndexMap;

use crate::component::{ComponentHandle, ComponentId};

#[derive(Default)]
pub struct UpdateScheduler {
    pending: RefCell<IndexMap<ComponentId, ComponentHandle>>,
    flush_scheduled: Cell<bool>,
}

impl UpdateScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `component` to the pending set. Returns `true` when the caller
    /// must queue a flush.
    pub(crate) fn enqueue(&self, component: ComponentHandle) -> bool {
        let id = component.id();
        let inserted = {
            let mut pending = self.pending.borrow_mut();
            if pending.contains_key(&id) {
                false
            } else {
                pending.insert(id, component);
                true
            }
        };
        if inserted {
            log::trace!("component {id} scheduled for update");
        }
        !self.flush_scheduled.replace(true)
    }

    /// Snapshot of the pending set, in scheduling order. Clears the set and
    /// the flush flag, so updates requested during the flush start a new one.
    pub(crate) fn take_pending(&self) -> Vec<ComponentHandle> {
        self.flush_scheduled.set(false);
        self.pending
            .borrow_mut()
            .drain(..)
            .map(|(_, component)| component)
            .collect()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.borrow().len()
    }

    pub fn is_pending(&self, id: ComponentId) -> bool {
        self.pending.borrow().contains_key(&id)
    }

    pub fn is_flush_scheduled(&self) -> bool {
        self.flush_scheduled.get()
    }
}
