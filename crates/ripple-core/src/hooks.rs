//! Per-component hook storage and the hook API.
//!
//! Every component instance owns one [`HookTable`]: an ordered slot array per
//! hook kind plus a read cursor per kind. Cursors are reset at the start of
//! each render, so the n-th `use_state` call of a render always lands on the
//! n-th state slot. That addressing only works if a component calls the same
//! hooks in the same order on every render; in debug builds the table records
//! the kind of every call on the first successful render and rejects later
//! renders that diverge.
//!
//! Hooks are methods on [`RenderContext`], which the lifecycle controller hands
//! to `Component::render`. A detached context (the one function components
//! receive) has no component behind it and fails every hook with
//! [`HookError::InvalidHookCall`].

use std::any::{type_name, Any};
use std::cell::{Ref, RefCell, RefMut};
use std::fmt;
use std::rc::Rc;

use thiserror::Error;

use crate::component::ComponentHandle;
use crate::value::Props;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HookKind {
    State,
    Effect,
    Memo,
    Ref,
}

impl fmt::Display for HookKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HookKind::State => "state",
            HookKind::Effect => "effect",
            HookKind::Memo => "memo",
            HookKind::Ref => "ref",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HookError {
    #[error("invalid hook call: `{hook}` called while no component is rendering")]
    InvalidHookCall { hook: &'static str },
    #[error("hook #{index} was a {expected} hook on the first render but is a {found} hook now")]
    OrderMismatch {
        index: usize,
        expected: HookKind,
        found: HookKind,
    },
    #[error("render called {current} hooks but the first render called {previous}")]
    HookCountChanged { previous: usize, current: usize },
    #[error("{kind} slot {index} does not hold a `{expected}`")]
    TypeMismatch {
        kind: HookKind,
        index: usize,
        expected: &'static str,
    },
}

/// Value returned by an effect body: what to run before the effect reruns or
/// when its component unmounts.
#[derive(Default)]
pub struct EffectCleanup {
    cleanup: Option<Box<dyn FnOnce()>>,
}

impl EffectCleanup {
    pub fn new(cleanup: impl FnOnce() + 'static) -> Self {
        Self {
            cleanup: Some(Box::new(cleanup)),
        }
    }

    pub fn none() -> Self {
        Self::default()
    }

    fn into_inner(self) -> Option<Box<dyn FnOnce()>> {
        self.cleanup
    }
}

#[derive(Default)]
struct EffectState {
    cleanup: Option<Box<dyn FnOnce()>>,
    dependencies: Option<Box<dyn Any>>,
    scheduled: bool,
    disposed: bool,
}

impl EffectState {
    fn should_run<D: PartialEq + 'static>(&self, dependencies: Option<&D>) -> bool {
        if !self.scheduled {
            return true;
        }
        match (dependencies, &self.dependencies) {
            (Some(next), Some(previous)) => previous
                .downcast_ref::<D>()
                .map_or(true, |previous| previous != next),
            _ => true,
        }
    }
}

impl Drop for EffectState {
    fn drop(&mut self) {
        if let Some(cleanup) = self.cleanup.take() {
            cleanup();
        }
    }
}

/// An effect body waiting for its render/patch cycle to finish.
pub(crate) struct PendingEffect {
    state: Rc<RefCell<EffectState>>,
    body: Box<dyn FnOnce() -> EffectCleanup>,
}

impl PendingEffect {
    pub(crate) fn run(self) {
        if self.state.borrow().disposed {
            return;
        }
        // A rerun queued before the previous body ran still owes that body's
        // cleanup.
        let previous = self.state.borrow_mut().cleanup.take();
        if let Some(previous) = previous {
            previous();
        }
        let cleanup = (self.body)().into_inner();
        let mut state = self.state.borrow_mut();
        if state.disposed {
            drop(state);
            if let Some(cleanup) = cleanup {
                cleanup();
            }
            return;
        }
        state.cleanup = cleanup;
    }
}

struct StateSlot {
    cell: Box<dyn Any>,
}

struct EffectSlot {
    state: Rc<RefCell<EffectState>>,
}

struct MemoSlot {
    value: Box<dyn Any>,
    dependencies: Box<dyn Any>,
}

struct RefSlot {
    cell: Box<dyn Any>,
}

#[derive(Default)]
pub struct HookTable {
    states: Vec<StateSlot>,
    effects: Vec<EffectSlot>,
    memos: Vec<MemoSlot>,
    refs: Vec<RefSlot>,
    state_cursor: usize,
    effect_cursor: usize,
    memo_cursor: usize,
    ref_cursor: usize,
    call_order: Vec<HookKind>,
    call_cursor: usize,
    completed_renders: usize,
    pending_effects: Vec<PendingEffect>,
}

impl HookTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin_render(&mut self) {
        self.state_cursor = 0;
        self.effect_cursor = 0;
        self.memo_cursor = 0;
        self.ref_cursor = 0;
        self.call_cursor = 0;
    }

    /// Closes a successful render pass.
    pub fn finish_render(&mut self) -> Result<(), HookError> {
        let checked = cfg!(debug_assertions) && self.completed_renders > 0;
        if checked && self.call_cursor != self.call_order.len() {
            return Err(HookError::HookCountChanged {
                previous: self.call_order.len(),
                current: self.call_cursor,
            });
        }
        if self.completed_renders == 0 {
            // A failed first attempt may have recorded extra calls.
            self.call_order.truncate(self.call_cursor);
        }
        self.completed_renders += 1;
        Ok(())
    }

    /// Closes a failed render pass. Effects it queued are dropped and marked
    /// unscheduled so the next successful render runs them.
    pub fn abandon_render(&mut self) {
        for pending in self.pending_effects.drain(..) {
            let mut state = pending.state.borrow_mut();
            state.scheduled = false;
            state.dependencies = None;
        }
    }

    pub fn slot_count(&self, kind: HookKind) -> usize {
        match kind {
            HookKind::State => self.states.len(),
            HookKind::Effect => self.effects.len(),
            HookKind::Memo => self.memos.len(),
            HookKind::Ref => self.refs.len(),
        }
    }

    pub fn pending_effect_count(&self) -> usize {
        self.pending_effects.len()
    }

    pub(crate) fn take_pending_effects(&mut self) -> Vec<PendingEffect> {
        std::mem::take(&mut self.pending_effects)
    }

    /// Runs every outstanding effect cleanup and marks all effect slots
    /// disposed, so queued bodies are skipped. Returns how many cleanups ran.
    pub fn dispose(&mut self) -> usize {
        self.pending_effects.clear();
        let cleanups: Vec<Box<dyn FnOnce()>> = self
            .effects
            .iter()
            .filter_map(|slot| {
                let mut state = slot.state.borrow_mut();
                state.disposed = true;
                state.cleanup.take()
            })
            .collect();
        let count = cleanups.len();
        for cleanup in cleanups {
            cleanup();
        }
        count
    }

    fn track(&mut self, kind: HookKind) -> Result<(), HookError> {
        let index = self.call_cursor;
        self.call_cursor += 1;
        let checked = cfg!(debug_assertions) && self.completed_renders > 0;
        match self.call_order.get(index).copied() {
            Some(expected) if checked && expected != kind => Err(HookError::OrderMismatch {
                index,
                expected,
                found: kind,
            }),
            Some(_) => {
                if self.completed_renders == 0 {
                    self.call_order[index] = kind;
                }
                Ok(())
            }
            None if checked => Err(HookError::HookCountChanged {
                previous: self.call_order.len(),
                current: index + 1,
            }),
            None => {
                self.call_order.push(kind);
                Ok(())
            }
        }
    }

    fn state_slot<T: 'static>(
        &mut self,
        init: impl FnOnce() -> T,
    ) -> Result<Rc<RefCell<T>>, HookError> {
        self.track(HookKind::State)?;
        let index = self.state_cursor;
        self.state_cursor += 1;
        if let Some(slot) = self.states.get(index) {
            return slot
                .cell
                .downcast_ref::<Rc<RefCell<T>>>()
                .cloned()
                .ok_or(HookError::TypeMismatch {
                    kind: HookKind::State,
                    index,
                    expected: type_name::<T>(),
                });
        }
        let cell = Rc::new(RefCell::new(init()));
        self.states.push(StateSlot {
            cell: Box::new(cell.clone()),
        });
        Ok(cell)
    }

    fn effect_slot(&mut self) -> Result<Rc<RefCell<EffectState>>, HookError> {
        self.track(HookKind::Effect)?;
        let index = self.effect_cursor;
        self.effect_cursor += 1;
        if let Some(slot) = self.effects.get(index) {
            return Ok(slot.state.clone());
        }
        let state = Rc::new(RefCell::new(EffectState::default()));
        self.effects.push(EffectSlot {
            state: state.clone(),
        });
        Ok(state)
    }

    fn memo_slot<T, D>(&mut self, dependencies: D, factory: impl FnOnce() -> T) -> Result<T, HookError>
    where
        T: Clone + 'static,
        D: PartialEq + 'static,
    {
        self.track(HookKind::Memo)?;
        let index = self.memo_cursor;
        self.memo_cursor += 1;
        if let Some(slot) = self.memos.get_mut(index) {
            let unchanged = slot
                .dependencies
                .downcast_ref::<D>()
                .is_some_and(|previous| *previous == dependencies);
            if unchanged {
                return slot
                    .value
                    .downcast_ref::<T>()
                    .cloned()
                    .ok_or(HookError::TypeMismatch {
                        kind: HookKind::Memo,
                        index,
                        expected: type_name::<T>(),
                    });
            }
            let value = factory();
            slot.value = Box::new(value.clone());
            slot.dependencies = Box::new(dependencies);
            return Ok(value);
        }
        let value = factory();
        self.memos.push(MemoSlot {
            value: Box::new(value.clone()),
            dependencies: Box::new(dependencies),
        });
        Ok(value)
    }

    fn ref_slot<T: 'static>(&mut self, init: impl FnOnce() -> T) -> Result<MutableRef<T>, HookError> {
        self.track(HookKind::Ref)?;
        let index = self.ref_cursor;
        self.ref_cursor += 1;
        if let Some(slot) = self.refs.get(index) {
            return slot
                .cell
                .downcast_ref::<MutableRef<T>>()
                .cloned()
                .ok_or(HookError::TypeMismatch {
                    kind: HookKind::Ref,
                    index,
                    expected: type_name::<T>(),
                });
        }
        let cell = MutableRef::new(init());
        self.refs.push(RefSlot {
            cell: Box::new(cell.clone()),
        });
        Ok(cell)
    }
}

/// Stable mutable cell returned by `use_ref`. Writing to it never schedules
/// an update.
pub struct MutableRef<T> {
    cell: Rc<RefCell<T>>,
}

impl<T> Clone for MutableRef<T> {
    fn clone(&self) -> Self {
        Self {
            cell: Rc::clone(&self.cell),
        }
    }
}

impl<T> MutableRef<T> {
    pub fn new(value: T) -> Self {
        Self {
            cell: Rc::new(RefCell::new(value)),
        }
    }

    pub fn current(&self) -> Ref<'_, T> {
        self.cell.borrow()
    }

    pub fn current_mut(&self) -> RefMut<'_, T> {
        self.cell.borrow_mut()
    }

    pub fn set(&self, value: T) {
        *self.cell.borrow_mut() = value;
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.cell, &other.cell)
    }
}

impl<T: Clone> MutableRef<T> {
    pub fn get(&self) -> T {
        self.cell.borrow().clone()
    }
}

impl<T: fmt::Debug> fmt::Debug for MutableRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MutableRef")
            .field("current", &*self.cell.borrow())
            .finish()
    }
}

/// Writes a state slot and hands its component to the update scheduler when
/// the value actually changed.
pub struct StateSetter<T> {
    cell: Rc<RefCell<T>>,
    component: ComponentHandle,
}

impl<T> Clone for StateSetter<T> {
    fn clone(&self) -> Self {
        Self {
            cell: Rc::clone(&self.cell),
            component: self.component.clone(),
        }
    }
}

impl<T: PartialEq + 'static> StateSetter<T> {
    /// Replaces the value. Returns `false` (and schedules nothing) when the
    /// new value equals the current one.
    pub fn set(&self, value: T) -> bool {
        if *self.cell.borrow() == value {
            return false;
        }
        *self.cell.borrow_mut() = value;
        self.component.schedule_update();
        true
    }

    /// Derives the next value from the current one.
    pub fn update(&self, updater: impl FnOnce(&T) -> T) -> bool {
        let next = {
            let current = self.cell.borrow();
            updater(&current)
        };
        self.set(next)
    }
}

impl<T: Clone> StateSetter<T> {
    /// Latest written value, which may be newer than what the last render saw.
    pub fn get(&self) -> T {
        self.cell.borrow().clone()
    }
}

/// Compares an `Rc` by address rather than contents, for dependency lists
/// that should track reference identity.
pub struct Identity<T: ?Sized>(pub Rc<T>);

impl<T: ?Sized> Clone for Identity<T> {
    fn clone(&self) -> Self {
        Identity(Rc::clone(&self.0))
    }
}

impl<T: ?Sized> PartialEq for Identity<T> {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

struct RenderScope<'a> {
    hooks: &'a mut HookTable,
    component: ComponentHandle,
}

/// The explicit "current component" of a render pass.
pub struct RenderContext<'a> {
    scope: Option<RenderScope<'a>>,
}

impl<'a> RenderContext<'a> {
    pub(crate) fn new(hooks: &'a mut HookTable, component: ComponentHandle) -> Self {
        Self {
            scope: Some(RenderScope { hooks, component }),
        }
    }

    /// A context with no component behind it.
    pub fn detached() -> RenderContext<'static> {
        RenderContext { scope: None }
    }

    pub fn is_detached(&self) -> bool {
        self.scope.is_none()
    }

    fn scope(&mut self, hook: &'static str) -> Result<&mut RenderScope<'a>, HookError> {
        self.scope
            .as_mut()
            .ok_or(HookError::InvalidHookCall { hook })
    }

    pub fn use_state<T>(&mut self, init: impl FnOnce() -> T) -> Result<(T, StateSetter<T>), HookError>
    where
        T: Clone + PartialEq + 'static,
    {
        let scope = self.scope("use_state")?;
        let cell = scope.hooks.state_slot(init)?;
        let value = cell.borrow().clone();
        let setter = StateSetter {
            cell,
            component: scope.component.clone(),
        };
        Ok((value, setter))
    }

    /// Schedules `effect` to run after this render is patched into the host.
    ///
    /// `None` dependencies rerun the effect after every render; `Some(())`
    /// runs it once; any other value reruns it whenever it compares unequal to
    /// the previous render's value. The previous cleanup runs synchronously
    /// here, before the new body is queued.
    pub fn use_effect<D, F>(&mut self, dependencies: Option<D>, effect: F) -> Result<(), HookError>
    where
        D: PartialEq + 'static,
        F: FnOnce() -> EffectCleanup + 'static,
    {
        let scope = self.scope("use_effect")?;
        let state = scope.hooks.effect_slot()?;
        if !state.borrow().should_run(dependencies.as_ref()) {
            return Ok(());
        }
        let previous = {
            let mut state = state.borrow_mut();
            state.scheduled = true;
            state.dependencies = dependencies.map(|value| Box::new(value) as Box<dyn Any>);
            state.cleanup.take()
        };
        if let Some(cleanup) = previous {
            cleanup();
        }
        scope.hooks.pending_effects.push(PendingEffect {
            state,
            body: Box::new(effect),
        });
        Ok(())
    }

    pub fn use_memo<T, D>(&mut self, dependencies: D, factory: impl FnOnce() -> T) -> Result<T, HookError>
    where
        T: Clone + 'static,
        D: PartialEq + 'static,
    {
        self.scope("use_memo")?
            .hooks
            .memo_slot(dependencies, factory)
    }

    pub fn use_callback<F, D>(&mut self, dependencies: D, callback: F) -> Result<F, HookError>
    where
        F: Clone + 'static,
        D: PartialEq + 'static,
    {
        self.scope("use_callback")?;
        self.use_memo(dependencies, move || callback)
    }

    pub fn use_ref<T: 'static>(&mut self, init: impl FnOnce() -> T) -> Result<MutableRef<T>, HookError> {
        self.scope("use_ref")?.hooks.ref_slot(init)
    }

    /// Snapshot of the component's merged state record.
    pub fn component_state(&mut self) -> Result<Props, HookError> {
        Ok(self.scope("component_state")?.component.state())
    }

    /// Handle for merging into the component's state record from callbacks.
    pub fn state_handle(&mut self) -> Result<ComponentHandle, HookError> {
        Ok(self.scope("state_handle")?.component.clone())
    }
}

#[cfg(test)]
#[path = "tests/hooks_tests.rs"]
mod tests;
