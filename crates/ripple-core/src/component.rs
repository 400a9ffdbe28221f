//! Component instances and their mount / update / unmount lifecycle.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{RenderError, RuntimeError};
use crate::hooks::{HookTable, RenderContext};
use crate::host::HostNodeId;
use crate::runtime::{Runtime, RuntimeHandle};
use crate::value::Props;
use crate::vnode::{error_view, Renderable, VNode};

/// A stateful component. `render` is called under a [`RenderContext`] bound
/// to the component's own hook table.
pub trait Component: 'static {
    fn render(&self, ctx: &mut RenderContext<'_>) -> Result<Renderable, RenderError>;

    /// Called once after the first render has been attached to the host.
    fn mounted(&self, _handle: &ComponentHandle) {}

    /// Called after every update cycle has been patched into the host.
    fn updated(&self, _handle: &ComponentHandle) {}

    /// Called before effect cleanups run and the host element is detached.
    fn will_unmount(&self, _handle: &ComponentHandle) {}
}

impl<F> Component for F
where
    F: Fn(&mut RenderContext<'_>) -> Result<Renderable, RenderError> + 'static,
{
    fn render(&self, ctx: &mut RenderContext<'_>) -> Result<Renderable, RenderError> {
        self(ctx)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentId(u64);

impl ComponentId {
    fn next() -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);
        ComponentId(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LifecycleState {
    Unmounted,
    Mounting,
    Mounted,
    Updating,
    Disposed,
}

struct ComponentInner {
    id: ComponentId,
    runtime: RuntimeHandle,
    component: Box<dyn Component>,
    hooks: RefCell<HookTable>,
    state: RefCell<Props>,
    lifecycle: Cell<LifecycleState>,
    container: Cell<Option<HostNodeId>>,
    root: Cell<Option<HostNodeId>>,
    tree: RefCell<Option<VNode>>,
    native: Cell<bool>,
}

/// Owning handle to a component. Dropping the last instance handle drops the
/// component's hook table, which runs any remaining effect cleanups.
#[derive(Clone)]
pub struct ComponentInstance {
    inner: Rc<ComponentInner>,
}

/// Non-owning handle used by state setters and the update scheduler.
#[derive(Clone)]
pub struct ComponentHandle {
    id: ComponentId,
    inner: Weak<ComponentInner>,
}

impl ComponentInstance {
    pub(crate) fn new(runtime: RuntimeHandle, component: Box<dyn Component>, state: Props) -> Self {
        let id = ComponentId::next();
        log::trace!("created component {id}");
        Self {
            inner: Rc::new(ComponentInner {
                id,
                runtime,
                component,
                hooks: RefCell::new(HookTable::new()),
                state: RefCell::new(state),
                lifecycle: Cell::new(LifecycleState::Unmounted),
                container: Cell::new(None),
                root: Cell::new(None),
                tree: RefCell::new(None),
                native: Cell::new(false),
            }),
        }
    }

    pub fn id(&self) -> ComponentId {
        self.inner.id
    }

    pub fn handle(&self) -> ComponentHandle {
        ComponentHandle {
            id: self.inner.id,
            inner: Rc::downgrade(&self.inner),
        }
    }

    pub fn lifecycle(&self) -> LifecycleState {
        self.inner.lifecycle.get()
    }

    pub fn is_mounted(&self) -> bool {
        self.lifecycle() == LifecycleState::Mounted
    }

    /// Host element currently standing for this component.
    pub fn root_element(&self) -> Option<HostNodeId> {
        self.inner.root.get()
    }

    /// The virtual tree produced by the last render, if it was virtual.
    pub fn current_tree(&self) -> Option<VNode> {
        self.inner.tree.borrow().clone()
    }

    pub fn state(&self) -> Props {
        self.inner.state.borrow().clone()
    }

    /// Shallow-merges `partial` into the state record. See
    /// [`ComponentHandle::set_state`].
    pub fn set_state(&self, partial: Props) -> bool {
        self.handle().set_state(partial)
    }

    fn runtime(&self) -> Result<Runtime, RuntimeError> {
        self.inner.runtime.upgrade().ok_or(RuntimeError::RuntimeDropped)
    }

    fn set_lifecycle(&self, state: LifecycleState) {
        log::trace!(
            "component {} {:?} -> {:?}",
            self.inner.id,
            self.inner.lifecycle.get(),
            state
        );
        self.inner.lifecycle.set(state);
    }

    fn render_pass(&self) -> Result<Renderable, RenderError> {
        let handle = self.handle();
        let mut hooks = self.inner.hooks.borrow_mut();
        hooks.begin_render();
        let result = {
            let mut ctx = RenderContext::new(&mut hooks, handle);
            self.inner.component.render(&mut ctx)
        };
        let result = match result {
            Ok(renderable) => hooks
                .finish_render()
                .map(|()| renderable)
                .map_err(RenderError::from),
            Err(error) => Err(error),
        };
        if result.is_err() {
            hooks.abandon_render();
        }
        result
    }

    /// Renders, falling back to the inline error view on failure.
    fn render_or_error_view(&self) -> Renderable {
        match self.render_pass() {
            Ok(renderable) => renderable,
            Err(error) => {
                log::error!("render of component {} failed: {error}", self.inner.id);
                Renderable::Virtual(error_view(&error))
            }
        }
    }

    /// First render: materializes the component into `container`.
    pub fn mount(&self, container: HostNodeId) -> Result<(), RuntimeError> {
        let state = self.lifecycle();
        if state != LifecycleState::Unmounted {
            return Err(RuntimeError::InvalidLifecycle {
                id: self.inner.id,
                operation: "mount",
                state,
            });
        }
        let runtime = self.runtime()?;
        self.set_lifecycle(LifecycleState::Mounting);
        self.inner.container.set(Some(container));

        let renderable = self.render_or_error_view();
        if let Err(error) = self.attach(&runtime, container, renderable) {
            self.inner.hooks.borrow_mut().abandon_render();
            self.inner.container.set(None);
            self.set_lifecycle(LifecycleState::Unmounted);
            return Err(error);
        }

        self.set_lifecycle(LifecycleState::Mounted);
        self.inner.component.mounted(&self.handle());
        self.flush_effects(&runtime);
        Ok(())
    }

    fn attach(
        &self,
        runtime: &Runtime,
        container: HostNodeId,
        renderable: Renderable,
    ) -> Result<(), RuntimeError> {
        let renderer = runtime.renderer();
        match renderable {
            Renderable::Native(element) => {
                renderer.append(container, element)?;
                self.inner.native.set(true);
                self.inner.root.set(Some(element));
                *self.inner.tree.borrow_mut() = None;
            }
            Renderable::Virtual(tree) => {
                let placeholder = renderer.insert_placeholder(container)?;
                let patches = runtime.reconciler().diff(None, Some(&tree));
                renderer.patch(container, &patches);
                if let Some(element) = tree.host_node() {
                    renderer.swap(placeholder, element)?;
                }
                renderer.remove(placeholder)?;
                self.inner.native.set(false);
                self.inner.root.set(tree.host_node());
                *self.inner.tree.borrow_mut() = Some(tree);
            }
        }
        Ok(())
    }

    /// Re-renders and patches the host. A no-op unless the component is
    /// mounted and idle.
    pub fn update(&self) -> Result<(), RuntimeError> {
        let state = self.lifecycle();
        if state != LifecycleState::Mounted {
            log::debug!(
                "skipping update of component {} while {state:?}",
                self.inner.id
            );
            return Ok(());
        }
        let runtime = self.runtime()?;
        self.set_lifecycle(LifecycleState::Updating);

        let renderable = self.render_or_error_view();
        let result = self.reconcile(&runtime, renderable);
        self.set_lifecycle(LifecycleState::Mounted);
        if let Err(error) = result {
            self.inner.hooks.borrow_mut().abandon_render();
            return Err(error);
        }

        self.inner.component.updated(&self.handle());
        self.flush_effects(&runtime);
        Ok(())
    }

    fn reconcile(&self, runtime: &Runtime, renderable: Renderable) -> Result<(), RuntimeError> {
        let Some(container) = self.inner.container.get() else {
            return Ok(());
        };
        let renderer = runtime.renderer();
        let previous_root = self.inner.root.get();
        let previous_native = self.inner.native.get();
        let previous_tree = self.inner.tree.borrow_mut().take();

        let (next_root, diffed) = match renderable {
            Renderable::Native(element) => {
                self.inner.native.set(true);
                (Some(element), false)
            }
            Renderable::Virtual(tree) => {
                let diffed = match &previous_tree {
                    Some(previous) => {
                        let patches = runtime.reconciler().diff(Some(previous), Some(&tree));
                        let summary = renderer.patch(container, &patches);
                        log::trace!(
                            "component {} patched: {} applied, {} skipped",
                            self.inner.id,
                            summary.applied,
                            summary.skipped
                        );
                        true
                    }
                    None => {
                        renderer.create_element(&tree)?;
                        false
                    }
                };
                self.inner.native.set(false);
                let root = tree.host_node();
                *self.inner.tree.borrow_mut() = Some(tree);
                (root, diffed)
            }
        };

        // A diff already moved the host from the old root to the new one;
        // switching between native and virtual output needs an explicit swap.
        if !diffed {
            if let (Some(previous), Some(next)) = (previous_root, next_root) {
                if previous != next {
                    renderer.swap(previous, next)?;
                    if !previous_native {
                        renderer.release(previous)?;
                    }
                }
            }
        }
        self.inner.root.set(next_root.or(previous_root));
        Ok(())
    }

    /// Tears the component down: `will_unmount`, effect cleanups, then the
    /// host element is detached and the stored tree dropped.
    pub fn unmount(&self) -> Result<(), RuntimeError> {
        let state = self.lifecycle();
        match state {
            LifecycleState::Mounted => {}
            LifecycleState::Unmounted | LifecycleState::Disposed => return Ok(()),
            LifecycleState::Mounting | LifecycleState::Updating => {
                return Err(RuntimeError::InvalidLifecycle {
                    id: self.inner.id,
                    operation: "unmount",
                    state,
                })
            }
        }
        self.inner.component.will_unmount(&self.handle());
        self.set_lifecycle(LifecycleState::Disposed);

        let cleanups = self.inner.hooks.borrow_mut().dispose();
        log::debug!(
            "unmounting component {}: {cleanups} effect cleanup(s) ran",
            self.inner.id
        );

        let root = self.inner.root.take();
        self.inner.tree.borrow_mut().take();
        self.inner.container.set(None);
        if let (Some(root), Some(runtime)) = (root, self.inner.runtime.upgrade()) {
            if self.inner.native.get() {
                runtime.renderer().detach(root)?;
            } else {
                runtime.renderer().remove(root)?;
            }
        }
        Ok(())
    }

    fn flush_effects(&self, runtime: &Runtime) {
        let effects = self.inner.hooks.borrow_mut().take_pending_effects();
        if effects.is_empty() {
            return;
        }
        log::trace!(
            "component {} queued {} effect(s)",
            self.inner.id,
            effects.len()
        );
        runtime.queue_microtask(move || {
            for effect in effects {
                effect.run();
            }
        });
    }
}

impl fmt::Debug for ComponentInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentInstance")
            .field("id", &self.inner.id)
            .field("lifecycle", &self.inner.lifecycle.get())
            .field("root", &self.inner.root.get())
            .finish()
    }
}

impl ComponentHandle {
    /// A handle to no component, for exercising hook tables directly.
    #[cfg(test)]
    pub(crate) fn dangling() -> Self {
        ComponentHandle {
            id: ComponentId::next(),
            inner: Weak::new(),
        }
    }

    pub fn id(&self) -> ComponentId {
        self.id
    }

    pub fn upgrade(&self) -> Option<ComponentInstance> {
        self.inner
            .upgrade()
            .map(|inner| ComponentInstance { inner })
    }

    pub fn is_alive(&self) -> bool {
        self.inner.strong_count() > 0
    }

    /// Snapshot of the state record; empty once the component is gone.
    pub fn state(&self) -> Props {
        self.inner
            .upgrade()
            .map(|inner| inner.state.borrow().clone())
            .unwrap_or_default()
    }

    /// Shallow-merges `partial` into the state record and schedules an update
    /// if any top-level key changed by identity. Returns whether anything
    /// changed.
    pub fn set_state(&self, partial: Props) -> bool {
        let Some(inner) = self.inner.upgrade() else {
            return false;
        };
        let changed = {
            let mut state = inner.state.borrow_mut();
            let mut changed = false;
            for (key, value) in partial {
                if state.get(&key).is_some_and(|previous| previous.same(&value)) {
                    continue;
                }
                state.insert(key, value);
                changed = true;
            }
            changed
        };
        if changed {
            self.schedule_update();
        }
        changed
    }

    /// Hands the component to its runtime's update scheduler.
    pub fn schedule_update(&self) {
        let Some(inner) = self.inner.upgrade() else {
            return;
        };
        match inner.runtime.upgrade() {
            Some(runtime) => runtime.schedule_update(self.clone()),
            None => log::debug!("runtime gone; dropping update for component {}", self.id),
        }
    }
}

impl fmt::Debug for ComponentHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentHandle")
            .field("id", &self.id)
            .field("alive", &self.is_alive())
            .finish()
    }
}

#[cfg(test)]
#[path = "tests/component_tests.rs"]
mod tests;
