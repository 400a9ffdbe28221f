//! Materializes virtual nodes into the host tree and applies patch lists.

use std::cell::RefCell;

use thiserror::Error;

use crate::collections::map::HashMap;
use crate::hooks::RenderContext;
use crate::host::{HostError, HostNodeId, SharedHost};
use crate::reconciler::{Patch, UpdatePayload};
use crate::value::{EventHandler, PropValue, RefTarget};
use crate::vnode::{error_view, NodeKind, VNode, RESERVED_PROPS};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PatchSummary {
    pub applied: usize,
    pub skipped: usize,
}

#[derive(Debug, Error)]
enum PatchFailure {
    #[error("target was never materialized")]
    Unmaterialized,
    #[error(transparent)]
    Host(#[from] HostError),
}

/// Owns what the renderer bound onto host nodes: listeners per event and the
/// ref attached to each element. The host is borrowed per primitive call and
/// never across user callbacks.
pub struct Renderer {
    host: SharedHost,
    listeners: RefCell<HashMap<HostNodeId, HashMap<String, EventHandler>>>,
    refs: RefCell<HashMap<HostNodeId, RefTarget>>,
}

impl Renderer {
    pub fn new(host: SharedHost) -> Self {
        Self {
            host,
            listeners: RefCell::new(HashMap::default()),
            refs: RefCell::new(HashMap::default()),
        }
    }

    pub fn host(&self) -> &SharedHost {
        &self.host
    }

    /// Builds the host subtree for `node` and records the root on it.
    ///
    /// Function components are called with a detached render context every
    /// time they are materialized; a failing one is replaced by the error
    /// view.
    pub fn create_element(&self, node: &VNode) -> Result<HostNodeId, HostError> {
        let id = match node.kind() {
            NodeKind::Text(content) => self.host.borrow_mut().create_text(content),
            NodeKind::Element(tag) => {
                let id = self.host.borrow_mut().create_element(tag);
                for (name, value) in node.props() {
                    if RESERVED_PROPS.contains(&name.as_str()) {
                        continue;
                    }
                    self.apply_prop(id, name, Some(value))?;
                }
                for child in node.children() {
                    let child_id = self.create_element(child)?;
                    self.host.borrow_mut().append_child(id, child_id)?;
                }
                id
            }
            NodeKind::Component(render) => {
                let output = match render(&mut RenderContext::detached(), node.props()) {
                    Ok(output) => output,
                    Err(error) => {
                        log::error!("function component failed to render: {error}");
                        error_view(&error)
                    }
                };
                self.create_element(&output)?
            }
        };
        node.set_host_node(Some(id));
        Ok(id)
    }

    /// Applies `patches` in order. Patches that do not fit the current host
    /// tree are skipped with a warning.
    pub fn patch(&self, container: HostNodeId, patches: &[Patch]) -> PatchSummary {
        let mut summary = PatchSummary::default();
        for patch in patches {
            match self.apply_patch(container, patch) {
                Ok(()) => summary.applied += 1,
                Err(failure) => {
                    log::warn!("skipping {} patch: {failure}", patch.name());
                    summary.skipped += 1;
                }
            }
        }
        summary
    }

    fn apply_patch(&self, container: HostNodeId, patch: &Patch) -> Result<(), PatchFailure> {
        match patch {
            Patch::Create { node } => {
                if !self.host.borrow().contains(container) {
                    return Err(HostError::Missing { id: container }.into());
                }
                let id = self.create_element(node)?;
                self.host.borrow_mut().append_child(container, id)?;
            }
            Patch::Remove { element } => {
                let element = element.ok_or(PatchFailure::Unmaterialized)?;
                let parent = self.parent_of(element)?;
                self.host.borrow_mut().remove_child(parent, element)?;
                self.release(element)?;
            }
            Patch::Replace { element, node } => {
                let element = element.ok_or(PatchFailure::Unmaterialized)?;
                let parent = self.parent_of(element)?;
                let replacement = self.create_element(node)?;
                self.host
                    .borrow_mut()
                    .replace_child(parent, replacement, element)?;
                self.release(element)?;
            }
            Patch::Update {
                element,
                payload: UpdatePayload::Text(content),
            } => {
                let element = element.ok_or(PatchFailure::Unmaterialized)?;
                self.host.borrow_mut().set_text(element, content)?;
            }
            Patch::Update {
                element,
                payload: UpdatePayload::Props(changes),
            } => {
                let element = element.ok_or(PatchFailure::Unmaterialized)?;
                for (name, value) in changes {
                    self.apply_prop(element, name, value.as_ref())?;
                }
            }
            Patch::CreateChild {
                parent,
                index,
                node,
            } => {
                let parent = parent.ok_or(PatchFailure::Unmaterialized)?;
                if !self.host.borrow().contains(parent) {
                    return Err(HostError::Missing { id: parent }.into());
                }
                let child = self.create_element(node)?;
                self.host.borrow_mut().insert_child(parent, *index, child)?;
            }
            Patch::RemoveChild { parent, element } => {
                let parent = parent.ok_or(PatchFailure::Unmaterialized)?;
                let element = element.ok_or(PatchFailure::Unmaterialized)?;
                self.host.borrow_mut().remove_child(parent, element)?;
                self.release(element)?;
            }
        }
        Ok(())
    }

    fn parent_of(&self, element: HostNodeId) -> Result<HostNodeId, HostError> {
        let host = self.host.borrow();
        if !host.contains(element) {
            return Err(HostError::Missing { id: element });
        }
        host.parent(element)
            .ok_or(HostError::Detached { id: element })
    }

    /// Applies one prop to an element. `None` and `Null` remove it.
    pub fn apply_prop(
        &self,
        element: HostNodeId,
        name: &str,
        value: Option<&PropValue>,
    ) -> Result<(), HostError> {
        let value = value.filter(|value| !value.is_null());
        if name == "ref" {
            return self.bind_ref(element, value);
        }
        if let Some(event) = event_name(name) {
            return self.bind_listener(element, &event, value);
        }
        match (name, value) {
            ("style", Some(PropValue::Style(style))) => {
                let mut host = self.host.borrow_mut();
                for (property, value) in style.iter() {
                    host.set_style(element, property, value)?;
                }
                Ok(())
            }
            ("style", None) => self.host.borrow_mut().clear_style(element),
            ("className", value) => self.set_attribute(element, "class", value),
            ("value", value) if self.host.borrow().is_form_control(element) => {
                self.set_form_value(element, value)
            }
            (name, value) => self.set_attribute(element, name, value),
        }
    }

    fn set_attribute(
        &self,
        element: HostNodeId,
        name: &str,
        value: Option<&PropValue>,
    ) -> Result<(), HostError> {
        match value.and_then(PropValue::to_attribute) {
            Some(text) => self.host.borrow_mut().set_attribute(element, name, &text),
            None => self.host.borrow_mut().remove_attribute(element, name),
        }
    }

    fn set_form_value(&self, element: HostNodeId, value: Option<&PropValue>) -> Result<(), HostError> {
        let mut host = self.host.borrow_mut();
        match value.and_then(PropValue::to_attribute) {
            Some(text) => {
                // Leave in-progress user input alone.
                if host.value(element).as_deref() == Some(text.as_str()) {
                    return Ok(());
                }
                host.set_value(element, &text)
            }
            None => {
                host.set_value(element, "")?;
                host.remove_attribute(element, "value")
            }
        }
    }

    fn bind_listener(
        &self,
        element: HostNodeId,
        event: &str,
        value: Option<&PropValue>,
    ) -> Result<(), HostError> {
        let next = match value {
            Some(PropValue::Handler(handler)) => Some(handler.clone()),
            _ => None,
        };
        let previous = self
            .listeners
            .borrow_mut()
            .get_mut(&element)
            .and_then(|bound| bound.remove(event));
        if let Some(previous) = previous {
            self.host
                .borrow_mut()
                .remove_event_listener(element, event, &previous)?;
        }
        if let Some(handler) = next {
            self.host
                .borrow_mut()
                .add_event_listener(element, event, handler.clone())?;
            self.listeners
                .borrow_mut()
                .entry(element)
                .or_default()
                .insert(event.to_string(), handler);
        }
        Ok(())
    }

    fn bind_ref(&self, element: HostNodeId, value: Option<&PropValue>) -> Result<(), HostError> {
        let next = match value {
            Some(PropValue::Ref(target)) => Some(target.clone()),
            _ => None,
        };
        let previous = self.refs.borrow_mut().remove(&element);
        if let Some(previous) = previous {
            if next.as_ref().is_some_and(|next| next.ptr_eq(&previous)) {
                self.refs.borrow_mut().insert(element, previous);
                return Ok(());
            }
            previous.assign(None);
        }
        if let Some(next) = next {
            next.assign(Some(element));
            self.refs.borrow_mut().insert(element, next);
        }
        Ok(())
    }

    /// Appends an existing host node to `container`.
    pub fn append(&self, container: HostNodeId, element: HostNodeId) -> Result<(), HostError> {
        self.host.borrow_mut().append_child(container, element)
    }

    /// Appends an invisible node reserving the next position in `container`.
    pub fn insert_placeholder(&self, container: HostNodeId) -> Result<HostNodeId, HostError> {
        let mut host = self.host.borrow_mut();
        let placeholder = host.create_placeholder();
        host.append_child(container, placeholder)?;
        Ok(placeholder)
    }

    /// Puts `replacement` where `current` sits. `current` is detached, not freed.
    pub fn swap(&self, current: HostNodeId, replacement: HostNodeId) -> Result<(), HostError> {
        let parent = self.parent_of(current)?;
        self.host
            .borrow_mut()
            .replace_child(parent, replacement, current)
    }

    /// Detaches `element` from its parent, if it has one.
    pub fn detach(&self, element: HostNodeId) -> Result<(), HostError> {
        let parent = self.host.borrow().parent(element);
        match parent {
            Some(parent) => self.host.borrow_mut().remove_child(parent, element),
            None => Ok(()),
        }
    }

    /// Detaches and frees `element` and its subtree.
    pub fn remove(&self, element: HostNodeId) -> Result<(), HostError> {
        self.detach(element)?;
        self.release(element)
    }

    /// Frees a subtree, clearing every ref and listener bound inside it.
    pub fn release(&self, element: HostNodeId) -> Result<(), HostError> {
        let mut subtree = Vec::new();
        self.collect_subtree(element, &mut subtree);
        let cleared: Vec<RefTarget> = {
            let mut listeners = self.listeners.borrow_mut();
            let mut refs = self.refs.borrow_mut();
            subtree
                .iter()
                .filter_map(|id| {
                    listeners.remove(id);
                    refs.remove(id)
                })
                .collect()
        };
        for target in cleared {
            target.assign(None);
        }
        self.host.borrow_mut().release(element)
    }

    fn collect_subtree(&self, element: HostNodeId, output: &mut Vec<HostNodeId>) {
        output.push(element);
        let children = self.host.borrow().children(element).unwrap_or_default();
        for child in children {
            self.collect_subtree(child, output);
        }
    }

    /// Number of elements with at least one listener bound by the renderer.
    pub fn bound_listener_count(&self) -> usize {
        self.listeners
            .borrow()
            .values()
            .filter(|bound| !bound.is_empty())
            .count()
    }

    pub fn bound_ref_count(&self) -> usize {
        self.refs.borrow().len()
    }
}

/// `onClick` -> `click`, `onMouseDown` -> `mousedown`. Anything not of the
/// form `on` + uppercase letter is not an event prop.
fn event_name(prop: &str) -> Option<String> {
    let rest = prop.strip_prefix("on")?;
    if !rest.chars().next()?.is_ascii_uppercase() {
        return None;
    }
    Some(rest.to_ascii_lowercase())
}

#[cfg(test)]
#[path = "tests/renderer_tests.rs"]
mod tests;
