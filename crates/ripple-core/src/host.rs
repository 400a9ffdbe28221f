//! Host display-tree contract and the in-memory host used headlessly.

use std::cell::RefCell;
use std::rc::Rc;

use indexmap::IndexMap;
use thiserror::Error;

use crate::value::{Event, EventHandler};

pub type HostNodeId = usize;

/// Shared handle to the host tree the renderer materializes into.
pub type SharedHost = Rc<RefCell<dyn HostTree>>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HostError {
    #[error("host node {id} missing")]
    Missing { id: HostNodeId },
    #[error("host node {id} is not an element")]
    NotAnElement { id: HostNodeId },
    #[error("host node {id} is not a text node")]
    NotText { id: HostNodeId },
    #[error("host node {child} is not a child of {parent}")]
    NotAChild {
        parent: HostNodeId,
        child: HostNodeId,
    },
    #[error("host node {id} has no parent")]
    Detached { id: HostNodeId },
}

/// Primitive operations the renderer needs from a display tree.
///
/// Inserting a node that already has a parent moves it, as in a DOM.
pub trait HostTree {
    fn create_element(&mut self, tag: &str) -> HostNodeId;
    fn create_text(&mut self, content: &str) -> HostNodeId;
    /// Creates an invisible node used to reserve a position in a parent.
    fn create_placeholder(&mut self) -> HostNodeId;

    fn contains(&self, id: HostNodeId) -> bool;
    fn is_text(&self, id: HostNodeId) -> bool;
    fn is_form_control(&self, id: HostNodeId) -> bool;
    fn parent(&self, id: HostNodeId) -> Option<HostNodeId>;
    fn children(&self, id: HostNodeId) -> Result<Vec<HostNodeId>, HostError>;

    fn append_child(&mut self, parent: HostNodeId, child: HostNodeId) -> Result<(), HostError>;
    /// Inserts `child` at `index`, appending when `index` is past the end.
    fn insert_child(
        &mut self,
        parent: HostNodeId,
        index: usize,
        child: HostNodeId,
    ) -> Result<(), HostError>;
    fn replace_child(
        &mut self,
        parent: HostNodeId,
        new_child: HostNodeId,
        old_child: HostNodeId,
    ) -> Result<(), HostError>;
    fn remove_child(&mut self, parent: HostNodeId, child: HostNodeId) -> Result<(), HostError>;

    fn set_text(&mut self, id: HostNodeId, content: &str) -> Result<(), HostError>;
    fn attribute(&self, id: HostNodeId, name: &str) -> Option<String>;
    fn set_attribute(&mut self, id: HostNodeId, name: &str, value: &str) -> Result<(), HostError>;
    fn remove_attribute(&mut self, id: HostNodeId, name: &str) -> Result<(), HostError>;

    fn add_event_listener(
        &mut self,
        id: HostNodeId,
        event: &str,
        handler: EventHandler,
    ) -> Result<(), HostError>;
    fn remove_event_listener(
        &mut self,
        id: HostNodeId,
        event: &str,
        handler: &EventHandler,
    ) -> Result<(), HostError>;

    fn set_style(&mut self, id: HostNodeId, property: &str, value: &str) -> Result<(), HostError>;
    fn clear_style(&mut self, id: HostNodeId) -> Result<(), HostError>;

    /// Live value of a form control.
    fn value(&self, id: HostNodeId) -> Option<String>;
    fn set_value(&mut self, id: HostNodeId, value: &str) -> Result<(), HostError>;

    /// Frees a node and its descendants. The node must already be detached.
    fn release(&mut self, id: HostNodeId) -> Result<(), HostError>;
}

const FORM_CONTROLS: &[&str] = &["input", "textarea", "select"];

#[derive(Default)]
struct ElementData {
    tag: String,
    attributes: IndexMap<String, String>,
    style: IndexMap<String, String>,
    listeners: Vec<(String, EventHandler)>,
    value: Option<String>,
    children: Vec<HostNodeId>,
}

enum HostNodeData {
    Element(ElementData),
    Text(String),
    Placeholder,
}

struct HostNode {
    parent: Option<HostNodeId>,
    data: HostNodeData,
}

/// Arena-backed host tree for tests and headless rendering.
#[derive(Default)]
pub struct MemoryHost {
    nodes: Vec<Option<HostNode>>,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self { nodes: Vec::new() }
    }

    /// Wraps a fresh host into the shared form the runtime expects while
    /// keeping a concrete handle for inspection.
    pub fn shared() -> (Rc<RefCell<MemoryHost>>, SharedHost) {
        let host = Rc::new(RefCell::new(MemoryHost::new()));
        let shared: SharedHost = host.clone();
        (host, shared)
    }

    /// Number of live (not released) nodes.
    pub fn len(&self) -> usize {
        self.nodes.iter().filter(|node| node.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn node(&self, id: HostNodeId) -> Result<&HostNode, HostError> {
        self.nodes
            .get(id)
            .and_then(Option::as_ref)
            .ok_or(HostError::Missing { id })
    }

    fn node_mut(&mut self, id: HostNodeId) -> Result<&mut HostNode, HostError> {
        self.nodes
            .get_mut(id)
            .and_then(Option::as_mut)
            .ok_or(HostError::Missing { id })
    }

    fn element(&self, id: HostNodeId) -> Result<&ElementData, HostError> {
        match &self.node(id)?.data {
            HostNodeData::Element(element) => Ok(element),
            _ => Err(HostError::NotAnElement { id }),
        }
    }

    fn element_mut(&mut self, id: HostNodeId) -> Result<&mut ElementData, HostError> {
        match &mut self.node_mut(id)?.data {
            HostNodeData::Element(element) => Ok(element),
            _ => Err(HostError::NotAnElement { id }),
        }
    }

    fn push(&mut self, data: HostNodeData) -> HostNodeId {
        let id = self.nodes.len();
        self.nodes.push(Some(HostNode { parent: None, data }));
        id
    }

    fn detach(&mut self, child: HostNodeId) -> Result<(), HostError> {
        let Some(parent) = self.node(child)?.parent else {
            return Ok(());
        };
        if let Ok(element) = self.element_mut(parent) {
            element.children.retain(|&id| id != child);
        }
        self.node_mut(child)?.parent = None;
        Ok(())
    }

    fn check_insertable(&self, parent: HostNodeId, child: HostNodeId) -> Result<(), HostError> {
        self.element(parent)?;
        self.node(child)?;
        Ok(())
    }

    pub fn tag(&self, id: HostNodeId) -> Option<&str> {
        self.element(id).ok().map(|element| element.tag.as_str())
    }

    /// Concatenated text of a node and all of its descendants.
    pub fn text_content(&self, id: HostNodeId) -> String {
        let mut output = String::new();
        self.collect_text(id, &mut output);
        output
    }

    fn collect_text(&self, id: HostNodeId, output: &mut String) {
        match self.node(id).map(|node| &node.data) {
            Ok(HostNodeData::Text(content)) => output.push_str(content),
            Ok(HostNodeData::Element(element)) => {
                for &child in &element.children {
                    self.collect_text(child, output);
                }
            }
            _ => {}
        }
    }

    pub fn style(&self, id: HostNodeId, property: &str) -> Option<String> {
        self.element(id).ok()?.style.get(property).cloned()
    }

    pub fn listener_count(&self, id: HostNodeId, event: &str) -> usize {
        self.element(id)
            .map(|element| {
                element
                    .listeners
                    .iter()
                    .filter(|(name, _)| name == event)
                    .count()
            })
            .unwrap_or(0)
    }

    /// Invokes every handler bound for `event` on `id`, returning how many ran.
    ///
    /// Handlers are cloned out before being called, so they may freely read the
    /// host through another shared borrow.
    pub fn dispatch_event(&self, id: HostNodeId, event: &str) -> usize {
        self.dispatch(Event::new(event, id))
    }

    pub fn dispatch(&self, event: Event) -> usize {
        let handlers: Vec<EventHandler> = match self.element(event.target) {
            Ok(element) => element
                .listeners
                .iter()
                .filter(|(name, _)| *name == event.name)
                .map(|(_, handler)| handler.clone())
                .collect(),
            Err(_) => return 0,
        };
        for handler in &handlers {
            handler.call(&event);
        }
        handlers.len()
    }

    /// Depth-first search for the first element carrying `name=value`.
    pub fn find_by_attribute(&self, root: HostNodeId, name: &str, value: &str) -> Option<HostNodeId> {
        let element = self.element(root).ok()?;
        if element.attributes.get(name).map(String::as_str) == Some(value) {
            return Some(root);
        }
        element
            .children
            .iter()
            .find_map(|&child| self.find_by_attribute(child, name, value))
    }

    pub fn dump_tree(&self, root: Option<HostNodeId>) -> String {
        let mut output = String::new();
        if let Some(root_id) = root {
            self.dump_node(&mut output, root_id, 0);
        } else {
            output.push_str("(no root)\n");
        }
        output
    }

    fn dump_node(&self, output: &mut String, id: HostNodeId, depth: usize) {
        let indent = "  ".repeat(depth);
        match self.node(id).map(|node| &node.data) {
            Ok(HostNodeData::Element(element)) => {
                output.push_str(&format!("{indent}[{id}] <{}>", element.tag));
                for (name, value) in &element.attributes {
                    output.push_str(&format!(" {name}={value:?}"));
                }
                output.push('\n');
                for &child in &element.children {
                    self.dump_node(output, child, depth + 1);
                }
            }
            Ok(HostNodeData::Text(content)) => {
                output.push_str(&format!("{indent}[{id}] {content:?}\n"));
            }
            Ok(HostNodeData::Placeholder) => {
                output.push_str(&format!("{indent}[{id}] <!-- -->\n"));
            }
            Err(_) => output.push_str(&format!("{indent}[{id}] (missing)\n")),
        }
    }
}

impl HostTree for MemoryHost {
    fn create_element(&mut self, tag: &str) -> HostNodeId {
        self.push(HostNodeData::Element(ElementData {
            tag: tag.to_ascii_lowercase(),
            ..ElementData::default()
        }))
    }

    fn create_text(&mut self, content: &str) -> HostNodeId {
        self.push(HostNodeData::Text(content.to_string()))
    }

    fn create_placeholder(&mut self) -> HostNodeId {
        self.push(HostNodeData::Placeholder)
    }

    fn contains(&self, id: HostNodeId) -> bool {
        self.node(id).is_ok()
    }

    fn is_text(&self, id: HostNodeId) -> bool {
        matches!(self.node(id).map(|node| &node.data), Ok(HostNodeData::Text(_)))
    }

    fn is_form_control(&self, id: HostNodeId) -> bool {
        self.element(id)
            .map(|element| FORM_CONTROLS.contains(&element.tag.as_str()))
            .unwrap_or(false)
    }

    fn parent(&self, id: HostNodeId) -> Option<HostNodeId> {
        self.node(id).ok()?.parent
    }

    fn children(&self, id: HostNodeId) -> Result<Vec<HostNodeId>, HostError> {
        match &self.node(id)?.data {
            HostNodeData::Element(element) => Ok(element.children.clone()),
            _ => Ok(Vec::new()),
        }
    }

    fn append_child(&mut self, parent: HostNodeId, child: HostNodeId) -> Result<(), HostError> {
        self.check_insertable(parent, child)?;
        self.detach(child)?;
        self.element_mut(parent)?.children.push(child);
        self.node_mut(child)?.parent = Some(parent);
        Ok(())
    }

    fn insert_child(
        &mut self,
        parent: HostNodeId,
        index: usize,
        child: HostNodeId,
    ) -> Result<(), HostError> {
        self.check_insertable(parent, child)?;
        self.detach(child)?;
        let children = &mut self.element_mut(parent)?.children;
        let index = index.min(children.len());
        children.insert(index, child);
        self.node_mut(child)?.parent = Some(parent);
        Ok(())
    }

    fn replace_child(
        &mut self,
        parent: HostNodeId,
        new_child: HostNodeId,
        old_child: HostNodeId,
    ) -> Result<(), HostError> {
        self.check_insertable(parent, new_child)?;
        if self.node(old_child)?.parent != Some(parent) {
            return Err(HostError::NotAChild {
                parent,
                child: old_child,
            });
        }
        if new_child == old_child {
            return Ok(());
        }
        self.detach(new_child)?;
        let children = &mut self.element_mut(parent)?.children;
        let position = children
            .iter()
            .position(|&id| id == old_child)
            .ok_or(HostError::NotAChild {
                parent,
                child: old_child,
            })?;
        children[position] = new_child;
        self.node_mut(old_child)?.parent = None;
        self.node_mut(new_child)?.parent = Some(parent);
        Ok(())
    }

    fn remove_child(&mut self, parent: HostNodeId, child: HostNodeId) -> Result<(), HostError> {
        if self.node(child)?.parent != Some(parent) {
            return Err(HostError::NotAChild { parent, child });
        }
        self.detach(child)
    }

    fn set_text(&mut self, id: HostNodeId, content: &str) -> Result<(), HostError> {
        match &mut self.node_mut(id)?.data {
            HostNodeData::Text(text) => {
                content.clone_into(text);
                Ok(())
            }
            _ => Err(HostError::NotText { id }),
        }
    }

    fn attribute(&self, id: HostNodeId, name: &str) -> Option<String> {
        self.element(id).ok()?.attributes.get(name).cloned()
    }

    fn set_attribute(&mut self, id: HostNodeId, name: &str, value: &str) -> Result<(), HostError> {
        self.element_mut(id)?
            .attributes
            .insert(name.to_string(), value.to_string());
        Ok(())
    }

    fn remove_attribute(&mut self, id: HostNodeId, name: &str) -> Result<(), HostError> {
        self.element_mut(id)?.attributes.shift_remove(name);
        Ok(())
    }

    fn add_event_listener(
        &mut self,
        id: HostNodeId,
        event: &str,
        handler: EventHandler,
    ) -> Result<(), HostError> {
        self.element_mut(id)?
            .listeners
            .push((event.to_string(), handler));
        Ok(())
    }

    fn remove_event_listener(
        &mut self,
        id: HostNodeId,
        event: &str,
        handler: &EventHandler,
    ) -> Result<(), HostError> {
        let listeners = &mut self.element_mut(id)?.listeners;
        if let Some(position) = listeners
            .iter()
            .position(|(name, bound)| name == event && bound.ptr_eq(handler))
        {
            listeners.remove(position);
        }
        Ok(())
    }

    fn set_style(&mut self, id: HostNodeId, property: &str, value: &str) -> Result<(), HostError> {
        self.element_mut(id)?
            .style
            .insert(property.to_string(), value.to_string());
        Ok(())
    }

    fn clear_style(&mut self, id: HostNodeId) -> Result<(), HostError> {
        self.element_mut(id)?.style.clear();
        Ok(())
    }

    fn value(&self, id: HostNodeId) -> Option<String> {
        self.element(id).ok()?.value.clone()
    }

    fn set_value(&mut self, id: HostNodeId, value: &str) -> Result<(), HostError> {
        self.element_mut(id)?.value = Some(value.to_string());
        Ok(())
    }

    fn release(&mut self, id: HostNodeId) -> Result<(), HostError> {
        self.detach(id)?;
        let children = self.children(id)?;
        for child in children {
            if let Some(node) = self.nodes.get_mut(child).and_then(Option::as_mut) {
                node.parent = None;
            }
            match self.release(child) {
                // Already released.
                Ok(()) | Err(HostError::Missing { .. }) => {}
                Err(error) => return Err(error),
            }
        }
        if let Some(slot) = self.nodes.get_mut(id) {
            slot.take();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_past_end_appends() {
        let mut host = MemoryHost::new();
        let root = host.create_element("div");
        let a = host.create_text("a");
        let b = host.create_text("b");
        host.append_child(root, a).unwrap();
        host.insert_child(root, 10, b).unwrap();
        assert_eq!(host.children(root).unwrap(), vec![a, b]);
        assert_eq!(host.text_content(root), "ab");
    }

    #[test]
    fn append_moves_node_between_parents() {
        let mut host = MemoryHost::new();
        let first = host.create_element("div");
        let second = host.create_element("div");
        let child = host.create_text("x");
        host.append_child(first, child).unwrap();
        host.append_child(second, child).unwrap();
        assert!(host.children(first).unwrap().is_empty());
        assert_eq!(host.parent(child), Some(second));
    }

    #[test]
    fn replace_child_keeps_position() {
        let mut host = MemoryHost::new();
        let root = host.create_element("ul");
        let a = host.create_element("li");
        let b = host.create_element("li");
        let c = host.create_element("li");
        host.append_child(root, a).unwrap();
        host.append_child(root, b).unwrap();
        host.replace_child(root, c, a).unwrap();
        assert_eq!(host.children(root).unwrap(), vec![c, b]);
        assert_eq!(host.parent(a), None);
    }

    #[test]
    fn remove_child_rejects_foreign_child() {
        let mut host = MemoryHost::new();
        let root = host.create_element("div");
        let orphan = host.create_element("span");
        assert_eq!(
            host.remove_child(root, orphan),
            Err(HostError::NotAChild {
                parent: root,
                child: orphan
            })
        );
    }

    #[test]
    fn release_frees_subtree() {
        let mut host = MemoryHost::new();
        let root = host.create_element("div");
        let child = host.create_element("span");
        let text = host.create_text("hi");
        host.append_child(root, child).unwrap();
        host.append_child(child, text).unwrap();
        host.release(child).unwrap();
        assert_eq!(host.len(), 1);
        assert!(host.children(root).unwrap().is_empty());
    }

    #[test]
    fn release_skips_children_freed_out_from_under_it() {
        let mut host = MemoryHost::new();
        let root = host.create_element("div");
        let gone = host.create_text("gone");
        let kept = host.create_text("kept");
        host.append_child(root, gone).unwrap();
        host.append_child(root, kept).unwrap();
        host.nodes[gone] = None;

        assert_eq!(host.release(root), Ok(()));
        assert!(host.is_empty());
        assert_eq!(host.release(root), Err(HostError::Missing { id: root }));
    }

    #[test]
    fn listeners_are_removed_by_identity() {
        let mut host = MemoryHost::new();
        let button = host.create_element("button");
        let first = EventHandler::new(|_| {});
        let second = EventHandler::new(|_| {});
        host.add_event_listener(button, "click", first.clone()).unwrap();
        host.add_event_listener(button, "click", second).unwrap();
        host.remove_event_listener(button, "click", &first).unwrap();
        assert_eq!(host.listener_count(button, "click"), 1);
    }
}
