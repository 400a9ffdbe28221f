//! Virtual nodes: declarative descriptions of host nodes prior to
//! materialization.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use crate::error::RenderError;
use crate::hooks::RenderContext;
use crate::host::HostNodeId;
use crate::value::{ElementRef, EventHandler, PropValue, Props, RefTarget, StyleMap};

/// A function component. It is invoked by value every time the renderer
/// materializes it and has no persistent identity of its own.
pub type ComponentFn = fn(&mut RenderContext<'_>, &Props) -> Result<VNode, RenderError>;

/// Prop keys that are structural and never diffed as ordinary props.
pub(crate) const RESERVED_PROPS: &[&str] = &["children", "key"];

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Key {
    Str(Rc<str>),
    Int(i64),
}

impl From<&str> for Key {
    fn from(value: &str) -> Self {
        Key::Str(Rc::from(value))
    }
}

impl From<String> for Key {
    fn from(value: String) -> Self {
        Key::Str(Rc::from(value))
    }
}

impl From<i64> for Key {
    fn from(value: i64) -> Self {
        Key::Int(value)
    }
}

#[derive(Clone)]
pub enum NodeKind {
    Element(Rc<str>),
    Text(Rc<str>),
    Component(ComponentFn),
}

impl NodeKind {
    /// Whether two kinds can be reconciled in place. Text content is not part
    /// of the kind; element tags and component functions are.
    pub fn same_kind(&self, other: &NodeKind) -> bool {
        match (self, other) {
            (NodeKind::Element(a), NodeKind::Element(b)) => a == b,
            (NodeKind::Text(_), NodeKind::Text(_)) => true,
            (NodeKind::Component(a), NodeKind::Component(b)) => *a as usize == *b as usize,
            _ => false,
        }
    }
}

impl fmt::Debug for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeKind::Element(tag) => write!(f, "Element({tag})"),
            NodeKind::Text(content) => write!(f, "Text({content:?})"),
            NodeKind::Component(component) => {
                write!(f, "Component({:#x})", *component as usize)
            }
        }
    }
}

struct VNodeData {
    kind: NodeKind,
    props: Props,
    children: Vec<VNode>,
    key: Option<Key>,
    element: Cell<Option<HostNodeId>>,
}

/// Shared handle to an immutable virtual node.
///
/// Clones share the node, including the slot remembering which host node it
/// was materialized into. Use [`VNode::deep_clone`] for an independent copy.
/// [`ElementBuilder`] copies a child that is still shared when it is added,
/// so every position in a built tree owns its slot.
#[derive(Clone)]
pub struct VNode {
    inner: Rc<VNodeData>,
}

impl VNode {
    fn from_parts(kind: NodeKind, props: Props, children: Vec<VNode>, key: Option<Key>) -> Self {
        Self {
            inner: Rc::new(VNodeData {
                kind,
                props,
                children,
                key,
                element: Cell::new(None),
            }),
        }
    }

    pub fn element(tag: &str) -> ElementBuilder {
        ElementBuilder::new(tag)
    }

    pub fn text(content: impl Into<String>) -> VNode {
        let content: String = content.into();
        VNode::from_parts(NodeKind::Text(Rc::from(content)), Props::new(), Vec::new(), None)
    }

    pub fn component(render: ComponentFn, props: Props) -> VNode {
        VNode::from_parts(NodeKind::Component(render), props, Vec::new(), None)
    }

    pub fn kind(&self) -> &NodeKind {
        &self.inner.kind
    }

    pub fn props(&self) -> &Props {
        &self.inner.props
    }

    pub fn prop(&self, name: &str) -> Option<&PropValue> {
        self.inner.props.get(name)
    }

    pub fn children(&self) -> &[VNode] {
        &self.inner.children
    }

    pub fn key(&self) -> Option<&Key> {
        self.inner.key.as_ref()
    }

    pub fn tag(&self) -> Option<&str> {
        match &self.inner.kind {
            NodeKind::Element(tag) => Some(tag),
            _ => None,
        }
    }

    pub fn text_content(&self) -> Option<&str> {
        match &self.inner.kind {
            NodeKind::Text(content) => Some(content),
            _ => None,
        }
    }

    /// Host node this virtual node was materialized into, if any.
    pub fn host_node(&self) -> Option<HostNodeId> {
        self.inner.element.get()
    }

    pub(crate) fn set_host_node(&self, element: Option<HostNodeId>) {
        self.inner.element.set(element);
    }

    /// `self`, or a deep copy when another handle still shares the node.
    fn into_owned(self) -> VNode {
        if Rc::strong_count(&self.inner) > 1 {
            self.deep_clone()
        } else {
            self
        }
    }

    pub fn ptr_eq(&self, other: &VNode) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Structurally identical copy with fresh, empty host-node slots. Prop
    /// values are shared, so identity comparisons still see them as unchanged.
    pub fn deep_clone(&self) -> VNode {
        VNode::from_parts(
            self.inner.kind.clone(),
            self.inner.props.clone(),
            self.inner.children.iter().map(VNode::deep_clone).collect(),
            self.inner.key.clone(),
        )
    }
}

impl fmt::Debug for VNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("VNode");
        debug.field("kind", &self.inner.kind);
        if !self.inner.props.is_empty() {
            debug.field("props", &self.inner.props);
        }
        if let Some(key) = &self.inner.key {
            debug.field("key", key);
        }
        if !self.inner.children.is_empty() {
            debug.field("children", &self.inner.children);
        }
        debug.field("element", &self.inner.element.get()).finish()
    }
}

/// Builder for element nodes.
#[derive(Debug)]
pub struct ElementBuilder {
    tag: Rc<str>,
    props: Props,
    children: Vec<VNode>,
    key: Option<Key>,
}

impl ElementBuilder {
    fn new(tag: &str) -> Self {
        Self {
            tag: Rc::from(tag),
            props: Props::new(),
            children: Vec::new(),
            key: None,
        }
    }

    pub fn prop(mut self, name: impl Into<String>, value: impl Into<PropValue>) -> Self {
        self.props.insert(name.into(), value.into());
        self
    }

    pub fn props(mut self, props: Props) -> Self {
        self.props.extend(props);
        self
    }

    pub fn class_name(self, class: impl Into<String>) -> Self {
        self.prop("className", class.into())
    }

    pub fn style(self, style: StyleMap) -> Self {
        self.prop("style", style)
    }

    /// Binds `handler` for `event` (e.g. `"click"` becomes the `onClick` prop).
    pub fn on(self, event: &str, handler: EventHandler) -> Self {
        let mut chars = event.chars();
        let name = match chars.next() {
            Some(first) => format!("on{}{}", first.to_ascii_uppercase(), chars.as_str()),
            None => return self,
        };
        self.prop(name, handler)
    }

    pub fn node_ref(self, element_ref: ElementRef) -> Self {
        self.prop("ref", element_ref)
    }

    pub fn ref_callback(self, callback: impl Fn(Option<HostNodeId>) + 'static) -> Self {
        self.prop("ref", RefTarget::callback(callback))
    }

    pub fn key(mut self, key: impl Into<Key>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn child(mut self, child: VNode) -> Self {
        self.children.push(child.into_owned());
        self
    }

    pub fn children(mut self, children: impl IntoIterator<Item = VNode>) -> Self {
        self.children.extend(children.into_iter().map(VNode::into_owned));
        self
    }

    pub fn text(self, content: impl Into<String>) -> Self {
        self.child(VNode::text(content))
    }

    pub fn build(self) -> VNode {
        VNode::from_parts(NodeKind::Element(self.tag), self.props, self.children, self.key)
    }
}

impl From<ElementBuilder> for VNode {
    fn from(builder: ElementBuilder) -> Self {
        builder.build()
    }
}

/// What a component render produces: either a virtual tree to reconcile or a
/// host node the component already materialized itself.
#[derive(Clone, Debug)]
pub enum Renderable {
    Native(HostNodeId),
    Virtual(VNode),
}

impl From<VNode> for Renderable {
    fn from(node: VNode) -> Self {
        Renderable::Virtual(node)
    }
}

impl From<ElementBuilder> for Renderable {
    fn from(builder: ElementBuilder) -> Self {
        Renderable::Virtual(builder.build())
    }
}

/// Minimal inline presentation used in place of a component whose render
/// failed.
pub fn error_view(error: &RenderError) -> VNode {
    VNode::element("div")
        .class_name("render-error")
        .text(error.to_string())
        .build()
}
