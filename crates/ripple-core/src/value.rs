//! Prop values carried by virtual nodes.
//!
//! Props are a closed set of value shapes. Comparison between renders is by
//! identity: primitives and strings compare by value, while style maps, event
//! handlers and refs compare by the address of their shared allocation. A
//! freshly built style map is therefore always "changed", even if its contents
//! match the previous one.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::host::HostNodeId;

/// Ordered prop map of a virtual node.
pub type Props = IndexMap<String, PropValue>;

/// Ordered property map assigned to a host element's style surface.
pub type StyleMap = IndexMap<String, String>;

/// An event delivered by the host tree to a bound handler.
#[derive(Clone, Debug, PartialEq)]
pub struct Event {
    pub name: String,
    pub target: HostNodeId,
    pub value: Option<String>,
}

impl Event {
    pub fn new(name: impl Into<String>, target: HostNodeId) -> Self {
        Self {
            name: name.into(),
            target,
            value: None,
        }
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }
}

/// A shared event callback. Two handlers are equal only if they share the same
/// allocation.
#[derive(Clone)]
pub struct EventHandler(Rc<dyn Fn(&Event)>);

impl EventHandler {
    pub fn new(handler: impl Fn(&Event) + 'static) -> Self {
        Self(Rc::new(handler))
    }

    pub fn call(&self, event: &Event) {
        (self.0)(event)
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl PartialEq for EventHandler {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for EventHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EventHandler({:p})", Rc::as_ptr(&self.0) as *const ())
    }
}

/// Mutable cell that receives the host element a `ref` prop is attached to.
///
/// Only the renderer writes to it; anyone holding a clone can read it.
#[derive(Clone, Default)]
pub struct ElementRef {
    current: Rc<Cell<Option<HostNodeId>>>,
}

impl ElementRef {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<HostNodeId> {
        self.current.get()
    }

    pub(crate) fn assign(&self, element: Option<HostNodeId>) {
        self.current.set(element);
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.current, &other.current)
    }
}

impl fmt::Debug for ElementRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ElementRef")
            .field("current", &self.current.get())
            .finish()
    }
}

/// Target of a `ref` prop: either a cell or a callback.
#[derive(Clone)]
pub enum RefTarget {
    Cell(ElementRef),
    Callback(Rc<dyn Fn(Option<HostNodeId>)>),
}

impl RefTarget {
    pub fn callback(callback: impl Fn(Option<HostNodeId>) + 'static) -> Self {
        RefTarget::Callback(Rc::new(callback))
    }

    pub(crate) fn assign(&self, element: Option<HostNodeId>) {
        match self {
            RefTarget::Cell(cell) => cell.assign(element),
            RefTarget::Callback(callback) => callback(element),
        }
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (RefTarget::Cell(a), RefTarget::Cell(b)) => a.ptr_eq(b),
            (RefTarget::Callback(a), RefTarget::Callback(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for RefTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RefTarget::Cell(cell) => cell.fmt(f),
            RefTarget::Callback(_) => f.write_str("RefCallback"),
        }
    }
}

#[derive(Clone, Debug)]
pub enum PropValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Rc<str>),
    Style(Rc<StyleMap>),
    Handler(EventHandler),
    Ref(RefTarget),
}

impl PropValue {
    /// Identity comparison used by the reconciler and the state-merge contract.
    pub fn same(&self, other: &PropValue) -> bool {
        match (self, other) {
            (PropValue::Null, PropValue::Null) => true,
            (PropValue::Bool(a), PropValue::Bool(b)) => a == b,
            (PropValue::Int(a), PropValue::Int(b)) => a == b,
            (PropValue::Float(a), PropValue::Float(b)) => a.to_bits() == b.to_bits(),
            (PropValue::Str(a), PropValue::Str(b)) => a == b,
            (PropValue::Style(a), PropValue::Style(b)) => Rc::ptr_eq(a, b),
            (PropValue::Handler(a), PropValue::Handler(b)) => a.ptr_eq(b),
            (PropValue::Ref(a), PropValue::Ref(b)) => a.ptr_eq(b),
            _ => false,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, PropValue::Null)
    }

    /// String form used when the value lands in a host attribute. Handlers,
    /// refs and style maps have no attribute form.
    pub fn to_attribute(&self) -> Option<String> {
        match self {
            PropValue::Bool(value) => Some(value.to_string()),
            PropValue::Int(value) => Some(value.to_string()),
            PropValue::Float(value) => Some(value.to_string()),
            PropValue::Str(value) => Some(value.to_string()),
            PropValue::Null
            | PropValue::Style(_)
            | PropValue::Handler(_)
            | PropValue::Ref(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropValue::Str(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            PropValue::Int(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropValue::Bool(value) => Some(*value),
            _ => None,
        }
    }
}

impl PartialEq for PropValue {
    fn eq(&self, other: &Self) -> bool {
        self.same(other)
    }
}

impl From<&str> for PropValue {
    fn from(value: &str) -> Self {
        PropValue::Str(Rc::from(value))
    }
}

impl From<String> for PropValue {
    fn from(value: String) -> Self {
        PropValue::Str(Rc::from(value))
    }
}

impl From<bool> for PropValue {
    fn from(value: bool) -> Self {
        PropValue::Bool(value)
    }
}

impl From<i64> for PropValue {
    fn from(value: i64) -> Self {
        PropValue::Int(value)
    }
}

impl From<i32> for PropValue {
    fn from(value: i32) -> Self {
        PropValue::Int(i64::from(value))
    }
}

impl From<f64> for PropValue {
    fn from(value: f64) -> Self {
        PropValue::Float(value)
    }
}

impl From<StyleMap> for PropValue {
    fn from(value: StyleMap) -> Self {
        PropValue::Style(Rc::new(value))
    }
}

impl From<Rc<StyleMap>> for PropValue {
    fn from(value: Rc<StyleMap>) -> Self {
        PropValue::Style(value)
    }
}

impl From<EventHandler> for PropValue {
    fn from(value: EventHandler) -> Self {
        PropValue::Handler(value)
    }
}

impl From<ElementRef> for PropValue {
    fn from(value: ElementRef) -> Self {
        PropValue::Ref(RefTarget::Cell(value))
    }
}

impl From<RefTarget> for PropValue {
    fn from(value: RefTarget) -> Self {
        PropValue::Ref(value)
    }
}

impl<T: Into<PropValue>> From<Option<T>> for PropValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(PropValue::Null)
    }
}

/// Builds a [`Props`] map from `(key, value)` pairs.
pub fn props<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Props
where
    K: Into<String>,
    V: Into<PropValue>,
{
    entries
        .into_iter()
        .map(|(key, value)| (key.into(), value.into()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primitives_compare_by_value() {
        assert!(PropValue::from("a").same(&PropValue::from("a".to_string())));
        assert!(!PropValue::from(1).same(&PropValue::from(2)));
        assert!(PropValue::Float(f64::NAN).same(&PropValue::Float(f64::NAN)));
        assert!(!PropValue::Int(1).same(&PropValue::Float(1.0)));
    }

    #[test]
    fn shared_values_compare_by_identity() {
        let style: Rc<StyleMap> = Rc::new(StyleMap::from([("color".into(), "red".into())]));
        let same_contents: Rc<StyleMap> = Rc::new((*style).clone());
        assert!(PropValue::Style(style.clone()).same(&PropValue::Style(style.clone())));
        assert!(!PropValue::Style(style).same(&PropValue::Style(same_contents)));

        let handler = EventHandler::new(|_| {});
        assert!(PropValue::from(handler.clone()).same(&PropValue::from(handler)));
        assert!(!PropValue::from(EventHandler::new(|_| {}))
            .same(&PropValue::from(EventHandler::new(|_| {}))));
    }

    #[test]
    fn option_maps_none_to_null() {
        assert!(PropValue::from(None::<&str>).is_null());
        assert_eq!(PropValue::from(Some(3)).as_int(), Some(3));
    }
}
