//! Positional tree diff producing an ordered patch list.
//!
//! Children are compared index by index; there is no key-based move
//! detection. Element back-references are carried from old nodes onto the
//! matching new nodes as the diff walks, so the new tree can be diffed again
//! after it has been patched in.

use indexmap::IndexMap;

use crate::host::HostNodeId;
use crate::value::PropValue;
use crate::vnode::{NodeKind, VNode, RESERVED_PROPS};

/// Prop changes of one element; `None` removes the prop.
pub type PropChanges = IndexMap<String, Option<PropValue>>;

#[derive(Clone, Debug)]
pub enum UpdatePayload {
    Text(String),
    Props(PropChanges),
}

/// One host-tree mutation.
///
/// Element fields hold the host node the corresponding old virtual node was
/// materialized into, or `None` if it never was; the renderer skips such
/// patches.
#[derive(Clone, Debug)]
pub enum Patch {
    Create {
        node: VNode,
    },
    Remove {
        element: Option<HostNodeId>,
    },
    Replace {
        element: Option<HostNodeId>,
        node: VNode,
    },
    Update {
        element: Option<HostNodeId>,
        payload: UpdatePayload,
    },
    CreateChild {
        parent: Option<HostNodeId>,
        index: usize,
        node: VNode,
    },
    RemoveChild {
        parent: Option<HostNodeId>,
        element: Option<HostNodeId>,
    },
}

impl Patch {
    pub fn name(&self) -> &'static str {
        match self {
            Patch::Create { .. } => "CREATE",
            Patch::Remove { .. } => "REMOVE",
            Patch::Replace { .. } => "REPLACE",
            Patch::Update { .. } => "UPDATE",
            Patch::CreateChild { .. } => "CREATE_CHILD",
            Patch::RemoveChild { .. } => "REMOVE_CHILD",
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct Reconciler;

impl Reconciler {
    pub fn new() -> Self {
        Self
    }

    pub fn diff(&self, old: Option<&VNode>, new: Option<&VNode>) -> Vec<Patch> {
        let mut patches = Vec::new();
        self.diff_into(old, new, &mut patches);
        log::trace!("diff produced {} patch(es)", patches.len());
        patches
    }

    fn diff_into(&self, old: Option<&VNode>, new: Option<&VNode>, patches: &mut Vec<Patch>) {
        match (old, new) {
            (None, None) => {}
            (None, Some(new)) => patches.push(Patch::Create { node: new.clone() }),
            (Some(old), None) => patches.push(Patch::Remove {
                element: old.host_node(),
            }),
            (Some(old), Some(new)) => self.diff_pair(old, new, patches),
        }
    }

    fn diff_pair(&self, old: &VNode, new: &VNode, patches: &mut Vec<Patch>) {
        if old.ptr_eq(new) {
            return;
        }
        if !old.kind().same_kind(new.kind()) {
            patches.push(Patch::Replace {
                element: old.host_node(),
                node: new.clone(),
            });
            return;
        }
        let element = old.host_node();
        match (old.kind(), new.kind()) {
            (NodeKind::Text(before), NodeKind::Text(after)) => {
                if before != after {
                    patches.push(Patch::Update {
                        element,
                        payload: UpdatePayload::Text(after.to_string()),
                    });
                }
                new.set_host_node(element);
            }
            (NodeKind::Element(_), NodeKind::Element(_)) => {
                let changes = diff_props(old, new);
                if !changes.is_empty() {
                    patches.push(Patch::Update {
                        element,
                        payload: UpdatePayload::Props(changes),
                    });
                }
                new.set_host_node(element);
                self.diff_children(old, new, element, patches);
            }
            (NodeKind::Component(_), NodeKind::Component(_)) => {
                // Function components are invoked by value, so unchanged
                // props are the only evidence the output is unchanged.
                if diff_props(old, new).is_empty() {
                    new.set_host_node(element);
                } else {
                    patches.push(Patch::Replace {
                        element,
                        node: new.clone(),
                    });
                }
            }
            _ => {}
        }
    }

    fn diff_children(
        &self,
        old: &VNode,
        new: &VNode,
        parent: Option<HostNodeId>,
        patches: &mut Vec<Patch>,
    ) {
        let old_children = old.children();
        let new_children = new.children();
        let len = old_children.len().max(new_children.len());
        for index in 0..len {
            match (old_children.get(index), new_children.get(index)) {
                (Some(old_child), Some(new_child)) => {
                    self.diff_pair(old_child, new_child, patches)
                }
                (None, Some(new_child)) => patches.push(Patch::CreateChild {
                    parent,
                    index,
                    node: new_child.clone(),
                }),
                (Some(old_child), None) => patches.push(Patch::RemoveChild {
                    parent,
                    element: old_child.host_node(),
                }),
                (None, None) => {}
            }
        }
    }
}

/// Props added or changed by identity in `new`, plus props dropped from `old`
/// mapped to `None`. Structural keys are ignored.
pub fn diff_props(old: &VNode, new: &VNode) -> PropChanges {
    let mut changes = PropChanges::new();
    for (name, value) in new.props() {
        if RESERVED_PROPS.contains(&name.as_str()) {
            continue;
        }
        match old.prop(name) {
            Some(previous) if previous.same(value) => {}
            _ => {
                changes.insert(name.clone(), Some(value.clone()));
            }
        }
    }
    for name in old.props().keys() {
        if RESERVED_PROPS.contains(&name.as_str()) {
            continue;
        }
        if !new.props().contains_key(name) {
            changes.insert(name.clone(), None);
        }
    }
    changes
}

#[cfg(test)]
#[path = "tests/reconciler_tests.rs"]
mod tests;
