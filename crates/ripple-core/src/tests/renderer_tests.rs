use super::*;
use crate::error::RenderError;
use crate::hooks::HookError;
use crate::host::{HostTree, MemoryHost};
use crate::reconciler::Reconciler;
use crate::value::{props, ElementRef, Props, StyleMap};
use std::cell::Cell;
use std::rc::Rc;

fn setup() -> (Rc<RefCell<MemoryHost>>, Renderer, HostNodeId) {
    let (host, shared) = MemoryHost::shared();
    let root = host.borrow_mut().create_element("main");
    (host, Renderer::new(shared), root)
}

fn greeting(_ctx: &mut RenderContext<'_>, props: &Props) -> Result<VNode, RenderError> {
    let name = props.get("name").and_then(PropValue::as_str).unwrap_or("nobody");
    Ok(VNode::element("p").text(format!("hello {name}")).build())
}

fn broken(ctx: &mut RenderContext<'_>, _props: &Props) -> Result<VNode, RenderError> {
    ctx.use_state(|| 0)?;
    Ok(VNode::text("unreachable"))
}

#[test]
fn event_names_follow_on_prefix_convention() {
    assert_eq!(event_name("onClick").as_deref(), Some("click"));
    assert_eq!(event_name("onMouseDown").as_deref(), Some("mousedown"));
    assert_eq!(event_name("one"), None);
    assert_eq!(event_name("on"), None);
    assert_eq!(event_name("className"), None);
}

#[test]
fn create_materializes_tree_and_records_elements() {
    let (host, renderer, root) = setup();
    let tree = VNode::element("div")
        .class_name("card")
        .prop("id", "main-card")
        .child(VNode::element("h1").text("Title").build())
        .text("body")
        .build();
    let summary = renderer.patch(root, &Reconciler::new().diff(None, Some(&tree)));
    assert_eq!(summary, PatchSummary { applied: 1, skipped: 0 });

    let host = host.borrow();
    let div = tree.host_node().expect("materialized");
    assert_eq!(host.children(root).unwrap(), vec![div]);
    assert_eq!(host.attribute(div, "class").as_deref(), Some("card"));
    assert_eq!(host.attribute(div, "id").as_deref(), Some("main-card"));
    assert_eq!(host.text_content(div), "Titlebody");
    assert_eq!(tree.children()[0].host_node().map(|id| host.tag(id)), Some(Some("h1")));
}

#[test]
fn function_components_render_in_place() {
    let (host, renderer, root) = setup();
    let tree = VNode::element("section")
        .child(VNode::component(greeting, props([("name", "ada")])))
        .child(VNode::component(broken, Props::new()))
        .build();
    renderer.patch(root, &Reconciler::new().diff(None, Some(&tree)));

    let host = host.borrow();
    let section = tree.host_node().unwrap();
    assert_eq!(host.text_content(section), format!(
        "hello ada{}",
        HookError::InvalidHookCall { hook: "use_state" }
    ));
    let error = tree.children()[1].host_node().unwrap();
    assert_eq!(host.attribute(error, "class").as_deref(), Some("render-error"));
}

#[test]
fn update_rebinds_handlers_without_duplicates() {
    let (host, renderer, root) = setup();
    let clicks = Rc::new(Cell::new(0));
    let first_clicks = clicks.clone();
    let old = VNode::element("button")
        .on("click", EventHandler::new(move |_| first_clicks.set(first_clicks.get() + 1)))
        .build();
    renderer.patch(root, &Reconciler::new().diff(None, Some(&old)));
    let button = old.host_node().unwrap();

    let second_clicks = clicks.clone();
    let new = VNode::element("button")
        .on("click", EventHandler::new(move |_| second_clicks.set(second_clicks.get() + 10)))
        .build();
    renderer.patch(root, &Reconciler::new().diff(Some(&old), Some(&new)));

    assert_eq!(host.borrow().listener_count(button, "click"), 1);
    let dispatched = host.borrow().dispatch_event(button, "click");
    assert_eq!(dispatched, 1);
    assert_eq!(clicks.get(), 10);

    let bare = VNode::element("button").build();
    renderer.patch(root, &Reconciler::new().diff(Some(&new), Some(&bare)));
    assert_eq!(host.borrow().listener_count(button, "click"), 0);
    assert_eq!(renderer.bound_listener_count(), 0);
}

#[test]
fn refs_are_assigned_and_cleared() {
    let (_host, renderer, root) = setup();
    let cell = ElementRef::new();
    let seen = Rc::new(RefCell::new(Vec::new()));
    let log = seen.clone();
    let tree = VNode::element("div")
        .child(VNode::element("input").node_ref(cell.clone()).build())
        .child(
            VNode::element("span")
                .ref_callback(move |element| log.borrow_mut().push(element))
                .build(),
        )
        .build();
    renderer.patch(root, &Reconciler::new().diff(None, Some(&tree)));
    let input = tree.children()[0].host_node();
    let span = tree.children()[1].host_node();
    assert_eq!(cell.current(), input);
    assert_eq!(*seen.borrow(), vec![span]);

    renderer.patch(root, &Reconciler::new().diff(Some(&tree), None));
    assert_eq!(cell.current(), None);
    assert_eq!(*seen.borrow(), vec![span, None]);
    assert_eq!(renderer.bound_ref_count(), 0);
}

#[test]
fn style_merges_and_null_clears() {
    let (host, renderer, root) = setup();
    let old = VNode::element("div")
        .style(StyleMap::from([("color".into(), "red".into())]))
        .build();
    renderer.patch(root, &Reconciler::new().diff(None, Some(&old)));
    let div = old.host_node().unwrap();

    let new = VNode::element("div")
        .style(StyleMap::from([("margin".into(), "0".into())]))
        .build();
    renderer.patch(root, &Reconciler::new().diff(Some(&old), Some(&new)));
    assert_eq!(host.borrow().style(div, "color").as_deref(), Some("red"));
    assert_eq!(host.borrow().style(div, "margin").as_deref(), Some("0"));

    let cleared = VNode::element("div").prop("style", PropValue::Null).build();
    renderer.patch(root, &Reconciler::new().diff(Some(&new), Some(&cleared)));
    assert_eq!(host.borrow().style(div, "margin"), None);
}

#[test]
fn form_value_is_not_clobbered_when_equal() {
    let (host, renderer, root) = setup();
    let input = host.borrow_mut().create_element("input");
    host.borrow_mut().append_child(root, input).unwrap();

    renderer.apply_prop(input, "value", Some(&PropValue::from("draft"))).unwrap();
    assert_eq!(host.borrow().value(input).as_deref(), Some("draft"));

    host.borrow_mut().set_value(input, "draft typed").unwrap();
    renderer.apply_prop(input, "value", Some(&PropValue::from("draft typed"))).unwrap();
    assert_eq!(host.borrow().value(input).as_deref(), Some("draft typed"));

    renderer.apply_prop(input, "value", None).unwrap();
    assert_eq!(host.borrow().value(input).as_deref(), Some(""));
    assert_eq!(host.borrow().attribute(input, "value"), None);
}

#[test]
fn null_props_remove_attributes() {
    let (host, renderer, root) = setup();
    let old = VNode::element("a").prop("href", "/home").prop("title", "Home").build();
    renderer.patch(root, &Reconciler::new().diff(None, Some(&old)));
    let link = old.host_node().unwrap();

    let new = VNode::element("a").prop("href", PropValue::Null).build();
    renderer.patch(root, &Reconciler::new().diff(Some(&old), Some(&new)));
    assert_eq!(host.borrow().attribute(link, "href"), None);
    assert_eq!(host.borrow().attribute(link, "title"), None);
}

#[test]
fn replace_keeps_position_and_frees_old_subtree() {
    let (host, renderer, root) = setup();
    let old = VNode::element("ul")
        .child(VNode::element("li").text("a").build())
        .child(VNode::element("li").text("b").build())
        .build();
    renderer.patch(root, &Reconciler::new().diff(None, Some(&old)));
    let first = old.children()[0].host_node().unwrap();
    let live_before = host.borrow().len();

    let new = VNode::element("ul")
        .child(VNode::element("p").text("x").build())
        .child(VNode::element("li").text("b").build())
        .build();
    let summary = renderer.patch(root, &Reconciler::new().diff(Some(&old), Some(&new)));
    assert_eq!(summary.applied, 1);

    let host = host.borrow();
    let list = new.host_node().unwrap();
    let children = host.children(list).unwrap();
    assert_eq!(children[0], new.children()[0].host_node().unwrap());
    assert_eq!(host.tag(children[0]), Some("p"));
    assert!(!host.contains(first));
    assert_eq!(host.len(), live_before);
    assert_eq!(host.text_content(list), "xb");
}

#[test]
fn create_child_inserts_at_index_and_appends_past_end() {
    let (host, renderer, root) = setup();
    let parent = host.borrow_mut().create_element("div");
    host.borrow_mut().append_child(root, parent).unwrap();
    let existing = host.borrow_mut().create_text("a");
    host.borrow_mut().append_child(parent, existing).unwrap();

    let patches = vec![
        Patch::CreateChild {
            parent: Some(parent),
            index: 0,
            node: VNode::text("first"),
        },
        Patch::CreateChild {
            parent: Some(parent),
            index: 99,
            node: VNode::text("last"),
        },
    ];
    renderer.patch(root, &patches);
    assert_eq!(host.borrow().text_content(parent), "firstalast");
}

#[test]
fn inconsistent_patches_are_skipped() {
    let (host, renderer, root) = setup();
    let orphan = host.borrow_mut().create_element("span");
    let patches = vec![
        Patch::Remove { element: None },
        Patch::Remove { element: Some(orphan) },
        Patch::Replace {
            element: Some(12_345),
            node: VNode::text("x"),
        },
        Patch::Update {
            element: Some(orphan),
            payload: UpdatePayload::Text("not text".into()),
        },
        Patch::RemoveChild {
            parent: Some(root),
            element: Some(orphan),
        },
        Patch::CreateChild {
            parent: None,
            index: 0,
            node: VNode::text("x"),
        },
    ];
    let summary = renderer.patch(root, &patches);
    assert_eq!(summary, PatchSummary { applied: 0, skipped: 6 });
    assert!(host.borrow().contains(orphan));
    assert!(host.borrow().children(root).unwrap().is_empty());
}
