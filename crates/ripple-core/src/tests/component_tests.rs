use super::*;
use crate::hooks::{EffectCleanup, StateSetter};
use crate::host::{HostTree, MemoryHost};
use crate::value::{props, ElementRef, PropValue};

fn setup() -> (Rc<RefCell<MemoryHost>>, Runtime, HostNodeId) {
    let (host, shared) = MemoryHost::shared();
    let container = host.borrow_mut().create_element("body");
    (host, Runtime::new(shared), container)
}

type SetterSlot<T> = Rc<RefCell<Option<StateSetter<T>>>>;

struct Counter {
    renders: Rc<Cell<usize>>,
    setter: SetterSlot<i32>,
}

impl Counter {
    fn new() -> (Self, Rc<Cell<usize>>, SetterSlot<i32>) {
        let renders = Rc::new(Cell::new(0));
        let setter: SetterSlot<i32> = Rc::new(RefCell::new(None));
        (
            Counter {
                renders: renders.clone(),
                setter: setter.clone(),
            },
            renders,
            setter,
        )
    }
}

impl Component for Counter {
    fn render(&self, ctx: &mut RenderContext<'_>) -> Result<Renderable, RenderError> {
        self.renders.set(self.renders.get() + 1);
        let (count, set_count) = ctx.use_state(|| 0)?;
        *self.setter.borrow_mut() = Some(set_count);
        Ok(VNode::element("span").text(count.to_string()).into())
    }
}

fn setter(slot: &SetterSlot<i32>) -> StateSetter<i32> {
    slot.borrow().clone().expect("rendered at least once")
}

#[test]
fn mount_swaps_placeholder_for_rendered_root() {
    let (host, runtime, container) = setup();
    let (counter, renders, _) = Counter::new();
    let instance = runtime.create_component(counter);
    instance.mount(container).unwrap();

    assert_eq!(renders.get(), 1);
    assert!(instance.is_mounted());
    let host = host.borrow();
    let root = instance.root_element().unwrap();
    assert_eq!(host.children(container).unwrap(), vec![root]);
    assert_eq!(host.text_content(container), "0");
    // container, span, text
    assert_eq!(host.len(), 3);
}

#[test]
fn mount_keeps_position_among_existing_children() {
    let (host, runtime, container) = setup();
    let before = host.borrow_mut().create_text("before");
    host.borrow_mut().append_child(container, before).unwrap();
    let (counter, _, _) = Counter::new();
    runtime.create_component(counter).mount(container).unwrap();
    assert_eq!(host.borrow().text_content(container), "before0");
}

#[test]
fn mounting_twice_is_rejected() {
    let (_host, runtime, container) = setup();
    let (counter, _, _) = Counter::new();
    let instance = runtime.create_component(counter);
    instance.mount(container).unwrap();
    assert!(matches!(
        instance.mount(container),
        Err(RuntimeError::InvalidLifecycle {
            operation: "mount",
            state: LifecycleState::Mounted,
            ..
        })
    ));
}

#[test]
fn many_sets_in_one_tick_update_once() {
    let (host, runtime, container) = setup();
    let (counter, renders, slot) = Counter::new();
    let instance = runtime.create_component(counter);
    instance.mount(container).unwrap();

    let set_count = setter(&slot);
    for _ in 0..5 {
        set_count.update(|count| count + 1);
    }
    assert_eq!(runtime.pending_update_count(), 1);
    assert_eq!(renders.get(), 1);

    runtime.run_microtasks();
    assert_eq!(renders.get(), 2);
    assert_eq!(runtime.pending_update_count(), 0);
    assert_eq!(host.borrow().text_content(container), "5");
}

#[test]
fn setting_an_equal_value_schedules_nothing() {
    let (_host, runtime, container) = setup();
    let (counter, renders, slot) = Counter::new();
    let instance = runtime.create_component(counter);
    instance.mount(container).unwrap();

    assert!(!setter(&slot).set(0));
    assert!(!runtime.has_pending_microtasks());
    runtime.run_microtasks();
    assert_eq!(renders.get(), 1);
}

#[test]
fn update_is_a_no_op_unless_mounted() {
    let (_host, runtime, container) = setup();
    let (counter, renders, _) = Counter::new();
    let instance = runtime.create_component(counter);
    instance.update().unwrap();
    assert_eq!(renders.get(), 0);

    instance.mount(container).unwrap();
    instance.unmount().unwrap();
    instance.update().unwrap();
    assert_eq!(renders.get(), 1);
    assert_eq!(instance.lifecycle(), LifecycleState::Disposed);
}

struct Tracked {
    log: Rc<RefCell<Vec<String>>>,
}

impl Component for Tracked {
    fn render(&self, ctx: &mut RenderContext<'_>) -> Result<Renderable, RenderError> {
        let log = self.log.clone();
        ctx.use_effect(Some(()), move || {
            log.borrow_mut().push("effect".into());
            let log = log.clone();
            EffectCleanup::new(move || log.borrow_mut().push("cleanup".into()))
        })?;
        Ok(VNode::element("div").text("tracked").into())
    }

    fn mounted(&self, _handle: &ComponentHandle) {
        self.log.borrow_mut().push("mounted".into());
    }

    fn will_unmount(&self, _handle: &ComponentHandle) {
        self.log.borrow_mut().push("will_unmount".into());
    }
}

#[test]
fn unmount_runs_cleanup_once_and_detaches() {
    let (host, runtime, container) = setup();
    let log = Rc::new(RefCell::new(Vec::new()));
    let instance = runtime.create_component(Tracked { log: log.clone() });
    instance.mount(container).unwrap();
    assert_eq!(*log.borrow(), vec!["mounted"]);

    runtime.run_microtasks();
    assert_eq!(*log.borrow(), vec!["mounted", "effect"]);

    instance.unmount().unwrap();
    instance.unmount().unwrap();
    drop(instance);
    assert_eq!(
        *log.borrow(),
        vec!["mounted", "effect", "will_unmount", "cleanup"]
    );
    assert!(host.borrow().children(container).unwrap().is_empty());
    assert_eq!(host.borrow().len(), 1);
}

#[test]
fn effect_queued_before_unmount_never_runs() {
    let (_host, runtime, container) = setup();
    let log = Rc::new(RefCell::new(Vec::new()));
    let instance = runtime.create_component(Tracked { log: log.clone() });
    instance.mount(container).unwrap();
    instance.unmount().unwrap();
    runtime.run_microtasks();
    assert_eq!(*log.borrow(), vec!["mounted", "will_unmount"]);
}

struct Probe {
    host: Rc<RefCell<MemoryHost>>,
    seen: Rc<RefCell<Vec<String>>>,
    setter: SetterSlot<i32>,
}

impl Component for Probe {
    fn render(&self, ctx: &mut RenderContext<'_>) -> Result<Renderable, RenderError> {
        let (count, set_count) = ctx.use_state(|| 0)?;
        *self.setter.borrow_mut() = Some(set_count);
        let root = ctx.use_ref(ElementRef::new)?.get();
        let host = self.host.clone();
        let seen = self.seen.clone();
        let observed = root.clone();
        ctx.use_effect(Some(count), move || {
            if let Some(element) = observed.current() {
                seen.borrow_mut().push(host.borrow().text_content(element));
            }
            EffectCleanup::none()
        })?;
        Ok(VNode::element("p")
            .node_ref(root)
            .text(format!("count {count}"))
            .into())
    }
}

#[test]
fn effects_observe_patched_host() {
    let (host, runtime, container) = setup();
    let seen = Rc::new(RefCell::new(Vec::new()));
    let slot: SetterSlot<i32> = Rc::new(RefCell::new(None));
    let instance = runtime.create_component(Probe {
        host: host.clone(),
        seen: seen.clone(),
        setter: slot.clone(),
    });
    instance.mount(container).unwrap();
    assert!(seen.borrow().is_empty());
    runtime.run_microtasks();
    setter(&slot).set(4);
    runtime.run_microtasks();
    assert_eq!(*seen.borrow(), vec!["count 0", "count 4"]);
}

struct Faulty {
    fail: Rc<Cell<bool>>,
}

impl Component for Faulty {
    fn render(&self, _ctx: &mut RenderContext<'_>) -> Result<Renderable, RenderError> {
        if self.fail.get() {
            return Err(RenderError::msg("boom"));
        }
        Ok(VNode::element("div").class_name("ok").text("fine").into())
    }
}

#[test]
fn render_failure_shows_error_view_and_recovers() {
    let (host, runtime, container) = setup();
    let fail = Rc::new(Cell::new(true));
    let instance = runtime.create_component(Faulty { fail: fail.clone() });
    instance.mount(container).unwrap();
    assert!(instance.is_mounted());
    {
        let host = host.borrow();
        let root = instance.root_element().unwrap();
        assert_eq!(host.attribute(root, "class").as_deref(), Some("render-error"));
        assert_eq!(host.text_content(root), "boom");
    }

    fail.set(false);
    instance.update().unwrap();
    let host = host.borrow();
    let root = instance.root_element().unwrap();
    assert_eq!(host.attribute(root, "class").as_deref(), Some("ok"));
    assert_eq!(host.text_content(container), "fine");
}

struct Native {
    host: Rc<RefCell<MemoryHost>>,
    bogus: Rc<Cell<bool>>,
}

impl Component for Native {
    fn render(&self, _ctx: &mut RenderContext<'_>) -> Result<Renderable, RenderError> {
        if self.bogus.get() {
            return Ok(Renderable::Native(usize::MAX));
        }
        let mut host = self.host.borrow_mut();
        let canvas = host.create_element("canvas");
        Ok(Renderable::Native(canvas))
    }
}

#[test]
fn native_roots_are_inserted_directly() {
    let (host, runtime, container) = setup();
    let instance = runtime.create_component(Native {
        host: host.clone(),
        bogus: Rc::new(Cell::new(false)),
    });
    instance.mount(container).unwrap();
    let first = instance.root_element().unwrap();
    assert_eq!(host.borrow().tag(first), Some("canvas"));
    assert!(instance.current_tree().is_none());

    instance.update().unwrap();
    let second = instance.root_element().unwrap();
    assert_ne!(first, second);
    assert_eq!(host.borrow().children(container).unwrap(), vec![second]);
}

#[test]
fn one_failing_update_does_not_block_the_flush() {
    let (host, runtime, container) = setup();
    let bogus = Rc::new(Cell::new(false));
    let broken = runtime.create_component(Native {
        host: host.clone(),
        bogus: bogus.clone(),
    });
    broken.mount(container).unwrap();
    let (counter, renders, slot) = Counter::new();
    let healthy = runtime.create_component(counter);
    healthy.mount(container).unwrap();

    bogus.set(true);
    broken.handle().schedule_update();
    setter(&slot).set(1);
    assert_eq!(runtime.pending_update_count(), 2);
    runtime.run_microtasks();

    assert_eq!(renders.get(), 2);
    assert!(broken.is_mounted());
    assert!(host.borrow().text_content(container).ends_with('1'));
}

#[test]
fn state_merge_is_shallow_and_by_identity() {
    let (_host, runtime, container) = setup();
    let renders = Rc::new(Cell::new(0));
    let counted = renders.clone();
    let instance = runtime.create_component_with_state(
        StatefulView { renders: counted },
        props([("title", PropValue::from("a")), ("count", PropValue::from(1))]),
    );
    instance.mount(container).unwrap();

    assert!(!instance.set_state(props([("title", "a")])));
    assert_eq!(runtime.pending_update_count(), 0);

    assert!(instance.set_state(props([("count", 2)])));
    assert_eq!(instance.state().get("title"), Some(&PropValue::from("a")));
    assert_eq!(instance.state().get("count"), Some(&PropValue::from(2)));
    runtime.run_microtasks();
    assert_eq!(renders.get(), 2);
}

struct StatefulView {
    renders: Rc<Cell<usize>>,
}

impl Component for StatefulView {
    fn render(&self, ctx: &mut RenderContext<'_>) -> Result<Renderable, RenderError> {
        self.renders.set(self.renders.get() + 1);
        let state = ctx.component_state()?;
        let count = state.get("count").and_then(PropValue::as_int).unwrap_or(0);
        Ok(VNode::element("output").text(count.to_string()).into())
    }
}

struct SelfScheduling {
    renders: Rc<Cell<usize>>,
}

impl Component for SelfScheduling {
    fn render(&self, ctx: &mut RenderContext<'_>) -> Result<Renderable, RenderError> {
        self.renders.set(self.renders.get() + 1);
        let (count, set_count) = ctx.use_state(|| 0)?;
        if count < 3 {
            set_count.set(count + 1);
        }
        Ok(VNode::text(count.to_string()).into())
    }
}

#[test]
fn set_state_during_render_is_deferred_to_next_tick() {
    let (host, runtime, container) = setup();
    let renders = Rc::new(Cell::new(0));
    let instance = runtime.create_component(SelfScheduling {
        renders: renders.clone(),
    });
    instance.mount(container).unwrap();
    assert_eq!(renders.get(), 1);
    assert_eq!(runtime.pending_update_count(), 1);

    runtime.run_microtasks();
    assert_eq!(renders.get(), 4);
    assert_eq!(host.borrow().text_content(container), "3");
}

struct Twins {
    setter: SetterSlot<i32>,
}

impl Component for Twins {
    fn render(&self, ctx: &mut RenderContext<'_>) -> Result<Renderable, RenderError> {
        let (count, set_count) = ctx.use_state(|| 0)?;
        *self.setter.borrow_mut() = Some(set_count);
        let label = VNode::text(count.to_string());
        Ok(VNode::element("div")
            .child(label.clone())
            .child(label)
            .into())
    }
}

#[test]
fn reused_child_node_updates_every_position() {
    let (host, runtime, container) = setup();
    let slot: SetterSlot<i32> = Rc::new(RefCell::new(None));
    let instance = runtime.create_component(Twins {
        setter: slot.clone(),
    });
    instance.mount(container).unwrap();
    assert_eq!(host.borrow().text_content(container), "00");

    setter(&slot).set(1);
    runtime.run_microtasks();
    assert_eq!(host.borrow().text_content(container), "11");

    let tree = instance.current_tree().unwrap();
    let first = tree.children()[0].host_node();
    let second = tree.children()[1].host_node();
    assert!(first.is_some() && second.is_some());
    assert_ne!(first, second);
}

struct Shrinking {
    skip_ref: Rc<Cell<bool>>,
    runs: Rc<Cell<usize>>,
}

impl Component for Shrinking {
    fn render(&self, ctx: &mut RenderContext<'_>) -> Result<Renderable, RenderError> {
        ctx.use_state(|| 0)?;
        let runs = self.runs.clone();
        ctx.use_effect(None::<()>, move || {
            runs.set(runs.get() + 1);
            EffectCleanup::none()
        })?;
        if !self.skip_ref.get() {
            ctx.use_ref(|| 0)?;
        }
        Ok(VNode::element("div").text("steady").into())
    }
}

#[cfg(debug_assertions)]
#[test]
fn effects_of_a_rejected_render_never_run() {
    let (host, runtime, container) = setup();
    let skip_ref = Rc::new(Cell::new(false));
    let runs = Rc::new(Cell::new(0));
    let instance = runtime.create_component(Shrinking {
        skip_ref: skip_ref.clone(),
        runs: runs.clone(),
    });
    instance.mount(container).unwrap();
    runtime.run_microtasks();
    assert_eq!(runs.get(), 1);

    skip_ref.set(true);
    instance.update().unwrap();
    runtime.run_microtasks();
    let root = instance.root_element().unwrap();
    assert_eq!(
        host.borrow().attribute(root, "class").as_deref(),
        Some("render-error")
    );
    assert_eq!(runs.get(), 1);

    skip_ref.set(false);
    instance.update().unwrap();
    runtime.run_microtasks();
    assert_eq!(host.borrow().text_content(container), "steady");
    assert_eq!(runs.get(), 2);
}
