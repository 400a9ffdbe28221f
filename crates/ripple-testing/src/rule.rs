use std::cell::{Ref, RefCell, RefMut};
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use ripple_core::{
    Component, ComponentInstance, HostNodeId, HostTree, MemoryHost, Props, Runtime,
    RuntimeError, RuntimeScheduler,
};

use crate::clock::ManualClock;

/// Scheduler that only counts the wake-ups it receives.
#[derive(Debug, Default)]
pub struct RecordingScheduler {
    microtask_requests: AtomicUsize,
    frame_requests: AtomicUsize,
}

impl RecordingScheduler {
    pub fn microtask_requests(&self) -> usize {
        self.microtask_requests.load(Ordering::SeqCst)
    }

    pub fn frame_requests(&self) -> usize {
        self.frame_requests.load(Ordering::SeqCst)
    }
}

impl RuntimeScheduler for RecordingScheduler {
    fn schedule_microtasks(&self) {
        self.microtask_requests.fetch_add(1, Ordering::SeqCst);
    }

    fn schedule_frame(&self) {
        self.frame_requests.fetch_add(1, Ordering::SeqCst);
    }
}

/// Headless harness for exercising components in tests.
///
/// Owns an in-memory host with a single container element, a runtime wired
/// to a [`RecordingScheduler`], and a [`ManualClock`]. Nothing runs until the
/// test pumps the microtask queue or advances a frame.
pub struct RuntimeTestRule {
    host: Rc<RefCell<MemoryHost>>,
    runtime: Runtime,
    scheduler: Arc<RecordingScheduler>,
    clock: ManualClock,
    container: HostNodeId,
}

impl RuntimeTestRule {
    pub fn new() -> Self {
        let (host, shared) = MemoryHost::shared();
        let container = host.borrow_mut().create_element("body");
        let scheduler = Arc::new(RecordingScheduler::default());
        let runtime = Runtime::with_scheduler(shared, scheduler.clone());
        Self {
            host,
            runtime,
            scheduler,
            clock: ManualClock::new(),
            container,
        }
    }

    /// Creates `component` and mounts it at the end of the container.
    pub fn mount(&self, component: impl Component) -> Result<ComponentInstance, RuntimeError> {
        self.mount_with_state(component, Props::new())
    }

    pub fn mount_with_state(
        &self,
        component: impl Component,
        state: Props,
    ) -> Result<ComponentInstance, RuntimeError> {
        let instance = self.runtime.create_component_with_state(component, state);
        instance.mount(self.container)?;
        Ok(instance)
    }

    /// Runs microtasks until the queue stays empty. Returns how many ran.
    pub fn pump_until_idle(&self) -> usize {
        let mut total = 0;
        loop {
            let ran = self.runtime.run_microtasks();
            if ran == 0 {
                break;
            }
            total += ran;
        }
        total
    }

    /// Advances the clock by `frame_millis`, runs the frame callbacks at the
    /// new time and then pumps until idle.
    pub fn advance_frame(&self, frame_millis: u64) -> usize {
        self.clock.advance_millis(frame_millis);
        let ran = self.runtime.drain_frame_callbacks(self.clock.frame_nanos());
        self.pump_until_idle();
        ran
    }

    /// Dispatches `event` on the first element under the container whose
    /// `name` attribute equals `value`, then pumps until idle.
    pub fn dispatch_on(&self, name: &str, value: &str, event: &str) -> usize {
        let target = self.host.borrow().find_by_attribute(self.container, name, value);
        let Some(target) = target else {
            return 0;
        };
        let dispatched = self.host.borrow().dispatch_event(target, event);
        self.pump_until_idle();
        dispatched
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    pub fn scheduler(&self) -> &RecordingScheduler {
        &self.scheduler
    }

    pub fn clock(&self) -> &ManualClock {
        &self.clock
    }

    pub fn container(&self) -> HostNodeId {
        self.container
    }

    pub fn host(&self) -> Ref<'_, MemoryHost> {
        self.host.borrow()
    }

    pub fn host_mut(&self) -> RefMut<'_, MemoryHost> {
        self.host.borrow_mut()
    }

    /// Concatenated text of everything mounted in the container.
    pub fn text(&self) -> String {
        self.host.borrow().text_content(self.container)
    }

    pub fn dump_tree(&self) -> String {
        self.host.borrow().dump_tree(Some(self.container))
    }

    pub fn is_idle(&self) -> bool {
        self.runtime.is_idle()
    }
}

impl Default for RuntimeTestRule {
    fn default() -> Self {
        Self::new()
    }
}

/// Convenience helper for tests that only need temporary access to a
/// `RuntimeTestRule`.
pub fn run_test_runtime<R>(f: impl FnOnce(&mut RuntimeTestRule) -> R) -> R {
    let mut rule = RuntimeTestRule::new();
    f(&mut rule)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ripple_core::{RenderContext, RenderError, Renderable, VNode};

    struct Label;

    impl Component for Label {
        fn render(&self, ctx: &mut RenderContext<'_>) -> Result<Renderable, RenderError> {
            let (count, set_count) = ctx.use_state(|| 0)?;
            if count < 2 {
                set_count.set(count + 1);
            }
            Ok(VNode::element("span").text(format!("n={count}")).into())
        }
    }

    #[test]
    fn mount_and_pump_until_idle() {
        run_test_runtime(|rule| {
            let instance = rule.mount(Label).expect("mount");
            assert!(instance.is_mounted());
            assert_eq!(rule.text(), "n=0");
            assert!(rule.scheduler().microtask_requests() >= 1);

            assert!(rule.pump_until_idle() > 0);
            assert_eq!(rule.text(), "n=2");
            assert!(rule.is_idle());
            assert_eq!(rule.pump_until_idle(), 0);
        });
    }

    #[test]
    fn advance_frame_runs_callbacks_at_clock_time() {
        let rule = RuntimeTestRule::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let log = seen.clone();
        rule.runtime()
            .frame_clock()
            .with_frame_millis(move |millis| log.borrow_mut().push(millis))
            .detach();
        assert_eq!(rule.scheduler().frame_requests(), 1);

        assert_eq!(rule.advance_frame(16), 1);
        assert_eq!(*seen.borrow(), vec![16]);
        assert_eq!(rule.advance_frame(16), 0);
    }
}
