use std::cell::RefCell;
use std::rc::Rc;
use std::thread;
use std::time::Duration;

use ripple_core::{
    Component, EffectCleanup, EventHandler, HostTree, MemoryHost, RenderContext, RenderError,
    Renderable, VNode,
};
use ripple_perf::{MemoizeOptions, Priority};
use ripple_runtime_std::StdRuntime;

const CLICKS: usize = 3;

struct Counter {
    history: Rc<RefCell<Vec<i64>>>,
}

impl Component for Counter {
    fn render(&self, ctx: &mut RenderContext<'_>) -> Result<Renderable, RenderError> {
        let (count, set_count) = ctx.use_state(|| 0i64)?;

        let history = self.history.clone();
        ctx.use_effect(Some(count), move || {
            if count > 0 {
                history.borrow_mut().push(count);
                log::info!("count changed to {count}");
            }
            EffectCleanup::none()
        })?;

        let increment = ctx.use_memo((), move || {
            EventHandler::new(move |_| {
                set_count.update(|count| count + 1);
            })
        })?;

        Ok(VNode::element("div")
            .class_name("counter")
            .child(
                VNode::element("button")
                    .prop("id", "increment")
                    .on("click", increment)
                    .text("Increment")
                    .build(),
            )
            .child(
                VNode::element("span")
                    .prop("id", "count")
                    .text(count.to_string())
                    .build(),
            )
            .into())
    }
}

fn main() {
    env_logger::init();

    println!("=== Ripple Counter Example ===");
    println!("Clicks the increment button {CLICKS} times on a headless host and");
    println!("prints the resulting tree. Set RUST_LOG=debug to watch the runtime.");
    println!();

    let (host, shared) = MemoryHost::shared();
    let body = host.borrow_mut().create_element("body");
    let runtime = StdRuntime::new(shared);
    let perf = runtime.performance_layer().clone();

    let history = Rc::new(RefCell::new(Vec::new()));
    let counter = runtime.runtime().create_component(Counter {
        history: history.clone(),
    });
    counter.mount(body).expect("mount counter");
    runtime.run_until_idle();

    let label = perf.memoize(
        |count: &String| format!("Clicked {count} time(s)"),
        MemoizeOptions::new("counter-label"),
    );
    let report = perf.debounce(
        move |text: String| println!("debounced: {text}"),
        Duration::from_millis(30),
    );

    let button = host
        .borrow()
        .find_by_attribute(body, "id", "increment")
        .expect("increment button");
    for _ in 0..CLICKS {
        host.borrow().dispatch_event(button, "click");
        runtime.run_until_idle();

        let count = host
            .borrow()
            .find_by_attribute(body, "id", "count")
            .map(|span| host.borrow().text_content(span))
            .unwrap_or_default();
        report.call(label.call(&count));
    }

    let frames = Rc::new(RefCell::new(0u32));
    let frame_count = frames.clone();
    perf.schedule_update(Priority::High, move || *frame_count.borrow_mut() += 1);

    while !runtime.is_idle() {
        runtime.tick();
        if let Some(wait) = runtime.time_until_next_timer() {
            thread::sleep(wait);
        }
    }

    println!();
    println!("history: {:?}", history.borrow());
    println!("frame batches: {:?}", perf.batch_stats());
    println!("memo cache: {:?}", perf.memo_cache().stats());
    println!();
    println!("{}", host.borrow().dump_tree(Some(body)));

    counter.unmount().expect("unmount counter");
}
