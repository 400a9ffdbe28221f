#![doc = r"Hooks runtime, positional reconciler and host renderer for Ripple."]

pub mod collections;
pub mod component;
pub mod error;
pub mod frame_clock;
pub mod hooks;
pub mod host;
pub mod platform;
pub mod reconciler;
pub mod renderer;
pub mod runtime;
pub mod scheduler;
pub mod value;
pub mod vnode;

pub use component::{Component, ComponentHandle, ComponentId, ComponentInstance, LifecycleState};
pub use error::{RenderError, RuntimeError};
pub use frame_clock::{FrameCallbackRegistration, FrameClock};
pub use hooks::{
    EffectCleanup, HookError, HookKind, HookTable, Identity, MutableRef, RenderContext,
    StateSetter,
};
pub use host::{HostError, HostNodeId, HostTree, MemoryHost, SharedHost};
pub use platform::{Clock, RuntimeScheduler};
pub use reconciler::{diff_props, Patch, PropChanges, Reconciler, UpdatePayload};
pub use renderer::{PatchSummary, Renderer};
pub use runtime::{DefaultScheduler, Runtime, RuntimeHandle};
pub use scheduler::UpdateScheduler;
pub use value::{props, ElementRef, Event, EventHandler, PropValue, Props, RefTarget, StyleMap};
pub use vnode::{error_view, ComponentFn, ElementBuilder, Key, NodeKind, Renderable, VNode};

pub type FrameCallbackId = u64;
