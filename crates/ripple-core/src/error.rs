use thiserror::Error;

use crate::component::{ComponentId, LifecycleState};
use crate::hooks::HookError;
use crate::host::HostError;

/// Failure produced while rendering a component or a function component.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error(transparent)]
    Hook(#[from] HookError),
    #[error(transparent)]
    Host(#[from] HostError),
    #[error("{0}")]
    Message(String),
}

impl RenderError {
    pub fn msg(message: impl Into<String>) -> Self {
        RenderError::Message(message.into())
    }
}

/// Failure surfaced by the lifecycle operations `mount`, `update` and `unmount`.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Host(#[from] HostError),
    #[error("component {id} cannot {operation} while {state:?}")]
    InvalidLifecycle {
        id: ComponentId,
        operation: &'static str,
        state: LifecycleState,
    },
    #[error("runtime has been dropped")]
    RuntimeDropped,
}
