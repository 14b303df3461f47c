//! Built-in step actions
//!
//! A small action library dispatched by step type id. Types without a
//! registered action fall back to a stub that reports success.

mod basic;
mod browser;
mod files;
mod handlers;
mod stub;

pub use basic::RunFlowAction;
pub use browser::OpenPageAction;
pub use files::WriteTextAction;
pub use handlers::{Action, ActionHandlers, DEFAULT_LATENCY};
pub use stub::StubAction;

use std::sync::Arc;
use stepcore::{HandlerError, Properties};

/// Register all standard actions
pub fn register_all(handlers: &mut ActionHandlers) {
    let latency = handlers.latency();
    handlers.register(Arc::new(browser::OpenPageAction));
    handlers.register(Arc::new(files::WriteTextAction::new(latency)));
    handlers.register(Arc::new(basic::RunFlowAction));
}

/// Non-empty string property, or `MissingProperty`
pub(crate) fn require_str<'a>(props: &'a Properties, key: &str) -> Result<&'a str, HandlerError> {
    props
        .get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| HandlerError::MissingProperty(key.to_string()))
}
