//! Step flow execution runtime
//!
//! This crate provides the engine that runs a graph snapshot in dependency
//! order, the coalescing update scheduler used for canvas redraws, and the
//! session that ties a graph, its registry and the active run together.

mod executor;
mod handler;
mod render;
mod runtime;
mod scheduler;

pub use executor::{ExecutionEngine, RunPhase, RunReport};
pub use handler::{StepHandler, StepOutcome};
pub use render::{Canvas, CoalescedRenderer, CANVAS_BOUNDS, EDGE_GEOMETRY};
pub use runtime::{FlowSession, SessionConfig};
pub use scheduler::{ManualTicks, TickId, TickSource, TickTask, TokioTicks, UpdateScheduler};
