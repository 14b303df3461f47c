//! Core model for the step flow editor
//!
//! This crate provides the step type catalog, the workflow graph with its
//! editing invariants, the persisted flow format and the progress event
//! types. It has no execution logic.

pub mod catalog;
mod error;
mod events;
mod flow;
mod graph;
mod registry;
mod render;

pub use error::{FlowError, HandlerError, ImportError, ImportIssue, RegistryError, RunError};
pub use events::{
    EventBus, ProgressEvent, ProgressSink, RunId, RunOutcome, StepProgress, StepStatus,
};
pub use flow::{FlowDocument, FlowEdge, FlowPosition, FlowStep, ImportSummary, FLOW_VERSION};
pub use graph::{
    Edge, EdgeId, Endpoint, GraphSettings, GraphSnapshot, Port, Position, Properties,
    RewirePolicy, Step, StepId, WorkflowGraph,
};
pub use registry::{
    load_catalog_dir, load_catalog_file, EnabledSetProvider, FieldSpec, FieldType,
    StepTypeDefinition, TypeRegistry, START_CATEGORY,
};
pub use render::Renderer;

/// Result type for flow operations
pub type Result<T> = std::result::Result<T, FlowError>;
