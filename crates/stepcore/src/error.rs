use crate::StepId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FlowError {
    #[error("Import error: {0}")]
    Import(#[from] ImportError),

    #[error("Run error: {0}")]
    Run(#[from] RunError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("A run is already in progress")]
    RunInProgress,
}

/// Raised when a flow payload is rejected as a whole. Nothing is applied.
#[derive(Error, Debug)]
pub enum ImportError {
    #[error("Malformed JSON: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Invalid flow: {0}")]
    Validation(String),
}

/// A single entry skipped during an otherwise successful import.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ImportIssue {
    #[error("Step at index {index} is not an object")]
    NotAnObject { index: usize },

    #[error("Step at index {index} has no typeId")]
    MissingType { index: usize },

    #[error("Step at index {index} references unknown type '{type_id}'")]
    UnresolvedType { index: usize, type_id: String },

    #[error("Step at index {index} reuses id '{id}'")]
    DuplicateId { index: usize, id: StepId },

    #[error("Edge at index {index} was dropped: {reason}")]
    DroppedEdge { index: usize, reason: String },
}

/// Why a run stopped before completing
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RunError {
    #[error("Graph is not a DAG: {} step(s) could not be ordered", unscheduled.len())]
    Cycle { unscheduled: Vec<StepId> },

    #[error("Step {step_id} failed: {message}")]
    Handler { step_id: StepId, message: String },

    #[error("Run cancelled")]
    Cancelled,
}

/// Failure reported by a step handler.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum HandlerError {
    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Missing required property: {0}")]
    MissingProperty(String),

    #[error("No handler for step type: {0}")]
    UnknownType(String),
}

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Duplicate step type: {0}")]
    DuplicateType(String),

    #[error("Failed to read catalog: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse catalog: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Enabled-set provider failed: {0}")]
    Provider(String),
}
