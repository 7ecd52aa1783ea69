// src/errors.rs

//! Crate-wide error aliases and helpers.

use thiserror::Error;

use crate::plan::{PhaseStatus, PlanStatus};

#[derive(Error, Debug)]
pub enum PhasedagError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Duplicate task id: {0}")]
    DuplicateTask(String),

    #[error("task '{task}' depends on unknown task '{dependency}'")]
    UnknownDependency { task: String, dependency: String },

    #[error("Cycle detected in dependency graph: {0}")]
    DagCycle(String),

    /// The graph or sort reached a state that earlier validation should
    /// have made impossible.
    #[error("Internal consistency error: {0}")]
    Internal(String),

    #[error("plan '{plan_id}' cannot move from {from:?} to {to:?}")]
    InvalidPlanTransition {
        plan_id: String,
        from: PlanStatus,
        to: PlanStatus,
    },

    #[error("phase '{phase_id}' cannot move from {from:?} to {to:?}")]
    InvalidPhaseTransition {
        phase_id: String,
        from: PhaseStatus,
        to: PhaseStatus,
    },

    #[error("plan '{plan_id}' is {status:?}; phases only run while it is executing")]
    PlanNotExecuting { plan_id: String, status: PlanStatus },

    #[error("Phase not found: {0}")]
    PhaseNotFound(String),

    #[error("phase '{0}' requires approval before it can be queued")]
    ApprovalRequired(String),

    #[error("Invalid checkpoint id: {0:?}")]
    InvalidCheckpointId(String),

    #[error("checkpoint {operation} failed for '{id}': {source}")]
    Checkpoint {
        operation: &'static str,
        id: String,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl PhasedagError {
    /// Wrap an I/O failure with the checkpoint operation and id it belongs to.
    pub fn checkpoint(operation: &'static str, id: impl Into<String>, source: std::io::Error) -> Self {
        PhasedagError::Checkpoint {
            operation,
            id: id.into(),
            source,
        }
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, PhasedagError>;
