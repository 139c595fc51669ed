// src/errors.rs

//! Crate-wide error type and helpers.

use thiserror::Error;

use crate::types::{RunId, StepId};

#[derive(Error, Debug)]
pub enum PlanexecError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Cycle detected in DAG: {0}")]
    DagCycle(String),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("TOML serialization error: {0}")]
    TomlSerializeError(#[from] toml::ser::Error),

    /// The planner or dependency analyzer could not produce a candidate plan.
    #[error("Planning failed: {0}")]
    PlanningError(String),

    /// The analyzer never produced a valid DAG within the attempt budget.
    #[error("Plan still invalid after {attempts} attempt(s): {}", .errors.join(", "))]
    PlanValidation { attempts: u32, errors: Vec<String> },

    /// The batcher found nothing to run while the plan is incomplete.
    #[error("Scheduling invariant violated: {0}")]
    SchedulingInvariant(String),

    #[error("Step '{step_id}' failed: {source:#}")]
    StepExecution {
        step_id: StepId,
        #[source]
        source: anyhow::Error,
    },

    /// Final synthesis failed; every step output is still checkpointed.
    #[error("Aggregation failed: {0:#}")]
    Aggregation(#[source] anyhow::Error),

    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    #[error("Run '{run_id}' was cancelled")]
    Cancelled { run_id: RunId },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl PlanexecError {
    /// Short name of the phase this error belongs to, for logs and CLI output.
    pub fn phase(&self) -> &'static str {
        match self {
            PlanexecError::ConfigError(_)
            | PlanexecError::DagCycle(_)
            | PlanexecError::TomlError(_) => "config",
            PlanexecError::PlanningError(_) => "planning",
            PlanexecError::PlanValidation { .. } => "validating",
            PlanexecError::SchedulingInvariant(_) => "batching",
            PlanexecError::StepExecution { .. } => "dispatching",
            PlanexecError::Aggregation(_) => "aggregating",
            PlanexecError::Checkpoint(_)
            | PlanexecError::TomlSerializeError(_)
            | PlanexecError::IoError(_) => "checkpoint",
            PlanexecError::Cancelled { .. } => "cancelled",
            PlanexecError::Other(_) => "other",
        }
    }

    /// Step that failed, if this error is tied to one.
    pub fn step_id(&self) -> Option<&str> {
        match self {
            PlanexecError::StepExecution { step_id, .. } => Some(step_id),
            _ => None,
        }
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, PlanexecError>;
