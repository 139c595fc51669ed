// src/engine/mod.rs

//! Orchestration engine for planexec.
//!
//! This module ties together:
//! - the plan/validate/batch/dispatch/aggregate state machine
//! - checkpointing after every phase boundary
//! - cancellation of a running plan
//!
//! The pure core state machine lives in [`core`] (with the per-event logic
//! in [`event_handlers`]); the async/IO shell that calls collaborators and
//! the checkpoint store is implemented in [`runtime`]. [`scheduler`] is the
//! public entry point that owns collaborators and tracks active runs.

use std::fmt;

use crate::dag::{Plan, StepResult};
use crate::errors::PlanexecError;
use crate::exec::DispatchOptions;
use crate::types::RunId;

/// Phase of a single run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    /// Waiting for the planner to produce free-text steps.
    Planning,
    /// Waiting for the dependency analyzer to produce a valid DAG.
    Validating,
    /// Computing the next wave.
    Batching,
    /// A wave is in flight.
    Dispatching,
    /// Every step finished; waiting for the aggregator.
    Aggregating,
    Done,
    Failed,
}

impl RunPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunPhase::Done | RunPhase::Failed)
    }
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunPhase::Planning => "planning",
            RunPhase::Validating => "validating",
            RunPhase::Batching => "batching",
            RunPhase::Dispatching => "dispatching",
            RunPhase::Aggregating => "aggregating",
            RunPhase::Done => "done",
            RunPhase::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Runtime options used by both the core and the async shell.
#[derive(Debug, Clone, Copy)]
pub struct RuntimeOptions {
    /// How many analyzer attempts a run gets before validation is fatal.
    pub max_plan_attempts: u32,
    pub dispatch: DispatchOptions,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            max_plan_attempts: 2,
            dispatch: DispatchOptions::default(),
        }
    }
}

/// Events flowing into the core from the IO shell.
#[derive(Debug)]
pub enum RunEvent {
    /// Kick off (or resume) the run from its current phase.
    Start,
    /// The planner returned its free-text steps.
    Planned(Vec<String>),
    /// The dependency analyzer returned a candidate plan.
    Analyzed(Plan),
    /// Every request of a wave returned successfully.
    WaveFinished { wave: u32, results: Vec<StepResult> },
    /// The aggregator produced the final artifact.
    Aggregated(String),
    /// A collaborator call or checkpoint write failed.
    Failed(PlanexecError),
    /// The run's cancellation token fired.
    Cancelled,
}

/// Result of a successful run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    pub run_id: RunId,
    /// Output of the aggregator.
    pub output: String,
    /// Number of waves the run took (including waves from before a resume).
    pub waves: u32,
}

pub mod core;
pub mod event_handlers;
pub mod runtime;
pub mod scheduler;

pub use core::{CoreRuntime, RunState};
pub use event_handlers::{aggregation_context, CoreCommand, CoreStep};
pub use runtime::Runtime;
pub use scheduler::Scheduler;
