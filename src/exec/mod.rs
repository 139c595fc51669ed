// src/exec/mod.rs

//! Step execution layer.
//!
//! - [`backend`] defines the collaborator traits (`Planner`,
//!   `DependencyAnalyzer`, `StepRunner`, `Aggregator`) the runtime calls.
//! - [`step_executor`] runs a single step with timeout, retry and
//!   cancellation.
//! - [`dispatcher`] fans a wave out to concurrent step executions and waits
//!   for all of them.
//! - [`command`] implements runner/aggregator on top of shell commands.
//! - [`configured`] implements planner/analyzer from a fixed plan.

pub mod backend;
pub mod command;
pub mod configured;
pub mod dispatcher;
pub mod step_executor;

pub use backend::{
    Aggregator, BoxFuture, Collaborators, DependencyAnalyzer, Planner, StepContext, StepRunner,
};
pub use command::{CommandAggregator, CommandStepRunner};
pub use configured::{ConcatAggregator, ConfiguredAnalyzer, ConfiguredPlanner};
pub use dispatcher::{dispatch_wave, DispatchOptions, Wave};
pub use step_executor::{execute_step, StepPolicy, StepRequest};
