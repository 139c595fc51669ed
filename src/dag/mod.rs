// src/dag/mod.rs

//! Plan model and the pure scheduling functions.
//!
//! - [`model`] holds steps, plans and the record of executed steps.
//! - [`graph`] is an adjacency view of a plan.
//! - [`validate`] checks a candidate plan is a well-formed DAG.
//! - [`batcher`] computes the next wave of ready steps.
//! - [`router`] decides between another wave and aggregation.
//! - [`state`] merges a finished wave into the run state.

pub mod batcher;
pub mod graph;
pub mod model;
pub mod router;
pub mod state;
pub mod validate;

pub use batcher::{compute_next_batch, plan_waves, require_next_batch};
pub use graph::DagGraph;
pub use model::{PastSteps, Plan, Step, StepRecord};
pub use router::{should_continue, Continuation};
pub use state::{apply_wave_results, StepResult};
pub use validate::{validate_plan, validation_feedback, ValidationFailure, ValidationReport};
