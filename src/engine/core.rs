// src/engine/core.rs

//! Pure core runtime state machine.
//!
//! This module contains a synchronous, deterministic "core runtime" that
//! consumes [`RunEvent`]s and produces:
//! - an updated run state
//! - a list of [`CoreCommand`]s describing what the IO shell should do next
//!
//! The async shell (`engine::runtime::Runtime`) is responsible for calling
//! collaborators, dispatching waves, writing checkpoints and watching the
//! cancellation token.
//!
//! The core is unit tested without any Tokio, filesystem or collaborators.
//!
//! [`CoreCommand`]: crate::engine::CoreCommand

use tracing::{error, info, warn};

use crate::dag::{PastSteps, Plan};
use crate::engine::event_handlers::{
    handle_aggregated, handle_analyzed, handle_planned, handle_start, handle_wave_finished,
    CoreStep,
};
use crate::engine::{RunEvent, RunOutcome, RunPhase, RuntimeOptions};
use crate::errors::{PlanexecError, Result};
use crate::store::Checkpoint;
use crate::types::RunId;

/// Everything the core knows about one run.
#[derive(Debug, Clone)]
pub struct RunState {
    pub run_id: RunId,
    pub objective: String,
    pub phase: RunPhase,
    pub planned_steps: Vec<String>,
    pub plan: Option<Plan>,
    pub past_steps: PastSteps,
    /// Waves merged so far.
    pub waves: u32,
    /// Analyzer attempts made in the current validation round.
    pub analysis_attempts: u32,
    pub output: Option<String>,
}

impl RunState {
    pub fn new(run_id: RunId, objective: impl Into<String>) -> Self {
        Self {
            run_id,
            objective: objective.into(),
            phase: RunPhase::Planning,
            planned_steps: Vec::new(),
            plan: None,
            past_steps: PastSteps::new(),
            waves: 0,
            analysis_attempts: 0,
            output: None,
        }
    }

    /// Rebuild the state of a run from its last checkpoint.
    ///
    /// - a stored output means the run is done;
    /// - a plan resumes at batching (or aggregation if every step finished);
    /// - planner steps without a plan resume at validation;
    /// - anything else plans from scratch.
    pub fn from_checkpoint(checkpoint: Checkpoint) -> Self {
        let phase = match (&checkpoint.final_output, &checkpoint.plan) {
            (Some(_), _) => RunPhase::Done,
            (None, Some(plan)) if plan.is_complete() => RunPhase::Aggregating,
            (None, Some(_)) => RunPhase::Batching,
            (None, None) if !checkpoint.planned_steps.is_empty() => RunPhase::Validating,
            (None, None) => RunPhase::Planning,
        };

        Self {
            run_id: checkpoint.run_id,
            objective: checkpoint.objective,
            phase,
            planned_steps: checkpoint.planned_steps,
            plan: checkpoint.plan,
            past_steps: checkpoint.past_steps,
            waves: checkpoint.waves_completed,
            analysis_attempts: 0,
            output: checkpoint.final_output,
        }
    }

    /// Snapshot of the durable part of the state.
    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            run_id: self.run_id.clone(),
            objective: self.objective.clone(),
            waves_completed: self.waves,
            final_output: self.output.clone(),
            plan_digest: None,
            planned_steps: self.planned_steps.clone(),
            plan: self.plan.clone(),
            past_steps: self.past_steps.clone(),
        }
        .seal()
    }
}

/// Pure core runtime.
///
/// It has **no** channels, no Tokio types, and does not perform any IO.
#[derive(Debug)]
pub struct CoreRuntime {
    state: RunState,
    options: RuntimeOptions,
    error: Option<PlanexecError>,
}

impl CoreRuntime {
    pub fn new(run_id: RunId, objective: impl Into<String>, options: RuntimeOptions) -> Self {
        Self {
            state: RunState::new(run_id, objective),
            options,
            error: None,
        }
    }

    pub fn resume(checkpoint: Checkpoint, options: RuntimeOptions) -> Self {
        let state = RunState::from_checkpoint(checkpoint);
        info!(
            run_id = %state.run_id,
            phase = %state.phase,
            waves = state.waves,
            recorded = state.past_steps.len(),
            "resuming run from checkpoint"
        );
        Self {
            state,
            options,
            error: None,
        }
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    pub fn phase(&self) -> RunPhase {
        self.state.phase
    }

    pub fn run_id(&self) -> &RunId {
        &self.state.run_id
    }

    /// Handle a single event, updating the run state and returning the
    /// resulting commands for the IO shell.
    ///
    /// Any error moves the run to [`RunPhase::Failed`]; the error is kept
    /// for [`CoreRuntime::finish`]. Events after a terminal phase are
    /// ignored, except a failure reported after `Done` (its last
    /// checkpoint was not written).
    pub fn step(&mut self, event: RunEvent) -> CoreStep {
        let ignored = match (self.state.phase, &event) {
            (_, RunEvent::Start) => false,
            // The final checkpoint write can still fail after the output is in.
            (RunPhase::Done, RunEvent::Failed(_)) => false,
            (phase, _) => phase.is_terminal(),
        };
        if ignored {
            warn!(run_id = %self.state.run_id, phase = %self.state.phase, ?event, "ignoring event after run ended");
            return CoreStep::stop();
        }

        let res = match event {
            RunEvent::Start => handle_start(&mut self.state),
            RunEvent::Planned(steps) => handle_planned(&mut self.state, steps),
            RunEvent::Analyzed(plan) => handle_analyzed(&mut self.state, &self.options, plan),
            RunEvent::WaveFinished { wave, results } => {
                handle_wave_finished(&mut self.state, wave, results)
            }
            RunEvent::Aggregated(output) => handle_aggregated(&mut self.state, output),
            RunEvent::Failed(err) => Err(err),
            RunEvent::Cancelled => Err(PlanexecError::Cancelled {
                run_id: self.state.run_id.clone(),
            }),
        };

        match res {
            Ok(step) => step,
            Err(err) => {
                error!(
                    run_id = %self.state.run_id,
                    phase = %self.state.phase,
                    error = %err,
                    "run failed"
                );
                self.state.phase = RunPhase::Failed;
                self.error = Some(err);
                CoreStep::stop()
            }
        }
    }

    /// Consume the core once the loop stopped.
    pub fn finish(self) -> Result<RunOutcome> {
        if let Some(err) = self.error {
            return Err(err);
        }
        match (self.state.phase, self.state.output) {
            (RunPhase::Done, Some(output)) => Ok(RunOutcome {
                run_id: self.state.run_id,
                output,
                waves: self.state.waves,
            }),
            (phase, _) => Err(PlanexecError::SchedulingInvariant(format!(
                "run '{}' stopped in phase {} without an output",
                self.state.run_id, phase
            ))),
        }
    }
}
