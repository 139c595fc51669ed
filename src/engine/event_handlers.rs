// src/engine/event_handlers.rs

//! Event handling logic for the core runtime.
//!
//! Every handler takes the run state, applies one event and returns the
//! commands the IO shell has to execute next. A handler returning `Err`
//! moves the run to [`RunPhase::Failed`] (see [`CoreRuntime::step`]).
//!
//! [`CoreRuntime::step`]: crate::engine::CoreRuntime::step

use std::collections::HashSet;

use tracing::{debug, info, warn};

use crate::dag::{
    apply_wave_results, require_next_batch, should_continue, validate_plan, validation_feedback,
    Continuation, PastSteps, Plan, StepResult, ValidationReport,
};
use crate::engine::core::RunState;
use crate::engine::{RunPhase, RuntimeOptions};
use crate::errors::{PlanexecError, Result};
use crate::exec::Wave;
use crate::store::Checkpoint;

/// Command produced by the pure core, to be executed by the outer IO shell.
#[derive(Debug, Clone)]
pub enum CoreCommand {
    /// Ask the planner for free-text steps.
    GeneratePlan { objective: String },
    /// Ask the dependency analyzer for a DAG over `steps`.
    AnalyzeSteps {
        steps: Vec<String>,
        /// Rendered validator errors from the previous attempt.
        feedback: Option<String>,
        /// 1-based attempt number.
        attempt: u32,
    },
    /// Fan the wave out and report back with `WaveFinished`.
    DispatchWave(Wave),
    /// Ask the aggregator for the final artifact.
    Aggregate { combined_context: String },
    /// Persist the run state.
    SaveCheckpoint(Checkpoint),
}

/// Decision returned by the core after handling a single `RunEvent`.
#[derive(Debug, Clone)]
pub struct CoreStep {
    /// Commands the IO shell should execute, in order.
    pub commands: Vec<CoreCommand>,
    /// Whether the outer runtime loop should keep running.
    pub keep_running: bool,
}

impl CoreStep {
    pub(crate) fn proceed(commands: Vec<CoreCommand>) -> Self {
        Self {
            commands,
            keep_running: true,
        }
    }

    pub(crate) fn stop() -> Self {
        Self {
            commands: Vec::new(),
            keep_running: false,
        }
    }
}

/// Kick off (or resume) the run from whatever phase it is in.
pub fn handle_start(state: &mut RunState) -> Result<CoreStep> {
    info!(run_id = %state.run_id, phase = %state.phase, "starting run");

    match state.phase {
        RunPhase::Planning => Ok(CoreStep::proceed(vec![CoreCommand::GeneratePlan {
            objective: state.objective.clone(),
        }])),
        RunPhase::Validating => {
            state.analysis_attempts = 0;
            Ok(CoreStep::proceed(vec![next_analysis(state, None)]))
        }
        RunPhase::Batching => schedule_next(state),
        RunPhase::Aggregating => Ok(CoreStep::proceed(vec![begin_aggregation(state)?])),
        RunPhase::Done => Ok(CoreStep::stop()),
        RunPhase::Dispatching | RunPhase::Failed => Err(unexpected(state, "Start")),
    }
}

/// Record the planner's steps and ask for the first DAG.
pub fn handle_planned(state: &mut RunState, steps: Vec<String>) -> Result<CoreStep> {
    expect_phase(state, RunPhase::Planning, "Planned")?;

    let steps: Vec<String> = steps
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    if steps.is_empty() {
        return Err(PlanexecError::PlanningError(
            "planner returned no steps".to_string(),
        ));
    }

    info!(run_id = %state.run_id, steps = steps.len(), "plan generated");
    state.planned_steps = steps;
    state.phase = RunPhase::Validating;
    state.analysis_attempts = 0;

    Ok(CoreStep::proceed(vec![
        CoreCommand::SaveCheckpoint(state.checkpoint()),
        next_analysis(state, None),
    ]))
}

/// Validate a candidate DAG; either start batching or retry the analyzer
/// with feedback until the attempt budget runs out.
pub fn handle_analyzed(
    state: &mut RunState,
    options: &RuntimeOptions,
    mut plan: Plan,
) -> Result<CoreStep> {
    expect_phase(state, RunPhase::Validating, "Analyzed")?;
    state.analysis_attempts += 1;
    let attempt = state.analysis_attempts;

    let rejected = if plan.is_empty() {
        Some(vec!["Plan contains no steps".to_string()])
    } else {
        match validate_plan(&plan) {
            ValidationReport::Valid => None,
            ValidationReport::Invalid { errors, .. } => Some(errors),
        }
    };

    match rejected {
        None => {
            for step in plan.steps.iter_mut() {
                step.completed = false;
                let mut seen = HashSet::new();
                step.dependencies.retain(|dep| seen.insert(dep.clone()));
            }
            info!(
                run_id = %state.run_id,
                attempt,
                steps = plan.len(),
                "plan validated"
            );
            state.plan = Some(plan);
            state.past_steps = PastSteps::new();
            state.phase = RunPhase::Batching;

            let mut commands = vec![CoreCommand::SaveCheckpoint(state.checkpoint())];
            let mut next = schedule_next(state)?;
            commands.append(&mut next.commands);
            Ok(CoreStep::proceed(commands))
        }
        Some(errors) => {
            if attempt >= options.max_plan_attempts {
                return Err(PlanexecError::PlanValidation {
                    attempts: attempt,
                    errors,
                });
            }
            warn!(
                run_id = %state.run_id,
                attempt,
                max_attempts = options.max_plan_attempts,
                ?errors,
                "invalid plan; asking the analyzer again"
            );
            let feedback = validation_feedback(&errors);
            Ok(CoreStep::proceed(vec![next_analysis(state, Some(feedback))]))
        }
    }
}

/// Merge a finished wave and route to the next wave or to aggregation.
pub fn handle_wave_finished(
    state: &mut RunState,
    wave: u32,
    results: Vec<StepResult>,
) -> Result<CoreStep> {
    expect_phase(state, RunPhase::Dispatching, "WaveFinished")?;
    if wave != state.waves + 1 {
        return Err(PlanexecError::SchedulingInvariant(format!(
            "wave {} finished but wave {} was in flight",
            wave,
            state.waves + 1
        )));
    }

    let plan = current_plan(state)?.clone();
    let (plan, past_steps) =
        apply_wave_results(plan, std::mem::take(&mut state.past_steps), results)?;

    info!(
        run_id = %state.run_id,
        wave,
        completed = plan.completed_count(),
        total = plan.len(),
        "wave merged"
    );
    state.plan = Some(plan);
    state.past_steps = past_steps;
    state.waves = wave;
    state.phase = RunPhase::Batching;

    let mut commands = vec![CoreCommand::SaveCheckpoint(state.checkpoint())];
    let mut next = schedule_next(state)?;
    commands.append(&mut next.commands);
    Ok(CoreStep::proceed(commands))
}

/// Store the final output; the run is done.
pub fn handle_aggregated(state: &mut RunState, output: String) -> Result<CoreStep> {
    expect_phase(state, RunPhase::Aggregating, "Aggregated")?;

    info!(run_id = %state.run_id, waves = state.waves, "run complete");
    state.output = Some(output);
    state.phase = RunPhase::Done;

    Ok(CoreStep {
        commands: vec![CoreCommand::SaveCheckpoint(state.checkpoint())],
        keep_running: false,
    })
}

/// Text handed to the aggregator: every step result in plan order, separated
/// by blank lines.
pub fn aggregation_context(plan: &Plan, past_steps: &PastSteps) -> String {
    plan.steps
        .iter()
        .filter_map(|s| past_steps.get(&s.id))
        .map(|rec| rec.result.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Compute the next wave, or move on to aggregation when the plan is done.
fn schedule_next(state: &mut RunState) -> Result<CoreStep> {
    let plan = current_plan(state)?;

    if should_continue(plan) == Continuation::Done {
        return Ok(CoreStep::proceed(vec![begin_aggregation(state)?]));
    }

    let batch = require_next_batch(plan, &state.past_steps)?;
    if batch.is_empty() {
        return Err(PlanexecError::SchedulingInvariant(format!(
            "plan has {} incomplete step(s) but every step already has a result",
            plan.len() - plan.completed_count()
        )));
    }

    let wave = Wave::build(state.waves + 1, &batch, plan, &state.past_steps)?;
    debug!(run_id = %state.run_id, wave = wave.index, steps = ?batch, "next wave");
    state.phase = RunPhase::Dispatching;
    Ok(CoreStep::proceed(vec![CoreCommand::DispatchWave(wave)]))
}

fn begin_aggregation(state: &mut RunState) -> Result<CoreCommand> {
    let combined_context = aggregation_context(current_plan(state)?, &state.past_steps);
    state.phase = RunPhase::Aggregating;
    Ok(CoreCommand::Aggregate { combined_context })
}

fn next_analysis(state: &RunState, feedback: Option<String>) -> CoreCommand {
    CoreCommand::AnalyzeSteps {
        steps: state.planned_steps.clone(),
        feedback,
        attempt: state.analysis_attempts + 1,
    }
}

fn current_plan(state: &RunState) -> Result<&Plan> {
    state.plan.as_ref().ok_or_else(|| {
        PlanexecError::SchedulingInvariant(format!(
            "run '{}' has no validated plan in phase {}",
            state.run_id, state.phase
        ))
    })
}

fn expect_phase(state: &RunState, expected: RunPhase, event: &str) -> Result<()> {
    if state.phase == expected {
        Ok(())
    } else {
        Err(unexpected(state, event))
    }
}

fn unexpected(state: &RunState, event: &str) -> PlanexecError {
    PlanexecError::SchedulingInvariant(format!(
        "event {} is not valid in phase {}",
        event, state.phase
    ))
}
