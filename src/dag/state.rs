// src/dag/state.rs

//! Deterministic merge of a finished wave into the run state.

use tracing::{debug, warn};

use crate::dag::model::{PastSteps, Plan, StepRecord};
use crate::errors::{PlanexecError, Result};
use crate::types::StepId;

/// Output of one executed step, produced by the step executor and merged by
/// [`apply_wave_results`] once the whole wave has returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepResult {
    pub step_id: StepId,
    /// The step text the runner was given.
    pub description: String,
    pub output: String,
    /// How many runner calls it took (1 unless retries kicked in).
    pub attempts: u32,
}

/// Merge the results of one wave into `(plan, past_steps)`.
///
/// Rules:
/// - a result for a step with no record yet appends a record and marks the
///   step completed;
/// - a result for a step that already has a record replaces it (last writer
///   wins) and leaves the step completed;
/// - a result for a step id that is not in the plan is an invariant
///   violation and nothing is merged;
/// - `completed` never goes back to `false`.
pub fn apply_wave_results(
    mut plan: Plan,
    mut past_steps: PastSteps,
    results: Vec<StepResult>,
) -> Result<(Plan, PastSteps)> {
    if let Some(unknown) = results.iter().find(|r| !plan.contains(&r.step_id)) {
        return Err(PlanexecError::SchedulingInvariant(format!(
            "result for step '{}' which is not part of the plan",
            unknown.step_id
        )));
    }

    for result in results {
        let record = StepRecord {
            description: result.description,
            result: result.output,
        };

        if past_steps.record(result.step_id.clone(), record).is_some() {
            warn!(step_id = %result.step_id, "step result replaced an existing record");
        } else {
            debug!(step_id = %result.step_id, attempts = result.attempts, "recorded step result");
        }

        for step in plan.steps.iter_mut().filter(|s| s.id == result.step_id) {
            step.completed = true;
        }
    }

    Ok((plan, past_steps))
}
