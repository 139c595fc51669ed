// src/dag/batcher.rs

//! Wave computation.
//!
//! A wave is every step that has not run yet and whose dependencies all
//! have a result in [`PastSteps`]. Batching is maximal-width: a ready step
//! is never held back because other steps are ready too.

use std::collections::HashSet;

use tracing::{debug, trace};

use crate::dag::model::{PastSteps, Plan, StepRecord};
use crate::errors::{PlanexecError, Result};
use crate::types::StepId;

/// Ids of the steps that can run now, in plan order.
///
/// Pure: recomputed from `(plan, past_steps)` on every call, which is what
/// makes resuming from a checkpoint safe.
pub fn compute_next_batch(plan: &Plan, past_steps: &PastSteps) -> Vec<StepId> {
    let mut ready = Vec::new();

    for step in plan.steps.iter() {
        if step.completed || past_steps.contains(&step.id) {
            trace!(step_id = %step.id, "batcher: already executed; skipping");
            continue;
        }

        if step.dependencies.iter().all(|dep| past_steps.contains(dep)) {
            ready.push(step.id.clone());
        }
    }

    debug!(?ready, "batcher: computed next wave");
    ready
}

/// Like [`compute_next_batch`], but an empty wave on an unfinished plan is
/// reported as a [`PlanexecError::SchedulingInvariant`].
pub fn require_next_batch(plan: &Plan, past_steps: &PastSteps) -> Result<Vec<StepId>> {
    let batch = compute_next_batch(plan, past_steps);
    if batch.is_empty() && !all_executed(plan, past_steps) {
        let blocked: Vec<&str> = plan
            .steps
            .iter()
            .filter(|s| !s.completed && !past_steps.contains(&s.id))
            .map(|s| s.id.as_str())
            .collect();
        return Err(PlanexecError::SchedulingInvariant(format!(
            "no step is ready but {} step(s) have not run: {}",
            blocked.len(),
            blocked.join(", ")
        )));
    }
    Ok(batch)
}

/// Simulate the remaining waves without executing anything.
///
/// Each wave is assumed to succeed before the next is computed. Used by
/// `--dry-run` and by tests that compare resumed and uninterrupted runs.
pub fn plan_waves(plan: &Plan, past_steps: &PastSteps) -> Result<Vec<Vec<StepId>>> {
    let mut simulated = past_steps.clone();
    let mut done: HashSet<&str> = plan
        .steps
        .iter()
        .filter(|s| s.completed)
        .map(|s| s.id.as_str())
        .collect();

    let mut waves = Vec::new();
    loop {
        let remaining = plan
            .steps
            .iter()
            .any(|s| !done.contains(s.id.as_str()) && !simulated.contains(&s.id));
        if !remaining {
            break;
        }

        let mut view = plan.clone();
        for step in view.steps.iter_mut() {
            step.completed = done.contains(step.id.as_str());
        }

        let wave = require_next_batch(&view, &simulated)?;
        for id in wave.iter() {
            if let Some(step) = plan.get(id) {
                done.insert(step.id.as_str());
                simulated.record(
                    id.clone(),
                    StepRecord {
                        description: step.description.clone(),
                        result: String::new(),
                    },
                );
            }
        }
        waves.push(wave);
    }

    Ok(waves)
}

fn all_executed(plan: &Plan, past_steps: &PastSteps) -> bool {
    plan.steps
        .iter()
        .all(|s| s.completed || past_steps.contains(&s.id))
}
