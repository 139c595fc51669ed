// src/dag/router.rs

//! Completion routing after each wave.

use crate::dag::model::Plan;

/// Where the run goes after a wave has been merged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Continuation {
    /// At least one step is still incomplete; compute the next wave.
    More,
    /// Every step is complete; aggregate.
    Done,
}

/// `Done` iff every step in the plan is complete.
pub fn should_continue(plan: &Plan) -> Continuation {
    if plan.is_complete() {
        Continuation::Done
    } else {
        Continuation::More
    }
}
