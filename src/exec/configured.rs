// src/exec/configured.rs

//! Collaborators backed by a fixed, config-supplied plan.

use anyhow::Result;
use tracing::debug;

use crate::dag::Plan;
use crate::exec::backend::{Aggregator, BoxFuture, DependencyAnalyzer, Planner};

/// Planner that always returns the descriptions of a fixed plan.
#[derive(Debug, Clone)]
pub struct ConfiguredPlanner {
    plan: Plan,
}

impl ConfiguredPlanner {
    pub fn new(plan: Plan) -> Self {
        Self { plan }
    }
}

impl Planner for ConfiguredPlanner {
    fn generate<'a>(&'a self, objective: &'a str) -> BoxFuture<'a, Result<Vec<String>>> {
        Box::pin(async move {
            debug!(objective = %objective, steps = self.plan.len(), "using configured plan");
            Ok(self
                .plan
                .steps
                .iter()
                .map(|s| s.description.clone())
                .collect())
        })
    }
}

/// Analyzer that returns the dependencies declared with `after = [...]`.
///
/// The plan is validated when the config is loaded, so validation feedback
/// is never needed; it is logged and ignored.
#[derive(Debug, Clone)]
pub struct ConfiguredAnalyzer {
    plan: Plan,
}

impl ConfiguredAnalyzer {
    pub fn new(plan: Plan) -> Self {
        Self { plan }
    }
}

impl DependencyAnalyzer for ConfiguredAnalyzer {
    fn analyze<'a>(
        &'a self,
        steps: &'a [String],
        feedback: Option<&'a str>,
    ) -> BoxFuture<'a, Result<Plan>> {
        Box::pin(async move {
            if let Some(fb) = feedback {
                debug!(feedback = %fb, "configured analyzer ignores validation feedback");
            }
            if steps.len() != self.plan.len() {
                anyhow::bail!(
                    "planner produced {} step(s) but the configured plan has {}",
                    steps.len(),
                    self.plan.len()
                );
            }
            Ok(self.plan.clone())
        })
    }
}

/// Aggregator that returns the combined step results unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConcatAggregator;

impl Aggregator for ConcatAggregator {
    fn synthesize<'a>(&'a self, combined_context: &'a str) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move { Ok(combined_context.to_string()) })
    }
}
