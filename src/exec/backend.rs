// src/exec/backend.rs

//! Pluggable collaborator abstraction.
//!
//! The scheduler never talks to a model provider directly. It reaches
//! planning, dependency analysis, step execution and synthesis through the
//! four traits below, so tests can swap in fakes and the CLI can plug in
//! shell-command implementations (see [`command`](super::command) and
//! [`configured`](super::configured)).
//!
//! The traits return boxed futures so they stay object safe; the runtime
//! holds them as `Arc<dyn ...>`.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use anyhow::Result;

use crate::dag::Plan;

/// Boxed, `Send` future returned by collaborator methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Turns an objective into free-text steps.
pub trait Planner: Send + Sync {
    fn generate<'a>(&'a self, objective: &'a str) -> BoxFuture<'a, Result<Vec<String>>>;
}

/// Turns free-text steps into a candidate DAG.
///
/// `feedback` carries the validator's errors from the previous attempt, if
/// there was one.
pub trait DependencyAnalyzer: Send + Sync {
    fn analyze<'a>(
        &'a self,
        steps: &'a [String],
        feedback: Option<&'a str>,
    ) -> BoxFuture<'a, Result<Plan>>;
}

/// Executes a single step description with the results of its dependencies.
pub trait StepRunner: Send + Sync {
    fn run<'a>(
        &'a self,
        description: &'a str,
        context: &'a StepContext,
    ) -> BoxFuture<'a, Result<String>>;
}

/// Consolidates every step result into the final artifact.
pub trait Aggregator: Send + Sync {
    fn synthesize<'a>(&'a self, combined_context: &'a str) -> BoxFuture<'a, Result<String>>;
}

/// Context handed to a [`StepRunner`].
///
/// Steps without dependencies get an explicit `NoContextRequired` instead of
/// an empty string, so a runner never mistakes "nothing" for a constraint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepContext {
    NoContextRequired,
    Dependencies(String),
}

impl StepContext {
    pub const NO_CONTEXT: &'static str = "No context required";

    pub fn as_text(&self) -> &str {
        match self {
            StepContext::NoContextRequired => Self::NO_CONTEXT,
            StepContext::Dependencies(text) => text,
        }
    }

    /// Full prompt for a runner: context first, then the task itself.
    pub fn prompt_for(&self, description: &str) -> String {
        format!("{}\n\n# Current Task\n{}\n", self.as_text(), description)
    }
}

impl fmt::Display for StepContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_text())
    }
}

/// The four collaborators a [`Scheduler`](crate::engine::Scheduler) is built
/// from.
#[derive(Clone)]
pub struct Collaborators {
    pub planner: Arc<dyn Planner>,
    pub analyzer: Arc<dyn DependencyAnalyzer>,
    pub runner: Arc<dyn StepRunner>,
    pub aggregator: Arc<dyn Aggregator>,
}

impl Collaborators {
    pub fn new(
        planner: Arc<dyn Planner>,
        analyzer: Arc<dyn DependencyAnalyzer>,
        runner: Arc<dyn StepRunner>,
        aggregator: Arc<dyn Aggregator>,
    ) -> Self {
        Self {
            planner,
            analyzer,
            runner,
            aggregator,
        }
    }
}

impl fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}
