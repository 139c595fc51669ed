//! Fake collaborators for driving the scheduler in tests.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};
use planexec::dag::Plan;
use planexec::exec::{
    Aggregator, BoxFuture, Collaborators, DependencyAnalyzer, Planner, StepContext, StepRunner,
};

/// Planner that returns a fixed list of steps (or always fails).
#[derive(Debug, Clone)]
pub struct FakePlanner {
    steps: Vec<String>,
    fail: bool,
    calls: Arc<AtomicUsize>,
}

impl FakePlanner {
    pub fn new<S: Into<String>>(steps: impl IntoIterator<Item = S>) -> Self {
        Self {
            steps: steps.into_iter().map(Into::into).collect(),
            fail: false,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Steps taken from a plan's descriptions, in order.
    pub fn from_plan(plan: &Plan) -> Self {
        Self::new(plan.steps.iter().map(|s| s.description.clone()))
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new(Vec::<String>::new())
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Planner for FakePlanner {
    fn generate<'a>(&'a self, _objective: &'a str) -> BoxFuture<'a, Result<Vec<String>>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(anyhow!("planner unavailable"));
            }
            Ok(self.steps.clone())
        })
    }
}

/// Analyzer that returns the scripted plans one per call; the last plan is
/// repeated once the script runs out.
#[derive(Debug, Clone)]
pub struct ScriptedAnalyzer {
    script: Vec<Plan>,
    feedback: Arc<Mutex<Vec<Option<String>>>>,
}

impl ScriptedAnalyzer {
    pub fn new(script: Vec<Plan>) -> Self {
        assert!(!script.is_empty(), "ScriptedAnalyzer needs at least one plan");
        Self {
            script,
            feedback: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Always returns `plan`.
    pub fn fixed(plan: Plan) -> Self {
        Self::new(vec![plan])
    }

    pub fn calls(&self) -> usize {
        self.feedback.lock().unwrap().len()
    }

    /// The feedback passed on each call, in call order.
    pub fn feedback(&self) -> Vec<Option<String>> {
        self.feedback.lock().unwrap().clone()
    }
}

impl DependencyAnalyzer for ScriptedAnalyzer {
    fn analyze<'a>(
        &'a self,
        _steps: &'a [String],
        feedback: Option<&'a str>,
    ) -> BoxFuture<'a, Result<Plan>> {
        Box::pin(async move {
            let mut seen = self.feedback.lock().unwrap();
            let idx = seen.len().min(self.script.len() - 1);
            seen.push(feedback.map(str::to_string));
            Ok(self.script[idx].clone())
        })
    }
}

/// One recorded call to [`RecordingRunner`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerCall {
    pub description: String,
    pub context: String,
}

/// Step runner that records every call and answers `"result of <description>"`.
///
/// It can sleep per call, fail chosen steps, and reports the peak number of
/// concurrent calls.
#[derive(Debug, Clone, Default)]
pub struct RecordingRunner {
    delay: Option<Duration>,
    fail_on: HashSet<String>,
    hang_on: HashSet<String>,
    calls: Arc<Mutex<Vec<RunnerCall>>>,
    running: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Fail every call for the step with this description.
    pub fn failing_on(mut self, description: &str) -> Self {
        self.fail_on.insert(description.to_string());
        self
    }

    /// Never return for the step with this description.
    pub fn hanging_on(mut self, description: &str) -> Self {
        self.hang_on.insert(description.to_string());
        self
    }

    pub fn calls(&self) -> Vec<RunnerCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn descriptions(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.description).collect()
    }

    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn output_for(description: &str) -> String {
        format!("result of {description}")
    }
}

impl StepRunner for RecordingRunner {
    fn run<'a>(
        &'a self,
        description: &'a str,
        context: &'a StepContext,
    ) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move {
            self.calls.lock().unwrap().push(RunnerCall {
                description: description.to_string(),
                context: context.as_text().to_string(),
            });

            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);

            if self.hang_on.contains(description) {
                std::future::pending::<()>().await;
            }
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.running.fetch_sub(1, Ordering::SeqCst);

            if self.fail_on.contains(description) {
                return Err(anyhow!("runner failed on '{description}'"));
            }
            Ok(Self::output_for(description))
        })
    }
}

/// Aggregator that prefixes the combined context with `SUMMARY:`; can fail
/// its first `n` calls.
#[derive(Debug, Clone, Default)]
pub struct FakeAggregator {
    failures_left: Arc<AtomicUsize>,
    inputs: Arc<Mutex<Vec<String>>>,
}

impl FakeAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_times(n: usize) -> Self {
        Self {
            failures_left: Arc::new(AtomicUsize::new(n)),
            ..Self::default()
        }
    }

    /// Combined contexts received, in call order.
    pub fn inputs(&self) -> Vec<String> {
        self.inputs.lock().unwrap().clone()
    }
}

impl Aggregator for FakeAggregator {
    fn synthesize<'a>(&'a self, combined_context: &'a str) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move {
            self.inputs.lock().unwrap().push(combined_context.to_string());
            let left = self.failures_left.load(Ordering::SeqCst);
            if left > 0 {
                self.failures_left.store(left - 1, Ordering::SeqCst);
                return Err(anyhow!("aggregator unavailable"));
            }
            Ok(format!("SUMMARY:\n{combined_context}"))
        })
    }
}

/// Bundle fakes into `Collaborators`.
pub fn collaborators(
    planner: &FakePlanner,
    analyzer: &ScriptedAnalyzer,
    runner: &RecordingRunner,
    aggregator: &FakeAggregator,
) -> Collaborators {
    Collaborators::new(
        Arc::new(planner.clone()),
        Arc::new(analyzer.clone()),
        Arc::new(runner.clone()),
        Arc::new(aggregator.clone()),
    )
}
