#![allow(dead_code)]

use std::sync::Arc;

use planexec::dag::Plan;
use planexec::engine::{RuntimeOptions, Scheduler};
use planexec::exec::DispatchOptions;
use planexec::store::{CheckpointStore, MemoryCheckpointStore};

pub use planexec_test_utils::fakes::collaborators;
pub use planexec_test_utils::{
    init_tracing, with_timeout, ConfigFileBuilder, FakeAggregator, FakePlanner, PlanBuilder,
    RecordingRunner, ScriptedAnalyzer,
};

/// Two independent research steps feeding a writing step.
pub fn diamond_plan() -> Plan {
    PlanBuilder::new()
        .step("s1", "research company history")
        .step("s2", "research product line")
        .step_after("s3", "write the article", &["s1", "s2"])
        .build()
}

/// Fakes wired into a scheduler, with handles kept for assertions.
pub struct Harness {
    pub planner: FakePlanner,
    pub analyzer: ScriptedAnalyzer,
    pub runner: RecordingRunner,
    pub aggregator: FakeAggregator,
    pub store: Arc<dyn CheckpointStore>,
    pub scheduler: Arc<Scheduler>,
}

impl Harness {
    pub fn new(
        planner: FakePlanner,
        analyzer: ScriptedAnalyzer,
        runner: RecordingRunner,
        aggregator: FakeAggregator,
    ) -> Self {
        Self::with_store(
            planner,
            analyzer,
            runner,
            aggregator,
            Arc::new(MemoryCheckpointStore::new()),
            RuntimeOptions::default(),
        )
    }

    pub fn with_store(
        planner: FakePlanner,
        analyzer: ScriptedAnalyzer,
        runner: RecordingRunner,
        aggregator: FakeAggregator,
        store: Arc<dyn CheckpointStore>,
        options: RuntimeOptions,
    ) -> Self {
        let scheduler = Arc::new(Scheduler::new(
            collaborators(&planner, &analyzer, &runner, &aggregator),
            Arc::clone(&store),
            options,
        ));
        Self {
            planner,
            analyzer,
            runner,
            aggregator,
            store,
            scheduler,
        }
    }

    /// Harness that runs `plan` as-is with a plain recording runner.
    pub fn for_plan(plan: Plan) -> Self {
        Self::new(
            FakePlanner::from_plan(&plan),
            ScriptedAnalyzer::fixed(plan),
            RecordingRunner::new(),
            FakeAggregator::new(),
        )
    }
}

/// Options with a concurrency cap and no retries.
pub fn capped_options(max_parallel_steps: usize) -> RuntimeOptions {
    RuntimeOptions {
        max_plan_attempts: 2,
        dispatch: DispatchOptions {
            max_parallel_steps: Some(max_parallel_steps),
            ..DispatchOptions::default()
        },
    }
}
