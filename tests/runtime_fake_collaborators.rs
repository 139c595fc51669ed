// tests/runtime_fake_collaborators.rs

mod common;
use crate::common::{
    capped_options, diamond_plan, init_tracing, with_timeout, FakeAggregator, FakePlanner,
    Harness, PlanBuilder, RecordingRunner, ScriptedAnalyzer,
};

use std::sync::Arc;
use std::time::Duration;

use planexec::errors::PlanexecError;
use planexec::exec::StepContext;
use planexec::store::MemoryCheckpointStore;
use planexec::types::RunId;

#[tokio::test]
async fn diamond_runs_in_two_waves_and_aggregates() {
    init_tracing();
    let h = Harness::for_plan(diamond_plan());

    let outcome = with_timeout(h.scheduler.run_plan("write about Acme", None))
        .await
        .expect("run should succeed");

    assert_eq!(outcome.waves, 2);
    assert_eq!(
        outcome.output,
        "SUMMARY:\n\
         result of research company history\n\n\
         result of research product line\n\n\
         result of write the article"
    );

    let calls = h.runner.calls();
    assert_eq!(calls.len(), 3);

    // Both roots ran in the first wave, without context.
    let mut first_wave: Vec<&str> = calls[..2].iter().map(|c| c.description.as_str()).collect();
    first_wave.sort();
    assert_eq!(first_wave, vec!["research company history", "research product line"]);
    for call in &calls[..2] {
        assert_eq!(call.context, StepContext::NO_CONTEXT);
    }

    // The writer saw both results, in its dependency order.
    let writer = &calls[2];
    assert_eq!(writer.description, "write the article");
    assert_eq!(
        writer.context,
        "# Context\n\
         ## Step taken\nresearch company history\n## Result\nresult of research company history\n\n\
         ## Step taken\nresearch product line\n## Result\nresult of research product line"
    );

    assert_eq!(h.aggregator.inputs().len(), 1);
    assert!(h.scheduler.active_runs().is_empty());
}

#[tokio::test]
async fn independent_steps_run_concurrently() {
    init_tracing();
    let plan = PlanBuilder::new()
        .step("a", "alpha")
        .step("b", "beta")
        .step("c", "gamma")
        .step("d", "delta")
        .build();
    let h = Harness::new(
        FakePlanner::from_plan(&plan),
        ScriptedAnalyzer::fixed(plan),
        RecordingRunner::new().with_delay(Duration::from_millis(50)),
        FakeAggregator::new(),
    );

    let outcome = with_timeout(h.scheduler.run_plan("parallel", None))
        .await
        .unwrap();

    assert_eq!(outcome.waves, 1);
    assert_eq!(h.runner.peak_concurrency(), 4);
}

#[tokio::test]
async fn concurrency_cap_is_respected() {
    init_tracing();
    let plan = PlanBuilder::new()
        .step("a", "alpha")
        .step("b", "beta")
        .step("c", "gamma")
        .step("d", "delta")
        .step("e", "epsilon")
        .build();
    let h = Harness::with_store(
        FakePlanner::from_plan(&plan),
        ScriptedAnalyzer::fixed(plan),
        RecordingRunner::new().with_delay(Duration::from_millis(30)),
        FakeAggregator::new(),
        Arc::new(MemoryCheckpointStore::new()),
        capped_options(2),
    );

    let outcome = with_timeout(h.scheduler.run_plan("capped", None))
        .await
        .unwrap();

    assert_eq!(outcome.waves, 1);
    assert_eq!(h.runner.calls().len(), 5);
    assert!(h.runner.peak_concurrency() <= 2);
}

#[tokio::test]
async fn step_failure_aborts_the_run() {
    init_tracing();
    let plan = diamond_plan();
    let h = Harness::new(
        FakePlanner::from_plan(&plan),
        ScriptedAnalyzer::fixed(plan),
        RecordingRunner::new().failing_on("research product line"),
        FakeAggregator::new(),
    );

    let err = with_timeout(h.scheduler.run_plan("will fail", None))
        .await
        .unwrap_err();

    match err {
        PlanexecError::StepExecution { ref step_id, .. } => assert_eq!(step_id, "s2"),
        other => panic!("expected StepExecution, got {other:?}"),
    }
    assert_eq!(err.phase(), "dispatching");
    assert!(!h.runner.descriptions().contains(&"write the article".to_string()));
    assert!(h.aggregator.inputs().is_empty());
}

#[tokio::test]
async fn cycle_exhausts_analysis_attempts() {
    init_tracing();
    let cyclic = PlanBuilder::new()
        .step_after("s1", "a", &["s2"])
        .step_after("s2", "b", &["s1"])
        .build();
    let h = Harness::new(
        FakePlanner::new(["a", "b"]),
        ScriptedAnalyzer::fixed(cyclic),
        RecordingRunner::new(),
        FakeAggregator::new(),
    );

    let err = with_timeout(h.scheduler.run_plan("cyclic", None))
        .await
        .unwrap_err();

    match err {
        PlanexecError::PlanValidation { attempts, errors } => {
            assert_eq!(attempts, 2);
            assert_eq!(errors.len(), 1);
            assert!(errors[0].starts_with("Circular dependencies detected"));
        }
        other => panic!("expected PlanValidation, got {other:?}"),
    }

    let feedback = h.analyzer.feedback();
    assert_eq!(feedback.len(), 2);
    assert!(feedback[0].is_none());
    assert!(
        feedback[1]
            .as_deref()
            .is_some_and(|fb| fb.contains("1. Circular dependencies detected"))
    );
    assert!(h.runner.calls().is_empty());
}

#[tokio::test]
async fn self_dependency_is_reported() {
    init_tracing();
    let plan = PlanBuilder::new()
        .step_after("s1", "loop forever", &["s1"])
        .build();
    let h = Harness::new(
        FakePlanner::new(["loop forever"]),
        ScriptedAnalyzer::fixed(plan),
        RecordingRunner::new(),
        FakeAggregator::new(),
    );

    let err = with_timeout(h.scheduler.run_plan("self", None))
        .await
        .unwrap_err();

    match err {
        PlanexecError::PlanValidation { errors, .. } => {
            assert_eq!(errors, vec!["Step s1 cannot depend on itself".to_string()]);
        }
        other => panic!("expected PlanValidation, got {other:?}"),
    }
}

#[tokio::test]
async fn invalid_first_plan_is_corrected_on_retry() {
    init_tracing();
    let broken = PlanBuilder::new()
        .step("s1", "research company history")
        .step_after("s2", "research product line", &["s9"])
        .step_after("s3", "write the article", &["s1", "s2"])
        .build();
    let h = Harness::new(
        FakePlanner::from_plan(&diamond_plan()),
        ScriptedAnalyzer::new(vec![broken, diamond_plan()]),
        RecordingRunner::new(),
        FakeAggregator::new(),
    );

    let outcome = with_timeout(h.scheduler.run_plan("retry", None))
        .await
        .unwrap();

    assert_eq!(outcome.waves, 2);
    let feedback = h.analyzer.feedback();
    assert_eq!(feedback.len(), 2);
    let second = feedback[1].clone().unwrap_or_default();
    assert!(second.contains("VALIDATION ERRORS FROM PREVIOUS ATTEMPT"));
    assert!(second.contains("Step s2 depends on non existent step s9"));
}

#[tokio::test]
async fn planner_failure_is_a_planning_error() {
    init_tracing();
    let h = Harness::new(
        FakePlanner::failing(),
        ScriptedAnalyzer::fixed(diamond_plan()),
        RecordingRunner::new(),
        FakeAggregator::new(),
    );

    let err = with_timeout(h.scheduler.run_plan("nothing", None))
        .await
        .unwrap_err();
    assert!(matches!(err, PlanexecError::PlanningError(ref msg) if msg.contains("planner unavailable")));
    assert_eq!(h.analyzer.calls(), 0);
}

#[tokio::test]
async fn empty_objective_is_rejected_for_new_runs() {
    init_tracing();
    let h = Harness::for_plan(diamond_plan());
    let err = h.scheduler.run_plan("   ", None).await.unwrap_err();
    assert!(matches!(err, PlanexecError::PlanningError(_)));
    assert_eq!(h.planner.calls(), 0);
}

#[tokio::test]
async fn cancel_stops_in_flight_steps() {
    init_tracing();
    let plan = diamond_plan();
    let h = Harness::new(
        FakePlanner::from_plan(&plan),
        ScriptedAnalyzer::fixed(plan),
        RecordingRunner::new().hanging_on("research product line"),
        FakeAggregator::new(),
    );
    let run_id = RunId::from("cancel-me");

    let task = {
        let scheduler = Arc::clone(&h.scheduler);
        let run_id = run_id.clone();
        tokio::spawn(async move { scheduler.run_plan("hang", Some(run_id)).await })
    };

    with_timeout(async {
        while h.runner.calls().len() < 2 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;

    assert_eq!(h.scheduler.active_runs(), vec![run_id.clone()]);
    assert!(h.scheduler.cancel(&run_id));

    let res = with_timeout(task).await.expect("run task panicked");
    match res {
        Err(PlanexecError::Cancelled { run_id: cancelled }) => assert_eq!(cancelled, run_id),
        other => panic!("expected Cancelled, got {other:?}"),
    }

    assert!(h.scheduler.active_runs().is_empty());
    assert!(!h.scheduler.cancel(&run_id));
    assert!(h.aggregator.inputs().is_empty());
}

#[tokio::test]
async fn aggregation_failure_is_retried_by_rerunning_the_same_id() {
    init_tracing();
    let plan = diamond_plan();
    let h = Harness::new(
        FakePlanner::from_plan(&plan),
        ScriptedAnalyzer::fixed(plan),
        RecordingRunner::new(),
        FakeAggregator::failing_times(1),
    );
    let run_id = RunId::from("agg-retry");

    let err = with_timeout(h.scheduler.run_plan("synth", Some(run_id.clone())))
        .await
        .unwrap_err();
    assert!(matches!(err, PlanexecError::Aggregation(_)));
    assert_eq!(err.phase(), "aggregating");

    let outcome = with_timeout(h.scheduler.run_plan("synth", Some(run_id.clone())))
        .await
        .unwrap();

    assert_eq!(outcome.run_id, run_id);
    assert_eq!(outcome.waves, 2);
    // Steps ran once; only aggregation was repeated.
    assert_eq!(h.runner.calls().len(), 3);
    assert_eq!(h.planner.calls(), 1);
    let inputs = h.aggregator.inputs();
    assert_eq!(inputs.len(), 2);
    assert_eq!(inputs[0], inputs[1]);
}
