// src/exec/dispatcher.rs

//! Fan-out of one wave to concurrent step executions.
//!
//! Every request in a wave runs on its own Tokio task. The dispatcher
//! waits for all of them (the wave barrier) before returning, so results
//! from this wave are only visible to later waves.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::dag::{PastSteps, Plan, StepResult};
use crate::errors::{PlanexecError, Result};
use crate::exec::backend::StepRunner;
use crate::exec::step_executor::{execute_step, StepPolicy, StepRequest};
use crate::types::StepId;

/// One wave of step requests, ready to dispatch.
#[derive(Debug, Clone)]
pub struct Wave {
    /// 1-based wave number within the run.
    pub index: u32,
    pub requests: Vec<StepRequest>,
}

impl Wave {
    /// Build the requests for `batch` against the committed state.
    ///
    /// Every request shares the same snapshot of `past_steps`.
    pub fn build(index: u32, batch: &[StepId], plan: &Plan, past_steps: &PastSteps) -> Result<Self> {
        let snapshot = Arc::new(past_steps.clone());
        let mut requests = Vec::with_capacity(batch.len());

        for id in batch {
            let step = plan.get(id).ok_or_else(|| {
                PlanexecError::SchedulingInvariant(format!(
                    "batch references step '{}' which is not in the plan",
                    id
                ))
            })?;
            requests.push(StepRequest::new(step.clone(), Arc::clone(&snapshot)));
        }

        Ok(Self { index, requests })
    }

    pub fn step_ids(&self) -> Vec<&str> {
        self.requests.iter().map(|r| r.step.id.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }
}

/// Dispatch settings shared by every wave of a run.
#[derive(Debug, Clone, Copy, Default)]
pub struct DispatchOptions {
    pub policy: StepPolicy,
    /// Cap on concurrently running steps; `None` runs the whole wave at once.
    pub max_parallel_steps: Option<usize>,
}

/// Execute every request of `wave` concurrently and wait for all of them.
///
/// Results come back in wave order. On the first failure the remaining
/// in-flight steps are aborted and that failure is returned.
pub async fn dispatch_wave(
    wave: Wave,
    runner: Arc<dyn StepRunner>,
    options: DispatchOptions,
    cancel: &CancellationToken,
) -> Result<Vec<StepResult>> {
    info!(wave = wave.index, steps = ?wave.step_ids(), "dispatching wave");

    let limiter = options
        .max_parallel_steps
        .map(|n| Arc::new(Semaphore::new(n.max(1))));

    // Child token so a failing step can stop its siblings without
    // cancelling the whole run.
    let wave_cancel = cancel.child_token();
    let total = wave.requests.len();
    let mut set = JoinSet::new();

    for (slot, request) in wave.requests.into_iter().enumerate() {
        let runner = Arc::clone(&runner);
        let limiter = limiter.clone();
        let token = wave_cancel.clone();
        let policy = options.policy;

        set.spawn(async move {
            // The semaphore is never closed.
            let _permit = match limiter {
                Some(sem) => sem.acquire_owned().await.ok(),
                None => None,
            };
            let res = execute_step(runner.as_ref(), &request, &policy, &token).await;
            (slot, res)
        });
    }

    let mut slots: Vec<Option<StepResult>> = vec![None; total];
    let mut failure: Option<PlanexecError> = None;

    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((slot, Ok(result))) => {
                debug!(wave = wave.index, step_id = %result.step_id, "step joined");
                slots[slot] = Some(result);
            }
            Ok((_, Err(err))) => {
                if failure.is_none() {
                    warn!(wave = wave.index, error = %err, "step failed; aborting rest of wave");
                    wave_cancel.cancel();
                    failure = Some(err);
                }
            }
            Err(join_err) => {
                if failure.is_none() {
                    wave_cancel.cancel();
                    failure = Some(PlanexecError::Other(anyhow::anyhow!(
                        "step task panicked or was aborted: {join_err}"
                    )));
                }
            }
        }
    }

    if cancel.is_cancelled() && failure.is_some() {
        debug!(wave = wave.index, "wave ended by run cancellation");
    }

    if let Some(err) = failure {
        return Err(err);
    }

    let results: Vec<StepResult> = slots.into_iter().flatten().collect();
    if results.len() != total {
        return Err(PlanexecError::SchedulingInvariant(format!(
            "wave {} returned {} of {} results",
            wave.index,
            results.len(),
            total
        )));
    }

    info!(wave = wave.index, steps = total, "wave complete");
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dag::{Step, StepRecord};
    use crate::exec::backend::{BoxFuture, StepContext};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Tracks peak concurrency; fails steps whose description starts with "fail".
    #[derive(Default)]
    struct Probe {
        running: AtomicUsize,
        peak: AtomicUsize,
    }

    impl StepRunner for Probe {
        fn run<'a>(
            &'a self,
            description: &'a str,
            _context: &'a StepContext,
        ) -> BoxFuture<'a, anyhow::Result<String>> {
            Box::pin(async move {
                let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
                self.peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(30)).await;
                self.running.fetch_sub(1, Ordering::SeqCst);
                if description.starts_with("fail") {
                    anyhow::bail!("boom");
                }
                Ok(description.to_uppercase())
            })
        }
    }

    fn plan() -> Plan {
        Plan::new(vec![
            Step::new("a", "alpha"),
            Step::new("b", "beta"),
            Step::new("c", "gamma"),
            Step::new("d", "fail delta"),
        ])
    }

    fn batch(ids: &[&str]) -> Vec<StepId> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn build_shares_one_snapshot() {
        let past: PastSteps = [(
            "x".to_string(),
            StepRecord {
                description: "x".into(),
                result: "rx".into(),
            },
        )]
        .into_iter()
        .collect();
        let wave = Wave::build(1, &batch(&["a", "b"]), &plan(), &past).unwrap();
        assert!(Arc::ptr_eq(&wave.requests[0].past_steps, &wave.requests[1].past_steps));
        assert_eq!(wave.step_ids(), vec!["a", "b"]);
    }

    #[test]
    fn build_rejects_unknown_ids() {
        let err = Wave::build(1, &batch(&["zzz"]), &plan(), &PastSteps::new()).unwrap_err();
        assert!(matches!(err, PlanexecError::SchedulingInvariant(_)));
    }

    #[tokio::test]
    async fn runs_wave_concurrently_and_keeps_order() {
        let probe = Arc::new(Probe::default());
        let wave = Wave::build(1, &batch(&["a", "b", "c"]), &plan(), &PastSteps::new()).unwrap();

        let results = dispatch_wave(
            wave,
            probe.clone(),
            DispatchOptions::default(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        let ids: Vec<_> = results.iter().map(|r| r.step_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(results[0].output, "ALPHA");
        assert_eq!(probe.peak.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn respects_parallelism_cap() {
        let probe = Arc::new(Probe::default());
        let wave = Wave::build(1, &batch(&["a", "b", "c"]), &plan(), &PastSteps::new()).unwrap();
        let options = DispatchOptions {
            max_parallel_steps: Some(1),
            ..DispatchOptions::default()
        };

        dispatch_wave(wave, probe.clone(), options, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(probe.peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn one_failure_fails_the_wave() {
        let probe = Arc::new(Probe::default());
        let wave = Wave::build(2, &batch(&["a", "d"]), &plan(), &PastSteps::new()).unwrap();

        let err = dispatch_wave(wave, probe, DispatchOptions::default(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.step_id(), Some("d"));
    }
}
