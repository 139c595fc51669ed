// src/exec/step_executor.rs

//! Execution of a single step, with timeout, retry and cancellation.

use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::dag::{PastSteps, Step, StepResult};
use crate::errors::{PlanexecError, Result};
use crate::exec::backend::{StepContext, StepRunner};

/// Everything one step execution needs, built by the dispatcher.
#[derive(Debug, Clone)]
pub struct StepRequest {
    pub step: Step,
    /// Records of this step's direct dependencies.
    pub dependency_results: PastSteps,
    /// Snapshot of every record committed before this wave.
    pub past_steps: Arc<PastSteps>,
}

impl StepRequest {
    pub fn new(step: Step, past_steps: Arc<PastSteps>) -> Self {
        let dependency_results = past_steps.subset(&step.dependencies);
        Self {
            step,
            dependency_results,
            past_steps,
        }
    }

    /// Build the runner context from the dependency records, in the step's
    /// dependency order.
    pub fn context(&self) -> StepContext {
        let blocks: Vec<String> = self
            .step
            .dependencies
            .iter()
            .filter_map(|dep| self.dependency_results.get(dep))
            .map(|rec| format!("## Step taken\n{}\n## Result\n{}", rec.description, rec.result))
            .collect();

        if blocks.is_empty() {
            StepContext::NoContextRequired
        } else {
            StepContext::Dependencies(format!("# Context\n{}", blocks.join("\n\n")))
        }
    }
}

/// Per-step timeout and retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepPolicy {
    /// Upper bound for a single runner call; `None` waits indefinitely.
    pub timeout: Option<Duration>,
    /// Extra attempts after the first failure.
    pub retries: u32,
    /// Delay before the first retry; doubles on every further retry.
    pub backoff: Duration,
}

impl Default for StepPolicy {
    fn default() -> Self {
        Self {
            timeout: None,
            retries: 0,
            backoff: Duration::from_millis(500),
        }
    }
}

impl StepPolicy {
    fn backoff_for(&self, retry: u32) -> Duration {
        self.backoff.saturating_mul(2u32.saturating_pow(retry.saturating_sub(1)))
    }
}

/// Run one step through `runner`.
///
/// Does not touch the plan or past steps; the returned [`StepResult`] is
/// merged by the core once the whole wave is back.
pub async fn execute_step(
    runner: &dyn StepRunner,
    request: &StepRequest,
    policy: &StepPolicy,
    cancel: &CancellationToken,
) -> Result<StepResult> {
    let step = &request.step;
    let context = request.context();
    let max_attempts = policy.retries + 1;

    info!(
        step_id = %step.id,
        deps = step.dependencies.len(),
        "executing step"
    );

    let mut attempt = 0;
    loop {
        attempt += 1;

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(step_id = %step.id, attempt, "step cancelled while in flight");
                return Err(PlanexecError::StepExecution {
                    step_id: step.id.clone(),
                    source: anyhow!("cancelled"),
                });
            }
            res = run_once(runner, &step.description, &context, policy.timeout) => res,
        };

        match outcome {
            Ok(output) => {
                info!(step_id = %step.id, attempt, "step finished");
                return Ok(StepResult {
                    step_id: step.id.clone(),
                    description: step.description.clone(),
                    output,
                    attempts: attempt,
                });
            }
            Err(err) if attempt < max_attempts => {
                let delay = policy.backoff_for(attempt);
                warn!(
                    step_id = %step.id,
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "step attempt failed; retrying"
                );
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        return Err(PlanexecError::StepExecution {
                            step_id: step.id.clone(),
                            source: err.context("cancelled during retry backoff"),
                        });
                    }
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            Err(err) => {
                warn!(step_id = %step.id, attempt, error = %err, "step failed");
                return Err(PlanexecError::StepExecution {
                    step_id: step.id.clone(),
                    source: err,
                });
            }
        }
    }
}

async fn run_once(
    runner: &dyn StepRunner,
    description: &str,
    context: &StepContext,
    timeout: Option<Duration>,
) -> anyhow::Result<String> {
    match timeout {
        Some(limit) => tokio::time::timeout(limit, runner.run(description, context))
            .await
            .map_err(|_| anyhow!("timed out after {:?}", limit))?,
        None => runner.run(description, context).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dag::StepRecord;
    use crate::exec::backend::BoxFuture;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Flaky {
        failures_left: AtomicU32,
        calls: AtomicU32,
    }

    impl StepRunner for Flaky {
        fn run<'a>(
            &'a self,
            description: &'a str,
            _context: &'a StepContext,
        ) -> BoxFuture<'a, anyhow::Result<String>> {
            Box::pin(async move {
                self.calls.fetch_add(1, Ordering::SeqCst);
                let left = self.failures_left.load(Ordering::SeqCst);
                if left > 0 {
                    self.failures_left.store(left - 1, Ordering::SeqCst);
                    anyhow::bail!("transient failure");
                }
                Ok(format!("ok: {description}"))
            })
        }
    }

    struct Sleepy;

    impl StepRunner for Sleepy {
        fn run<'a>(
            &'a self,
            _description: &'a str,
            _context: &'a StepContext,
        ) -> BoxFuture<'a, anyhow::Result<String>> {
            Box::pin(async move {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok("too late".to_string())
            })
        }
    }

    fn flaky(failures: u32) -> Flaky {
        Flaky {
            failures_left: AtomicU32::new(failures),
            calls: AtomicU32::new(0),
        }
    }

    fn root_request() -> StepRequest {
        StepRequest::new(Step::new("s1", "research"), Arc::new(PastSteps::new()))
    }

    fn fast_policy(retries: u32) -> StepPolicy {
        StepPolicy {
            timeout: None,
            retries,
            backoff: Duration::from_millis(1),
        }
    }

    #[test]
    fn root_step_gets_explicit_no_context() {
        let ctx = root_request().context();
        assert_eq!(ctx, StepContext::NoContextRequired);
        assert_eq!(ctx.as_text(), "No context required");
    }

    #[test]
    fn dependency_context_follows_dependency_order() {
        let past: PastSteps = [
            (
                "s1".to_string(),
                StepRecord {
                    description: "first".into(),
                    result: "r1".into(),
                },
            ),
            (
                "s2".to_string(),
                StepRecord {
                    description: "second".into(),
                    result: "r2".into(),
                },
            ),
        ]
        .into_iter()
        .collect();

        let req = StepRequest::new(Step::new("s3", "write").after(["s2", "s1"]), Arc::new(past));
        assert_eq!(req.dependency_results.len(), 2);

        let text = req.context().as_text().to_string();
        assert!(text.starts_with("# Context\n"));
        let second = text.find("second").unwrap();
        let first = text.find("first").unwrap();
        assert!(second < first);
        assert!(text.contains("## Step taken\nfirst\n## Result\nr1"));
    }

    #[test]
    fn prompt_puts_task_after_context() {
        let prompt = StepContext::NoContextRequired.prompt_for("do it");
        assert_eq!(prompt, "No context required\n\n# Current Task\ndo it\n");
    }

    #[test]
    fn backoff_doubles() {
        let policy = StepPolicy {
            timeout: None,
            retries: 3,
            backoff: Duration::from_millis(100),
        };
        assert_eq!(policy.backoff_for(1), Duration::from_millis(100));
        assert_eq!(policy.backoff_for(2), Duration::from_millis(200));
        assert_eq!(policy.backoff_for(3), Duration::from_millis(400));
    }

    #[tokio::test]
    async fn succeeds_on_first_attempt() {
        let runner = flaky(0);
        let res = execute_step(&runner, &root_request(), &fast_policy(0), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(res.output, "ok: research");
        assert_eq!(res.attempts, 1);
    }

    #[tokio::test]
    async fn without_retries_a_failure_is_fatal() {
        let runner = flaky(1);
        let err = execute_step(&runner, &root_request(), &fast_policy(0), &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.step_id(), Some("s1"));
        assert_eq!(runner.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_until_success() {
        let runner = flaky(2);
        let res = execute_step(&runner, &root_request(), &fast_policy(2), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(res.attempts, 3);
    }

    #[tokio::test]
    async fn timeout_fails_the_attempt() {
        let policy = StepPolicy {
            timeout: Some(Duration::from_millis(20)),
            retries: 0,
            backoff: Duration::from_millis(1),
        };
        let err = execute_step(&Sleepy, &root_request(), &policy, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn cancellation_aborts_in_flight_call() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = execute_step(&Sleepy, &root_request(), &fast_policy(0), &cancel)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("cancelled"));
    }

    #[tokio::test]
    async fn cancelled_before_start_never_calls_the_runner() {
        let runner = flaky(0);
        let cancel = CancellationToken::new();
        cancel.cancel();
        for _ in 0..20 {
            let err = execute_step(&runner, &root_request(), &fast_policy(0), &cancel)
                .await
                .unwrap_err();
            assert_eq!(err.step_id(), Some("s1"));
        }
        assert_eq!(runner.calls.load(Ordering::SeqCst), 0);
    }
}
