// src/engine/runtime.rs

use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::errors::{PlanexecError, Result};
use crate::exec::{dispatch_wave, Collaborators, Wave};
use crate::store::{Checkpoint, CheckpointStore};

use super::core::CoreRuntime;
use super::{CoreCommand, RunEvent, RunOutcome, RuntimeOptions};

/// Drives one run of the core state machine, and delegates the actual
/// work to the collaborators, the dispatcher and the checkpoint store.
///
/// This is a pure IO shell around `CoreRuntime`, which contains all the
/// run semantics. Every command that talks to the outside world races the
/// run's cancellation token.
pub struct Runtime {
    core: CoreRuntime,
    collaborators: Collaborators,
    store: Arc<dyn CheckpointStore>,
    options: RuntimeOptions,
    cancel: CancellationToken,
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("core", &self.core)
            .finish_non_exhaustive()
    }
}

impl Runtime {
    pub fn new(
        core: CoreRuntime,
        collaborators: Collaborators,
        store: Arc<dyn CheckpointStore>,
        options: RuntimeOptions,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            core,
            collaborators,
            store,
            options,
            cancel,
        }
    }

    /// Main event loop.
    ///
    /// - Feeds events into the core runtime, starting with `Start`.
    /// - Executes the commands returned by the core; the ones that call out
    ///   produce the next event.
    /// - Stops when the core says so and returns its outcome.
    pub async fn run(mut self) -> Result<RunOutcome> {
        let run_id = self.core.run_id().clone();
        info!(run_id = %run_id, "planexec runtime started");

        let mut events = VecDeque::from([RunEvent::Start]);

        while let Some(event) = events.pop_front() {
            debug!(run_id = %run_id, ?event, "runtime received event");

            let step = self.core.step(event);

            for command in step.commands {
                if let Some(next) = self.execute_command(command).await {
                    let failed = matches!(next, RunEvent::Failed(_) | RunEvent::Cancelled);
                    events.push_back(next);
                    if failed {
                        break;
                    }
                }
            }

            // A stopping step may still have queued a failure from its
            // final checkpoint write; the core has to see it.
            if !step.keep_running && events.is_empty() {
                debug!(run_id = %run_id, "core requested exit; stopping runtime");
                break;
            }
        }

        info!(run_id = %run_id, phase = %self.core.phase(), "runtime exiting");
        self.core.finish()
    }

    /// Execute a single command from the core, returning the event it
    /// produced, if any.
    async fn execute_command(&self, command: CoreCommand) -> Option<RunEvent> {
        let event = match command {
            CoreCommand::GeneratePlan { objective } => {
                match self.cancellable(self.collaborators.planner.generate(&objective)).await {
                    Ok(Ok(steps)) => RunEvent::Planned(steps),
                    Ok(Err(err)) => RunEvent::Failed(PlanexecError::PlanningError(format!(
                        "planner failed: {err:#}"
                    ))),
                    Err(cancelled) => cancelled,
                }
            }
            CoreCommand::AnalyzeSteps {
                steps,
                feedback,
                attempt,
            } => {
                debug!(attempt, with_feedback = feedback.is_some(), "calling dependency analyzer");
                let call = self
                    .collaborators
                    .analyzer
                    .analyze(&steps, feedback.as_deref());
                match self.cancellable(call).await {
                    Ok(Ok(plan)) => RunEvent::Analyzed(plan),
                    Ok(Err(err)) => RunEvent::Failed(PlanexecError::PlanningError(format!(
                        "dependency analyzer failed on attempt {attempt}: {err:#}"
                    ))),
                    Err(cancelled) => cancelled,
                }
            }
            CoreCommand::DispatchWave(wave) => self.dispatch(wave).await,
            CoreCommand::Aggregate { combined_context } => {
                let call = self.collaborators.aggregator.synthesize(&combined_context);
                match self.cancellable(call).await {
                    Ok(Ok(output)) => RunEvent::Aggregated(output),
                    Ok(Err(err)) => RunEvent::Failed(PlanexecError::Aggregation(err)),
                    Err(cancelled) => cancelled,
                }
            }
            CoreCommand::SaveCheckpoint(checkpoint) => return self.save(&checkpoint).err(),
        };
        Some(event)
    }

    async fn dispatch(&self, wave: Wave) -> RunEvent {
        let index = wave.index;
        let runner = Arc::clone(&self.collaborators.runner);

        match dispatch_wave(wave, runner, self.options.dispatch, &self.cancel).await {
            Ok(results) => RunEvent::WaveFinished {
                wave: index,
                results,
            },
            Err(_) if self.cancel.is_cancelled() => RunEvent::Cancelled,
            Err(err) => RunEvent::Failed(err),
        }
    }

    fn save(&self, checkpoint: &Checkpoint) -> std::result::Result<(), RunEvent> {
        self.store.save(checkpoint).map_err(|err| {
            warn!(run_id = %checkpoint.run_id, error = %err, "failed to store checkpoint");
            RunEvent::Failed(PlanexecError::Checkpoint(format!("{err:#}")))
        })
    }

    /// Await `fut` unless the run is cancelled first.
    async fn cancellable<F, T>(&self, fut: F) -> std::result::Result<T, RunEvent>
    where
        F: Future<Output = T>,
    {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(RunEvent::Cancelled),
            out = fut => Ok(out),
        }
    }
}
