// src/engine/scheduler.rs

//! Public entry point: owns the collaborators and the checkpoint store,
//! starts or resumes runs, and tracks the cancellation token of every
//! active run.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::engine::core::CoreRuntime;
use crate::engine::runtime::Runtime;
use crate::engine::{RunOutcome, RuntimeOptions};
use crate::errors::{PlanexecError, Result};
use crate::exec::Collaborators;
use crate::store::CheckpointStore;
use crate::types::RunId;

pub struct Scheduler {
    collaborators: Collaborators,
    store: Arc<dyn CheckpointStore>,
    options: RuntimeOptions,
    active: Mutex<HashMap<RunId, CancellationToken>>,
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("options", &self.options)
            .field("active", &self.active_runs())
            .finish_non_exhaustive()
    }
}

impl Scheduler {
    pub fn new(
        collaborators: Collaborators,
        store: Arc<dyn CheckpointStore>,
        options: RuntimeOptions,
    ) -> Self {
        Self {
            collaborators,
            store,
            options,
            active: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &Arc<dyn CheckpointStore> {
        &self.store
    }

    /// Execute `objective` to completion and return the aggregated output.
    ///
    /// Without a `run_id` a fresh id is allocated. With one, the run resumes
    /// from its checkpoint if there is one (the stored objective wins), and
    /// starts fresh under that id otherwise.
    pub async fn run_plan(&self, objective: &str, run_id: Option<RunId>) -> Result<RunOutcome> {
        let run_id = run_id.unwrap_or_else(RunId::generate);

        let checkpoint = self
            .store
            .load(&run_id)
            .map_err(|e| PlanexecError::Checkpoint(format!("{e:#}")))?;

        let core = match checkpoint {
            Some(cp) => {
                if !objective.is_empty() && cp.objective != objective {
                    warn!(
                        run_id = %run_id,
                        stored = %cp.objective,
                        "objective differs from the checkpoint; continuing with the stored one"
                    );
                }
                CoreRuntime::resume(cp, self.options)
            }
            None => {
                if objective.trim().is_empty() {
                    return Err(PlanexecError::PlanningError(
                        "objective must not be empty".to_string(),
                    ));
                }
                info!(run_id = %run_id, "starting new run");
                CoreRuntime::new(run_id.clone(), objective, self.options)
            }
        };

        let guard = self.register(&run_id)?;
        let runtime = Runtime::new(
            core,
            self.collaborators.clone(),
            Arc::clone(&self.store),
            self.options,
            guard.token.clone(),
        );
        runtime.run().await
    }

    /// Cancel an active run. Returns `false` if no run with that id is active.
    pub fn cancel(&self, run_id: &RunId) -> bool {
        match self.lock_active().get(run_id) {
            Some(token) => {
                info!(run_id = %run_id, "cancelling run");
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Ids of the runs currently executing, sorted.
    pub fn active_runs(&self) -> Vec<RunId> {
        let mut ids: Vec<RunId> = self.lock_active().keys().cloned().collect();
        ids.sort();
        ids
    }

    fn register(&self, run_id: &RunId) -> Result<ActiveRun<'_>> {
        let mut active = self.lock_active();
        if active.contains_key(run_id) {
            return Err(PlanexecError::Other(anyhow::anyhow!(
                "run '{}' is already active",
                run_id
            )));
        }
        let token = CancellationToken::new();
        active.insert(run_id.clone(), token.clone());
        Ok(ActiveRun {
            scheduler: self,
            run_id: run_id.clone(),
            token,
        })
    }

    fn lock_active(&self) -> MutexGuard<'_, HashMap<RunId, CancellationToken>> {
        // The map stays consistent even if a holder panicked.
        self.active
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Removes the run from the active map when the run ends, however it ends.
struct ActiveRun<'a> {
    scheduler: &'a Scheduler,
    run_id: RunId,
    token: CancellationToken,
}

impl Drop for ActiveRun<'_> {
    fn drop(&mut self) {
        self.scheduler.lock_active().remove(&self.run_id);
    }
}
