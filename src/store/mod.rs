// src/store/mod.rs

//! Run checkpoints.
//!
//! The runtime persists a [`Checkpoint`] after planning, after the plan is
//! validated, after every wave and after aggregation. Because the batcher
//! recomputes readiness from `(plan, past_steps)`, a checkpoint is all that
//! is needed to resume a run; steps that were in flight when the process
//! died simply have no record yet and run again.

pub mod file;

use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use blake3::Hasher;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::dag::{PastSteps, Plan};
use crate::types::RunId;

pub use file::FileCheckpointStore;

/// Durable state of one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub run_id: RunId,
    pub objective: String,
    /// Number of waves merged so far.
    #[serde(default)]
    pub waves_completed: u32,
    /// Set once aggregation succeeded.
    #[serde(default)]
    pub final_output: Option<String>,
    /// blake3 digest of `plan`, checked on load.
    #[serde(default)]
    pub plan_digest: Option<String>,
    /// Free-text steps from the planner.
    #[serde(default)]
    pub planned_steps: Vec<String>,
    /// Validated plan, once the analyzer produced one.
    #[serde(default)]
    pub plan: Option<Plan>,
    #[serde(default)]
    pub past_steps: PastSteps,
}

impl Checkpoint {
    pub fn new(run_id: RunId, objective: impl Into<String>) -> Self {
        Self {
            run_id,
            objective: objective.into(),
            waves_completed: 0,
            final_output: None,
            plan_digest: None,
            planned_steps: Vec::new(),
            plan: None,
            past_steps: PastSteps::new(),
        }
    }

    /// Recompute `plan_digest` from the current plan.
    pub fn seal(mut self) -> Self {
        self.plan_digest = self.plan.as_ref().map(plan_digest);
        self
    }

    /// Check that the stored digest matches the plan.
    pub fn verify(&self) -> Result<()> {
        let expected = self.plan.as_ref().map(plan_digest);
        if expected != self.plan_digest {
            return Err(anyhow!(
                "checkpoint for run '{}' has a plan digest mismatch (stored {:?}, computed {:?})",
                self.run_id,
                self.plan_digest,
                expected
            ));
        }
        Ok(())
    }

    /// Short human-readable progress summary.
    pub fn progress(&self) -> String {
        match (&self.plan, &self.final_output) {
            (_, Some(_)) => "done".to_string(),
            (Some(plan), None) => format!(
                "{}/{} steps, {} wave(s)",
                plan.completed_count(),
                plan.len(),
                self.waves_completed
            ),
            (None, None) if !self.planned_steps.is_empty() => {
                format!("planned {} step(s), not validated", self.planned_steps.len())
            }
            (None, None) => "not planned".to_string(),
        }
    }
}

/// Digest of everything in a plan, including completion flags.
pub fn plan_digest(plan: &Plan) -> String {
    let mut hasher = Hasher::new();
    for step in plan.steps.iter() {
        hasher.update(step.id.as_bytes());
        hasher.update(&[0]);
        hasher.update(step.description.as_bytes());
        hasher.update(&[0]);
        for dep in step.dependencies.iter() {
            hasher.update(dep.as_bytes());
            hasher.update(&[1]);
        }
        hasher.update(&[step.completed as u8, b'\n']);
    }
    hasher.finalize().to_hex().to_string()
}

/// Abstract storage for run checkpoints.
pub trait CheckpointStore: Send + Sync {
    fn load(&self, run_id: &RunId) -> Result<Option<Checkpoint>>;
    fn save(&self, checkpoint: &Checkpoint) -> Result<()>;
    fn remove(&self, run_id: &RunId) -> Result<()>;
    /// Ids of every stored run, sorted.
    fn list(&self) -> Result<Vec<RunId>>;
}

/// Stores checkpoints in memory only.
#[derive(Debug, Default)]
pub struct MemoryCheckpointStore {
    map: Mutex<HashMap<RunId, Checkpoint>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CheckpointStore for MemoryCheckpointStore {
    fn load(&self, run_id: &RunId) -> Result<Option<Checkpoint>> {
        let map = self.map.lock().map_err(|_| anyhow!("checkpoint store lock poisoned"))?;
        Ok(map.get(run_id).cloned())
    }

    fn save(&self, checkpoint: &Checkpoint) -> Result<()> {
        let mut map = self.map.lock().map_err(|_| anyhow!("checkpoint store lock poisoned"))?;
        map.insert(checkpoint.run_id.clone(), checkpoint.clone());
        debug!(run_id = %checkpoint.run_id, "stored checkpoint (memory)");
        Ok(())
    }

    fn remove(&self, run_id: &RunId) -> Result<()> {
        let mut map = self.map.lock().map_err(|_| anyhow!("checkpoint store lock poisoned"))?;
        map.remove(run_id);
        Ok(())
    }

    fn list(&self) -> Result<Vec<RunId>> {
        let map = self.map.lock().map_err(|_| anyhow!("checkpoint store lock poisoned"))?;
        let mut ids: Vec<RunId> = map.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}
