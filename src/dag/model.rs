// src/dag/model.rs

//! Plan data model: steps, plans and the record of executed steps.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::StepId;

/// Atomic unit of work inside a [`Plan`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    pub id: StepId,
    pub description: String,
    /// Ids of the steps whose results this step needs, in declaration order.
    #[serde(default)]
    pub dependencies: Vec<StepId>,
    /// Set once the step's result has been merged into [`PastSteps`].
    #[serde(default)]
    pub completed: bool,
}

impl Step {
    pub fn new(id: impl Into<StepId>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            dependencies: Vec::new(),
            completed: false,
        }
    }

    /// Builder-style helper for declaring dependencies.
    pub fn after<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<StepId>,
    {
        for dep in deps {
            let dep = dep.into();
            if !self.dependencies.contains(&dep) {
                self.dependencies.push(dep);
            }
        }
        self
    }
}

/// Ordered collection of steps; the dependency edges form a DAG once
/// validated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    #[serde(default, rename = "step")]
    pub steps: Vec<Step>,
}

impl Plan {
    pub fn new(steps: Vec<Step>) -> Self {
        Self { steps }
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn step_ids(&self) -> impl Iterator<Item = &str> {
        self.steps.iter().map(|s| s.id.as_str())
    }

    pub fn is_complete(&self) -> bool {
        self.steps.iter().all(|s| s.completed)
    }

    pub fn completed_count(&self) -> usize {
        self.steps.iter().filter(|s| s.completed).count()
    }
}

/// What a finished step produced, keyed by step id in [`PastSteps`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepRecord {
    /// The step text as it was executed.
    pub description: String,
    pub result: String,
}

/// Append-only record of executed steps.
///
/// Backed by a `BTreeMap` so iteration (and therefore checkpoints and
/// logs) is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PastSteps {
    entries: BTreeMap<StepId, StepRecord>,
}

impl PastSteps {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&StepRecord> {
        self.entries.get(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(|k| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&StepId, &StepRecord)> {
        self.entries.iter()
    }

    /// Insert or replace the record for `id`, returning the previous record.
    pub(crate) fn record(&mut self, id: StepId, record: StepRecord) -> Option<StepRecord> {
        self.entries.insert(id, record)
    }

    /// Copy of the entries for the given ids (missing ids are skipped).
    pub fn subset<'a, I>(&self, ids: I) -> PastSteps
    where
        I: IntoIterator<Item = &'a StepId>,
    {
        let mut out = PastSteps::new();
        for id in ids {
            if let Some(rec) = self.entries.get(id) {
                out.entries.insert(id.clone(), rec.clone());
            }
        }
        out
    }
}

impl FromIterator<(StepId, StepRecord)> for PastSteps {
    fn from_iter<T: IntoIterator<Item = (StepId, StepRecord)>>(iter: T) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}
