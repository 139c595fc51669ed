// src/dag/graph.rs

use std::collections::HashMap;

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::dag::model::Plan;
use crate::types::StepId;

/// Adjacency view of a [`Plan`], keyed by step id.
///
/// Built from a plan that passed [`validate_plan`](crate::dag::validate_plan);
/// used for dependency-first ordering and diagnostics.
#[derive(Debug, Clone)]
pub struct DagGraph {
    /// Step ids in plan order.
    order: Vec<StepId>,
    /// Direct dependencies: steps that must finish before the key can run.
    deps: HashMap<StepId, Vec<StepId>>,
}

impl DagGraph {
    pub fn from_plan(plan: &Plan) -> Self {
        let order = plan.steps.iter().map(|s| s.id.clone()).collect();
        let deps = plan
            .steps
            .iter()
            .map(|s| (s.id.clone(), s.dependencies.clone()))
            .collect();

        Self { order, deps }
    }

    /// All step ids, in plan order.
    pub fn steps(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(|s| s.as_str())
    }

    pub fn dependencies_of(&self, id: &str) -> &[StepId] {
        self.deps.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Dependency-first ordering of all steps, or the id of a step on a
    /// cycle.
    pub fn topological_order(&self) -> Result<Vec<StepId>, StepId> {
        // Edge direction: dep -> step, so dependencies sort first.
        let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();
        for id in self.steps() {
            graph.add_node(id);
        }
        for id in self.order.iter() {
            for dep in self.dependencies_of(id) {
                if self.deps.contains_key(dep) {
                    graph.add_edge(dep.as_str(), id.as_str(), ());
                }
            }
        }

        toposort(&graph, None)
            .map(|sorted| sorted.into_iter().map(str::to_string).collect())
            .map_err(|cycle| cycle.node_id().to_string())
    }
}
