// src/dag/validate.rs

//! Structural validation of candidate plans.
//!
//! Checks run in a fixed order and stop at the first failing category,
//! reporting every violation of that category:
//!
//! 1. duplicate step ids
//! 2. dependencies on unknown steps
//! 3. self-dependencies
//! 4. cycles

use std::collections::HashSet;

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;
use tracing::debug;

use crate::dag::model::Plan;

/// Which check rejected a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationFailure {
    DuplicateIds,
    UnknownDependency,
    SelfDependency,
    Cycle,
}

/// Outcome of [`validate_plan`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationReport {
    Valid,
    Invalid {
        kind: ValidationFailure,
        errors: Vec<String>,
    },
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationReport::Valid)
    }

    pub fn errors(&self) -> &[String] {
        match self {
            ValidationReport::Valid => &[],
            ValidationReport::Invalid { errors, .. } => errors,
        }
    }

    fn invalid(kind: ValidationFailure, errors: Vec<String>) -> Self {
        debug!(?kind, ?errors, "plan rejected by validator");
        ValidationReport::Invalid { kind, errors }
    }
}

pub fn validate_plan(plan: &Plan) -> ValidationReport {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut duplicates: Vec<&str> = Vec::new();
    for id in plan.step_ids() {
        if !seen.insert(id) && !duplicates.contains(&id) {
            duplicates.push(id);
        }
    }
    if !duplicates.is_empty() {
        return ValidationReport::invalid(
            ValidationFailure::DuplicateIds,
            vec![format!("Duplicate step IDs found: {}", duplicates.join(", "))],
        );
    }

    let mut unknown = Vec::new();
    for step in plan.steps.iter() {
        for dep in step.dependencies.iter() {
            if !seen.contains(dep.as_str()) {
                unknown.push(format!(
                    "Step {} depends on non existent step {}",
                    step.id, dep
                ));
            }
        }
    }
    if !unknown.is_empty() {
        return ValidationReport::invalid(ValidationFailure::UnknownDependency, unknown);
    }

    let self_deps: Vec<String> = plan
        .steps
        .iter()
        .filter(|s| s.dependencies.contains(&s.id))
        .map(|s| format!("Step {} cannot depend on itself", s.id))
        .collect();
    if !self_deps.is_empty() {
        return ValidationReport::invalid(ValidationFailure::SelfDependency, self_deps);
    }

    // Edge direction: step -> dependency ("step requires dependency").
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();
    for id in plan.step_ids() {
        graph.add_node(id);
    }
    for step in plan.steps.iter() {
        for dep in step.dependencies.iter() {
            graph.add_edge(step.id.as_str(), dep.as_str(), ());
        }
    }

    if let Err(cycle) = toposort(&graph, None) {
        return ValidationReport::invalid(
            ValidationFailure::Cycle,
            vec![format!(
                "Circular dependencies detected (involving step {})",
                cycle.node_id()
            )],
        );
    }

    ValidationReport::Valid
}

/// Render validator errors as corrective feedback for the next analyzer
/// attempt.
pub fn validation_feedback(errors: &[String]) -> String {
    let mut out = String::from(
        "# VALIDATION ERRORS FROM PREVIOUS ATTEMPT\n\
         Your previous response had the following issues:\n",
    );
    for (i, err) in errors.iter().enumerate() {
        out.push_str(&format!("{}. {}\n", i + 1, err));
    }
    out.push_str(
        "\nPlease fix these issues and ensure:\n\
         - All step IDs are unique\n\
         - All dependencies reference existing step IDs\n\
         - No step depends on itself\n\
         - No circular dependencies exist\n",
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dag::model::Step;

    fn kind_of(report: &ValidationReport) -> Option<ValidationFailure> {
        match report {
            ValidationReport::Valid => None,
            ValidationReport::Invalid { kind, .. } => Some(*kind),
        }
    }

    #[test]
    fn accepts_two_wave_plan() {
        let plan = Plan::new(vec![
            Step::new("s1", "one"),
            Step::new("s2", "two"),
            Step::new("s3", "three").after(["s1", "s2"]),
        ]);
        assert!(validate_plan(&plan).is_valid());
    }

    #[test]
    fn empty_plan_is_structurally_valid() {
        assert!(validate_plan(&Plan::default()).is_valid());
    }

    #[test]
    fn duplicate_ids_abort_further_checks() {
        let plan = Plan::new(vec![
            Step::new("s1", "one").after(["s1"]),
            Step::new("s1", "again").after(["ghost"]),
        ]);
        let report = validate_plan(&plan);
        assert_eq!(kind_of(&report), Some(ValidationFailure::DuplicateIds));
        assert_eq!(report.errors().len(), 1);
        assert!(report.errors()[0].contains("s1"));
    }

    #[test]
    fn collects_every_unknown_dependency() {
        let plan = Plan::new(vec![
            Step::new("s1", "one").after(["x"]),
            Step::new("s2", "two").after(["y", "s1"]),
        ]);
        let report = validate_plan(&plan);
        assert_eq!(kind_of(&report), Some(ValidationFailure::UnknownDependency));
        assert_eq!(
            report.errors(),
            [
                "Step s1 depends on non existent step x".to_string(),
                "Step s2 depends on non existent step y".to_string(),
            ]
        );
    }

    #[test]
    fn self_dependency_names_the_step() {
        let plan = Plan::new(vec![Step::new("s1", "one").after(["s1"])]);
        let report = validate_plan(&plan);
        assert_eq!(kind_of(&report), Some(ValidationFailure::SelfDependency));
        assert_eq!(report.errors(), ["Step s1 cannot depend on itself".to_string()]);
    }

    #[test]
    fn detects_two_step_cycle() {
        let plan = Plan::new(vec![
            Step::new("s1", "one").after(["s2"]),
            Step::new("s2", "two").after(["s1"]),
        ]);
        let report = validate_plan(&plan);
        assert_eq!(kind_of(&report), Some(ValidationFailure::Cycle));
        assert!(report.errors()[0].contains("Circular dependencies detected"));
    }

    #[test]
    fn detects_longer_cycle_behind_valid_prefix() {
        let plan = Plan::new(vec![
            Step::new("root", "r"),
            Step::new("a", "A").after(["root", "c"]),
            Step::new("b", "B").after(["a"]),
            Step::new("c", "C").after(["b"]),
        ]);
        assert_eq!(kind_of(&validate_plan(&plan)), Some(ValidationFailure::Cycle));
    }

    #[test]
    fn feedback_numbers_errors() {
        let fb = validation_feedback(&["first".to_string(), "second".to_string()]);
        assert!(fb.contains("1. first"));
        assert!(fb.contains("2. second"));
        assert!(fb.contains("No circular dependencies exist"));
    }
}
