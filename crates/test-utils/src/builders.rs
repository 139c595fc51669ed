#![allow(dead_code)]

use planexec::config::{
    AggregatorSection, ConfigFile, ConfigSection, RawConfigFile, RunnerSection, StepConfig,
};
use planexec::dag::{Plan, Step};
use planexec::errors::Result;
use planexec::types::CheckpointMode;

/// Builder for `Plan` to keep DAG literals short in tests.
///
/// ```ignore
/// let plan = PlanBuilder::new()
///     .step("s1", "research")
///     .step_after("s2", "write", &["s1"])
///     .build();
/// ```
#[derive(Debug, Default)]
pub struct PlanBuilder {
    steps: Vec<Step>,
}

impl PlanBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn step(mut self, id: &str, description: &str) -> Self {
        self.steps.push(Step::new(id, description));
        self
    }

    pub fn step_after(mut self, id: &str, description: &str, deps: &[&str]) -> Self {
        self.steps
            .push(Step::new(id, description).after(deps.iter().copied()));
        self
    }

    /// Add a dependency without deduplication or existence checks, for
    /// building deliberately broken plans.
    pub fn raw_dependency(mut self, id: &str, dep: &str) -> Self {
        if let Some(step) = self.steps.iter_mut().find(|s| s.id == id) {
            step.dependencies.push(dep.to_string());
        }
        self
    }

    pub fn build(self) -> Plan {
        Plan::new(self.steps)
    }
}

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile {
                config: ConfigSection::default(),
                runner: Some(RunnerSection {
                    cmd: "cat".to_string(),
                }),
                aggregator: None,
                step: Vec::new(),
            },
        }
    }

    pub fn with_step(mut self, id: &str, description: &str, after: &[&str]) -> Self {
        self.config.step.push(StepConfig {
            id: id.to_string(),
            description: description.to_string(),
            after: after.iter().map(|s| s.to_string()).collect(),
        });
        self
    }

    pub fn with_runner(mut self, cmd: &str) -> Self {
        self.config.runner = Some(RunnerSection {
            cmd: cmd.to_string(),
        });
        self
    }

    pub fn without_runner(mut self) -> Self {
        self.config.runner = None;
        self
    }

    pub fn with_aggregator(mut self, cmd: &str) -> Self {
        self.config.aggregator = Some(AggregatorSection {
            cmd: cmd.to_string(),
        });
        self
    }

    pub fn max_plan_attempts(mut self, n: u32) -> Self {
        self.config.config.max_plan_attempts = n;
        self
    }

    pub fn checkpoint(mut self, mode: CheckpointMode) -> Self {
        self.config.config.checkpoint = mode;
        self
    }

    pub fn state_dir(mut self, dir: &str) -> Self {
        self.config.config.state_dir = dir.to_string();
        self
    }

    pub fn step_timeout(mut self, timeout: &str) -> Self {
        self.config.config.step_timeout = Some(timeout.to_string());
        self
    }

    pub fn step_retries(mut self, n: u32) -> Self {
        self.config.config.step_retries = n;
        self
    }

    pub fn retry_backoff(mut self, backoff: &str) -> Self {
        self.config.config.retry_backoff = backoff.to_string();
        self
    }

    pub fn max_parallel_steps(mut self, n: usize) -> Self {
        self.config.config.max_parallel_steps = Some(n);
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn try_build(self) -> Result<ConfigFile> {
        ConfigFile::try_from(self.config)
    }

    pub fn build(self) -> ConfigFile {
        self.try_build()
            .expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}
