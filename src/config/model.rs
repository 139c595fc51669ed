// src/config/model.rs

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::dag::{Plan, Step};
use crate::exec::{DispatchOptions, StepPolicy};
use crate::types::CheckpointMode;

/// Configuration as read from a TOML file, before validation.
///
/// ```toml
/// [config]
/// max_plan_attempts = 2
/// checkpoint = "file"
/// step_timeout = "2m"
///
/// [runner]
/// cmd = "my-agent --stdin"
///
/// [[step]]
/// id = "s1"
/// description = "Research the company history"
///
/// [[step]]
/// id = "s2"
/// description = "Write the article"
/// after = ["s1"]
/// ```
///
/// Use [`ConfigFile::try_from`] (or
/// [`load_and_validate`](crate::config::load_and_validate)) to get a
/// validated [`ConfigFile`].
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub config: ConfigSection,

    /// Command used to execute steps.
    #[serde(default)]
    pub runner: Option<RunnerSection>,

    /// Optional command used for the final synthesis.
    #[serde(default)]
    pub aggregator: Option<AggregatorSection>,

    /// The static plan, in file order.
    #[serde(default)]
    pub step: Vec<StepConfig>,
}

/// `[config]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigSection {
    /// How many times the dependency analyzer may be asked for a valid DAG.
    #[serde(default = "default_max_plan_attempts")]
    pub max_plan_attempts: u32,

    /// `"file"` (default) or `"memory"`.
    #[serde(default)]
    pub checkpoint: CheckpointMode,

    /// Directory holding file checkpoints, relative to the config file.
    #[serde(default = "default_state_dir")]
    pub state_dir: String,

    /// Per-attempt time limit for a step, e.g. `"90s"`.
    #[serde(default)]
    pub step_timeout: Option<String>,

    /// Extra attempts per step after a failure.
    #[serde(default)]
    pub step_retries: u32,

    /// Initial retry delay; doubles on each further retry.
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff: String,

    /// Maximum number of steps running at once within a wave.
    #[serde(default)]
    pub max_parallel_steps: Option<usize>,
}

fn default_max_plan_attempts() -> u32 {
    2
}

fn default_state_dir() -> String {
    ".planexec".to_string()
}

fn default_retry_backoff() -> String {
    "500ms".to_string()
}

impl Default for ConfigSection {
    fn default() -> Self {
        Self {
            max_plan_attempts: default_max_plan_attempts(),
            checkpoint: CheckpointMode::default(),
            state_dir: default_state_dir(),
            step_timeout: None,
            step_retries: 0,
            retry_backoff: default_retry_backoff(),
            max_parallel_steps: None,
        }
    }
}

/// `[runner]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct RunnerSection {
    pub cmd: String,
}

/// `[aggregator]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct AggregatorSection {
    pub cmd: String,
}

/// One `[[step]]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct StepConfig {
    pub id: String,
    pub description: String,
    /// Ids of the steps this one waits for.
    #[serde(default)]
    pub after: Vec<String>,
}

/// Validated configuration.
///
/// Only constructed through `TryFrom<RawConfigFile>`, so durations are
/// already parsed and the static plan is a valid DAG.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub config: ConfigSection,
    pub runner: RunnerSection,
    pub aggregator: Option<AggregatorSection>,
    pub step: Vec<StepConfig>,
    step_timeout: Option<Duration>,
    retry_backoff: Duration,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(
        raw: RawConfigFile,
        runner: RunnerSection,
        step_timeout: Option<Duration>,
        retry_backoff: Duration,
    ) -> Self {
        Self {
            config: raw.config,
            runner,
            aggregator: raw.aggregator,
            step: raw.step,
            step_timeout,
            retry_backoff,
        }
    }

    /// The `[[step]]` entries as a fresh plan.
    pub fn plan(&self) -> Plan {
        build_plan(&self.step)
    }

    pub fn step_policy(&self) -> StepPolicy {
        StepPolicy {
            timeout: self.step_timeout,
            retries: self.config.step_retries,
            backoff: self.retry_backoff,
        }
    }

    pub fn dispatch_options(&self) -> DispatchOptions {
        DispatchOptions {
            policy: self.step_policy(),
            max_parallel_steps: self.config.max_parallel_steps,
        }
    }

    /// Checkpoint directory resolved against `root` (the config file's
    /// directory).
    pub fn state_dir(&self, root: &std::path::Path) -> PathBuf {
        root.join(&self.config.state_dir)
    }
}

pub(crate) fn build_plan(steps: &[StepConfig]) -> Plan {
    Plan::new(
        steps
            .iter()
            .map(|s| Step::new(s.id.clone(), s.description.clone()).after(s.after.iter().cloned()))
            .collect(),
    )
}
