use crate::config::model::{build_plan, ConfigFile, RawConfigFile};
use crate::dag::{validate_plan, ValidationFailure, ValidationReport};
use crate::errors::{PlanexecError, Result};
use crate::types::parse_duration;

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = crate::errors::PlanexecError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        ensure_has_steps(&raw)?;
        validate_global_config(&raw)?;
        validate_static_plan(&raw)?;

        let runner = match raw.runner.clone() {
            Some(r) if !r.cmd.trim().is_empty() => r,
            Some(_) => {
                return Err(PlanexecError::ConfigError(
                    "[runner].cmd must not be empty".to_string(),
                ));
            }
            None => {
                return Err(PlanexecError::ConfigError(
                    "config must contain a [runner] section with `cmd`".to_string(),
                ));
            }
        };

        if let Some(agg) = raw.aggregator.as_ref() {
            if agg.cmd.trim().is_empty() {
                return Err(PlanexecError::ConfigError(
                    "[aggregator].cmd must not be empty when the section is present".to_string(),
                ));
            }
        }

        let step_timeout = raw
            .config
            .step_timeout
            .as_deref()
            .map(|s| parse_config_duration("step_timeout", s))
            .transpose()?;
        let retry_backoff = parse_config_duration("retry_backoff", &raw.config.retry_backoff)?;

        Ok(ConfigFile::new_unchecked(raw, runner, step_timeout, retry_backoff))
    }
}

fn ensure_has_steps(cfg: &RawConfigFile) -> Result<()> {
    if cfg.step.is_empty() {
        return Err(PlanexecError::ConfigError(
            "config must contain at least one [[step]] entry".to_string(),
        ));
    }
    Ok(())
}

fn validate_global_config(cfg: &RawConfigFile) -> Result<()> {
    if cfg.config.max_plan_attempts == 0 {
        return Err(PlanexecError::ConfigError(
            "[config].max_plan_attempts must be >= 1 (got 0)".to_string(),
        ));
    }

    if cfg.config.max_parallel_steps == Some(0) {
        return Err(PlanexecError::ConfigError(
            "[config].max_parallel_steps must be >= 1 when set (got 0)".to_string(),
        ));
    }

    if cfg.config.state_dir.trim().is_empty() {
        return Err(PlanexecError::ConfigError(
            "[config].state_dir must not be empty".to_string(),
        ));
    }

    Ok(())
}

fn validate_static_plan(cfg: &RawConfigFile) -> Result<()> {
    if let Some(step) = cfg.step.iter().find(|s| s.id.trim().is_empty()) {
        return Err(PlanexecError::ConfigError(format!(
            "step with description '{}' has an empty id",
            step.description
        )));
    }

    // Blank descriptions would be dropped by the planner stage.
    if let Some(step) = cfg.step.iter().find(|s| s.description.trim().is_empty()) {
        return Err(PlanexecError::ConfigError(format!(
            "step '{}' has an empty description",
            step.id
        )));
    }

    match validate_plan(&build_plan(&cfg.step)) {
        ValidationReport::Valid => Ok(()),
        ValidationReport::Invalid {
            kind: ValidationFailure::Cycle,
            errors,
        } => Err(PlanexecError::DagCycle(errors.join("; "))),
        ValidationReport::Invalid { errors, .. } => {
            Err(PlanexecError::ConfigError(errors.join("; ")))
        }
    }
}

fn parse_config_duration(field: &str, value: &str) -> Result<std::time::Duration> {
    parse_duration(value)
        .map_err(|e| PlanexecError::ConfigError(format!("[config].{field}: {e}")))
}
