// src/config/mod.rs

//! Configuration loading and validation.

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{load_and_validate, load_from_path};
pub use model::{
    AggregatorSection, ConfigFile, ConfigSection, RawConfigFile, RunnerSection, StepConfig,
};

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::errors::PlanexecError;
    use crate::types::CheckpointMode;

    fn parse(src: &str) -> crate::errors::Result<ConfigFile> {
        let raw: RawConfigFile = toml::from_str(src)?;
        ConfigFile::try_from(raw)
    }

    const MINIMAL: &str = r#"
[runner]
cmd = "cat"

[[step]]
id = "s1"
description = "one"
"#;

    #[test]
    fn defaults_apply() {
        let cfg = parse(MINIMAL).unwrap();
        assert_eq!(cfg.config.max_plan_attempts, 2);
        assert_eq!(cfg.config.checkpoint, CheckpointMode::File);
        assert_eq!(cfg.config.state_dir, ".planexec");
        let policy = cfg.step_policy();
        assert_eq!(policy.timeout, None);
        assert_eq!(policy.retries, 0);
        assert_eq!(policy.backoff, Duration::from_millis(500));
        assert!(cfg.aggregator.is_none());
    }

    #[test]
    fn full_config_round_trips_into_plan() {
        let cfg = parse(
            r#"
[config]
max_plan_attempts = 3
checkpoint = "memory"
step_timeout = "90s"
step_retries = 2
retry_backoff = "1s"
max_parallel_steps = 4

[runner]
cmd = "agent"

[aggregator]
cmd = "synth"

[[step]]
id = "s2"
description = "two"

[[step]]
id = "s1"
description = "one"

[[step]]
id = "s3"
description = "three"
after = ["s1", "s2"]
"#,
        )
        .unwrap();

        assert_eq!(cfg.config.checkpoint, CheckpointMode::Memory);
        let opts = cfg.dispatch_options();
        assert_eq!(opts.max_parallel_steps, Some(4));
        assert_eq!(opts.policy.timeout, Some(Duration::from_secs(90)));
        assert_eq!(opts.policy.retries, 2);

        let plan = cfg.plan();
        let ids: Vec<_> = plan.step_ids().collect();
        assert_eq!(ids, vec!["s2", "s1", "s3"]);
        assert_eq!(plan.get("s3").unwrap().dependencies, vec!["s1", "s2"]);
    }

    #[test]
    fn missing_runner_is_rejected() {
        let err = parse("[[step]]\nid = \"a\"\ndescription = \"A\"\n").unwrap_err();
        assert!(matches!(err, PlanexecError::ConfigError(msg) if msg.contains("[runner]")));
    }

    #[test]
    fn zero_attempts_is_rejected() {
        let src = format!("[config]\nmax_plan_attempts = 0\n{MINIMAL}");
        assert!(matches!(parse(&src), Err(PlanexecError::ConfigError(_))));
    }

    #[test]
    fn bad_duration_names_the_field() {
        let src = format!("[config]\nstep_timeout = \"soon\"\n{MINIMAL}");
        let err = parse(&src).unwrap_err();
        assert!(err.to_string().contains("step_timeout"));
    }

    #[test]
    fn unknown_checkpoint_mode_fails_to_parse() {
        let src = format!("[config]\ncheckpoint = \"disk\"\n{MINIMAL}");
        assert!(matches!(parse(&src), Err(PlanexecError::TomlError(_))));
    }

    #[test]
    fn duplicate_ids_are_config_errors() {
        let src = r#"
[runner]
cmd = "cat"

[[step]]
id = "a"
description = "A"

[[step]]
id = "a"
description = "A again"
"#;
        let err = parse(src).unwrap_err();
        assert!(matches!(err, PlanexecError::ConfigError(msg) if msg.contains("Duplicate")));
    }

    #[test]
    fn blank_descriptions_are_rejected() {
        let src = r#"
[runner]
cmd = "cat"

[[step]]
id = "s1"
description = "   "

[[step]]
id = "s2"
description = "write"
after = ["s1"]
"#;
        match parse(src) {
            Err(PlanexecError::ConfigError(msg)) => {
                assert_eq!(msg, "step 's1' has an empty description");
            }
            other => panic!("expected ConfigError, got {other:?}"),
        }
    }
}
