// src/lib.rs

pub mod cli;
pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod fs;
pub mod logging;
pub mod store;
pub mod types;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, info};

use crate::cli::CliArgs;
use crate::config::loader::load_and_validate;
use crate::config::model::ConfigFile;
use crate::dag::{plan_waves, PastSteps};
use crate::engine::{RuntimeOptions, Scheduler};
use crate::exec::{
    Aggregator, Collaborators, CommandAggregator, CommandStepRunner, ConcatAggregator,
    ConfiguredAnalyzer, ConfiguredPlanner,
};
use crate::store::{CheckpointStore, FileCheckpointStore, MemoryCheckpointStore};
use crate::types::{CheckpointMode, RunId};

pub use crate::engine::RunOutcome;
pub use crate::errors::PlanexecError;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading
/// - checkpoint store
/// - config-backed planner/analyzer and command-backed runner/aggregator
/// - the scheduler
/// - Ctrl-C handling (cancels the run)
pub async fn run(args: CliArgs) -> Result<()> {
    let config_path = PathBuf::from(&args.config);
    let cfg = load_and_validate(&config_path)?;

    if args.dry_run {
        print_dry_run(&cfg)?;
        return Ok(());
    }

    let store = build_store(&cfg, &config_root_dir(&config_path));

    if args.list_runs {
        print_runs(store.as_ref())?;
        return Ok(());
    }

    let run_id = args.run_id.map(RunId::from).unwrap_or_else(RunId::generate);

    // On resume the objective may come from the checkpoint.
    let objective = match args.objective {
        Some(objective) => objective,
        None => store
            .load(&run_id)?
            .map(|cp| cp.objective)
            .unwrap_or_default(),
    };

    let options = RuntimeOptions {
        max_plan_attempts: cfg.config.max_plan_attempts,
        dispatch: cfg.dispatch_options(),
    };
    let scheduler = Arc::new(Scheduler::new(
        build_collaborators(&cfg, &objective),
        store,
        options,
    ));

    // Ctrl-C → cancel the run; its last checkpoint stays resumable.
    {
        let scheduler = Arc::clone(&scheduler);
        let run_id = run_id.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                eprintln!("failed to listen for Ctrl+C: {e}");
                return;
            }
            scheduler.cancel(&run_id);
        });
    }

    info!(run_id = %run_id, config = ?config_path, "running plan");
    let outcome = scheduler.run_plan(&objective, Some(run_id)).await?;

    println!("{}", outcome.output);
    info!(run_id = %outcome.run_id, waves = outcome.waves, "done");
    Ok(())
}

/// Directory that relative paths in the config (e.g. `state_dir`) are
/// resolved against.
///
/// - If the config path has a non-empty parent (e.g. "plans/Planexec.toml"),
///   we use that directory.
/// - If it's just a bare filename like "Planexec.toml" (parent = ""),
///   we fall back to the current working directory "."
fn config_root_dir(config_path: &Path) -> PathBuf {
    match config_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    }
}

/// Checkpoint store selected by `[config].checkpoint`.
pub fn build_store(cfg: &ConfigFile, root: &Path) -> Arc<dyn CheckpointStore> {
    match cfg.config.checkpoint {
        CheckpointMode::File => Arc::new(FileCheckpointStore::new(cfg.state_dir(root))),
        CheckpointMode::Memory => Arc::new(MemoryCheckpointStore::new()),
    }
}

/// Collaborators the CLI runs with: the static plan from the config, and
/// shell commands for execution and synthesis.
pub fn build_collaborators(cfg: &ConfigFile, objective: &str) -> Collaborators {
    let plan = cfg.plan();
    let aggregator: Arc<dyn Aggregator> = match cfg.aggregator {
        Some(ref agg) => Arc::new(CommandAggregator::new(agg.cmd.clone(), objective)),
        None => Arc::new(ConcatAggregator),
    };

    Collaborators::new(
        Arc::new(ConfiguredPlanner::new(plan.clone())),
        Arc::new(ConfiguredAnalyzer::new(plan)),
        Arc::new(CommandStepRunner::new(cfg.runner.cmd.clone(), objective)),
        aggregator,
    )
}

/// Dry-run output: settings, steps with their dependencies, and the waves
/// the plan would run in.
fn print_dry_run(cfg: &ConfigFile) -> Result<()> {
    println!("planexec dry-run");
    println!("  config.max_plan_attempts = {}", cfg.config.max_plan_attempts);
    println!("  config.checkpoint = {:?}", cfg.config.checkpoint);
    if let Some(ref timeout) = cfg.config.step_timeout {
        println!("  config.step_timeout = {timeout}");
    }
    println!("  config.step_retries = {}", cfg.config.step_retries);
    if let Some(limit) = cfg.config.max_parallel_steps {
        println!("  config.max_parallel_steps = {limit}");
    }
    println!("  runner.cmd = {}", cfg.runner.cmd);
    if let Some(ref agg) = cfg.aggregator {
        println!("  aggregator.cmd = {}", agg.cmd);
    }
    println!();

    println!("steps ({}):", cfg.step.len());
    for step in cfg.step.iter() {
        println!("  - {}: {}", step.id, step.description);
        if !step.after.is_empty() {
            println!("      after: {:?}", step.after);
        }
    }
    println!();

    let waves = plan_waves(&cfg.plan(), &PastSteps::new())?;
    println!("waves ({}):", waves.len());
    for (i, wave) in waves.iter().enumerate() {
        println!("  {}: {}", i + 1, wave.join(", "));
    }

    debug!("dry-run complete (no execution)");
    Ok(())
}

fn print_runs(store: &dyn CheckpointStore) -> Result<()> {
    let ids = store.list()?;
    if ids.is_empty() {
        println!("no checkpointed runs");
        return Ok(());
    }
    for id in ids {
        match store.load(&id)? {
            Some(cp) => println!("{}\t{}\t{}", id, cp.progress(), cp.objective),
            None => println!("{id}\t(missing)"),
        }
    }
    Ok(())
}
