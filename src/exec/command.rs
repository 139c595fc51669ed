// src/exec/command.rs

//! Shell-command collaborators.
//!
//! These let the CLI drive any external agent or model wrapper: the prompt
//! goes to the command's stdin, and its trimmed stdout is the result.

use std::process::Stdio;

use anyhow::{bail, Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info};

use crate::exec::backend::{Aggregator, BoxFuture, StepContext, StepRunner};

pub const ENV_STEP_DESCRIPTION: &str = "PLANEXEC_STEP_DESCRIPTION";
pub const ENV_CONTEXT: &str = "PLANEXEC_CONTEXT";
pub const ENV_OBJECTIVE: &str = "PLANEXEC_OBJECTIVE";

/// Runs each step through a shell command.
#[derive(Debug, Clone)]
pub struct CommandStepRunner {
    cmd: String,
    objective: String,
}

impl CommandStepRunner {
    pub fn new(cmd: impl Into<String>, objective: impl Into<String>) -> Self {
        Self {
            cmd: cmd.into(),
            objective: objective.into(),
        }
    }
}

impl StepRunner for CommandStepRunner {
    fn run<'a>(
        &'a self,
        description: &'a str,
        context: &'a StepContext,
    ) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move {
            let prompt = context.prompt_for(description);
            let env = [
                (ENV_STEP_DESCRIPTION, description),
                (ENV_CONTEXT, context.as_text()),
                (ENV_OBJECTIVE, self.objective.as_str()),
            ];
            run_shell(&self.cmd, &prompt, &env).await
        })
    }
}

/// Synthesizes the final output through a shell command.
#[derive(Debug, Clone)]
pub struct CommandAggregator {
    cmd: String,
    objective: String,
}

impl CommandAggregator {
    pub fn new(cmd: impl Into<String>, objective: impl Into<String>) -> Self {
        Self {
            cmd: cmd.into(),
            objective: objective.into(),
        }
    }
}

impl Aggregator for CommandAggregator {
    fn synthesize<'a>(&'a self, combined_context: &'a str) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move {
            let env = [(ENV_OBJECTIVE, self.objective.as_str())];
            run_shell(&self.cmd, combined_context, &env).await
        })
    }
}

/// Run `cmd` through the platform shell, feed `stdin`, and return trimmed
/// stdout. A non-zero exit status is an error.
async fn run_shell(cmd: &str, stdin: &str, env: &[(&str, &str)]) -> Result<String> {
    // Build a shell command appropriate for the platform.
    let mut command = if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(cmd);
        c
    } else {
        let mut c = Command::new("sh");
        c.arg("-c").arg(cmd);
        c
    };

    command
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    for (key, value) in env {
        command.env(key, value);
    }

    debug!(cmd = %cmd, "starting collaborator process");
    let mut child = command
        .spawn()
        .with_context(|| format!("spawning process for command '{}'", cmd))?;

    if let Some(mut pipe) = child.stdin.take() {
        let input = stdin.to_string();
        // Commands are free to ignore stdin; a closed pipe is not an error.
        tokio::spawn(async move {
            if pipe.write_all(input.as_bytes()).await.is_ok() {
                let _ = pipe.shutdown().await;
            }
        });
    }

    // Always consume stderr so buffers don't fill; log at debug.
    if let Some(stderr) = child.stderr.take() {
        let label = cmd.to_string();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!(cmd = %label, "stderr: {}", line);
            }
        });
    }

    let mut stdout = String::new();
    if let Some(mut out) = child.stdout.take() {
        out.read_to_string(&mut stdout)
            .await
            .with_context(|| format!("reading stdout of '{}'", cmd))?;
    }

    let status = child
        .wait()
        .await
        .with_context(|| format!("waiting for process of command '{}'", cmd))?;

    let code = status.code().unwrap_or(-1);
    info!(cmd = %cmd, exit_code = code, success = status.success(), "collaborator process exited");

    if !status.success() {
        bail!("command '{}' exited with status {}", cmd, code);
    }

    Ok(stdout.trim().to_string())
}
