//! Command execution utilities for scheduler and repair tools.

use std::process::ExitStatus;
use thiserror::Error;
use tokio::process::Command;

/// Error type for command execution.
#[derive(Error, Debug)]
pub enum CommandError {
    #[error("Failed to execute {command}: {error}")]
    Execution { command: String, error: String },
    #[error("Command {command} failed ({status}): {stderr}")]
    Failed {
        command: String,
        status: String,
        stderr: String,
    },
}

impl CommandError {
    /// Standard error text of the failed command, if it ran at all.
    pub fn stderr(&self) -> Option<&str> {
        match self {
            Self::Failed { stderr, .. } => Some(stderr),
            Self::Execution { .. } => None,
        }
    }
}

/// Captured result of a command that was allowed to exit non-zero.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status.success()
    }
}

/// Execute a command and return stdout as a string.
///
/// A non-zero exit becomes [`CommandError::Failed`] carrying the
/// command's standard error, trimmed.
pub async fn run_command(cmd: &mut Command, name: &str) -> Result<String, CommandError> {
    let output = run_command_status(cmd, name).await?;

    if !output.success() {
        return Err(CommandError::Failed {
            command: name.to_string(),
            status: output.status.to_string(),
            stderr: output.stderr.trim().to_string(),
        });
    }

    Ok(output.stdout)
}

/// Execute a command and return its exit status with both output streams.
///
/// Only a failure to spawn is an error here; the caller decides what a
/// non-zero exit means.
pub async fn run_command_status(
    cmd: &mut Command,
    name: &str,
) -> Result<CommandOutput, CommandError> {
    let output = cmd.output().await.map_err(|e| CommandError::Execution {
        command: name.to_string(),
        error: e.to_string(),
    })?;

    Ok(CommandOutput {
        status: output.status,
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}
