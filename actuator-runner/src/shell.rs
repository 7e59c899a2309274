//! External command invocation
//!
//! Used for:
//! - Probing the installed agent binary for its version
//! - Extracting delivered packages with `tar`
//!
//! Every invocation is bounded by a wall-clock timeout; expiry kills the
//! child and is reported as a failure of the whole step.

use async_trait::async_trait;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

use crate::error::JobError;

/// Captured result of one command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl CommandOutput {
    /// True when the command exited with status 0
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Runs external commands
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Runs `program` with `args`, waiting at most `timeout`
    ///
    /// A non-zero exit is not an error here; see `run_checked`.
    async fn run(
        &self,
        program: &str,
        args: &[String],
        timeout: Duration,
    ) -> Result<CommandOutput, JobError>;

    /// Like `run`, but a non-zero exit becomes `JobError::Command`
    async fn run_checked(
        &self,
        program: &str,
        args: &[String],
        timeout: Duration,
    ) -> Result<CommandOutput, JobError> {
        let output = self.run(program, args, timeout).await?;

        if !output.success() {
            return Err(JobError::Command {
                command: display_command(program, args),
                message: format!(
                    "exit_code={}, stdout='{}', stderr='{}'",
                    output.exit_code,
                    output.stdout.trim(),
                    output.stderr.trim()
                ),
            });
        }

        Ok(output)
    }
}

/// Runs commands as child processes of the actuator
#[derive(Debug, Clone, Copy, Default)]
pub struct ShellRunner;

#[async_trait]
impl CommandRunner for ShellRunner {
    async fn run(
        &self,
        program: &str,
        args: &[String],
        timeout: Duration,
    ) -> Result<CommandOutput, JobError> {
        let command_line = display_command(program, args);
        debug!("Executing: {}", command_line);

        let child = Command::new(program)
            .args(args)
            .kill_on_drop(true)
            .output();

        let output = match tokio::time::timeout(timeout, child).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(JobError::Command {
                    command: command_line,
                    message: e.to_string(),
                });
            }
            Err(_) => {
                return Err(JobError::Timeout {
                    command: command_line,
                    timeout,
                });
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        let exit_code = output.status.code().unwrap_or(-1);

        if !stdout.trim().is_empty() {
            debug!("{} stdout: {}", program, stdout.trim());
        }
        if !stderr.trim().is_empty() {
            debug!("{} stderr: {}", program, stderr.trim());
        }

        Ok(CommandOutput {
            stdout,
            stderr,
            exit_code,
        })
    }
}

/// Renders a command line for logs and errors
pub fn display_command(program: &str, args: &[String]) -> String {
    if args.is_empty() {
        program.to_string()
    } else {
        format!("{} {}", program, args.join(" "))
    }
}
