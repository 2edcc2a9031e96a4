//! Command transport used by the Slurm adapter.
//!
//! The transport itself (SSH session, credentials, reconnects) lives outside
//! this workspace; anything that can run a shell command and hand back its
//! output implements [`RemoteShell`].

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

/// Captured result of one command.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// The most useful text to surface when the command failed.
    pub fn failure_text(&self) -> String {
        let stderr = self.stderr.trim();
        if !stderr.is_empty() {
            return stderr.to_string();
        }
        let stdout = self.stdout.trim();
        if !stdout.is_empty() {
            return stdout.to_string();
        }
        format!("exit code {}", self.exit_code)
    }
}

/// Errors raised by the transport, never by the command itself.
#[derive(Debug, thiserror::Error)]
pub enum ShellError {
    #[error("not connected to the cluster")]
    NotConnected,
    #[error("transport failure: {message}")]
    Transport { message: String },
    #[error("failed to spawn command: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Runs shell commands on the machine that hosts the scheduler.
#[async_trait]
pub trait RemoteShell: Send + Sync {
    async fn execute(&self, command: &str) -> Result<CommandOutput, ShellError>;
}

/// Runs commands through a local shell. Suitable when the sweep tool runs on
/// the cluster's login node itself.
#[derive(Debug, Clone)]
pub struct LocalShell {
    program: String,
}

impl LocalShell {
    pub fn new() -> Self {
        Self {
            program: "sh".to_string(),
        }
    }

    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for LocalShell {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteShell for LocalShell {
    async fn execute(&self, command: &str) -> Result<CommandOutput, ShellError> {
        debug!(program = %self.program, command = %command, "executing local command");
        let output = Command::new(&self.program)
            .arg("-c")
            .arg(command)
            .output()
            .await?;

        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            // Killed by a signal: no code, report as generic failure.
            exit_code: output.status.code().unwrap_or(-1),
        })
    }
}

/// Quote `value` for safe interpolation into a POSIX shell command.
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}
