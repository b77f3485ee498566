//! Container-runtime CLI adapter.
//!
//! Every operation is one runtime subcommand, run as an explicit awaited
//! task with a bounded timeout and a structured result (exit code plus
//! captured output). There is no fire-and-forget spawning here.

use std::io::ErrorKind;
use std::time::Duration;

use thiserror::Error;
use tokio::process::Command;
use tokio::time::timeout;

/// Default deadline for a single runtime invocation.
const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors from the container runtime boundary.
#[derive(Debug, Error)]
pub enum DockerError {
    /// The runtime binary is missing or not responding.
    #[error("container runtime unavailable: {0}")]
    Unavailable(String),

    /// The runtime ran but exited non-zero.
    #[error("container runtime command failed ({command}): {stderr}")]
    CommandFailed {
        /// The rendered command line.
        command: String,
        /// Exit code, if the process exited normally.
        status: Option<i32>,
        /// Captured stderr.
        stderr: String,
    },

    /// The invocation exceeded its deadline.
    #[error("container runtime command timed out: {command}")]
    Timeout {
        /// The rendered command line.
        command: String,
    },

    /// Unexpected I/O failure while running the command.
    #[error("container runtime I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Structured result of one runtime invocation.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// Exit code, if the process exited normally.
    pub status: Option<i32>,
    /// Captured stdout.
    pub stdout: String,
    /// Captured stderr.
    pub stderr: String,
}

/// Thin async client for the container runtime CLI.
#[derive(Debug, Clone)]
pub struct DockerCli {
    binary: String,
    command_timeout: Duration,
}

impl Default for DockerCli {
    fn default() -> Self {
        Self::new()
    }
}

impl DockerCli {
    /// Create a client for the `docker` binary with the default timeout.
    pub fn new() -> Self {
        Self {
            binary: "docker".to_string(),
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }

    /// Use a different runtime binary (e.g. `podman`).
    #[must_use]
    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    /// Override the per-invocation deadline.
    #[must_use]
    pub const fn with_timeout(mut self, command_timeout: Duration) -> Self {
        self.command_timeout = command_timeout;
        self
    }

    /// Probe runtime availability via a version check.
    ///
    /// Returns the server version string on success. A missing binary or a
    /// non-responding daemon both map to [`DockerError::Unavailable`].
    pub async fn is_available(&self) -> Result<String, DockerError> {
        match self
            .run(&["version", "--format", "{{.Server.Version}}"])
            .await
        {
            Ok(output) => Ok(output.stdout.trim().to_string()),
            Err(DockerError::CommandFailed { stderr, .. }) => {
                Err(DockerError::Unavailable(stderr))
            }
            Err(e) => Err(e),
        }
    }

    /// Stop a container by name.
    pub async fn stop(&self, container: &str) -> Result<CommandOutput, DockerError> {
        self.run(&["stop", container]).await
    }

    /// Remove a container by name, force-removing if still running.
    pub async fn remove(&self, container: &str) -> Result<CommandOutput, DockerError> {
        self.run(&["rm", "-f", container]).await
    }

    /// Current status line for a container, or `None` if it does not exist.
    pub async fn status(&self, container: &str) -> Result<Option<String>, DockerError> {
        let filter = format!("name=^{container}$");
        let output = self
            .run(&["ps", "-a", "--filter", &filter, "--format", "{{.Status}}"])
            .await?;

        let line = output.stdout.trim();
        if line.is_empty() {
            Ok(None)
        } else {
            Ok(Some(line.to_string()))
        }
    }

    /// Fetch the last `tail` log lines for a container.
    pub async fn logs(
        &self,
        container: &str,
        tail: Option<u32>,
    ) -> Result<CommandOutput, DockerError> {
        let tail_count = tail.map(|n| n.to_string());
        let mut args = vec!["logs"];
        if let Some(ref count) = tail_count {
            args.push("--tail");
            args.push(count);
        }
        args.push(container);
        self.run(&args).await
    }

    /// Run one runtime subcommand to completion within the deadline.
    async fn run(&self, args: &[&str]) -> Result<CommandOutput, DockerError> {
        let rendered = format!("{} {}", self.binary, args.join(" "));
        tracing::debug!(command = %rendered, "invoking container runtime");

        let result = timeout(
            self.command_timeout,
            Command::new(&self.binary).args(args).output(),
        )
        .await;

        let output = match result {
            Err(_elapsed) => return Err(DockerError::Timeout { command: rendered }),
            Ok(Err(e)) if e.kind() == ErrorKind::NotFound => {
                return Err(DockerError::Unavailable(format!(
                    "'{}' not found on PATH",
                    self.binary
                )));
            }
            Ok(Err(e)) => return Err(DockerError::Io(e)),
            Ok(Ok(output)) => output,
        };

        let captured = CommandOutput {
            status: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };

        if output.status.success() {
            Ok(captured)
        } else {
            tracing::warn!(
                command = %rendered,
                status = ?captured.status,
                "container runtime command failed"
            );
            Err(DockerError::CommandFailed {
                command: rendered,
                status: captured.status,
                stderr: captured.stderr,
            })
        }
    }
}
