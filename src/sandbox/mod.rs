//! Sandbox capability
//!
//! The agent loop runs model-proposed shell commands somewhere isolated.
//! It only needs four operations from that place: report its status, start
//! it, stop it, and run one command under a wall-clock timeout. Those are the
//! [`Sandbox`] trait; [`DockerSandbox`] implements it with the `docker` CLI.
//!
//! A sandbox is shared by every challenge in a run and has no internal
//! locking. Running two sessions against the same sandbox concurrently is
//! not supported.

pub mod command;
pub mod docker;

use async_trait::async_trait;

pub use command::ShellCommand;
pub use docker::DockerSandbox;

/// Exit code reported by coreutils `timeout` when it had to kill the command
pub const TIMEOUT_EXIT_CODE: i32 = 124;

/// Lifecycle state reported by the sandbox
#[derive(Debug, Clone, PartialEq)]
pub enum SandboxStatus {
    Running,
    /// Any other state, with the raw state name (e.g. "exited", "created")
    Stopped(String),
}

impl SandboxStatus {
    pub fn is_running(&self) -> bool {
        matches!(self, SandboxStatus::Running)
    }
}

/// Raw result of one command execution
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecOutput {
    pub exit_code: Option<i32>,
    /// Combined stdout and stderr, undecoded
    pub output: Vec<u8>,
}

impl ExecOutput {
    pub fn new(exit_code: Option<i32>, output: impl Into<Vec<u8>>) -> Self {
        Self {
            exit_code,
            output: output.into(),
        }
    }

    /// Output decoded as text
    ///
    /// Invalid UTF-8 is replaced rather than rejected; empty output is a
    /// valid (if uninformative) result.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.output).trim().to_string()
    }

    /// Whether the sandbox-side timeout killed the command
    pub fn timed_out(&self) -> bool {
        self.exit_code == Some(TIMEOUT_EXIT_CODE)
    }
}

/// Error type for sandbox operations
#[derive(Debug)]
pub enum SandboxError {
    /// The sandbox tooling could not be launched at all
    Spawn(std::io::Error),
    /// A sandbox management command exited unsuccessfully
    Command { action: String, stderr: String },
    /// The sandbox does not exist
    NotFound(String),
    /// The command cannot be represented as a single shell word
    Quote(String),
    /// The execution did not return within the timeout plus grace period
    Timeout(u64),
}

impl std::fmt::Display for SandboxError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SandboxError::Spawn(e) => write!(f, "Failed to launch sandbox tooling: {}", e),
            SandboxError::Command { action, stderr } => {
                write!(f, "Sandbox {} failed: {}", action, stderr.trim())
            }
            SandboxError::NotFound(name) => write!(f, "Sandbox '{}' not found", name),
            SandboxError::Quote(msg) => write!(f, "Cannot quote command: {}", msg),
            SandboxError::Timeout(secs) => write!(f, "Execution hung for more than {}s", secs),
        }
    }
}

impl std::error::Error for SandboxError {}

impl From<std::io::Error> for SandboxError {
    fn from(e: std::io::Error) -> Self {
        SandboxError::Spawn(e)
    }
}

/// Opaque start/exec/stop capability
#[async_trait]
pub trait Sandbox: Send + Sync {
    async fn status(&self) -> Result<SandboxStatus, SandboxError>;

    async fn start(&self) -> Result<(), SandboxError>;

    async fn stop(&self) -> Result<(), SandboxError>;

    /// Run `command` as a single opaque shell argument, killed after `timeout_secs`
    ///
    /// A command killed by the timeout is not an error: whatever output it
    /// produced before being killed is returned.
    async fn exec_run(
        &self,
        command: &ShellCommand,
        timeout_secs: u64,
    ) -> Result<ExecOutput, SandboxError>;

    /// Start the sandbox unless it is already running
    async fn ensure_running(&self) -> Result<(), SandboxError> {
        if !self.status().await?.is_running() {
            self.start().await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exec_output_text_is_lossy_and_trimmed() {
        let out = ExecOutput::new(Some(0), b"FLAG{abc}\n\xff\n".to_vec());
        assert_eq!(out.text(), "FLAG{abc}\n\u{FFFD}");

        let empty = ExecOutput::new(Some(0), Vec::new());
        assert_eq!(empty.text(), "");
    }

    #[test]
    fn test_timed_out() {
        assert!(ExecOutput::new(Some(TIMEOUT_EXIT_CODE), "partial").timed_out());
        assert!(!ExecOutput::new(Some(1), "").timed_out());
        assert!(!ExecOutput::new(None, "").timed_out());
    }

    #[test]
    fn test_status_is_running() {
        assert!(SandboxStatus::Running.is_running());
        assert!(!SandboxStatus::Stopped("exited".to_string()).is_running());
    }
}
