//! Docker-backed sandbox ("attackbox")
//!
//! Drives the `docker` CLI through `tokio::process`. One long-lived
//! container is reused across a whole benchmark run; commands are executed
//! with `docker exec` under coreutils `timeout`.
//!
//! A freshly created container is provisioned once with the setup commands
//! (tool installation) and then stopped. Every start recreates the TUN
//! device, which does not survive a container restart.

use std::path::{Path, PathBuf};
use std::process::Output;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::{ExecOutput, Sandbox, SandboxError, SandboxStatus, ShellCommand};
use crate::metrics::SANDBOX_EXEC_DURATION;

/// Default attack box image
pub const DEFAULT_IMAGE: &str = "kalilinux/kali-rolling";

/// Provisioning run once after the container is created
pub const DEFAULT_SETUP_COMMANDS: &[&str] = &[
    "apt-get update",
    "apt-get -y install kali-linux-headless sshpass curl wget",
];

/// Recreates `/dev/net/tun` so VPN clients work inside the container
const TUN_SETUP: &str = "mkdir -p /dev/net && { [ -e /dev/net/tun ] || mknod /dev/net/tun c 10 200; } && chmod 600 /dev/net/tun";

/// Extra time granted to `docker exec` beyond the in-container timeout
const EXEC_GRACE_SECS: u64 = 5;

pub fn default_setup_commands() -> Vec<String> {
    DEFAULT_SETUP_COMMANDS.iter().map(|c| c.to_string()).collect()
}

/// Sandbox backed by a named Docker container
#[derive(Debug, Clone)]
pub struct DockerSandbox {
    name: String,
    docker_bin: PathBuf,
    setup_commands: Vec<String>,
}

impl DockerSandbox {
    /// Handle to an existing container, without checking that it exists
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            docker_bin: PathBuf::from("docker"),
            setup_commands: default_setup_commands(),
        }
    }

    /// Use a different docker-compatible CLI (e.g. podman)
    pub fn with_docker_bin(mut self, docker_bin: impl Into<PathBuf>) -> Self {
        self.docker_bin = docker_bin.into();
        self
    }

    /// Replace the provisioning commands run after creation
    pub fn with_setup_commands(mut self, setup_commands: Vec<String>) -> Self {
        self.setup_commands = setup_commands;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Reuse this container if it exists, otherwise create it from `image`
    ///
    /// When `host_data_dir` exists on the host it is bind-mounted at `/data`.
    pub async fn connect(
        self,
        image: &str,
        host_data_dir: Option<PathBuf>,
    ) -> Result<Self, SandboxError> {
        match self.status().await {
            Ok(status) => {
                info!(container = %self.name, ?status, "Reusing existing attackbox");
                Ok(self)
            }
            Err(SandboxError::NotFound(_)) => {
                self.create(image, host_data_dir).await?;
                Ok(self)
            }
            Err(e) => Err(e),
        }
    }

    async fn create(&self, image: &str, host_data_dir: Option<PathBuf>) -> Result<(), SandboxError> {
        println!(
            "[SANDBOX] Creating new {} from {}. This can take a few minutes. \
             If interrupted, delete the {} container and run again.",
            self.name, image, self.name
        );

        let data_dir = match host_data_dir {
            Some(dir) if dir.exists() => Some(dir),
            Some(dir) => {
                warn!(dir = %dir.display(), "Data directory does not exist, not binding to container");
                None
            }
            None => None,
        };

        self.docker("create", &run_args(&self.name, image, data_dir.as_deref()))
            .await?;
        info!(container = %self.name, image, "Attackbox created");

        self.provision().await;
        self.stop().await?;
        println!("[SANDBOX] The {} has been set up.", self.name);
        Ok(())
    }

    /// Run the setup commands once; failures are reported, not fatal
    async fn provision(&self) {
        if let Some(script) = setup_script(&self.setup_commands) {
            match self.docker("setup", &exec_args(&self.name, &script)).await {
                Ok(output) => debug!(
                    container = %self.name,
                    output = %String::from_utf8_lossy(&output.stdout),
                    "Setup finished"
                ),
                Err(e) => warn!(container = %self.name, error = %e, "Setup failed"),
            }
        }

        if self
            .docker("setup", &exec_args(&self.name, "command -v curl"))
            .await
            .is_err()
        {
            warn!(container = %self.name, "curl is not available in the attackbox");
        }
    }

    /// Run a docker management command and fail on a non-zero exit
    async fn docker(&self, action: &str, args: &[String]) -> Result<Output, SandboxError> {
        debug!(container = %self.name, action, ?args, "docker");
        let output = Command::new(&self.docker_bin)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).to_string();
            if stderr.contains("No such object") || stderr.contains("No such container") {
                return Err(SandboxError::NotFound(self.name.clone()));
            }
            return Err(SandboxError::Command {
                action: action.to_string(),
                stderr,
            });
        }
        Ok(output)
    }
}

/// `docker run` arguments for a detached container with a TTY
fn run_args(name: &str, image: &str, data_dir: Option<&Path>) -> Vec<String> {
    let mut args = vec![
        "run".to_string(),
        "-d".to_string(),
        "-t".to_string(),
        "--name".to_string(),
        name.to_string(),
    ];
    if let Some(dir) = data_dir {
        args.push("-v".to_string());
        args.push(format!("{}:/data:rw", dir.display()));
    }
    args.push(image.to_string());
    args
}

/// `docker exec` arguments running `script` through `/bin/sh -c`
fn exec_args(name: &str, script: &str) -> Vec<String> {
    vec![
        "exec".to_string(),
        name.to_string(),
        "/bin/sh".to_string(),
        "-c".to_string(),
        script.to_string(),
    ]
}

/// All setup commands chained so the first failure stops the rest
fn setup_script(commands: &[String]) -> Option<String> {
    let commands: Vec<&str> = commands
        .iter()
        .map(|c| c.trim())
        .filter(|c| !c.is_empty())
        .collect();
    if commands.is_empty() {
        None
    } else {
        Some(commands.join(" && "))
    }
}

/// In-container invocation with stderr merged into stdout in write order
fn exec_invocation(command: &ShellCommand, timeout_secs: u64) -> Result<String, SandboxError> {
    Ok(format!("{} 2>&1", command.with_timeout(timeout_secs)?))
}

/// Map `docker inspect` state names onto [`SandboxStatus`]
fn parse_status(raw: &str) -> SandboxStatus {
    match raw.trim() {
        "running" => SandboxStatus::Running,
        other => SandboxStatus::Stopped(other.to_string()),
    }
}

#[async_trait]
impl Sandbox for DockerSandbox {
    async fn status(&self) -> Result<SandboxStatus, SandboxError> {
        let args = [
            "inspect".to_string(),
            "-f".to_string(),
            "{{.State.Status}}".to_string(),
            self.name.clone(),
        ];
        let output = self.docker("inspect", &args).await?;
        Ok(parse_status(&String::from_utf8_lossy(&output.stdout)))
    }

    async fn start(&self) -> Result<(), SandboxError> {
        info!(container = %self.name, "Starting attackbox");
        self.docker("start", &["start".to_string(), self.name.clone()])
            .await?;

        if let Err(e) = self.docker("tun", &exec_args(&self.name, TUN_SETUP)).await {
            warn!(container = %self.name, error = %e, "Could not create /dev/net/tun");
        }
        Ok(())
    }

    async fn stop(&self) -> Result<(), SandboxError> {
        info!(container = %self.name, "Stopping attackbox");
        self.docker("stop", &["stop".to_string(), self.name.clone()])
            .await
            .map(|_| ())
    }

    async fn exec_run(
        &self,
        command: &ShellCommand,
        timeout_secs: u64,
    ) -> Result<ExecOutput, SandboxError> {
        let invocation = exec_invocation(command, timeout_secs)?;

        let start = Instant::now();
        let child = Command::new(&self.docker_bin)
            .args(exec_args(&self.name, &invocation))
            .kill_on_drop(true)
            .output();

        let guard = Duration::from_secs(timeout_secs + EXEC_GRACE_SECS);
        let output = tokio::time::timeout(guard, child)
            .await
            .map_err(|_| SandboxError::Timeout(timeout_secs + EXEC_GRACE_SECS))??;

        SANDBOX_EXEC_DURATION.observe(start.elapsed().as_secs_f64());

        // Command output is already merged; stderr only carries docker's own errors
        let mut combined = output.stdout;
        combined.extend_from_slice(&output.stderr);
        let result = ExecOutput::new(output.status.code(), combined);

        if result.timed_out() {
            warn!(container = %self.name, timeout_secs, "Command killed by timeout");
        }
        Ok(result)
    }
}
