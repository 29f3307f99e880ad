// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Docker CLI runtime adapter.
//!
//! Shells out to the `docker` binary rather than speaking the API socket:
//! the CLI handles credential helpers, contexts, and rootless setups for us.
//! Containers are labelled with their workspace id so a crashed engine's
//! leftovers can be found and removed on the next run.
//!
//! Sources are copied into the container's writable layer (`create` + `cp` +
//! `start --attach`) instead of bind-mounted, so a step can freely mutate
//! them without touching the host.

use crate::runtime::{ContainerRuntime, LogSink, Mount, RunOutcome, RunRequest, RuntimeError};
use crate::subprocess::{run_with_timeout, DOCKER_CP_TIMEOUT, DOCKER_QUERY_TIMEOUT};
use async_trait::async_trait;
use kiln_core::event::LogStream;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, warn};

/// Label attached to every container, valued with the workspace id.
const WORKSPACE_LABEL: &str = "dev.kiln.workspace";

/// How many trailing stderr lines to keep for failure classification.
const STDERR_TAIL: usize = 20;

/// Host environment variables forwarded to the docker CLI.
///
/// Everything else is stripped so step behavior cannot depend on the
/// invoking shell.
const PASSTHROUGH_ENV: &[&str] = &[
    "PATH",
    "HOME",
    "DOCKER_HOST",
    "DOCKER_CONFIG",
    "DOCKER_CERT_PATH",
    "DOCKER_TLS_VERIFY",
];

/// Container runtime backed by the `docker` CLI.
#[derive(Debug, Clone)]
pub struct DockerRuntime {
    binary: String,
}

impl Default for DockerRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl DockerRuntime {
    pub fn new() -> Self {
        Self {
            binary: "docker".to_string(),
        }
    }

    /// Override the docker binary (tests point this at a stub script).
    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.env_clear();
        for key in PASSTHROUGH_ENV {
            if let Ok(value) = std::env::var(key) {
                cmd.env(key, value);
            }
        }
        cmd
    }

    async fn container_ids(
        &self,
        workspace: &str,
        include_stopped: bool,
    ) -> Result<Vec<String>, String> {
        let mut cmd = self.command();
        cmd.arg("ps").arg("-q");
        if include_stopped {
            cmd.arg("-a");
        }
        cmd.arg("--filter")
            .arg(format!("label={WORKSPACE_LABEL}={workspace}"));

        let output = run_with_timeout(cmd, DOCKER_QUERY_TIMEOUT, "docker ps").await?;
        if !output.status.success() {
            return Err(String::from_utf8_lossy(&output.stderr).trim().to_string());
        }
        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(|line| line.trim().to_string())
            .filter(|line| !line.is_empty())
            .collect())
    }

    /// Stream one already-configured docker command to completion.
    async fn supervise(
        &self,
        mut cmd: Command,
        request: &RunRequest,
        on_log: LogSink,
    ) -> Result<RunOutcome, RuntimeError> {
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let started_at = epoch_ms();
        let mut child = cmd.spawn().map_err(|e| RuntimeError::Spawn(e.to_string()))?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let stderr_tail: Arc<Mutex<VecDeque<String>>> = Arc::new(Mutex::new(VecDeque::new()));

        let mut readers = tokio::task::JoinSet::new();
        if let Some(stdout) = stdout {
            let on_log = Arc::clone(&on_log);
            readers.spawn(async move {
                let mut lines = BufReader::new(stdout).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    on_log(LogStream::Stdout, line);
                }
            });
        }
        if let Some(stderr) = stderr {
            let on_log = Arc::clone(&on_log);
            let tail = Arc::clone(&stderr_tail);
            readers.spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    {
                        let mut tail = tail.lock();
                        if tail.len() == STDERR_TAIL {
                            tail.pop_front();
                        }
                        tail.push_back(line.clone());
                    }
                    on_log(LogStream::Stderr, line);
                }
            });
        }

        let status = match request.timeout {
            Some(duration) => match tokio::time::timeout(duration, child.wait()).await {
                Ok(result) => result?,
                Err(_elapsed) => {
                    warn!(container = %request.name, "run timed out, killing container");
                    self.force_kill(&request.name).await;
                    let _ = child.wait().await;
                    readers.shutdown().await;
                    return Err(RuntimeError::Timeout(duration.as_secs()));
                }
            },
            None => child.wait().await?,
        };

        // Drain remaining log lines before reporting completion.
        while readers.join_next().await.is_some() {}
        let finished_at = epoch_ms();

        let exit_code = status.code().unwrap_or(-1);
        let tail: Vec<String> = stderr_tail.lock().iter().cloned().collect();
        if let Some(error) = classify_cli_failure(exit_code, &tail, &request.image) {
            return Err(error);
        }

        Ok(RunOutcome {
            exit_code,
            started_at,
            finished_at,
        })
    }

    async fn force_kill(&self, name: &str) {
        let mut cmd = self.command();
        cmd.args(["kill", name]);
        if let Err(e) = run_with_timeout(cmd, DOCKER_QUERY_TIMEOUT, "docker kill").await {
            warn!(container = name, error = %e, "docker kill failed");
        }
    }

    async fn remove_container(&self, name: &str) {
        let mut cmd = self.command();
        cmd.args(["rm", "-f", name]);
        if let Err(e) = run_with_timeout(cmd, DOCKER_QUERY_TIMEOUT, "docker rm").await {
            debug!(container = name, error = %e, "docker rm failed");
        }
    }
}

fn epoch_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

fn mount_flag(mount: &Mount) -> String {
    let host = mount.host_path.display();
    if mount.read_only {
        format!("{}:{}:ro", host, mount.container_path)
    } else {
        format!("{}:{}", host, mount.container_path)
    }
}

/// Flags shared by `docker run` and `docker create`.
fn common_args(request: &RunRequest) -> Vec<String> {
    let mut args = vec![
        "--name".to_string(),
        request.name.clone(),
        "--label".to_string(),
        format!("{WORKSPACE_LABEL}={}", request.workspace),
        "--network".to_string(),
        request.network.as_str().to_string(),
    ];

    for (key, value) in &request.env {
        args.push("-e".to_string());
        args.push(format!("{key}={value}"));
    }
    for mount in request
        .inputs
        .iter()
        .chain(request.mounts.iter())
        .chain(request.output.iter())
        .chain(request.caches.iter())
    {
        args.push("-v".to_string());
        args.push(mount_flag(mount));
    }

    args.push(request.image.clone());
    args.extend(request.cmd.iter().cloned());
    args
}

/// Argument vector for the single-shot `docker run` path (no sources).
fn run_args(request: &RunRequest) -> Vec<String> {
    let mut args = vec!["run".to_string(), "--rm".to_string()];
    args.extend(common_args(request));
    args
}

/// Argument vector for `docker create` (sources present).
fn create_args(request: &RunRequest) -> Vec<String> {
    let mut args = vec!["create".to_string()];
    args.extend(common_args(request));
    args
}

/// Arguments for copying one source into a created container.
fn cp_args(source: &Mount, container: &str) -> Vec<String> {
    let host = if source.host_path.is_dir() {
        format!("{}/.", source.host_path.display())
    } else {
        source.host_path.display().to_string()
    };
    vec![
        "cp".to_string(),
        host,
        format!("{container}:{}", source.container_path),
    ]
}

/// Map docker CLI failures (as opposed to step command failures) onto the
/// error taxonomy. Step commands own every exit code except docker's own
/// 125 ("the docker command itself failed").
fn classify_cli_failure(exit_code: i32, stderr_tail: &[String], image: &str) -> Option<RuntimeError> {
    if exit_code != 125 {
        return None;
    }
    let tail = stderr_tail.join("\n");
    let pull_markers = [
        "pull access denied",
        "manifest unknown",
        "Unable to find image",
        "failed to resolve reference",
    ];
    if pull_markers.iter().any(|marker| tail.contains(marker)) {
        return Some(RuntimeError::ImagePull {
            image: image.to_string(),
            message: tail,
        });
    }
    if tail.contains("Cannot connect to the Docker daemon") {
        return Some(RuntimeError::NotAvailable(tail));
    }
    Some(RuntimeError::Spawn(tail))
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn check(&self) -> Result<(), RuntimeError> {
        let mut cmd = self.command();
        cmd.args(["version", "--format", "{{.Server.Version}}"]);
        let output = run_with_timeout(cmd, DOCKER_QUERY_TIMEOUT, "docker version")
            .await
            .map_err(RuntimeError::NotAvailable)?;
        if !output.status.success() {
            return Err(RuntimeError::NotAvailable(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
        Ok(())
    }

    async fn run(
        &self,
        request: RunRequest,
        on_log: LogSink,
    ) -> Result<RunOutcome, RuntimeError> {
        if request.sources.is_empty() {
            let mut cmd = self.command();
            cmd.args(run_args(&request));
            return self.supervise(cmd, &request, on_log).await;
        }

        // Sources present: create the container, copy the sources into its
        // writable layer, then attach. The container is removed afterwards
        // since `--rm` cannot be combined with `create` + `cp`.
        let mut create = self.command();
        create.args(create_args(&request));
        let output = run_with_timeout(create, DOCKER_QUERY_TIMEOUT, "docker create")
            .await
            .map_err(RuntimeError::Spawn)?;
        if !output.status.success() {
            let stderr: Vec<String> = String::from_utf8_lossy(&output.stderr)
                .lines()
                .map(|l| l.to_string())
                .collect();
            let code = output.status.code().unwrap_or(125);
            return Err(
                classify_cli_failure(code, &stderr, &request.image)
                    .unwrap_or_else(|| RuntimeError::Spawn(stderr.join("\n"))),
            );
        }

        for source in &request.sources {
            let mut cp = self.command();
            cp.args(cp_args(source, &request.name));
            match run_with_timeout(cp, DOCKER_CP_TIMEOUT, "docker cp").await {
                Ok(output) if output.status.success() => {}
                Ok(output) => {
                    self.remove_container(&request.name).await;
                    return Err(RuntimeError::Spawn(
                        String::from_utf8_lossy(&output.stderr).trim().to_string(),
                    ));
                }
                Err(e) => {
                    self.remove_container(&request.name).await;
                    return Err(RuntimeError::Spawn(e));
                }
            }
        }

        let mut start = self.command();
        start.args(["start", "--attach", &request.name]);
        let result = self.supervise(start, &request, on_log).await;
        self.remove_container(&request.name).await;
        result
    }

    async fn kill_running(&self, workspace: &str) -> Result<(), RuntimeError> {
        let ids = self
            .container_ids(workspace, false)
            .await
            .map_err(RuntimeError::CleanupFailed)?;
        for id in ids {
            self.force_kill(&id).await;
        }
        Ok(())
    }

    async fn cleanup(&self, workspace: &str) -> Result<(), RuntimeError> {
        let ids = self
            .container_ids(workspace, true)
            .await
            .map_err(RuntimeError::CleanupFailed)?;
        for id in ids {
            debug!(container = %id, workspace, "removing stale container");
            self.remove_container(&id).await;
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "docker_tests.rs"]
mod tests;
