// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Container runtime abstraction.
//!
//! The engine talks to containers only through [`ContainerRuntime`]; the
//! docker CLI implementation lives in [`crate::DockerRuntime`] and tests use
//! `FakeRuntime`. One `run` call is one container: mounts and env are fully
//! specified up front, log lines stream out through the sink, and the exit
//! code comes back in the outcome.

use async_trait::async_trait;
use kiln_core::event::LogStream;
use kiln_core::step::NetworkMode;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors from the container runtime.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("container runtime not available: {0}")]
    NotAvailable(String),

    #[error("failed to pull image {image}: {message}")]
    ImagePull { image: String, message: String },

    #[error("container timed out after {0}s")]
    Timeout(u64),

    #[error("failed to launch container: {0}")]
    Spawn(String),

    #[error("container cleanup failed: {0}")]
    CleanupFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RuntimeError {
    /// Stable machine-readable code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            RuntimeError::NotAvailable(_) => "DOCKER_NOT_AVAILABLE",
            RuntimeError::ImagePull { .. } => "IMAGE_PULL_FAILED",
            RuntimeError::Timeout(_) => "CONTAINER_TIMEOUT",
            RuntimeError::Spawn(_) => "CONTAINER_CRASH",
            RuntimeError::CleanupFailed(_) => "CONTAINER_CLEANUP_FAILED",
            RuntimeError::Io(_) => "CONTAINER_CRASH",
        }
    }

    /// Transient errors are eligible for the step retry budget.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            RuntimeError::NotAvailable(_)
                | RuntimeError::ImagePull { .. }
                | RuntimeError::Timeout(_)
                | RuntimeError::CleanupFailed(_)
        )
    }
}

/// One host path made visible inside the container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mount {
    pub host_path: PathBuf,
    pub container_path: String,
    pub read_only: bool,
}

impl Mount {
    pub fn read_only(host_path: impl Into<PathBuf>, container_path: impl Into<String>) -> Self {
        Self {
            host_path: host_path.into(),
            container_path: container_path.into(),
            read_only: true,
        }
    }

    pub fn read_write(host_path: impl Into<PathBuf>, container_path: impl Into<String>) -> Self {
        Self {
            host_path: host_path.into(),
            container_path: container_path.into(),
            read_only: false,
        }
    }
}

/// Everything needed to launch one container.
#[derive(Debug, Clone)]
pub struct RunRequest {
    /// Container name, unique per invocation.
    pub name: String,
    /// Workspace id, used to label containers for kill/cleanup.
    pub workspace: String,
    pub image: String,
    pub cmd: Vec<String>,
    pub env: BTreeMap<String, String>,
    /// Input artifact mounts (read-only).
    pub inputs: Vec<Mount>,
    /// Artifact output mount (read-write); absent for setup and ephemeral
    /// scratch phases.
    pub output: Option<Mount>,
    /// Named cache mounts (read-write).
    pub caches: Vec<Mount>,
    /// Host bind mounts (read-only).
    pub mounts: Vec<Mount>,
    /// Host paths copied into the container's writable layer.
    pub sources: Vec<Mount>,
    pub network: NetworkMode,
    pub timeout: Option<Duration>,
}

/// Result of a completed (not crashed-at-launch) container run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    pub exit_code: i32,
    /// Epoch milliseconds.
    pub started_at: u64,
    /// Epoch milliseconds.
    pub finished_at: u64,
}

impl RunOutcome {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Sink for streamed container log lines.
pub type LogSink = Arc<dyn Fn(LogStream, String) + Send + Sync>;

/// Launches and supervises containers.
#[async_trait]
pub trait ContainerRuntime: Send + Sync + 'static {
    /// Verify the runtime is usable.
    async fn check(&self) -> Result<(), RuntimeError>;

    /// Run one container to completion, streaming log lines to `on_log`.
    async fn run(&self, request: RunRequest, on_log: LogSink)
        -> Result<RunOutcome, RuntimeError>;

    /// Best-effort termination of all running containers for a workspace.
    async fn kill_running(&self, workspace: &str) -> Result<(), RuntimeError>;

    /// Remove stale containers left behind by a prior crashed run.
    async fn cleanup(&self, workspace: &str) -> Result<(), RuntimeError>;
}
