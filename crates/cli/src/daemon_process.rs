// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon process management.
//!
//! Starts `kilnd` for detached runs: spawn with piped stdio, write the
//! handshake line, wait for the ready reply carrying the socket path, then
//! drop the pipes so the daemon runs on without us.

use crate::client::ClientError;
use kiln_daemon::{Handshake, Ready};
use kiln_engine::RunOptions;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;

/// How long to wait for the daemon's ready reply.
const READY_TIMEOUT: Duration = Duration::from_secs(10);

/// Environment variable overriding the kilnd binary path.
pub const DAEMON_BINARY_ENV: &str = "KILN_DAEMON_BIN";

/// Spawn a detached daemon and return the socket path it listens on.
pub async fn start_daemon(
    workspaces_root: &Path,
    project_root: &Path,
    options: &RunOptions,
) -> Result<PathBuf, ClientError> {
    let binary = find_kilnd_binary();

    let mut child = Command::new(&binary)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| ClientError::DaemonStartFailed(format!("{}: {e}", binary.display())))?;

    let handshake = Handshake {
        workspace_root: workspaces_root.to_path_buf(),
        cwd: Some(project_root.to_path_buf()),
        options: Some(options.clone()),
    };
    let mut line = serde_json::to_vec(&handshake)
        .map_err(|e| ClientError::DaemonStartFailed(e.to_string()))?;
    line.push(b'\n');

    let Some(mut stdin) = child.stdin.take() else {
        return Err(ClientError::DaemonStartFailed("no stdin pipe".to_string()));
    };
    stdin
        .write_all(&line)
        .await
        .map_err(|e| ClientError::DaemonStartFailed(e.to_string()))?;
    drop(stdin);

    let Some(stdout) = child.stdout.take() else {
        return Err(ClientError::DaemonStartFailed("no stdout pipe".to_string()));
    };
    let mut reader = BufReader::new(stdout);
    let mut reply = String::new();
    tokio::time::timeout(READY_TIMEOUT, reader.read_line(&mut reply))
        .await
        .map_err(|_| ClientError::DaemonStartFailed("timed out waiting for ready".to_string()))?
        .map_err(|e| ClientError::DaemonStartFailed(e.to_string()))?;

    let Ready::Ready { socket_path } = serde_json::from_str(reply.trim())
        .map_err(|e| ClientError::DaemonStartFailed(format!("bad ready reply: {e}")))?;

    // Drop the pipes; the daemon runs independently from here.
    drop(reader);
    drop(child);

    Ok(socket_path)
}

/// Find the kilnd binary: env override, then a sibling of the current
/// executable, then PATH.
fn find_kilnd_binary() -> PathBuf {
    if let Ok(path) = std::env::var(DAEMON_BINARY_ENV) {
        if !path.is_empty() {
            return PathBuf::from(path);
        }
    }

    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            let sibling = dir.join("kilnd");
            if sibling.exists() {
                return sibling;
            }
        }
    }

    PathBuf::from("kilnd")
}

#[cfg(test)]
#[path = "daemon_process_tests.rs"]
mod tests;
