// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cross-process workspace lock (`daemon.json`).
//!
//! The lock file names the holder's PID; liveness is probed with a null
//! signal. A lock whose holder is dead, or whose file no longer parses, is
//! stale and removed on contention. The check is advisory: it serializes
//! cooperating kiln processes, it does not fence arbitrary writers.

use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;
use tracing::{debug, warn};

/// Contents of `daemon.json` while a run holds the workspace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockInfo {
    pub pid: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub socket_path: Option<PathBuf>,
    /// Epoch milliseconds.
    pub started_at: u64,
    pub version: String,
}

/// Lock acquisition errors.
#[derive(Debug, Error)]
pub enum LockError {
    #[error("workspace is locked by pid {}", .0.pid)]
    Held(LockInfo),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl LockError {
    pub fn code(&self) -> &'static str {
        match self {
            LockError::Held(_) => "WORKSPACE_LOCKED",
            LockError::Io(_) | LockError::Json(_) => "STORAGE_IO",
        }
    }
}

/// Check if a process with the given PID exists (null signal probe).
pub fn process_exists(pid: u32) -> bool {
    Command::new("kill")
        .args(["-0", &pid.to_string()])
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// A held workspace lock. Released on [`WorkspaceLock::release`] or drop.
#[derive(Debug)]
pub struct WorkspaceLock {
    path: PathBuf,
    info: LockInfo,
    released: bool,
}

impl WorkspaceLock {
    /// Acquire the lock at `path` (the workspace's `daemon.json`).
    ///
    /// Fails with [`LockError::Held`] if another live process holds it.
    /// Stale locks (dead PID, malformed file) are removed and acquisition
    /// retried.
    pub fn acquire(
        path: &Path,
        socket_path: Option<PathBuf>,
        started_at: u64,
        version: &str,
    ) -> Result<Self, LockError> {
        match read_lock(path) {
            ReadLock::Live(info) => {
                if info.pid != std::process::id() {
                    return Err(LockError::Held(info));
                }
                // Our own pid: a previous lock of this process was not
                // cleanly released. Overwrite it.
                debug!(path = %path.display(), "re-acquiring own stale lock");
            }
            ReadLock::Stale => {
                warn!(path = %path.display(), "removing stale workspace lock");
                let _ = fs::remove_file(path);
            }
            ReadLock::Absent => {}
        }

        let info = LockInfo {
            pid: std::process::id(),
            socket_path,
            started_at,
            version: version.to_string(),
        };
        write_lock(path, &info)?;
        Ok(Self {
            path: path.to_path_buf(),
            info,
            released: false,
        })
    }

    pub fn info(&self) -> &LockInfo {
        &self.info
    }

    /// Remove the lock file. Idempotent.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if let Err(e) = fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %self.path.display(), error = %e, "failed to remove lock file");
            }
        }
    }
}

impl Drop for WorkspaceLock {
    fn drop(&mut self) {
        self.release();
    }
}

enum ReadLock {
    Live(LockInfo),
    Stale,
    Absent,
}

fn read_lock(path: &Path) -> ReadLock {
    let content = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(_) => return ReadLock::Absent,
    };
    match serde_json::from_str::<LockInfo>(&content) {
        Ok(info) if process_exists(info.pid) => ReadLock::Live(info),
        Ok(_) => ReadLock::Stale,
        Err(_) => ReadLock::Stale,
    }
}

/// Write the lock via temp-file-then-rename so readers never see a torn file.
fn write_lock(path: &Path, info: &LockInfo) -> Result<(), LockError> {
    let tmp = path.with_extension("tmp");
    {
        let file = File::create(&tmp)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, info)?;
        writer.flush()?;
        let file = writer.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
#[path = "lock_tests.rs"]
mod tests;
