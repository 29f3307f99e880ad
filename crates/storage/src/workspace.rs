// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workspace directory layout and the run commit protocol.
//!
//! ```text
//! <root>/<name>/
//!   staging/<runId>/      in-progress runs (artifacts/, logs, meta.json)
//!   runs/<runId>/         committed runs
//!   caches/<name>/        persistent named caches
//!   step-runs/<stepId>    symlink to the step's current run
//!   state.json            step id -> {runId, fingerprint}
//!   daemon.json           workspace lock (while held)
//! ```
//!
//! A run becomes visible in `runs/` through a single rename of its staging
//! directory, after artifacts and `meta.json` are fully flushed. Failed runs
//! never leave `staging/`.

use crate::StorageError;
use kiln_core::run::RunRecord;
use kiln_core::step::validate_identifier;
use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const STAGING_DIR: &str = "staging";
const RUNS_DIR: &str = "runs";
const CACHES_DIR: &str = "caches";
const STEP_RUNS_DIR: &str = "step-runs";
const STATE_FILE: &str = "state.json";
const LOCK_FILE: &str = "daemon.json";
const META_FILE: &str = "meta.json";
const ARTIFACTS_DIR: &str = "artifacts";

/// Handle to one workspace directory.
#[derive(Debug, Clone)]
pub struct WorkspaceStore {
    name: String,
    dir: PathBuf,
}

impl WorkspaceStore {
    /// Create a workspace (idempotent) and return a handle to it.
    pub fn create(root: &Path, name: &str) -> Result<Self, StorageError> {
        validate_identifier(name)
            .map_err(|_| StorageError::InvalidWorkspaceName(name.to_string()))?;
        let dir = root.join(name);
        for sub in [STAGING_DIR, RUNS_DIR, CACHES_DIR, STEP_RUNS_DIR] {
            fs::create_dir_all(dir.join(sub))?;
        }
        Ok(Self {
            name: name.to_string(),
            dir,
        })
    }

    /// Open an existing workspace; fails if it does not exist.
    pub fn open(root: &Path, name: &str) -> Result<Self, StorageError> {
        let dir = root.join(name);
        if !dir.is_dir() {
            return Err(StorageError::WorkspaceNotFound(name.to_string()));
        }
        Ok(Self {
            name: name.to_string(),
            dir,
        })
    }

    /// Open a workspace, creating it on first use.
    pub fn open_or_create(root: &Path, name: &str) -> Result<Self, StorageError> {
        match Self::open(root, name) {
            Ok(ws) => Ok(ws),
            Err(StorageError::WorkspaceNotFound(_)) => Self::create(root, name),
            Err(e) => Err(e),
        }
    }

    /// List workspace names under `root`.
    pub fn list(root: &Path) -> Result<Vec<String>, StorageError> {
        let mut names = Vec::new();
        let entries = match fs::read_dir(root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(names),
            Err(e) => return Err(e.into()),
        };
        for entry in entries {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    /// Remove a workspace directory entirely.
    pub fn remove(root: &Path, name: &str) -> Result<(), StorageError> {
        let dir = root.join(name);
        if !dir.is_dir() {
            return Err(StorageError::WorkspaceNotFound(name.to_string()));
        }
        fs::remove_dir_all(&dir)?;
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn state_path(&self) -> PathBuf {
        self.dir.join(STATE_FILE)
    }

    pub fn lock_path(&self) -> PathBuf {
        self.dir.join(LOCK_FILE)
    }

    pub fn staging_run_path(&self, run_id: &str) -> PathBuf {
        self.dir.join(STAGING_DIR).join(run_id)
    }

    pub fn staging_artifacts_path(&self, run_id: &str) -> PathBuf {
        self.staging_run_path(run_id).join(ARTIFACTS_DIR)
    }

    pub fn run_path(&self, run_id: &str) -> PathBuf {
        self.dir.join(RUNS_DIR).join(run_id)
    }

    pub fn run_artifacts_path(&self, run_id: &str) -> PathBuf {
        self.run_path(run_id).join(ARTIFACTS_DIR)
    }

    pub fn cache_path(&self, name: &str) -> PathBuf {
        self.dir.join(CACHES_DIR).join(name)
    }

    fn step_run_link(&self, step_id: &str) -> PathBuf {
        self.dir.join(STEP_RUNS_DIR).join(step_id)
    }

    /// Remove all staging subdirectories. Called at session start so a
    /// crashed prior run cannot leave partial output behind.
    pub fn cleanup_staging(&self) -> Result<(), StorageError> {
        let staging = self.dir.join(STAGING_DIR);
        let entries = match fs::read_dir(&staging) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        for entry in entries {
            let entry = entry?;
            let path = entry.path();
            debug!(path = %path.display(), "removing stale staging entry");
            if entry.file_type()?.is_dir() {
                fs::remove_dir_all(&path)?;
            } else {
                fs::remove_file(&path)?;
            }
        }
        Ok(())
    }

    /// Idempotently create a named cache directory.
    pub fn prepare_cache(&self, name: &str) -> Result<PathBuf, StorageError> {
        validate_identifier(name)
            .map_err(|_| StorageError::InvalidWorkspaceName(name.to_string()))?;
        let path = self.cache_path(name);
        fs::create_dir_all(&path)?;
        Ok(path)
    }

    /// Committed run ids, sorted (run ids are time-sortable).
    pub fn list_runs(&self) -> Result<Vec<String>, StorageError> {
        self.list_dir_names(&self.dir.join(RUNS_DIR))
    }

    /// Existing cache names, sorted.
    pub fn list_caches(&self) -> Result<Vec<String>, StorageError> {
        self.list_dir_names(&self.dir.join(CACHES_DIR))
    }

    fn list_dir_names(&self, dir: &Path) -> Result<Vec<String>, StorageError> {
        let mut names = Vec::new();
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(names),
            Err(e) => return Err(e.into()),
        };
        for entry in entries {
            let entry = entry?;
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    /// Remove every committed run not in `keep` and not referenced by a
    /// `step-runs/` link. Returns the removed run ids.
    pub fn prune_runs(&self, keep: &HashSet<String>) -> Result<Vec<String>, StorageError> {
        let mut protected = keep.clone();
        for step_id in self.list_dir_names(&self.dir.join(STEP_RUNS_DIR))? {
            if let Some(run_id) = self.current_run(&step_id) {
                protected.insert(run_id);
            }
        }

        let mut removed = Vec::new();
        for run_id in self.list_runs()? {
            if !protected.contains(&run_id) {
                fs::remove_dir_all(self.run_path(&run_id))?;
                removed.push(run_id);
            }
        }
        Ok(removed)
    }

    /// Create the staging directory for a run, returning its artifacts path.
    pub fn begin_staging(&self, run_id: &str) -> Result<PathBuf, StorageError> {
        let artifacts = self.staging_artifacts_path(run_id);
        fs::create_dir_all(&artifacts).map_err(|e| StorageError::StagingFailed {
            run_id: run_id.to_string(),
            message: e.to_string(),
        })?;
        Ok(artifacts)
    }

    /// Best-effort removal of a staging directory after a failed run.
    pub fn discard_staging(&self, run_id: &str) {
        let path = self.staging_run_path(run_id);
        if let Err(e) = fs::remove_dir_all(&path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(run_id, error = %e, "failed to discard staging directory");
            }
        }
    }

    /// Append a line to a log file in the staging run directory.
    pub fn append_staging_log(
        &self,
        run_id: &str,
        file_name: &str,
        line: &str,
    ) -> Result<(), StorageError> {
        let path = self.staging_run_path(run_id).join(file_name);
        let mut file = fs::OpenOptions::new().create(true).append(true).open(path)?;
        file.write_all(line.as_bytes())?;
        file.write_all(b"\n")?;
        Ok(())
    }

    /// Commit a staged run: flush `meta.json`, then promote the staging
    /// directory into `runs/` with a single rename and point the step's
    /// `step-runs/` link at it.
    ///
    /// Idempotent: if the staging directory is already gone but the run
    /// directory exists, only the link is refreshed.
    pub fn commit_run(&self, record: &RunRecord) -> Result<(), StorageError> {
        let staging = self.staging_run_path(&record.run_id);
        let committed = self.run_path(&record.run_id);

        if staging.is_dir() {
            self.write_meta(&staging, record)?;
            if let Err(e) = fs::rename(&staging, &committed) {
                self.discard_staging(&record.run_id);
                return Err(StorageError::StagingFailed {
                    run_id: record.run_id.clone(),
                    message: format!("commit rename failed: {e}"),
                });
            }
        } else if !committed.is_dir() {
            return Err(StorageError::RunNotFound(record.run_id.clone()));
        }

        self.update_step_link(&record.step_id, &record.run_id)?;
        Ok(())
    }

    fn write_meta(&self, run_dir: &Path, record: &RunRecord) -> Result<(), StorageError> {
        let path = run_dir.join(META_FILE);
        let file = File::create(&path)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, record)?;
        let file = writer.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;
        Ok(())
    }

    /// Atomically point `step-runs/<stepId>` at a committed run: write the
    /// symlink under a temporary name, then rename over the old link.
    fn update_step_link(&self, step_id: &str, run_id: &str) -> Result<(), StorageError> {
        let link = self.step_run_link(step_id);
        let tmp = self.dir.join(STEP_RUNS_DIR).join(format!(".{step_id}.tmp"));
        let target = Path::new("..").join(RUNS_DIR).join(run_id);

        let _ = fs::remove_file(&tmp);
        std::os::unix::fs::symlink(&target, &tmp)?;
        fs::rename(&tmp, &link)?;
        Ok(())
    }

    /// Remove a step's current-run link, if present.
    pub fn remove_step_link(&self, step_id: &str) -> Result<(), StorageError> {
        match fs::remove_file(self.step_run_link(step_id)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Run id the step's `step-runs/` link currently resolves to.
    pub fn current_run(&self, step_id: &str) -> Option<String> {
        let target = fs::read_link(self.step_run_link(step_id)).ok()?;
        target
            .file_name()
            .and_then(|name| name.to_str())
            .map(|name| name.to_string())
    }

    /// Read the metadata of a committed run.
    pub fn read_meta(&self, run_id: &str) -> Result<RunRecord, StorageError> {
        let path = self.run_path(run_id).join(META_FILE);
        let file = match File::open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::RunNotFound(run_id.to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }

    /// True when a committed run's artifact directory is still on disk.
    pub fn artifacts_exist(&self, run_id: &str) -> bool {
        self.run_artifacts_path(run_id).is_dir()
    }
}

#[cfg(test)]
#[path = "workspace_tests.rs"]
mod tests;
