// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Persisted step state (`state.json`).
//!
//! Maps step id to the run that currently satisfies it, plus the fingerprint
//! that run was produced under. Together with the `step-runs/` symlink index
//! this is the source of truth for "which run is current for each step".

use crate::StorageError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::Path;
use tracing::warn;

/// One step's current run and fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepEntry {
    pub run_id: String,
    pub fingerprint: String,
}

/// The persisted state document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct State {
    #[serde(default)]
    pub steps: BTreeMap<String, StepEntry>,
}

impl State {
    /// Load state from `path`. A missing file is an empty state; a corrupt
    /// file is moved aside to `.bak` and treated as empty, which at worst
    /// causes cache misses on the next run.
    pub fn load(path: &Path) -> Result<Self, StorageError> {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_reader(BufReader::new(file)) {
            Ok(state) => Ok(state),
            Err(e) => {
                let bak = path.with_extension("bak");
                warn!(
                    error = %e,
                    path = %path.display(),
                    "corrupt state file, moving to .bak and starting empty",
                );
                fs::rename(path, &bak)?;
                Ok(Self::default())
            }
        }
    }

    /// Save state atomically (write to .tmp, fsync, rename).
    pub fn save(&self, path: &Path) -> Result<(), StorageError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let tmp_path = path.with_extension("tmp");
        {
            let file = File::create(&tmp_path)?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer_pretty(&mut writer, self)?;
            let file = writer.into_inner().map_err(|e| e.into_error())?;
            file.sync_all()?;
        }
        fs::rename(&tmp_path, path)?;
        Ok(())
    }

    pub fn get_step(&self, step_id: &str) -> Option<&StepEntry> {
        self.steps.get(step_id)
    }

    pub fn set_step(
        &mut self,
        step_id: impl Into<String>,
        run_id: impl Into<String>,
        fingerprint: impl Into<String>,
    ) {
        self.steps.insert(
            step_id.into(),
            StepEntry {
                run_id: run_id.into(),
                fingerprint: fingerprint.into(),
            },
        );
    }

    /// Remove a step's entry, returning the run id it pointed at.
    pub fn remove_step(&mut self, step_id: &str) -> Option<String> {
        self.steps.remove(step_id).map(|entry| entry.run_id)
    }

    /// Run ids currently referenced by any step.
    pub fn active_run_ids(&self) -> HashSet<String> {
        self.steps.values().map(|e| e.run_id.clone()).collect()
    }
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
