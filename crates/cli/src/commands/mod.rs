// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! CLI subcommand implementations

pub mod clean;
pub mod exec;
pub mod export;
pub mod inspect;
pub mod list;
pub mod logs;
pub mod prune;
pub mod rm;
pub mod rm_step;
pub mod run;
pub mod show;

use anyhow::{Context, Result};
use kiln_core::Step;
use kiln_pipeline::KitRegistry;
use std::path::{Path, PathBuf};

/// Load and resolve a pipeline file into engine-ready steps.
pub fn load_pipeline(file: &Path) -> Result<Vec<Step>> {
    let parsed = kiln_pipeline::load_file(file)
        .with_context(|| format!("loading pipeline {}", file.display()))?;
    let root = pipeline_root(file);
    let steps = kiln_pipeline::resolve(&parsed, &root, &KitRegistry::with_builtins())
        .with_context(|| format!("resolving pipeline {}", file.display()))?;
    Ok(steps)
}

/// Directory a pipeline file's relative paths resolve against.
pub fn pipeline_root(file: &Path) -> PathBuf {
    file.parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}
