// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `kiln export` - copy a step's artifacts out of the workspace

use crate::Cli;
use anyhow::{bail, Context, Result};
use clap::Args;
use kiln_storage::WorkspaceStore;
use std::path::{Path, PathBuf};

#[derive(Args, Debug)]
pub struct ExportArgs {
    /// Step id whose current artifacts to export
    pub step: String,

    /// Destination directory (created if needed)
    pub dest: PathBuf,

    /// Workspace name
    #[arg(long, default_value = "default")]
    pub workspace: String,
}

pub fn execute(cli: &Cli, args: &ExportArgs) -> Result<()> {
    let workspace = WorkspaceStore::open(&cli.workspaces_root(), &args.workspace)?;
    let Some(run_id) = workspace.current_run(&args.step) else {
        bail!("step `{}` has no current run", args.step);
    };

    let artifacts = workspace.run_artifacts_path(&run_id);
    if !artifacts.is_dir() {
        bail!("artifacts for run {run_id} are missing");
    }

    copy_dir(&artifacts, &args.dest)
        .with_context(|| format!("copying artifacts to {}", args.dest.display()))?;

    if cli.json {
        println!(
            "{}",
            serde_json::json!({ "step": args.step, "runId": run_id, "dest": args.dest })
        );
    } else {
        println!("exported {} ({}) to {}", args.step, run_id, args.dest.display());
    }
    Ok(())
}

fn copy_dir(from: &Path, to: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(to)?;
    for entry in std::fs::read_dir(from)? {
        let entry = entry?;
        let target = to.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir(&entry.path(), &target)?;
        } else {
            std::fs::copy(entry.path(), target)?;
        }
    }
    Ok(())
}
