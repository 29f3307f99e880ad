// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `kiln inspect` - run metadata

use crate::Cli;
use anyhow::{bail, Result};
use clap::Args;
use kiln_storage::{StorageError, WorkspaceStore};

#[derive(Args, Debug)]
pub struct InspectArgs {
    /// Step id (resolves to its current run) or a run id
    pub target: String,

    /// Workspace name
    #[arg(long, default_value = "default")]
    pub workspace: String,
}

pub fn execute(cli: &Cli, args: &InspectArgs) -> Result<()> {
    let workspace = WorkspaceStore::open(&cli.workspaces_root(), &args.workspace)?;

    // A step id takes precedence; fall back to treating the target as a
    // run id.
    let run_id = workspace
        .current_run(&args.target)
        .unwrap_or_else(|| args.target.clone());

    let meta = match workspace.read_meta(&run_id) {
        Ok(meta) => meta,
        Err(StorageError::RunNotFound(_)) => {
            bail!("no run found for `{}`", args.target)
        }
        Err(e) => return Err(e.into()),
    };

    if cli.json {
        println!("{}", serde_json::to_string(&meta)?);
    } else {
        println!("{}", serde_json::to_string_pretty(&meta)?);
    }
    Ok(())
}
