// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `kiln prune` - remove unreferenced runs

use crate::Cli;
use anyhow::Result;
use clap::Args;
use kiln_storage::{State, WorkspaceStore};

#[derive(Args, Debug)]
pub struct PruneArgs {
    /// Workspace name
    #[arg(long, default_value = "default")]
    pub workspace: String,
}

pub fn execute(cli: &Cli, args: &PruneArgs) -> Result<()> {
    let workspace = WorkspaceStore::open(&cli.workspaces_root(), &args.workspace)?;
    let state = State::load(&workspace.state_path())?;

    let removed = workspace.prune_runs(&state.active_run_ids())?;

    if cli.json {
        println!("{}", serde_json::json!({ "removed": removed }));
    } else if removed.is_empty() {
        println!("nothing to prune");
    } else {
        for run_id in &removed {
            println!("removed {run_id}");
        }
        println!("pruned {} run(s)", removed.len());
    }
    Ok(())
}
