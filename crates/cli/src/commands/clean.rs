// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `kiln clean` - clean staging leftovers and prune unreferenced runs

use crate::Cli;
use anyhow::Result;
use clap::Args;
use kiln_storage::{State, WorkspaceStore};

#[derive(Args, Debug)]
pub struct CleanArgs {
    /// Workspace name
    #[arg(long, default_value = "default")]
    pub workspace: String,
}

pub fn execute(cli: &Cli, args: &CleanArgs) -> Result<()> {
    let workspace = WorkspaceStore::open(&cli.workspaces_root(), &args.workspace)?;
    workspace.cleanup_staging()?;

    let state = State::load(&workspace.state_path())?;
    let removed = workspace.prune_runs(&state.active_run_ids())?;

    if cli.json {
        println!("{}", serde_json::json!({ "pruned": removed.len() }));
    } else {
        println!("cleaned staging, pruned {} run(s)", removed.len());
    }
    Ok(())
}
