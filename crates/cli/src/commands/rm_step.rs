// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `kiln rm-step` - forget a step's current run

use crate::Cli;
use anyhow::{bail, Result};
use clap::Args;
use kiln_storage::{State, WorkspaceStore};

#[derive(Args, Debug)]
pub struct RmStepArgs {
    /// Step id to forget
    pub step: String,

    /// Workspace name
    #[arg(long, default_value = "default")]
    pub workspace: String,
}

pub fn execute(cli: &Cli, args: &RmStepArgs) -> Result<()> {
    let workspace = WorkspaceStore::open(&cli.workspaces_root(), &args.workspace)?;
    let mut state = State::load(&workspace.state_path())?;

    let Some(run_id) = state.remove_step(&args.step) else {
        bail!("step `{}` has no state entry", args.step);
    };
    state.save(&workspace.state_path())?;
    workspace.remove_step_link(&args.step)?;

    if cli.json {
        println!(
            "{}",
            serde_json::json!({ "step": args.step, "forgotten": run_id })
        );
    } else {
        println!("forgot {} (was {run_id}); `kiln prune` reclaims the run", args.step);
    }
    Ok(())
}
