// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `kiln rm` - remove a workspace

use crate::Cli;
use anyhow::{bail, Result};
use clap::Args;
use kiln_storage::{process_exists, LockInfo, WorkspaceStore};

#[derive(Args, Debug)]
pub struct RmArgs {
    /// Workspace name
    pub workspace: String,
}

pub fn execute(cli: &Cli, args: &RmArgs) -> Result<()> {
    let root = cli.workspaces_root();
    let workspace = WorkspaceStore::open(&root, &args.workspace)?;

    // Refuse to delete under a live run.
    if let Ok(raw) = std::fs::read_to_string(workspace.lock_path()) {
        if let Ok(lock) = serde_json::from_str::<LockInfo>(&raw) {
            if process_exists(lock.pid) {
                bail!(
                    "workspace `{}` is in use by pid {}",
                    args.workspace,
                    lock.pid
                );
            }
        }
    }

    WorkspaceStore::remove(&root, &args.workspace)?;
    if cli.json {
        println!("{}", serde_json::json!({ "removed": args.workspace }));
    } else {
        println!("removed workspace {}", args.workspace);
    }
    Ok(())
}
