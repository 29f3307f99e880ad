// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `kiln list` - list workspaces

use crate::Cli;
use anyhow::Result;
use clap::Args;
use kiln_storage::WorkspaceStore;

#[derive(Args, Debug)]
pub struct ListArgs {}

pub fn execute(cli: &Cli, _args: &ListArgs) -> Result<()> {
    let root = cli.workspaces_root();
    let names = WorkspaceStore::list(&root)?;

    if cli.json {
        let mut entries = Vec::new();
        for name in &names {
            let workspace = WorkspaceStore::open(&root, name)?;
            entries.push(serde_json::json!({
                "name": name,
                "runs": workspace.list_runs()?.len(),
                "caches": workspace.list_caches()?,
                "locked": workspace.lock_path().exists(),
            }));
        }
        println!("{}", serde_json::json!({ "workspaces": entries }));
        return Ok(());
    }

    if names.is_empty() {
        println!("no workspaces in {}", root.display());
        return Ok(());
    }
    for name in &names {
        let workspace = WorkspaceStore::open(&root, name)?;
        let runs = workspace.list_runs()?.len();
        let locked = if workspace.lock_path().exists() {
            " [locked]"
        } else {
            ""
        };
        println!("{name:<20} {runs} run(s){locked}");
    }
    Ok(())
}
