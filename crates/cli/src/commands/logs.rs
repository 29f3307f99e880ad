// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `kiln logs` - stored logs, or live logs via the daemon

use crate::client::DaemonClient;
use crate::{output, Cli};
use anyhow::{bail, Context, Result};
use clap::Args;
use kiln_daemon::{Request, Response};
use kiln_storage::{LockInfo, WorkspaceStore};
use std::io::{BufRead, BufReader};

#[derive(Args, Debug)]
pub struct LogsArgs {
    /// Step id; omit with --follow to stream the whole pipeline
    pub step: Option<String>,

    /// Workspace name
    #[arg(long, default_value = "default")]
    pub workspace: String,

    /// Subscribe to the running daemon and stream live logs
    #[arg(long)]
    pub follow: bool,
}

pub async fn execute(cli: &Cli, args: &LogsArgs) -> Result<()> {
    let workspace = WorkspaceStore::open(&cli.workspaces_root(), &args.workspace)?;

    if args.follow {
        return follow(cli, &workspace, args.step.as_deref()).await;
    }

    let Some(step) = &args.step else {
        bail!("a step id is required unless --follow is given");
    };
    let Some(run_id) = workspace.current_run(step) else {
        bail!("step `{step}` has no current run");
    };

    let run_dir = workspace.run_path(&run_id);
    for (file, to_stderr) in [("stdout.log", false), ("stderr.log", true)] {
        let path = run_dir.join(file);
        let Ok(reader) = std::fs::File::open(&path) else {
            continue;
        };
        for line in BufReader::new(reader).lines() {
            let line = line?;
            if to_stderr {
                eprintln!("{line}");
            } else {
                println!("{line}");
            }
        }
    }
    Ok(())
}

/// Stream live events from the daemon recorded in the workspace lock.
async fn follow(cli: &Cli, workspace: &WorkspaceStore, step: Option<&str>) -> Result<()> {
    let lock_raw = std::fs::read_to_string(workspace.lock_path())
        .context("workspace is not running under a daemon (no lock file)")?;
    let lock: LockInfo = serde_json::from_str(&lock_raw).context("malformed lock file")?;
    let Some(socket_path) = lock.socket_path else {
        bail!("workspace is locked by pid {} without a daemon socket", lock.pid);
    };

    let mut client = DaemonClient::connect(&socket_path).await?;
    client.send(&Request::Subscribe { logs: true }).await?;

    loop {
        match client.recv().await {
            Ok(Response::Event { event }) => {
                let relevant = match step {
                    Some(filter) => event.step_id() == Some(filter),
                    None => true,
                };
                if relevant {
                    output::print_event(cli.output_format(), &event);
                }
            }
            Ok(Response::State { .. }) => {}
            Ok(Response::Done { success }) => {
                if !success {
                    bail!("pipeline failed");
                }
                return Ok(());
            }
            Ok(_) => {}
            Err(crate::client::ClientError::Closed) => return Ok(()),
            Err(e) => return Err(e.into()),
        }
    }
}
