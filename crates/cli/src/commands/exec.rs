// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `kiln exec` - ephemeral single-step execution

use crate::{env, output, Cli};
use anyhow::{bail, Result};
use clap::Args;
use kiln_adapters::DockerRuntime;
use kiln_engine::{Reporter, StepRunner};
use kiln_storage::{State, WorkspaceStore};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Args, Debug)]
pub struct ExecArgs {
    /// Pipeline file
    pub file: PathBuf,

    /// Step id to execute
    pub step: String,

    /// Workspace name (read for input artifacts and caches)
    #[arg(long, default_value = "default")]
    pub workspace: String,

    /// Env file overlaying the session environment
    #[arg(long, value_name = "FILE")]
    pub env_file: Option<PathBuf>,
}

pub async fn execute(cli: &Cli, args: &ExecArgs) -> Result<()> {
    let steps = super::load_pipeline(&args.file)?;
    let Some(step) = steps.iter().find(|step| step.id == args.step) else {
        bail!("step not found in pipeline: {}", args.step);
    };

    let workspace = WorkspaceStore::open_or_create(&cli.workspaces_root(), &args.workspace)?;
    let state = Arc::new(Mutex::new(State::load(&workspace.state_path())?));

    let format = cli.output_format();
    let (reporter, mut events) = Reporter::new();
    let printer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            output::print_event(format, &event);
        }
    });

    let runner = StepRunner::new(
        workspace,
        Arc::new(DockerRuntime::new()),
        reporter,
        state,
        super::pipeline_root(&args.file),
        env::session_env(args.env_file.as_deref())?,
    );
    let exit_code = runner.run_ephemeral(step).await;

    drop(runner);
    let _ = printer.await;

    match exit_code {
        Ok(0) => Ok(()),
        Ok(code) => bail!("step exited with code {code}"),
        Err(e) => Err(e.into()),
    }
}
