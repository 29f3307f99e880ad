// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `kiln run` - attached, detached, and dry-run pipeline execution

use crate::client::DaemonClient;
use crate::{daemon_process, env, output, Cli};
use anyhow::{bail, Result};
use clap::Args;
use kiln_adapters::DockerRuntime;
use kiln_daemon::{Request, Response};
use kiln_engine::{PipelineRunner, Reporter, RunOptions};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Pipeline file
    #[arg(default_value = "pipeline.yaml")]
    pub file: PathBuf,

    /// Workspace name
    #[arg(long, default_value = "default")]
    pub workspace: String,

    /// Bypass the cache for a step (repeatable; unknown names are ignored)
    #[arg(long = "force", value_name = "STEP")]
    pub force: Vec<String>,

    /// Bypass the cache for every step
    #[arg(long)]
    pub force_all: bool,

    /// Plan and predict without running containers
    #[arg(long)]
    pub dry_run: bool,

    /// Run only this step and its ancestors (repeatable)
    #[arg(long = "target", value_name = "STEP")]
    pub targets: Vec<String>,

    /// Maximum steps running in parallel (default: CPU count)
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Env file overlaying the session environment for `if` conditions
    #[arg(long, value_name = "FILE")]
    pub env_file: Option<PathBuf>,

    /// Run in a background daemon and return immediately
    #[arg(long)]
    pub detach: bool,
}

pub async fn execute(cli: &Cli, args: &RunArgs) -> Result<()> {
    let steps = super::load_pipeline(&args.file)?;
    let project_root = super::pipeline_root(&args.file);
    let workspaces_root = cli.workspaces_root();

    let options = RunOptions {
        workspace: args.workspace.clone(),
        force: args.force.clone(),
        force_all: args.force_all,
        dry_run: args.dry_run,
        targets: args.targets.clone(),
        concurrency: args.concurrency,
        session_env: env::session_env(args.env_file.as_deref())?,
        socket_path: None,
    };

    if args.detach {
        let socket_path =
            daemon_process::start_daemon(&workspaces_root, &project_root, &options).await?;
        let mut client = DaemonClient::connect(&socket_path).await?;
        client
            .send(&Request::Run {
                pipeline: steps,
                options,
            })
            .await?;
        match client.recv().await? {
            Response::Ack { job_id } => {
                println!("started job {job_id}");
                println!("socket: {}", socket_path.display());
                println!("follow with: kiln logs --workspace {} --follow", args.workspace);
                Ok(())
            }
            Response::Error { code, message } => bail!("daemon refused run: {code}: {message}"),
            other => bail!("unexpected daemon reply: {other:?}"),
        }
    } else {
        run_attached(cli, steps, project_root, workspaces_root, options).await
    }
}

async fn run_attached(
    cli: &Cli,
    steps: Vec<kiln_core::Step>,
    project_root: PathBuf,
    workspaces_root: PathBuf,
    options: RunOptions,
) -> Result<()> {
    let format = cli.output_format();
    let (reporter, mut events) = Reporter::new();
    let printer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            output::print_event(format, &event);
        }
    });

    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = cancel_tx.send(true);
        }
    });

    let runner = PipelineRunner::new(
        workspaces_root,
        project_root,
        Arc::new(DockerRuntime::new()),
        reporter,
    );
    let result = runner.run(&steps, options, cancel_rx).await;

    drop(runner);
    let _ = printer.await;

    match result {
        Ok(true) => Ok(()),
        Ok(false) => bail!("pipeline failed"),
        Err(e) => Err(e.into()),
    }
}
