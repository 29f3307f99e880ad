// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! kiln - containerized pipeline runner CLI

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod client;
mod commands;
mod daemon_process;
mod env;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{clean, exec, export, inspect, list, logs, prune, rm, rm_step, run, show};
use output::OutputFormat;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "kiln",
    version,
    about = "kiln - containerized pipelines with deterministic caching"
)]
pub struct Cli {
    /// Workspaces root (overrides KILN_WORKDIR)
    #[arg(long = "workdir", global = true, value_name = "DIR")]
    pub workdir: Option<PathBuf>,

    /// Emit machine-readable JSON
    #[arg(long = "json", global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn output_format(&self) -> OutputFormat {
        if self.json {
            OutputFormat::Json
        } else {
            OutputFormat::Human
        }
    }

    pub fn workspaces_root(&self) -> PathBuf {
        env::workspaces_root(self.workdir.clone())
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a pipeline
    Run(run::RunArgs),
    /// Run a single step ephemerally (no commit, workspace unchanged)
    Exec(exec::ExecArgs),
    /// Show the metadata of a step's current run
    Inspect(inspect::InspectArgs),
    /// Print the stored logs of a step's current run
    Logs(logs::LogsArgs),
    /// Copy a step's current artifacts out of the workspace
    Export(export::ExportArgs),
    /// Show the resolved pipeline and its execution levels
    Show(show::ShowArgs),
    /// Remove runs not referenced by the current state
    Prune(prune::PruneArgs),
    /// Forget a step's current run
    RmStep(rm_step::RmStepArgs),
    /// List workspaces
    List(list::ListArgs),
    /// Remove a workspace
    Rm(rm::RmArgs),
    /// Clean staging leftovers and prune unreferenced runs
    Clean(clean::CleanArgs),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let format = cli.output_format();

    let result = dispatch(cli).await;
    if let Err(error) = result {
        output::print_error(format, &error);
        std::process::exit(1);
    }
}

async fn dispatch(cli: Cli) -> Result<()> {
    match &cli.command {
        Commands::Run(args) => run::execute(&cli, args).await,
        Commands::Exec(args) => exec::execute(&cli, args).await,
        Commands::Inspect(args) => inspect::execute(&cli, args),
        Commands::Logs(args) => logs::execute(&cli, args).await,
        Commands::Export(args) => export::execute(&cli, args),
        Commands::Show(args) => show::execute(&cli, args),
        Commands::Prune(args) => prune::execute(&cli, args),
        Commands::RmStep(args) => rm_step::execute(&cli, args),
        Commands::List(args) => list::execute(&cli, args),
        Commands::Rm(args) => rm::execute(&cli, args),
        Commands::Clean(args) => clean::execute(&cli, args),
    }
}

#[cfg(test)]
#[path = "main_tests.rs"]
mod tests;
