// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `kiln show` - resolved pipeline and level plan

use crate::Cli;
use anyhow::Result;
use clap::Args;
use kiln_engine::{build_graph, topological_levels, validate_graph};
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct ShowArgs {
    /// Pipeline file
    #[arg(default_value = "pipeline.yaml")]
    pub file: PathBuf,
}

pub fn execute(cli: &Cli, args: &ShowArgs) -> Result<()> {
    let steps = super::load_pipeline(&args.file)?;
    let graph = build_graph(&steps)?;
    validate_graph(&graph)?;
    let levels = topological_levels(&graph);

    if cli.json {
        println!(
            "{}",
            serde_json::to_string(&serde_json::json!({
                "steps": steps,
                "levels": levels,
            }))?
        );
        return Ok(());
    }

    println!("{} step(s), {} level(s)", steps.len(), levels.len());
    for (index, level) in levels.iter().enumerate() {
        println!("level {index}: {}", level.join(", "));
    }
    println!();
    for step in &steps {
        let deps: Vec<&str> = step.inputs.iter().map(|i| i.step.as_str()).collect();
        let deps = if deps.is_empty() {
            "-".to_string()
        } else {
            deps.join(", ")
        };
        println!(
            "{:<20} image={} deps={}",
            step.id, step.image, deps
        );
    }
    Ok(())
}
