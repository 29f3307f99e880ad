// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event and error rendering for the terminal.

use kiln_core::{LogStream, PipelineEvent, RunStatus, ShortId};

/// Output format selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Human,
    Json,
}

/// Print one pipeline event.
pub fn print_event(format: OutputFormat, event: &PipelineEvent) {
    match format {
        OutputFormat::Json => {
            if let Ok(line) = serde_json::to_string(event) {
                println!("{line}");
            }
        }
        OutputFormat::Human => print_human(event),
    }
}

fn print_human(event: &PipelineEvent) {
    match event {
        PipelineEvent::PipelineStart { workspace, levels, dry_run } => {
            let steps: usize = levels.iter().map(Vec::len).sum();
            let what = if *dry_run { "planning" } else { "running" };
            println!(
                "{what} {steps} step(s) in {} level(s) [workspace: {workspace}]",
                levels.len()
            );
        }
        PipelineEvent::StepStarting { step_id, attempt } => {
            if *attempt > 1 {
                println!("> {step_id} (attempt {attempt})");
            } else {
                println!("> {step_id}");
            }
        }
        PipelineEvent::StepLog { step_id, stream, line } => match stream {
            LogStream::Stdout => println!("  {step_id} | {line}"),
            LogStream::Stderr => eprintln!("  {step_id} ! {line}"),
        },
        PipelineEvent::StepFinished {
            step_id,
            status,
            duration_ms,
            ..
        } => match status {
            RunStatus::Success => println!("+ {step_id} ({duration_ms}ms)"),
            RunStatus::Failure => println!("- {step_id} failed (allowed)"),
        },
        PipelineEvent::StepFailed { step_id, message, .. } => {
            eprintln!("x {step_id}: {message}");
        }
        PipelineEvent::StepSkipped { step_id, reason } => {
            println!("~ {step_id} skipped ({reason})");
        }
        PipelineEvent::StepRetrying {
            step_id,
            attempt,
            delay_ms,
        } => {
            println!("  {step_id} retrying after attempt {attempt} ({delay_ms}ms delay)");
        }
        PipelineEvent::StepWouldRun {
            step_id,
            fingerprint,
            cached,
        } => {
            let verdict = if *cached { "cached" } else { "would run" };
            println!("? {step_id}: {verdict} [{}]", fingerprint.short(12));
        }
        PipelineEvent::PipelineFinished { duration_ms } => {
            println!("pipeline finished in {duration_ms}ms");
        }
        PipelineEvent::PipelineFailed { message } => {
            eprintln!("pipeline failed: {message}");
        }
    }
}

/// Print a top-level error before exiting nonzero.
pub fn print_error(format: OutputFormat, error: &anyhow::Error) {
    match format {
        OutputFormat::Json => {
            let record = serde_json::json!({
                "error": error.to_string(),
                "code": error_code(error),
            });
            if let Ok(line) = serde_json::to_string(&record) {
                eprintln!("{line}");
            }
        }
        OutputFormat::Human => {
            eprintln!("error: {error:#}");
        }
    }
}

/// Recover a stable machine code from known error types in the chain.
fn error_code(error: &anyhow::Error) -> String {
    if let Some(e) = error.downcast_ref::<kiln_engine::EngineError>() {
        return e.code().to_string();
    }
    if let Some(e) = error.downcast_ref::<kiln_pipeline::ResolveError>() {
        return e.code().to_string();
    }
    if let Some(e) = error.downcast_ref::<kiln_pipeline::ParseError>() {
        return e.code().to_string();
    }
    if let Some(e) = error.downcast_ref::<kiln_storage::StorageError>() {
        return e.code().to_string();
    }
    if let Some(e) = error.downcast_ref::<kiln_storage::LockError>() {
        return e.code().to_string();
    }
    "ERROR".to_string()
}

#[cfg(test)]
#[path = "output_tests.rs"]
mod tests;
