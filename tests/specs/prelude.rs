// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared fixtures for the engine specs.

use kiln_adapters::FakeRuntime;
use kiln_core::step::InputRef;
use kiln_core::{PipelineEvent, RunStatus, SkipReason, Step};
use kiln_engine::{PipelineRunner, Reporter, RunOptions};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::watch;

pub struct Harness {
    pub root: TempDir,
    pub runtime: FakeRuntime,
    pub runner: PipelineRunner,
    pub events: UnboundedReceiver<PipelineEvent>,
}

impl Harness {
    pub fn new() -> Self {
        let root = TempDir::new().unwrap();
        let runtime = FakeRuntime::new();
        let (reporter, events) = Reporter::new();
        let runner = PipelineRunner::new(
            root.path().join("workspaces"),
            root.path().join("project"),
            Arc::new(runtime.clone()),
            reporter,
        );
        Self {
            root,
            runtime,
            runner,
            events,
        }
    }

    pub async fn run(&mut self, steps: &[Step], options: RunOptions) -> bool {
        let (tx, rx) = watch::channel(false);
        std::mem::forget(tx);
        self.runner.run(steps, options, rx).await.unwrap()
    }

    /// Drain all events currently buffered.
    pub fn events(&mut self) -> Vec<PipelineEvent> {
        let mut collected = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            collected.push(event);
        }
        collected
    }

    pub fn workspace(&self) -> kiln_storage::WorkspaceStore {
        kiln_storage::WorkspaceStore::open(&self.root.path().join("workspaces"), "default")
            .unwrap()
    }
}

pub fn step(id: &str, deps: &[&str]) -> Step {
    let mut step = Step::new(id, "alpine:3", vec!["true".to_string()]);
    step.inputs = deps
        .iter()
        .map(|dep| InputRef {
            alias: dep.to_string(),
            step: dep.to_string(),
            optional: false,
        })
        .collect();
    step
}

/// Successful `step:finished` events in emission order.
pub fn finished(events: &[PipelineEvent]) -> Vec<(String, String)> {
    events
        .iter()
        .filter_map(|event| match event {
            PipelineEvent::StepFinished {
                step_id,
                run_id: Some(run_id),
                status: RunStatus::Success,
                ..
            } => Some((step_id.clone(), run_id.clone())),
            _ => None,
        })
        .collect()
}

/// `step:skipped` events in emission order.
pub fn skipped(events: &[PipelineEvent]) -> Vec<(String, SkipReason)> {
    events
        .iter()
        .filter_map(|event| match event {
            PipelineEvent::StepSkipped { step_id, reason } => Some((step_id.clone(), *reason)),
            _ => None,
        })
        .collect()
}
