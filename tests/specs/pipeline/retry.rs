// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Retry policy across the whole pipeline runner.

use crate::prelude::*;
use kiln_adapters::FakeResult;
use kiln_core::{PipelineEvent, RunStatus};
use kiln_engine::RunOptions;

#[tokio::test]
async fn flaky_step_retries_then_succeeds() {
    let mut harness = Harness::new();
    harness
        .runtime
        .script("kiln-default-flaky", FakeResult::exit(1));

    let mut flaky = step("flaky", &[]);
    flaky.retries = 2;
    flaky.retry_delay_ms = 0;

    assert!(harness.run(&[flaky], RunOptions::default()).await);

    let events = harness.events();
    let sequence: Vec<&str> = events
        .iter()
        .filter_map(|event| match event {
            PipelineEvent::StepStarting { attempt, .. } => {
                Some(if *attempt == 1 { "start-1" } else { "start-2" })
            }
            PipelineEvent::StepRetrying { attempt: 1, .. } => Some("retry-1"),
            PipelineEvent::StepFinished {
                status: RunStatus::Success,
                attempts: 2,
                ..
            } => Some("finished-2"),
            _ => None,
        })
        .collect();
    assert_eq!(sequence, ["start-1", "retry-1", "start-2", "finished-2"]);
}

#[tokio::test]
async fn exhausted_retries_fail_the_pipeline() {
    let mut harness = Harness::new();
    for _ in 0..3 {
        harness
            .runtime
            .script("kiln-default-flaky", FakeResult::exit(1));
    }

    let mut flaky = step("flaky", &[]);
    flaky.retries = 2;

    assert!(!harness.run(&[flaky], RunOptions::default()).await);

    let events = harness.events();
    assert!(matches!(
        events.last().unwrap(),
        PipelineEvent::PipelineFailed { .. }
    ));
    assert!(events.iter().any(|event| matches!(
        event,
        PipelineEvent::StepFailed { attempts: 3, .. }
    )));
    // Three containers were attempted.
    assert_eq!(harness.runtime.run_names().len(), 3);
}

#[tokio::test]
async fn no_commit_survives_a_failed_step() {
    let mut harness = Harness::new();
    harness
        .runtime
        .script("kiln-default-broken", FakeResult::exit(1));

    assert!(!harness.run(&[step("broken", &[])], RunOptions::default()).await);
    harness.events();

    let workspace = harness.workspace();
    assert!(workspace.list_runs().unwrap().is_empty());
    let state = kiln_storage::State::load(&workspace.state_path()).unwrap();
    assert!(state.steps.is_empty());
}
