// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Conditional steps gated on the session environment.

use crate::prelude::*;
use kiln_core::SkipReason;
use kiln_engine::RunOptions;
use std::collections::BTreeMap;

fn gated_step() -> kiln_core::Step {
    let mut gated = step("gated", &[]);
    gated.condition = Some("env.CI == \"true\"".to_string());
    gated
}

fn env(value: Option<&str>) -> BTreeMap<String, String> {
    match value {
        Some(value) => [("CI".to_string(), value.to_string())].into_iter().collect(),
        None => BTreeMap::new(),
    }
}

#[tokio::test]
async fn runs_when_condition_holds() {
    let mut harness = Harness::new();
    let options = RunOptions {
        session_env: env(Some("true")),
        ..RunOptions::default()
    };
    assert!(harness.run(&[gated_step()], options).await);
    let events = harness.events();
    assert_eq!(finished(&events).len(), 1);
    assert!(skipped(&events).is_empty());
}

#[tokio::test]
async fn skips_when_condition_is_false() {
    let mut harness = Harness::new();
    let options = RunOptions {
        session_env: env(Some("false")),
        ..RunOptions::default()
    };
    assert!(harness.run(&[gated_step()], options).await);
    let events = harness.events();
    assert_eq!(
        skipped(&events),
        [("gated".to_string(), SkipReason::Condition)]
    );
    assert!(harness.runtime.run_names().is_empty());
}

#[tokio::test]
async fn skips_when_variable_is_unset() {
    let mut harness = Harness::new();
    let options = RunOptions {
        session_env: env(None),
        ..RunOptions::default()
    };
    assert!(harness.run(&[gated_step()], options).await);
    assert_eq!(
        skipped(&harness.events()),
        [("gated".to_string(), SkipReason::Condition)]
    );
}

#[tokio::test]
async fn dependents_of_skipped_steps_still_start() {
    // A skipped dependency unblocks its dependents; with the input marked
    // optional, the dependent runs without the artifact.
    let mut harness = Harness::new();
    let mut gated = gated_step();
    gated.condition = Some("env.NEVER".to_string());
    let mut dependent = step("dependent", &[]);
    dependent.inputs.push(kiln_core::step::InputRef {
        alias: "maybe".to_string(),
        step: "gated".to_string(),
        optional: true,
    });

    assert!(harness
        .run(&[gated, dependent], RunOptions::default())
        .await);
    let events = harness.events();
    assert_eq!(
        skipped(&events),
        [("gated".to_string(), SkipReason::Condition)]
    );
    assert_eq!(finished(&events).len(), 1);
}
