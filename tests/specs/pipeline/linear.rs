// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Linear pipeline: run, cache, and selective force.

use crate::prelude::*;
use kiln_core::SkipReason;
use kiln_engine::RunOptions;

#[tokio::test]
async fn linear_chain_caches_and_selectively_reruns() {
    let mut harness = Harness::new();
    let steps = [step("a", &[]), step("b", &["a"]), step("c", &["b"])];

    // First run: three distinct run ids, committed in order.
    assert!(harness.run(&steps, RunOptions::default()).await);
    let events = harness.events();
    let first = finished(&events);
    assert_eq!(
        first.iter().map(|(id, _)| id.as_str()).collect::<Vec<_>>(),
        ["a", "b", "c"]
    );
    let ids: std::collections::HashSet<&String> = first.iter().map(|(_, run)| run).collect();
    assert_eq!(ids.len(), 3);

    // Unchanged re-run: everything cached.
    assert!(harness.run(&steps, RunOptions::default()).await);
    let events = harness.events();
    assert_eq!(
        skipped(&events),
        [
            ("a".to_string(), SkipReason::Cached),
            ("b".to_string(), SkipReason::Cached),
            ("c".to_string(), SkipReason::Cached),
        ]
    );
    assert!(finished(&events).is_empty());

    // Force b: a stays cached; b reruns with a fresh id; c follows because
    // its input artifact id changed.
    let options = RunOptions {
        force: vec!["b".to_string()],
        ..RunOptions::default()
    };
    assert!(harness.run(&steps, options).await);
    let events = harness.events();
    assert_eq!(skipped(&events), [("a".to_string(), SkipReason::Cached)]);
    let rerun = finished(&events);
    assert_eq!(
        rerun.iter().map(|(id, _)| id.as_str()).collect::<Vec<_>>(),
        ["b", "c"]
    );
    let old_b = &first[1].1;
    assert_ne!(&rerun[0].1, old_b, "forced b must get a new run id");
}

#[tokio::test]
async fn state_symlink_and_meta_agree_after_each_commit() {
    let mut harness = Harness::new();
    let steps = [step("a", &[]), step("b", &["a"])];
    assert!(harness.run(&steps, RunOptions::default()).await);
    harness.events();

    let workspace = harness.workspace();
    let state = kiln_storage::State::load(&workspace.state_path()).unwrap();
    for (step_id, entry) in &state.steps {
        assert_eq!(
            workspace.current_run(step_id).as_ref(),
            Some(&entry.run_id),
            "symlink and state must agree for {step_id}"
        );
        let meta = workspace.read_meta(&entry.run_id).unwrap();
        assert_eq!(meta.fingerprint, entry.fingerprint);
        assert_eq!(meta.step_id, *step_id);
    }
}

#[tokio::test]
async fn downstream_sees_upstream_artifacts() {
    let mut harness = Harness::new();
    let steps = [step("a", &[]), step("b", &["a"])];
    assert!(harness.run(&steps, RunOptions::default()).await);
    harness.events();

    let requests = harness.runtime.requests();
    let b_request = requests
        .iter()
        .find(|request| request.name == "kiln-default-b")
        .unwrap();
    assert_eq!(b_request.inputs.len(), 1);
    assert_eq!(b_request.inputs[0].container_path, "/input/a");
    assert!(b_request.inputs[0].read_only);
    // The mount points at the committed artifacts of a's run.
    assert!(b_request.inputs[0].host_path.is_dir());
}
