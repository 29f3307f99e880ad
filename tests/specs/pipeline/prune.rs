// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pruning keeps exactly the referenced runs.

use crate::prelude::*;
use kiln_engine::RunOptions;
use std::collections::HashSet;

#[tokio::test]
async fn prune_removes_only_unreferenced_runs() {
    let mut harness = Harness::new();
    let steps = [step("a", &[])];

    // Two forced runs of the same step: the first run id becomes garbage.
    assert!(harness.run(&steps, RunOptions::default()).await);
    let first = finished(&harness.events())[0].1.clone();
    let options = RunOptions {
        force_all: true,
        ..RunOptions::default()
    };
    assert!(harness.run(&steps, options).await);
    let second = finished(&harness.events())[0].1.clone();
    assert_ne!(first, second);

    let workspace = harness.workspace();
    assert_eq!(workspace.list_runs().unwrap().len(), 2);

    let state = kiln_storage::State::load(&workspace.state_path()).unwrap();
    let removed = workspace.prune_runs(&state.active_run_ids()).unwrap();
    assert_eq!(removed, vec![first]);

    // Everything left is referenced by state or the symlink index.
    let survivors: HashSet<String> = workspace.list_runs().unwrap().into_iter().collect();
    assert_eq!(survivors, state.active_run_ids());
    assert_eq!(workspace.current_run("a"), Some(second));
}
