// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workspace lock exclusion and stale-holder recovery.

use crate::prelude::*;
use kiln_engine::RunOptions;
use kiln_storage::{LockInfo, WorkspaceStore};

fn write_lock(workspace: &WorkspaceStore, pid: u32) {
    let holder = LockInfo {
        pid,
        socket_path: None,
        started_at: 0,
        version: "0.1.0".to_string(),
    };
    std::fs::write(
        workspace.lock_path(),
        serde_json::to_string(&holder).unwrap(),
    )
    .unwrap();
}

#[tokio::test]
async fn live_holder_blocks_and_reports_its_pid() {
    let mut harness = Harness::new();
    let workspace =
        WorkspaceStore::create(&harness.root.path().join("workspaces"), "default").unwrap();
    write_lock(&workspace, 1);

    let err = {
        let (tx, rx) = tokio::sync::watch::channel(false);
        std::mem::forget(tx);
        harness
            .runner
            .run(&[step("a", &[])], RunOptions::default(), rx)
            .await
            .unwrap_err()
    };
    assert_eq!(err.code(), "WORKSPACE_LOCKED");
    match err {
        kiln_engine::EngineError::Lock(kiln_storage::LockError::Held(info)) => {
            assert_eq!(info.pid, 1);
        }
        other => panic!("expected held lock, got {other:?}"),
    }
    harness.events();
}

#[tokio::test]
async fn dead_holder_is_healed_and_the_run_proceeds() {
    let mut harness = Harness::new();
    let workspace =
        WorkspaceStore::create(&harness.root.path().join("workspaces"), "default").unwrap();
    // A pid no live process can have.
    write_lock(&workspace, u32::MAX - 1);

    assert!(harness.run(&[step("a", &[])], RunOptions::default()).await);
    assert_eq!(finished(&harness.events()).len(), 1);
    // Lock released after the run.
    assert!(!workspace.lock_path().exists());
}
