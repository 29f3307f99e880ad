// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn flag_wins_over_everything() {
    let root = workspaces_root(Some(PathBuf::from("/explicit")));
    assert_eq!(root, PathBuf::from("/explicit"));
}

#[test]
fn default_lands_under_home() {
    // Without a flag the root is KILN_WORKDIR or ~/.kiln/workspaces; either
    // way it must be non-empty and absolute-ish.
    let root = workspaces_root(None);
    assert!(!root.as_os_str().is_empty());
}

#[test]
fn session_env_includes_process_environment() {
    // PATH is present in any sane test environment.
    let env = session_env(None).unwrap();
    assert!(env.contains_key("PATH"));
}

#[test]
fn env_file_overlays_process_environment() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ci.env");
    std::fs::write(&path, "KILN_TEST_ONLY_VAR=from-file\n").unwrap();

    let env = session_env(Some(&path)).unwrap();
    assert_eq!(
        env.get("KILN_TEST_ONLY_VAR").map(String::as_str),
        Some("from-file")
    );
}

#[test]
fn missing_env_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    assert!(session_env(Some(&dir.path().join("absent.env"))).is_err());
}
