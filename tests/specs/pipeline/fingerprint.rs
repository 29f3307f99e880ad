// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fingerprint determinism across map orderings, and presence semantics
//! from the pipeline file down.

use kiln_engine::fingerprint_for;
use kiln_pipeline::{parse_str, resolve, Format, KitRegistry};
use kiln_storage::{fingerprint, FingerprintInput, State, WorkspaceStore};
use std::collections::BTreeMap;

fn input(env_pairs: &[(&str, &str)]) -> FingerprintInput {
    FingerprintInput {
        image: "alpine".to_string(),
        cmd: vec!["echo".to_string(), "x".to_string()],
        env: Some(
            env_pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<BTreeMap<String, String>>(),
        ),
        input_artifact_ids: Vec::new(),
        mounts: None,
        sources: None,
        caches: None,
        setup: None,
    }
}

#[test]
fn env_insertion_order_does_not_matter() {
    let ab = input(&[("A", "1"), ("B", "2")]);
    let ba = input(&[("B", "2"), ("A", "1")]);
    assert_eq!(fingerprint(&ab).unwrap(), fingerprint(&ba).unwrap());
}

#[test]
fn env_value_change_matters() {
    let one = input(&[("A", "1"), ("B", "2")]);
    let two = input(&[("A", "2"), ("B", "2")]);
    assert_ne!(fingerprint(&one).unwrap(), fingerprint(&two).unwrap());
}

/// Fingerprint of the single step in a pipeline file, via the real
/// parse -> resolve -> fingerprint path.
fn pipeline_fingerprint(yaml: &str) -> String {
    let dir = tempfile::tempdir().unwrap();
    let file = parse_str(yaml, Format::Yaml).unwrap();
    let steps = resolve(&file, dir.path(), &KitRegistry::with_builtins()).unwrap();
    let workspace = WorkspaceStore::create(&dir.path().join("workspaces"), "default").unwrap();
    let (digest, _cached) = fingerprint_for(&steps[0], &State::default(), &workspace).unwrap();
    digest
}

#[test]
fn omitted_env_differs_from_empty_env_in_pipeline_files() {
    let omitted = pipeline_fingerprint("steps:\n  a:\n    image: alpine\n    cmd: [\"true\"]\n");
    let empty = pipeline_fingerprint(
        "steps:\n  a:\n    image: alpine\n    cmd: [\"true\"]\n    env: {}\n",
    );
    assert_ne!(omitted, empty);
}

#[test]
fn omitted_caches_differ_from_empty_caches_in_pipeline_files() {
    let omitted = pipeline_fingerprint("steps:\n  a:\n    image: alpine\n    cmd: [\"true\"]\n");
    let empty = pipeline_fingerprint(
        "steps:\n  a:\n    image: alpine\n    cmd: [\"true\"]\n    caches: []\n",
    );
    assert_ne!(omitted, empty);
}

#[test]
fn omitted_mounts_differ_from_empty_mounts_in_pipeline_files() {
    let omitted = pipeline_fingerprint("steps:\n  a:\n    image: alpine\n    cmd: [\"true\"]\n");
    let empty = pipeline_fingerprint(
        "steps:\n  a:\n    image: alpine\n    cmd: [\"true\"]\n    mounts: []\n    sources: []\n",
    );
    assert_ne!(omitted, empty);
}

#[test]
fn digest_is_stable_across_processes() {
    // The canonical encoding is plain JSON with sorted collections, so the
    // digest for a fixed input never changes between runs or hosts.
    let digest = fingerprint(&input(&[("A", "1")])).unwrap();
    assert_eq!(digest, fingerprint(&input(&[("A", "1")])).unwrap());
    assert_eq!(digest.len(), 64);
    assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
}
