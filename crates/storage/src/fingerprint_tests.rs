// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn base_input() -> FingerprintInput {
    FingerprintInput {
        image: "alpine:3".to_string(),
        cmd: vec!["echo".to_string(), "x".to_string()],
        env: Some(
            [("A", "1"), ("B", "2")]
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        ),
        input_artifact_ids: vec!["run-b".to_string(), "run-a".to_string()],
        mounts: None,
        sources: None,
        caches: None,
        setup: None,
    }
}

#[test]
fn fingerprint_is_deterministic() {
    let a = fingerprint(&base_input()).unwrap();
    let b = fingerprint(&base_input()).unwrap();
    assert_eq!(a, b);
    assert_eq!(a.len(), 64);
}

#[test]
fn input_id_ordering_does_not_matter() {
    let mut reordered = base_input();
    reordered.input_artifact_ids = vec!["run-a".to_string(), "run-b".to_string()];
    assert_eq!(
        fingerprint(&base_input()).unwrap(),
        fingerprint(&reordered).unwrap()
    );
}

#[test]
fn cache_and_mount_ordering_does_not_matter() {
    let cache = |name: &str| kiln_core::step::CacheRef {
        name: name.to_string(),
        path: format!("/cache/{name}"),
        exclusive: false,
    };
    let bind = |cp: &str| kiln_core::step::BindRef {
        host_path: "src".to_string(),
        container_path: cp.to_string(),
    };

    let mut one = base_input();
    one.caches = Some(vec![cache("npm"), cache("apt")]);
    one.mounts = Some(vec![bind("/b"), bind("/a")]);

    let mut two = base_input();
    two.caches = Some(vec![cache("apt"), cache("npm")]);
    two.mounts = Some(vec![bind("/a"), bind("/b")]);

    assert_eq!(fingerprint(&one).unwrap(), fingerprint(&two).unwrap());
}

#[test]
fn env_value_change_changes_fingerprint() {
    let mut changed = base_input();
    changed
        .env
        .as_mut()
        .unwrap()
        .insert("A".to_string(), "2".to_string());
    assert_ne!(
        fingerprint(&base_input()).unwrap(),
        fingerprint(&changed).unwrap()
    );
}

#[test]
fn image_and_cmd_changes_change_fingerprint() {
    let base = fingerprint(&base_input()).unwrap();

    let mut image = base_input();
    image.image = "alpine:edge".to_string();
    assert_ne!(base, fingerprint(&image).unwrap());

    let mut cmd = base_input();
    cmd.cmd.push("--verbose".to_string());
    assert_ne!(base, fingerprint(&cmd).unwrap());
}

#[test]
fn input_set_change_changes_fingerprint() {
    let mut changed = base_input();
    changed.input_artifact_ids = vec!["run-a".to_string(), "run-c".to_string()];
    assert_ne!(
        fingerprint(&base_input()).unwrap(),
        fingerprint(&changed).unwrap()
    );
}

#[test]
fn omitted_differs_from_empty() {
    let omitted = base_input();

    let mut empty_env = base_input();
    empty_env.env = None;
    let mut present_empty_env = base_input();
    present_empty_env.env = Some(std::collections::BTreeMap::new());
    assert_ne!(
        fingerprint(&empty_env).unwrap(),
        fingerprint(&present_empty_env).unwrap()
    );

    let mut empty_caches = base_input();
    empty_caches.caches = Some(Vec::new());
    assert_ne!(
        fingerprint(&omitted).unwrap(),
        fingerprint(&empty_caches).unwrap()
    );
}

#[test]
fn setup_presence_and_content_affect_fingerprint() {
    let without = fingerprint(&base_input()).unwrap();

    let mut with_setup = base_input();
    with_setup.setup = Some(SetupFingerprint {
        cmd: vec!["npm".to_string(), "install".to_string()],
        caches: None,
        allow_network: true,
    });
    let first = fingerprint(&with_setup).unwrap();
    assert_ne!(without, first);

    with_setup.setup.as_mut().unwrap().allow_network = false;
    assert_ne!(first, fingerprint(&with_setup).unwrap());
}
