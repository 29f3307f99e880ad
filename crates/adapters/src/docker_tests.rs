// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use kiln_core::step::NetworkMode;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

fn request() -> RunRequest {
    RunRequest {
        name: "kiln-default-build".to_string(),
        workspace: "default".to_string(),
        image: "alpine:3".to_string(),
        cmd: vec!["sh".to_string(), "-c".to_string(), "make".to_string()],
        env: BTreeMap::from([("CI".to_string(), "true".to_string())]),
        inputs: vec![Mount::read_only("/ws/runs/r1/artifacts", "/input/src")],
        output: Some(Mount::read_write("/ws/staging/r2/artifacts", "/output")),
        caches: vec![Mount::read_write("/ws/caches/npm", "/root/.npm")],
        mounts: vec![Mount::read_only("/proj/scripts", "/scripts")],
        sources: Vec::new(),
        network: NetworkMode::None,
        timeout: Some(Duration::from_secs(60)),
    }
}

#[test]
fn run_args_cover_name_label_network_env_and_mounts() {
    let args = run_args(&request());
    let joined = args.join(" ");

    assert_eq!(args[0], "run");
    assert_eq!(args[1], "--rm");
    assert!(joined.contains("--name kiln-default-build"));
    assert!(joined.contains("--label dev.kiln.workspace=default"));
    assert!(joined.contains("--network none"));
    assert!(joined.contains("-e CI=true"));
    assert!(joined.contains("-v /ws/runs/r1/artifacts:/input/src:ro"));
    assert!(joined.contains("-v /proj/scripts:/scripts:ro"));
    assert!(joined.contains("-v /ws/staging/r2/artifacts:/output"));
    assert!(!joined.contains("/output:ro"));
    assert!(joined.contains("-v /ws/caches/npm:/root/.npm"));
}

#[test]
fn image_and_cmd_come_last() {
    let args = run_args(&request());
    let image_pos = args.iter().position(|a| a == "alpine:3").unwrap();
    assert_eq!(&args[image_pos + 1..], ["sh", "-c", "make"]);
}

#[test]
fn bridge_network_is_passed_through() {
    let mut req = request();
    req.network = NetworkMode::Bridge;
    let args = run_args(&req);
    let pos = args.iter().position(|a| a == "--network").unwrap();
    assert_eq!(args[pos + 1], "bridge");
}

#[test]
fn create_args_omit_rm() {
    let args = create_args(&request());
    assert_eq!(args[0], "create");
    assert!(!args.contains(&"--rm".to_string()));
}

#[test]
fn cp_args_copy_file_sources_verbatim() {
    let source = Mount {
        host_path: PathBuf::from("/proj/config.toml"),
        container_path: "/app/config.toml".to_string(),
        read_only: true,
    };
    assert_eq!(
        cp_args(&source, "kiln-default-build"),
        [
            "cp",
            "/proj/config.toml",
            "kiln-default-build:/app/config.toml"
        ]
    );
}

#[test]
fn cp_args_copy_directory_contents() {
    let dir = tempfile::tempdir().unwrap();
    let source = Mount {
        host_path: dir.path().to_path_buf(),
        container_path: "/app/src".to_string(),
        read_only: true,
    };
    let args = cp_args(&source, "c");
    assert_eq!(args[1], format!("{}/.", dir.path().display()));
    assert_eq!(args[2], "c:/app/src");
}

#[test]
fn exit_125_with_pull_markers_is_image_pull_failure() {
    let tail = vec!["docker: Error response from daemon: pull access denied for x".to_string()];
    let err = classify_cli_failure(125, &tail, "x").unwrap();
    assert_eq!(err.code(), "IMAGE_PULL_FAILED");
    assert!(err.is_transient());
}

#[test]
fn exit_125_with_daemon_down_is_not_available() {
    let tail = vec!["Cannot connect to the Docker daemon at unix:///var/run/docker.sock".to_string()];
    let err = classify_cli_failure(125, &tail, "alpine").unwrap();
    assert_eq!(err.code(), "DOCKER_NOT_AVAILABLE");
}

#[test]
fn step_exit_codes_are_not_classified() {
    assert!(classify_cli_failure(0, &[], "alpine").is_none());
    assert!(classify_cli_failure(1, &[], "alpine").is_none());
    assert!(classify_cli_failure(137, &[], "alpine").is_none());
}

#[tokio::test]
async fn check_fails_when_binary_is_missing() {
    let runtime = DockerRuntime::with_binary("kiln-no-such-docker");
    let err = runtime.check().await.unwrap_err();
    assert_eq!(err.code(), "DOCKER_NOT_AVAILABLE");
}
