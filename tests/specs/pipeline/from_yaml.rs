// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! YAML pipeline file through resolution to execution.

use crate::prelude::*;
use kiln_engine::RunOptions;
use kiln_pipeline::{parse_str, resolve, Format, KitRegistry};

const PIPELINE: &str = r#"
steps:
  fetch:
    uses: script
    with:
      script: echo fetched
  build:
    image: node:20
    cmd: ["npm", "run", "build"]
    inputs:
      - step: fetch
        alias: src
    caches:
      - name: npm
        path: /root/.npm
  package:
    image: alpine:3
    cmd: ["tar", "cf", "/output/app.tar", "/input/dist"]
    inputs:
      - step: build
        alias: dist
"#;

#[tokio::test]
async fn yaml_pipeline_resolves_and_runs_end_to_end() {
    let mut harness = Harness::new();
    let file = parse_str(PIPELINE, Format::Yaml).unwrap();
    let steps = resolve(
        &file,
        &harness.root.path().join("project"),
        &KitRegistry::with_builtins(),
    )
    .unwrap();

    assert_eq!(steps.len(), 3);
    // The kit expanded fetch into a shell invocation.
    assert_eq!(steps[0].image, "alpine:3");
    assert_eq!(steps[0].cmd, ["sh", "-c", "echo fetched"]);

    assert!(harness.run(&steps, RunOptions::default()).await);
    let events = harness.events();
    assert_eq!(
        finished(&events)
            .iter()
            .map(|(id, _)| id.as_str())
            .collect::<Vec<_>>(),
        ["fetch", "build", "package"]
    );

    // The npm cache directory was created inside the workspace.
    let workspace = harness.workspace();
    assert_eq!(workspace.list_caches().unwrap(), ["npm"]);

    // The build request mounts the cache read-write and the input read-only.
    let requests = harness.runtime.requests();
    let build = requests
        .iter()
        .find(|request| request.name == "kiln-default-build")
        .unwrap();
    assert_eq!(build.caches.len(), 1);
    assert_eq!(build.caches[0].container_path, "/root/.npm");
    assert!(!build.caches[0].read_only);
    assert_eq!(build.inputs[0].container_path, "/input/src");
}
