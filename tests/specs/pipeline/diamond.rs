// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Diamond pipeline: parallel middle level, gated join.

use crate::prelude::*;
use kiln_core::PipelineEvent;
use kiln_engine::RunOptions;

#[tokio::test]
async fn diamond_plans_three_levels_and_joins_last() {
    let mut harness = Harness::new();
    let steps = [
        step("a", &[]),
        step("b", &["a"]),
        step("c", &["a"]),
        step("d", &["b", "c"]),
    ];
    let options = RunOptions {
        concurrency: Some(2),
        ..RunOptions::default()
    };
    assert!(harness.run(&steps, options).await);

    let events = harness.events();
    match &events[0] {
        PipelineEvent::PipelineStart { levels, .. } => {
            assert_eq!(
                levels,
                &vec![
                    vec!["a".to_string()],
                    vec!["b".to_string(), "c".to_string()],
                    vec!["d".to_string()],
                ]
            );
        }
        other => panic!("expected pipeline:start, got {other:?}"),
    }

    // d is scheduled strictly after both b and c completed.
    let names = harness.runtime.run_names();
    assert_eq!(names.first().map(String::as_str), Some("kiln-default-a"));
    assert_eq!(names.last().map(String::as_str), Some("kiln-default-d"));
    assert_eq!(names.len(), 4);

    // d mounts both inputs.
    let requests = harness.runtime.requests();
    let d_request = requests
        .iter()
        .find(|request| request.name == "kiln-default-d")
        .unwrap();
    let mut aliases: Vec<&str> = d_request
        .inputs
        .iter()
        .map(|mount| mount.container_path.as_str())
        .collect();
    aliases.sort();
    assert_eq!(aliases, ["/input/b", "/input/c"]);
}
