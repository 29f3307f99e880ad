// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn sample_record() -> RunRecord {
    RunRecord {
        run_id: "0191a-run".to_string(),
        step_id: "build".to_string(),
        step_name: Some("Build".to_string()),
        image: "alpine:3".to_string(),
        cmd: vec!["sh".to_string(), "-c".to_string(), "make".to_string()],
        env: [("CI".to_string(), "true".to_string())].into_iter().collect(),
        status: RunStatus::Success,
        exit_code: 0,
        duration_ms: 1234,
        started_at: 1_700_000_000_000,
        finished_at: 1_700_000_001_234,
        fingerprint: "abcd".to_string(),
        inputs: vec![RunInput {
            alias: "src".to_string(),
            run_id: "0190f-dep".to_string(),
        }],
    }
}

#[test]
fn meta_json_uses_camel_case_keys() {
    let json = serde_json::to_value(sample_record()).unwrap();
    assert_eq!(json["runId"], "0191a-run");
    assert_eq!(json["stepId"], "build");
    assert_eq!(json["stepName"], "Build");
    assert_eq!(json["exitCode"], 0);
    assert_eq!(json["durationMs"], 1234);
    assert_eq!(json["inputs"][0]["runId"], "0190f-dep");
    assert_eq!(json["status"], "success");
}

#[test]
fn meta_json_round_trips() {
    let record = sample_record();
    let json = serde_json::to_string(&record).unwrap();
    let back: RunRecord = serde_json::from_str(&json).unwrap();
    assert_eq!(back, record);
}

#[test]
fn optional_fields_are_omitted_when_absent() {
    let mut record = sample_record();
    record.step_name = None;
    record.env.clear();
    record.inputs.clear();

    let json = serde_json::to_value(&record).unwrap();
    let obj = json.as_object().unwrap();
    assert!(!obj.contains_key("stepName"));
    assert!(!obj.contains_key("env"));
    assert!(!obj.contains_key("inputs"));
}
