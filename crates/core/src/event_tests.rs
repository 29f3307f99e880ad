// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::run::RunStatus;

#[test]
fn events_serialize_with_type_tag() {
    let event = PipelineEvent::StepSkipped {
        step_id: "build".to_string(),
        reason: SkipReason::Cached,
    };
    let json = serde_json::to_value(&event).unwrap();
    assert_eq!(json["type"], "step:skipped");
    assert_eq!(json["step_id"], "build");
    assert_eq!(json["reason"], "cached");
}

#[test]
fn events_round_trip() {
    let events = vec![
        PipelineEvent::PipelineStart {
            workspace: "default".to_string(),
            levels: vec![vec!["a".to_string()], vec!["b".to_string()]],
            dry_run: false,
        },
        PipelineEvent::StepStarting {
            step_id: "a".to_string(),
            attempt: 1,
        },
        PipelineEvent::StepLog {
            step_id: "a".to_string(),
            stream: LogStream::Stderr,
            line: "warning: slow".to_string(),
        },
        PipelineEvent::StepRetrying {
            step_id: "a".to_string(),
            attempt: 1,
            delay_ms: 250,
        },
        PipelineEvent::StepFinished {
            step_id: "a".to_string(),
            run_id: Some("r-1".to_string()),
            status: RunStatus::Success,
            attempts: 2,
            duration_ms: 10,
        },
        PipelineEvent::StepFailed {
            step_id: "b".to_string(),
            code: "CONTAINER_CRASH".to_string(),
            message: "exit code 1".to_string(),
            attempts: 1,
        },
        PipelineEvent::StepWouldRun {
            step_id: "b".to_string(),
            fingerprint: "ff00".to_string(),
            cached: true,
        },
        PipelineEvent::PipelineFinished { duration_ms: 42 },
        PipelineEvent::PipelineFailed {
            message: "step b failed".to_string(),
        },
    ];

    for event in events {
        let json = serde_json::to_string(&event).unwrap();
        let back: PipelineEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }
}

#[test]
fn step_id_accessor_covers_step_events() {
    let event = PipelineEvent::StepStarting {
        step_id: "x".to_string(),
        attempt: 1,
    };
    assert_eq!(event.step_id(), Some("x"));

    let event = PipelineEvent::PipelineFinished { duration_ms: 0 };
    assert_eq!(event.step_id(), None);
}

#[test]
fn terminal_events_are_flagged() {
    assert!(PipelineEvent::PipelineFinished { duration_ms: 0 }.is_terminal());
    assert!(PipelineEvent::PipelineFailed {
        message: String::new()
    }
    .is_terminal());
    assert!(!PipelineEvent::StepSkipped {
        step_id: "a".to_string(),
        reason: SkipReason::Condition,
    }
    .is_terminal());
}
