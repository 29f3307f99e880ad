// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Structured events emitted by the pipeline runner.
//!
//! Serializes with `{"type": "step:finished", ...fields}` format. Events from
//! one step are ordered; events across steps interleave but carry enough
//! identity (step id, attempt) to be reassembled by the aggregator.

use crate::run::RunStatus;
use serde::{Deserialize, Serialize};

/// Why a step was skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SkipReason {
    /// The `if` condition evaluated false.
    Condition,
    /// Fingerprint matched the state entry and the artifacts still exist.
    Cached,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::Condition => write!(f, "condition"),
            SkipReason::Cached => write!(f, "cached"),
        }
    }
}

/// Which stream a log line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogStream {
    Stdout,
    Stderr,
}

/// Events that describe the progress of a pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PipelineEvent {
    /// Run accepted: the resolved plan as ordered levels of step ids.
    #[serde(rename = "pipeline:start")]
    PipelineStart {
        workspace: String,
        levels: Vec<Vec<String>>,
        #[serde(default)]
        dry_run: bool,
    },

    #[serde(rename = "step:starting")]
    StepStarting {
        step_id: String,
        /// 1-based attempt counter.
        attempt: u32,
    },

    #[serde(rename = "step:log")]
    StepLog {
        step_id: String,
        stream: LogStream,
        line: String,
    },

    /// Terminal success, or a contained failure when `allow_failure` is set.
    #[serde(rename = "step:finished")]
    StepFinished {
        step_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        run_id: Option<String>,
        status: RunStatus,
        attempts: u32,
        duration_ms: u64,
    },

    /// Terminal failure that cancels the pipeline.
    #[serde(rename = "step:failed")]
    StepFailed {
        step_id: String,
        code: String,
        message: String,
        attempts: u32,
    },

    #[serde(rename = "step:skipped")]
    StepSkipped { step_id: String, reason: SkipReason },

    /// A transient failure consumed one retry; `attempt` is the attempt that
    /// just failed.
    #[serde(rename = "step:retrying")]
    StepRetrying {
        step_id: String,
        attempt: u32,
        delay_ms: u64,
    },

    /// Dry-run prediction for one step.
    #[serde(rename = "step:would-run")]
    StepWouldRun {
        step_id: String,
        fingerprint: String,
        /// True when the state entry already matches the fingerprint.
        cached: bool,
    },

    #[serde(rename = "pipeline:finished")]
    PipelineFinished { duration_ms: u64 },

    #[serde(rename = "pipeline:failed")]
    PipelineFailed { message: String },
}

impl PipelineEvent {
    /// Step id this event belongs to, if any.
    pub fn step_id(&self) -> Option<&str> {
        match self {
            PipelineEvent::StepStarting { step_id, .. }
            | PipelineEvent::StepLog { step_id, .. }
            | PipelineEvent::StepFinished { step_id, .. }
            | PipelineEvent::StepFailed { step_id, .. }
            | PipelineEvent::StepSkipped { step_id, .. }
            | PipelineEvent::StepRetrying { step_id, .. }
            | PipelineEvent::StepWouldRun { step_id, .. } => Some(step_id),
            _ => None,
        }
    }

    /// True for the terminal pipeline events.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PipelineEvent::PipelineFinished { .. } | PipelineEvent::PipelineFailed { .. }
        )
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
