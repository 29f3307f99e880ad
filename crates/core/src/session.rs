// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session snapshot built by folding pipeline events.
//!
//! The aggregator keeps one [`SessionState`] per run so late daemon
//! subscribers can be brought up to date with a single snapshot message
//! before receiving live events.

use crate::event::{PipelineEvent, SkipReason};
use crate::run::RunStatus;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Overall pipeline status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineStatus {
    #[default]
    Idle,
    Running,
    Finished,
    Failed,
}

/// Per-step status within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepState {
    #[default]
    Pending,
    Running,
    Succeeded,
    Failed,
    Skipped,
    WouldRun,
}

/// Snapshot of one step's progress.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StepSnapshot {
    pub state: StepState,
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<SkipReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Aggregated view of a pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SessionState {
    pub status: PipelineStatus,
    pub workspace: Option<String>,
    /// The planned levels, recorded from `pipeline:start`.
    #[serde(default)]
    pub levels: Vec<Vec<String>>,
    pub steps: BTreeMap<String, StepSnapshot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one event into the snapshot.
    pub fn apply(&mut self, event: &PipelineEvent) {
        match event {
            PipelineEvent::PipelineStart {
                workspace, levels, ..
            } => {
                self.status = PipelineStatus::Running;
                self.workspace = Some(workspace.clone());
                self.levels = levels.clone();
                for level in levels {
                    for step_id in level {
                        self.steps.entry(step_id.clone()).or_default();
                    }
                }
            }
            PipelineEvent::StepStarting { step_id, attempt } => {
                let snap = self.steps.entry(step_id.clone()).or_default();
                snap.state = StepState::Running;
                snap.attempts = *attempt;
            }
            PipelineEvent::StepLog { .. } => {}
            PipelineEvent::StepFinished {
                step_id,
                run_id,
                status,
                attempts,
                duration_ms,
            } => {
                let snap = self.steps.entry(step_id.clone()).or_default();
                snap.state = match status {
                    RunStatus::Success => StepState::Succeeded,
                    RunStatus::Failure => StepState::Failed,
                };
                snap.attempts = *attempts;
                snap.duration_ms = Some(*duration_ms);
                snap.run_id.clone_from(run_id);
            }
            PipelineEvent::StepFailed {
                step_id,
                message,
                attempts,
                ..
            } => {
                let snap = self.steps.entry(step_id.clone()).or_default();
                snap.state = StepState::Failed;
                snap.attempts = *attempts;
                snap.error = Some(message.clone());
            }
            PipelineEvent::StepSkipped { step_id, reason } => {
                let snap = self.steps.entry(step_id.clone()).or_default();
                snap.state = StepState::Skipped;
                snap.skip_reason = Some(*reason);
            }
            PipelineEvent::StepRetrying {
                step_id, attempt, ..
            } => {
                let snap = self.steps.entry(step_id.clone()).or_default();
                snap.attempts = *attempt;
            }
            PipelineEvent::StepWouldRun { step_id, .. } => {
                let snap = self.steps.entry(step_id.clone()).or_default();
                snap.state = StepState::WouldRun;
            }
            PipelineEvent::PipelineFinished { .. } => {
                self.status = PipelineStatus::Finished;
            }
            PipelineEvent::PipelineFailed { message } => {
                self.status = PipelineStatus::Failed;
                self.failure = Some(message.clone());
            }
        }
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
