// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Committed run records.
//!
//! A run is one successful (or allow-failure) execution of a step. The record
//! is persisted as `runs/<runId>/meta.json` and is the unit of cache reuse:
//! downstream fingerprints incorporate the run ids of their inputs.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Outcome of a committed run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Success,
    Failure,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStatus::Success => write!(f, "success"),
            RunStatus::Failure => write!(f, "failure"),
        }
    }
}

/// Resolved input recorded with a run: which run id backed which alias.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunInput {
    pub alias: String,
    pub run_id: String,
}

/// Metadata persisted with every committed run (`meta.json`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRecord {
    pub run_id: String,
    pub step_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_name: Option<String>,
    pub image: String,
    pub cmd: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
    pub status: RunStatus,
    pub exit_code: i32,
    pub duration_ms: u64,
    /// Epoch milliseconds.
    pub started_at: u64,
    /// Epoch milliseconds.
    pub finished_at: u64,
    pub fingerprint: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inputs: Vec<RunInput>,
}

#[cfg(test)]
#[path = "run_tests.rs"]
mod tests;
