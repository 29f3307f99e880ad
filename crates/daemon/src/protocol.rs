// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! IPC message types for the daemon protocol.

use kiln_core::{PipelineEvent, SessionState, Step};
use kiln_engine::RunOptions;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Client -> daemon commands.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Request {
    /// Start a pipeline run.
    Run {
        pipeline: Vec<Step>,
        #[serde(default)]
        options: RunOptions,
    },
    /// Snapshot of the current session.
    Status,
    /// Receive the session snapshot followed by live events.
    Subscribe {
        /// Include `step:log` events.
        #[serde(default)]
        logs: bool,
    },
    /// Cancel the running pipeline.
    Cancel,
}

/// Daemon -> client messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Response {
    Ack { job_id: String },
    Event { event: PipelineEvent },
    State { state: SessionState },
    Done { success: bool },
    Error { code: String, message: String },
}

/// First message the parent writes to a forked daemon's stdin.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Handshake {
    /// Root directory holding the workspaces.
    pub workspace_root: PathBuf,
    /// Pipeline root for host path resolution.
    #[serde(default)]
    pub cwd: Option<PathBuf>,
    /// Default run options for this daemon session.
    #[serde(default)]
    pub options: Option<RunOptions>,
}

/// Reply to the handshake, written once the socket is listening.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Ready {
    Ready {
        #[serde(rename = "socketPath")]
        socket_path: PathBuf,
    },
}

#[cfg(test)]
#[path = "protocol_tests.rs"]
mod tests;
