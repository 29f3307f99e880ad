// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Resolved step definitions.
//!
//! A [`Step`] is the fully-resolved, immutable form of one pipeline node:
//! kit expansion, env-file merging, and validation have already happened by
//! the time one of these is constructed. The engine never sees raw pipeline
//! file syntax.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Default container path a step writes its artifact to.
pub const DEFAULT_OUTPUT_PATH: &str = "/output";

/// Container directory under which input artifacts are mounted (`/input/<alias>`).
pub const RUN_INPUT_ROOT: &str = "/input";

/// Invalid step or cache identifier.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StepIdError {
    #[error("identifier is empty")]
    Empty,
    #[error("identifier `{0}` contains invalid characters (allowed: A-Z a-z 0-9 _ -)")]
    InvalidChars(String),
    #[error("identifier `{0}` contains `..`")]
    DotDot(String),
}

/// Validate a step or cache identifier.
///
/// Identifiers become path components under the workspace, so the charset is
/// restricted and `..` is rejected outright.
pub fn validate_identifier(id: &str) -> Result<(), StepIdError> {
    if id.is_empty() {
        return Err(StepIdError::Empty);
    }
    if id.contains("..") {
        return Err(StepIdError::DotDot(id.to_string()));
    }
    if !id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(StepIdError::InvalidChars(id.to_string()));
    }
    Ok(())
}

/// Reference to the artifact of another step, mounted under an alias.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputRef {
    /// Mount alias; the artifact appears at `/input/<alias>`.
    pub alias: String,
    /// Id of the step whose current run provides the artifact.
    pub step: String,
    /// Optional inputs referencing unknown or never-run steps are dropped
    /// instead of failing the step.
    #[serde(default)]
    pub optional: bool,
}

/// A named persistent cache directory mounted into the container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheRef {
    /// Cache name, shared across steps of the workspace.
    pub name: String,
    /// Absolute container path the cache is mounted at.
    pub path: String,
    /// Exclusive caches are locked for the duration of the setup phase.
    #[serde(default)]
    pub exclusive: bool,
}

/// A host path bound or copied into the container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindRef {
    /// Host path, relative to the pipeline root.
    pub host_path: String,
    /// Absolute container path.
    pub container_path: String,
}

/// Optional setup phase run before the step itself.
///
/// Setup populates caches under exclusive locks and produces no artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetupSpec {
    pub cmd: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caches: Option<Vec<CacheRef>>,
    #[serde(default)]
    pub allow_network: bool,
}

/// Container network mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkMode {
    None,
    Bridge,
}

impl NetworkMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            NetworkMode::None => "none",
            NetworkMode::Bridge => "bridge",
        }
    }
}

/// A fully-resolved pipeline step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    /// Step id, unique within the pipeline.
    pub id: String,
    /// Optional human-readable name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Container image reference.
    pub image: String,
    /// Command vector, never empty.
    pub cmd: Vec<String>,
    /// Step environment. Already merged with env-file contents (step entries
    /// win); a BTreeMap keeps the merged form canonical. `None` means the
    /// pipeline file never declared one — the fingerprint distinguishes that
    /// from an empty map.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<BTreeMap<String, String>>,
    /// Ordered input artifact references.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inputs: Vec<InputRef>,
    /// Container path the artifact directory is mounted at.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caches: Option<Vec<CacheRef>>,
    /// Read-only host bind mounts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mounts: Option<Vec<BindRef>>,
    /// Host paths copied into the container's writable layer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<BindRef>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub setup: Option<SetupSpec>,
    /// Bound on the run phase, in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    /// A failing run is reported but does not cancel the pipeline.
    #[serde(default)]
    pub allow_failure: bool,
    #[serde(default)]
    pub allow_network: bool,
    /// Retry budget for transient failures.
    #[serde(default)]
    pub retries: u32,
    /// Delay between attempts, in milliseconds.
    #[serde(default)]
    pub retry_delay_ms: u64,
    /// Condition expression; false or unparsable skips the step.
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "if")]
    pub condition: Option<String>,
}

impl Step {
    /// Minimal step for construction in tests and kit defaults.
    pub fn new(id: impl Into<String>, image: impl Into<String>, cmd: Vec<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            image: image.into(),
            cmd,
            env: None,
            inputs: Vec::new(),
            output_path: None,
            caches: None,
            mounts: None,
            sources: None,
            setup: None,
            timeout_secs: None,
            allow_failure: false,
            allow_network: false,
            retries: 0,
            retry_delay_ms: 0,
            condition: None,
        }
    }

    /// Container path the step's artifact mount appears at.
    pub fn output_path(&self) -> &str {
        self.output_path.as_deref().unwrap_or(DEFAULT_OUTPUT_PATH)
    }

    /// Environment map handed to containers; empty when none was declared.
    pub fn container_env(&self) -> BTreeMap<String, String> {
        self.env.clone().unwrap_or_default()
    }

    /// Network mode for the run phase.
    pub fn network(&self) -> NetworkMode {
        if self.allow_network {
            NetworkMode::Bridge
        } else {
            NetworkMode::None
        }
    }

    /// Display name, falling back to the id.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}

#[cfg(test)]
#[path = "step_tests.rs"]
mod tests;
