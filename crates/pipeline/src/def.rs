// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Raw pipeline file definitions.
//!
//! These structs mirror the YAML/JSON document as written by the user. Kit
//! expansion, env-file merging, and validation happen in [`crate::resolve`],
//! which turns a [`StepDef`] into a [`kiln_core::Step`]. Field names accept
//! both snake_case and camelCase spellings.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A parsed pipeline file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineFile {
    /// Steps in declaration order. The key is the step id.
    #[serde(default)]
    pub steps: IndexMap<String, StepDef>,
}

/// Reference to another step's artifact.
///
/// Accepts either `{ step = "name", ... }` or a bare `"name"` string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InputDef {
    Bare(String),
    Full {
        step: String,
        #[serde(default)]
        alias: Option<String>,
        #[serde(default)]
        optional: bool,
    },
}

impl InputDef {
    pub fn step(&self) -> &str {
        match self {
            InputDef::Bare(step) => step,
            InputDef::Full { step, .. } => step,
        }
    }

    pub fn alias(&self) -> &str {
        match self {
            InputDef::Bare(step) => step,
            InputDef::Full { step, alias, .. } => alias.as_deref().unwrap_or(step),
        }
    }

    pub fn optional(&self) -> bool {
        match self {
            InputDef::Bare(_) => false,
            InputDef::Full { optional, .. } => *optional,
        }
    }
}

/// Named cache declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheDef {
    pub name: String,
    pub path: String,
    #[serde(default)]
    pub exclusive: bool,
}

/// Host path declaration for mounts and sources.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BindDef {
    /// Host path, relative to the pipeline root.
    pub host: String,
    /// Absolute container path.
    pub container: String,
}

/// Setup phase declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SetupDef {
    #[serde(default)]
    pub cmd: Vec<String>,
    #[serde(default)]
    pub caches: Option<Vec<CacheDef>>,
    #[serde(default, alias = "allowNetwork")]
    pub allow_network: bool,
}

/// One step as written in the pipeline file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StepDef {
    #[serde(default)]
    pub name: Option<String>,
    /// Kit reference; the kit's output is merged underneath user fields.
    #[serde(default)]
    pub uses: Option<String>,
    /// Kit parameters.
    #[serde(default)]
    pub with: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub cmd: Vec<String>,
    /// `None` when the pipeline file omits the key entirely; omission and an
    /// explicit empty map produce different fingerprints downstream, so the
    /// distinction survives from here on. Same for caches/mounts/sources.
    #[serde(default)]
    pub env: Option<BTreeMap<String, String>>,
    #[serde(default, alias = "envFile")]
    pub env_file: Option<String>,
    #[serde(default)]
    pub inputs: Vec<InputDef>,
    #[serde(default, alias = "outputPath")]
    pub output_path: Option<String>,
    #[serde(default)]
    pub caches: Option<Vec<CacheDef>>,
    #[serde(default)]
    pub mounts: Option<Vec<BindDef>>,
    #[serde(default)]
    pub sources: Option<Vec<BindDef>>,
    #[serde(default)]
    pub setup: Option<SetupDef>,
    #[serde(default, alias = "timeoutSec", alias = "timeout")]
    pub timeout_secs: Option<u64>,
    #[serde(default, alias = "allowFailure")]
    pub allow_failure: bool,
    #[serde(default, alias = "allowNetwork")]
    pub allow_network: bool,
    #[serde(default)]
    pub retries: u32,
    #[serde(default, alias = "retryDelayMs")]
    pub retry_delay_ms: u64,
    #[serde(default, rename = "if")]
    pub condition: Option<String>,
}

#[cfg(test)]
#[path = "def_tests.rs"]
mod tests;
