// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Kits: plugins that expand a shorthand reference into partial step fields.
//!
//! A step with `uses: <kit>` hands its `with:` parameters to the kit, which
//! returns a [`KitOutput`]. The output is merged underneath the user's own
//! fields: scalars only fill gaps, list entries concatenate and dedupe by
//! key (cache name, mount container path), and env entries never override
//! user-provided values.

use crate::def::{BindDef, CacheDef, SetupDef, StepDef};
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

/// Kit resolution errors. All of these are load-time fatal.
#[derive(Debug, Error)]
pub enum KitError {
    #[error("unknown kit: {0}")]
    UnknownKit(String),

    #[error("kit {kit}: missing required parameter `{param}`")]
    MissingParameter { kit: String, param: String },

    #[error("kit {kit}: parameter `{param}` {message}")]
    InvalidParameter {
        kit: String,
        param: String,
        message: String,
    },

    #[error("kit {kit}: unsupported option `{param}`")]
    UnsupportedOption { kit: String, param: String },
}

impl KitError {
    pub fn code(&self) -> &'static str {
        "KIT_MISUSE"
    }
}

/// Partial step fields produced by a kit.
#[derive(Debug, Clone, Default)]
pub struct KitOutput {
    pub image: Option<String>,
    pub cmd: Vec<String>,
    pub setup: Option<SetupDef>,
    pub caches: Vec<CacheDef>,
    pub mounts: Vec<BindDef>,
    pub sources: Vec<BindDef>,
    pub env: BTreeMap<String, String>,
    pub allow_network: Option<bool>,
}

/// A kit expands parameters into partial step fields.
pub trait Kit: Send + Sync {
    fn name(&self) -> &str;
    fn resolve(&self, params: &BTreeMap<String, serde_json::Value>)
        -> Result<KitOutput, KitError>;
}

/// Registry of available kits, keyed by name.
#[derive(Default)]
pub struct KitRegistry {
    kits: HashMap<String, Box<dyn Kit>>,
}

impl KitRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in kits.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(ScriptKit));
        registry
    }

    pub fn register(&mut self, kit: Box<dyn Kit>) {
        self.kits.insert(kit.name().to_string(), kit);
    }

    pub fn get(&self, name: &str) -> Result<&dyn Kit, KitError> {
        self.kits
            .get(name)
            .map(|kit| kit.as_ref())
            .ok_or_else(|| KitError::UnknownKit(name.to_string()))
    }
}

/// Merge a kit's output underneath a user-written step definition.
///
/// User fields win; list fields are concatenated (user entries first) and
/// deduplicated by key.
pub fn merge_kit_output(def: &StepDef, output: KitOutput) -> StepDef {
    let mut merged = def.clone();

    if merged.image.is_none() {
        merged.image = output.image;
    }
    if merged.cmd.is_empty() {
        merged.cmd = output.cmd;
    }
    if merged.setup.is_none() {
        merged.setup = output.setup;
    }
    if output.allow_network == Some(true) {
        merged.allow_network = true;
    }

    if !output.env.is_empty() {
        let env = merged.env.get_or_insert_with(BTreeMap::new);
        for (key, value) in output.env {
            env.entry(key).or_insert(value);
        }
    }

    merged.caches = merge_keyed(merged.caches, output.caches, |cache: &CacheDef| {
        cache.name.clone()
    });
    merged.mounts = merge_keyed(merged.mounts, output.mounts, |bind: &BindDef| {
        bind.container.clone()
    });
    merged.sources = merge_keyed(merged.sources, output.sources, |bind: &BindDef| {
        bind.container.clone()
    });

    merged
}

/// Concatenate a kit list under the user's, deduplicating by key.
///
/// A kit that contributes nothing leaves the user's field as written,
/// including the omitted-vs-empty distinction.
fn merge_keyed<T, K: std::hash::Hash + Eq>(
    user: Option<Vec<T>>,
    kit: Vec<T>,
    key: impl Fn(&T) -> K,
) -> Option<Vec<T>> {
    if kit.is_empty() {
        return user;
    }
    let mut seen = std::collections::HashSet::new();
    let mut result = Vec::new();
    for item in user.unwrap_or_default().into_iter().chain(kit) {
        if seen.insert(key(&item)) {
            result.push(item);
        }
    }
    Some(result)
}

/// Built-in `script` kit: wraps a shell snippet into an image + command.
///
/// Parameters: `script` (required), `image` (optional, default `alpine:3`).
pub struct ScriptKit;

impl Kit for ScriptKit {
    fn name(&self) -> &str {
        "script"
    }

    fn resolve(
        &self,
        params: &BTreeMap<String, serde_json::Value>,
    ) -> Result<KitOutput, KitError> {
        for param in params.keys() {
            if param != "script" && param != "image" {
                return Err(KitError::UnsupportedOption {
                    kit: self.name().to_string(),
                    param: param.clone(),
                });
            }
        }

        let script = params
            .get("script")
            .ok_or_else(|| KitError::MissingParameter {
                kit: self.name().to_string(),
                param: "script".to_string(),
            })?
            .as_str()
            .ok_or_else(|| KitError::InvalidParameter {
                kit: self.name().to_string(),
                param: "script".to_string(),
                message: "must be a string".to_string(),
            })?;

        let image = match params.get("image") {
            Some(value) => value
                .as_str()
                .ok_or_else(|| KitError::InvalidParameter {
                    kit: self.name().to_string(),
                    param: "image".to_string(),
                    message: "must be a string".to_string(),
                })?
                .to_string(),
            None => "alpine:3".to_string(),
        };

        Ok(KitOutput {
            image: Some(image),
            cmd: vec!["sh".to_string(), "-c".to_string(), script.to_string()],
            ..KitOutput::default()
        })
    }
}

#[cfg(test)]
#[path = "kit_tests.rs"]
mod tests;
