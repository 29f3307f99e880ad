// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Resolution of raw step definitions into engine-ready steps.
//!
//! Resolution runs per step, in declaration order: kit expansion, env-file
//! merge (step entries win), then validation. Cross-step checks (unknown
//! input references, cycles) belong to the planner; everything local to one
//! step is enforced here.

use crate::def::{PipelineFile, StepDef};
use crate::envfile::read_env_file;
use crate::kit::{merge_kit_output, KitError, KitRegistry};
use kiln_core::step::{
    validate_identifier, BindRef, CacheRef, InputRef, SetupSpec, Step, StepIdError,
};
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;

/// Errors from step resolution.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("step {step}: {source}")]
    InvalidId {
        step: String,
        #[source]
        source: StepIdError,
    },

    #[error("step {step}: cache {cache}: {source}")]
    InvalidCacheName {
        step: String,
        cache: String,
        #[source]
        source: StepIdError,
    },

    #[error("step {step}: no image (set `image` or use a kit)")]
    MissingImage { step: String },

    #[error("step {step}: empty command")]
    EmptyCmd { step: String },

    #[error("step {step}: container path `{path}` must be absolute")]
    RelativeContainerPath { step: String, path: String },

    #[error("step {step}: container path `{path}` is claimed by both a mount and a source")]
    MountSourceConflict { step: String, path: String },

    #[error("step {step}: duplicate input alias `{alias}`")]
    DuplicateInputAlias { step: String, alias: String },

    #[error("step {step}: failed to read env file {path}: {source}")]
    EnvFile {
        step: String,
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("step {step}: {source}")]
    Kit {
        step: String,
        #[source]
        source: KitError,
    },
}

impl ResolveError {
    pub fn code(&self) -> &'static str {
        match self {
            ResolveError::Kit { source, .. } => source.code(),
            _ => "VALIDATION_ERROR",
        }
    }
}

/// Resolve a parsed pipeline file into engine-ready steps.
///
/// `root` is the pipeline root directory; `env_file` and host paths are
/// resolved against it.
pub fn resolve(
    file: &PipelineFile,
    root: &Path,
    kits: &KitRegistry,
) -> Result<Vec<Step>, ResolveError> {
    file.steps
        .iter()
        .map(|(id, def)| resolve_step(id, def, root, kits))
        .collect()
}

fn resolve_step(
    id: &str,
    def: &StepDef,
    root: &Path,
    kits: &KitRegistry,
) -> Result<Step, ResolveError> {
    validate_identifier(id).map_err(|source| ResolveError::InvalidId {
        step: id.to_string(),
        source,
    })?;

    let def = match &def.uses {
        Some(kit_name) => {
            let kit = kits.get(kit_name).map_err(|source| ResolveError::Kit {
                step: id.to_string(),
                source,
            })?;
            let output = kit.resolve(&def.with).map_err(|source| ResolveError::Kit {
                step: id.to_string(),
                source,
            })?;
            merge_kit_output(def, output)
        }
        None => def.clone(),
    };

    let image = def.image.clone().ok_or_else(|| ResolveError::MissingImage {
        step: id.to_string(),
    })?;
    if def.cmd.is_empty() {
        return Err(ResolveError::EmptyCmd {
            step: id.to_string(),
        });
    }

    // Env-file entries fill in around step-level env; the step wins. A step
    // that declares neither keeps `None`, which fingerprints differently
    // from an explicitly empty map.
    let env = if def.env.is_none() && def.env_file.is_none() {
        None
    } else {
        let mut merged = match &def.env_file {
            Some(rel) => {
                let path = root.join(rel);
                read_env_file(&path).map_err(|source| ResolveError::EnvFile {
                    step: id.to_string(),
                    path: path.display().to_string(),
                    source,
                })?
            }
            None => Default::default(),
        };
        if let Some(step_env) = &def.env {
            merged.extend(step_env.clone());
        }
        Some(merged)
    };

    let mut aliases = HashSet::new();
    for input in &def.inputs {
        if !aliases.insert(input.alias().to_string()) {
            return Err(ResolveError::DuplicateInputAlias {
                step: id.to_string(),
                alias: input.alias().to_string(),
            });
        }
    }

    for cache in def.caches.iter().flatten().chain(
        def.setup
            .iter()
            .flat_map(|setup| setup.caches.iter().flatten()),
    ) {
        validate_identifier(&cache.name).map_err(|source| ResolveError::InvalidCacheName {
            step: id.to_string(),
            cache: cache.name.clone(),
            source,
        })?;
        require_absolute(id, &cache.path)?;
    }
    if let Some(output_path) = &def.output_path {
        require_absolute(id, output_path)?;
    }

    let mut mount_paths = HashSet::new();
    for bind in def.mounts.iter().flatten() {
        require_absolute(id, &bind.container)?;
        mount_paths.insert(bind.container.clone());
    }
    for bind in def.sources.iter().flatten() {
        require_absolute(id, &bind.container)?;
        if mount_paths.contains(&bind.container) {
            return Err(ResolveError::MountSourceConflict {
                step: id.to_string(),
                path: bind.container.clone(),
            });
        }
    }

    Ok(Step {
        id: id.to_string(),
        name: def.name.clone(),
        image,
        cmd: def.cmd.clone(),
        env,
        inputs: def
            .inputs
            .iter()
            .map(|input| InputRef {
                alias: input.alias().to_string(),
                step: input.step().to_string(),
                optional: input.optional(),
            })
            .collect(),
        output_path: def.output_path.clone(),
        caches: def
            .caches
            .as_ref()
            .map(|caches| caches.iter().map(cache_ref).collect()),
        mounts: def
            .mounts
            .as_ref()
            .map(|binds| binds.iter().map(bind_ref).collect()),
        sources: def
            .sources
            .as_ref()
            .map(|binds| binds.iter().map(bind_ref).collect()),
        setup: def.setup.as_ref().map(|setup| SetupSpec {
            cmd: setup.cmd.clone(),
            caches: setup
                .caches
                .as_ref()
                .map(|caches| caches.iter().map(cache_ref).collect()),
            allow_network: setup.allow_network,
        }),
        timeout_secs: def.timeout_secs,
        allow_failure: def.allow_failure,
        allow_network: def.allow_network,
        retries: def.retries,
        retry_delay_ms: def.retry_delay_ms,
        condition: def.condition.clone(),
    })
}

fn require_absolute(step: &str, path: &str) -> Result<(), ResolveError> {
    if path.starts_with('/') {
        Ok(())
    } else {
        Err(ResolveError::RelativeContainerPath {
            step: step.to_string(),
            path: path.to_string(),
        })
    }
}

fn cache_ref(def: &crate::def::CacheDef) -> CacheRef {
    CacheRef {
        name: def.name.clone(),
        path: def.path.clone(),
        exclusive: def.exclusive,
    }
}

fn bind_ref(def: &crate::def::BindDef) -> BindRef {
    BindRef {
        host_path: def.host.clone(),
        container_path: def.container.clone(),
    }
}

#[cfg(test)]
#[path = "resolve_tests.rs"]
mod tests;
