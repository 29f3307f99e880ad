// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Deterministic step fingerprints.
//!
//! A fingerprint is a SHA-256 digest over a canonical JSON encoding of
//! everything that affects a step's output: image, command, environment,
//! input artifact ids, mounts, sources, caches, and the setup phase. The
//! encoding sorts every collection, so two inputs that differ only in
//! map or list ordering hash identically. Optional sections serialize as
//! `null` when absent, which keeps "omitted" distinct from "empty".

use kiln_core::step::{BindRef, CacheRef};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Setup phase portion of a fingerprint, canonicalized like the step itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SetupFingerprint {
    pub cmd: Vec<String>,
    pub caches: Option<Vec<CacheRef>>,
    pub allow_network: bool,
}

/// Everything that participates in a step's fingerprint.
///
/// Collections may be supplied in any order; [`fingerprint`] canonicalizes
/// before hashing. `None` and `Some(empty)` produce different digests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FingerprintInput {
    pub image: String,
    pub cmd: Vec<String>,
    pub env: Option<BTreeMap<String, String>>,
    /// Run ids of the step's resolved inputs.
    pub input_artifact_ids: Vec<String>,
    pub mounts: Option<Vec<BindRef>>,
    pub sources: Option<Vec<BindRef>>,
    pub caches: Option<Vec<CacheRef>>,
    pub setup: Option<SetupFingerprint>,
}

impl FingerprintInput {
    /// Sort every order-insensitive collection into its canonical form.
    fn canonicalize(&self) -> Self {
        let sort_binds = |binds: &Option<Vec<BindRef>>| {
            binds.as_ref().map(|b| {
                let mut sorted = b.clone();
                sorted.sort_by(|a, b| a.container_path.cmp(&b.container_path));
                sorted
            })
        };
        let sort_caches = |caches: &Option<Vec<CacheRef>>| {
            caches.as_ref().map(|c| {
                let mut sorted = c.clone();
                sorted.sort_by(|a, b| a.name.cmp(&b.name));
                sorted
            })
        };

        let mut input_artifact_ids = self.input_artifact_ids.clone();
        input_artifact_ids.sort();

        Self {
            image: self.image.clone(),
            cmd: self.cmd.clone(),
            env: self.env.clone(),
            input_artifact_ids,
            mounts: sort_binds(&self.mounts),
            sources: sort_binds(&self.sources),
            caches: sort_caches(&self.caches),
            setup: self.setup.as_ref().map(|s| SetupFingerprint {
                cmd: s.cmd.clone(),
                caches: sort_caches(&s.caches),
                allow_network: s.allow_network,
            }),
        }
    }
}

/// Compute the hex fingerprint digest for a step.
///
/// Pure function: same input (up to collection ordering) always yields the
/// same digest.
pub fn fingerprint(input: &FingerprintInput) -> Result<String, serde_json::Error> {
    let canonical = serde_json::to_string(&input.canonicalize())?;
    let digest = Sha256::digest(canonical.as_bytes());
    Ok(format!("{:x}", digest))
}

#[cfg(test)]
#[path = "fingerprint_tests.rs"]
mod tests;
