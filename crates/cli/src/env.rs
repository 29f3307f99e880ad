// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Environment and path resolution for the CLI.

use std::collections::BTreeMap;
use std::path::PathBuf;

/// Environment variable overriding the default workspaces root.
pub const WORKDIR_ENV: &str = "KILN_WORKDIR";

/// Resolve the workspaces root: flag, then `KILN_WORKDIR`, then
/// `~/.kiln/workspaces`.
pub fn workspaces_root(flag: Option<PathBuf>) -> PathBuf {
    if let Some(dir) = flag {
        return dir;
    }
    if let Ok(dir) = std::env::var(WORKDIR_ENV) {
        if !dir.is_empty() {
            return PathBuf::from(dir);
        }
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".kiln")
        .join("workspaces")
}

/// Session environment for `if` conditions: the process environment,
/// overlaid with an optional env file (file entries win).
pub fn session_env(env_file: Option<&std::path::Path>) -> std::io::Result<BTreeMap<String, String>> {
    let mut env: BTreeMap<String, String> = std::env::vars().collect();
    if let Some(path) = env_file {
        for (key, value) in kiln_pipeline::read_env_file(path)? {
            env.insert(key, value);
        }
    }
    Ok(env)
}

#[cfg(test)]
#[path = "env_tests.rs"]
mod tests;
