// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Dotenv-style env file parsing for step `env_file` references.

use std::collections::BTreeMap;
use std::path::Path;

/// Parse a dotenv-style file into ordered key-value pairs.
///
/// Missing files are an error here (a declared `env_file` that does not
/// exist is a misconfiguration, not an empty environment).
pub fn read_env_file(path: &Path) -> std::io::Result<BTreeMap<String, String>> {
    let content = std::fs::read_to_string(path)?;
    Ok(parse_env(&content))
}

/// Parse dotenv content string into key-value pairs.
fn parse_env(content: &str) -> BTreeMap<String, String> {
    let mut map = BTreeMap::new();
    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        if let Some(eq_pos) = trimmed.find('=') {
            let key = trimmed[..eq_pos].trim().to_string();
            let value = trimmed[eq_pos + 1..].to_string();
            if !key.is_empty() {
                map.insert(key, value);
            }
        }
    }
    map
}

#[cfg(test)]
#[path = "envfile_tests.rs"]
mod tests;
