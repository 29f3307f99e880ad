// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pipeline file parsing (YAML and JSON)

use crate::def::PipelineFile;
use std::path::Path;
use thiserror::Error;

/// Pipeline file format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Yaml,
    Json,
}

impl Format {
    /// Pick the format from a file extension; YAML is the default.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Format::Json,
            _ => Format::Yaml,
        }
    }
}

/// Errors that can occur during pipeline file parsing
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl ParseError {
    pub fn code(&self) -> &'static str {
        "VALIDATION_ERROR"
    }
}

/// Parse pipeline file content in the given format.
pub fn parse_str(content: &str, format: Format) -> Result<PipelineFile, ParseError> {
    match format {
        Format::Yaml => Ok(serde_yaml::from_str(content)?),
        Format::Json => Ok(serde_json::from_str(content)?),
    }
}

/// Load a pipeline file from disk, picking the format from the extension.
pub fn load_file(path: &Path) -> Result<PipelineFile, ParseError> {
    let content = std::fs::read_to_string(path).map_err(|source| ParseError::Read {
        path: path.display().to_string(),
        source,
    })?;
    parse_str(&content, Format::from_path(path))
}

#[cfg(test)]
#[path = "parser_tests.rs"]
mod tests;
