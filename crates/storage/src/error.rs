// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for workspace storage

use thiserror::Error;

/// Errors from the workspace store and state manager.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("workspace not found: {0}")]
    WorkspaceNotFound(String),

    #[error("invalid workspace name: {0}")]
    InvalidWorkspaceName(String),

    #[error("run not found: {0}")]
    RunNotFound(String),

    #[error("artifacts missing for run {0}")]
    ArtifactNotFound(String),

    #[error("failed to stage run {run_id}: {message}")]
    StagingFailed { run_id: String, message: String },
}

impl StorageError {
    /// Stable machine-readable code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            StorageError::Io(_) | StorageError::Json(_) => "STORAGE_IO",
            StorageError::WorkspaceNotFound(_) => "WORKSPACE_NOT_FOUND",
            StorageError::InvalidWorkspaceName(_) => "VALIDATION_ERROR",
            StorageError::RunNotFound(_) => "RUN_NOT_FOUND",
            StorageError::ArtifactNotFound(_) => "ARTIFACT_NOT_FOUND",
            StorageError::StagingFailed { .. } => "STAGING_FAILED",
        }
    }
}
