// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for the execution engine

use crate::plan::PlanError;
use kiln_adapters::RuntimeError;
use kiln_storage::{LockError, StorageError};
use thiserror::Error;

/// Errors that can occur while running a pipeline.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Lock(#[from] LockError),

    #[error("step {step}: required input step {reference} has no run")]
    InputNotFound { step: String, reference: String },

    #[error("step {step} failed with exit code {exit_code}")]
    StepFailed { step: String, exit_code: i32 },

    #[error("run canceled")]
    Canceled,
}

impl EngineError {
    /// Stable machine-readable code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::Plan(e) => e.code(),
            EngineError::Runtime(e) => e.code(),
            EngineError::Storage(e) => e.code(),
            EngineError::Lock(e) => e.code(),
            EngineError::InputNotFound { .. } => "STEP_NOT_FOUND",
            EngineError::StepFailed { .. } => "CONTAINER_CRASH",
            EngineError::Canceled => "CANCELED",
        }
    }

    /// Transient errors are eligible for the step retry budget.
    pub fn is_transient(&self) -> bool {
        match self {
            EngineError::Runtime(e) => e.is_transient(),
            _ => false,
        }
    }
}
