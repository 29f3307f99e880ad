// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Single-step execution: skip decision, setup, run, commit, retries.
//!
//! The sequence for one step:
//!
//! 1. Evaluate the `if` condition (skip with reason `condition`).
//! 2. Resolve inputs against the state; required-but-missing fails, optional
//!    inputs are dropped.
//! 3. Compute the fingerprint; matching state entry with live artifacts
//!    skips with reason `cached` (unless forced).
//! 4. Setup phase under exclusive cache locks, if declared.
//! 5. Run phase: container with input mounts at `/input/<alias>`, output at
//!    the staging artifact directory, shared caches, bounded by the step
//!    timeout. Log lines stream to the reporter and the staging log files.
//! 6. Transient failures and non-zero exits consume the retry budget, with
//!    the same run id across attempts.
//! 7. Success commits: meta flushed, staging renamed into `runs/`, symlink
//!    and state updated atomically.
//! 8. Exhausted failures discard staging; `allow_failure` converts the
//!    failure into a non-propagating `step:finished(status=failure)`.

use crate::cache_lock::CacheLocks;
use crate::error::EngineError;
use crate::report::Reporter;
use kiln_adapters::{ContainerRuntime, LogSink, Mount, RunOutcome as ContainerOutcome, RunRequest};
use kiln_core::run::{RunInput, RunRecord, RunStatus};
use kiln_core::step::SetupSpec;
use kiln_core::{evaluate_condition, new_run_id, NetworkMode, PipelineEvent, SkipReason, Step};
use kiln_storage::{fingerprint, FingerprintInput, SetupFingerprint, State, StorageError, WorkspaceStore};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, warn};

/// Result of running one step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// Not executed; condition false or cache hit.
    Skipped(SkipReason),
    /// Committed run.
    Succeeded { run_id: String },
    /// Run failed after retries, contained by `allow_failure`.
    FailedAllowed,
}

impl StepOutcome {
    /// True when downstream steps may start.
    pub fn unblocks_dependents(&self) -> bool {
        matches!(self, StepOutcome::Skipped(_) | StepOutcome::Succeeded { .. })
    }
}

/// Executes single steps against one workspace.
#[derive(Clone)]
pub struct StepRunner {
    pub(crate) workspace: WorkspaceStore,
    pub(crate) runtime: Arc<dyn ContainerRuntime>,
    pub(crate) reporter: Reporter,
    pub(crate) cache_locks: Arc<CacheLocks>,
    pub(crate) state: Arc<Mutex<State>>,
    /// Pipeline root; step host paths resolve against it.
    pub(crate) project_root: PathBuf,
    /// Session environment the `if` conditions evaluate over.
    pub(crate) session_env: Arc<BTreeMap<String, String>>,
}

impl StepRunner {
    pub fn new(
        workspace: WorkspaceStore,
        runtime: Arc<dyn ContainerRuntime>,
        reporter: Reporter,
        state: Arc<Mutex<State>>,
        project_root: PathBuf,
        session_env: BTreeMap<String, String>,
    ) -> Self {
        Self {
            workspace,
            runtime,
            reporter,
            cache_locks: Arc::new(CacheLocks::new()),
            state,
            project_root,
            session_env: Arc::new(session_env),
        }
    }

    /// Run one step end-to-end.
    pub async fn run(
        &self,
        step: &Step,
        force: bool,
        cancel: &watch::Receiver<bool>,
    ) -> Result<StepOutcome, EngineError> {
        if let Some(condition) = &step.condition {
            if !evaluate_condition(condition, &self.session_env) {
                self.reporter.emit(PipelineEvent::StepSkipped {
                    step_id: step.id.clone(),
                    reason: SkipReason::Condition,
                });
                return Ok(StepOutcome::Skipped(SkipReason::Condition));
            }
        }

        let inputs = self.resolve_inputs(step)?;
        let input_ids: Vec<String> = inputs.iter().map(|i| i.run_id.clone()).collect();
        let fingerprint = compute_fingerprint(step, input_ids)?;

        if !force {
            let cached = {
                let state = self.state.lock();
                state
                    .get_step(&step.id)
                    .filter(|entry| entry.fingerprint == fingerprint)
                    .map(|entry| entry.run_id.clone())
            };
            if let Some(run_id) = cached {
                if self.workspace.artifacts_exist(&run_id) {
                    debug!(step = %step.id, %run_id, "cache hit");
                    self.reporter.emit(PipelineEvent::StepSkipped {
                        step_id: step.id.clone(),
                        reason: SkipReason::Cached,
                    });
                    return Ok(StepOutcome::Skipped(SkipReason::Cached));
                }
            }
        }

        for cache in step.caches.iter().flatten().chain(
            step.setup
                .iter()
                .flat_map(|setup| setup.caches.iter().flatten()),
        ) {
            self.workspace.prepare_cache(&cache.name)?;
        }

        let run_id = new_run_id();
        let total_attempts = step.retries + 1;
        let mut attempt: u32 = 1;

        loop {
            if *cancel.borrow() {
                self.workspace.discard_staging(&run_id);
                return Err(EngineError::Canceled);
            }

            self.reporter.emit(PipelineEvent::StepStarting {
                step_id: step.id.clone(),
                attempt,
            });

            let failure = match self.attempt(step, &inputs, &run_id).await {
                Ok(outcome) if outcome.exit_code == 0 => {
                    return self.commit(step, inputs, run_id, fingerprint, outcome, attempt);
                }
                Ok(outcome) => AttemptFailure::Exit(outcome),
                Err(e) if e.is_transient() => AttemptFailure::Transient(e),
                Err(e) => {
                    self.workspace.discard_staging(&run_id);
                    self.reporter.emit(PipelineEvent::StepFailed {
                        step_id: step.id.clone(),
                        code: e.code().to_string(),
                        message: e.to_string(),
                        attempts: attempt,
                    });
                    return Err(e);
                }
            };

            if attempt < total_attempts {
                self.reporter.emit(PipelineEvent::StepRetrying {
                    step_id: step.id.clone(),
                    attempt,
                    delay_ms: step.retry_delay_ms,
                });
                if step.retry_delay_ms > 0 {
                    tokio::time::sleep(Duration::from_millis(step.retry_delay_ms)).await;
                }
                attempt += 1;
                continue;
            }

            self.workspace.discard_staging(&run_id);
            return self.fail(step, attempt, failure);
        }
    }

    /// Run a step ephemerally: no cache check, no staging, no commit; the
    /// workspace is left untouched and output goes to a scratch directory.
    pub async fn run_ephemeral(&self, step: &Step) -> Result<i32, EngineError> {
        if let Some(condition) = &step.condition {
            if !evaluate_condition(condition, &self.session_env) {
                self.reporter.emit(PipelineEvent::StepSkipped {
                    step_id: step.id.clone(),
                    reason: SkipReason::Condition,
                });
                return Ok(0);
            }
        }

        let inputs = self.resolve_inputs(step)?;
        for cache in step.caches.iter().flatten().chain(
            step.setup
                .iter()
                .flat_map(|setup| setup.caches.iter().flatten()),
        ) {
            self.workspace.prepare_cache(&cache.name)?;
        }

        let scratch = std::env::temp_dir().join(format!("kiln-exec-{}", new_run_id()));
        std::fs::create_dir_all(&scratch).map_err(StorageError::Io)?;
        let _cleanup = ScratchGuard(scratch.clone());

        self.reporter.emit(PipelineEvent::StepStarting {
            step_id: step.id.clone(),
            attempt: 1,
        });

        if let Some(setup) = &step.setup {
            let outcome = self.run_setup(step, setup, scratch.join("scratch")).await?;
            if outcome.exit_code != 0 {
                self.emit_failure(step, 1, outcome.exit_code);
                return Ok(outcome.exit_code);
            }
        }

        let output = Mount::read_write(scratch.join("output"), step.output_path());
        std::fs::create_dir_all(&output.host_path).map_err(StorageError::Io)?;
        let request = self.run_request(step, &inputs, output);
        let outcome = self
            .runtime
            .run(request, self.log_sink(step.id.clone(), None))
            .await?;

        if outcome.exit_code == 0 {
            self.reporter.emit(PipelineEvent::StepFinished {
                step_id: step.id.clone(),
                run_id: None,
                status: RunStatus::Success,
                attempts: 1,
                duration_ms: outcome.finished_at.saturating_sub(outcome.started_at),
            });
        } else {
            self.emit_failure(step, 1, outcome.exit_code);
        }
        Ok(outcome.exit_code)
    }

    /// One attempt: fresh staging, optional setup phase, then the run phase.
    async fn attempt(
        &self,
        step: &Step,
        inputs: &[RunInput],
        run_id: &str,
    ) -> Result<ContainerOutcome, EngineError> {
        // Recreate staging so a failed prior attempt cannot leak partial
        // output into this one.
        self.workspace.discard_staging(run_id);
        let artifacts = self.workspace.begin_staging(run_id)?;

        if let Some(setup) = &step.setup {
            let scratch = self.workspace.staging_run_path(run_id).join("scratch");
            let outcome = self.run_setup(step, setup, scratch.clone()).await?;
            if outcome.exit_code != 0 {
                return Ok(outcome);
            }
            // The scratch directory must not end up in the committed run.
            let _ = std::fs::remove_dir_all(&scratch);
        }

        let output = Mount::read_write(artifacts, step.output_path());
        let request = self.run_request(step, inputs, output);
        let outcome = self
            .runtime
            .run(
                request,
                self.log_sink(step.id.clone(), Some(run_id.to_string())),
            )
            .await?;
        Ok(outcome)
    }

    /// Setup phase: exclusive cache locks, only the setup caches mounted,
    /// a scratch working directory, no artifact.
    async fn run_setup(
        &self,
        step: &Step,
        setup: &SetupSpec,
        scratch: PathBuf,
    ) -> Result<ContainerOutcome, EngineError> {
        let names: Vec<String> = setup
            .caches
            .iter()
            .flatten()
            .map(|c| c.name.clone())
            .collect();
        let _guard = self.cache_locks.acquire(&names).await;
        std::fs::create_dir_all(&scratch).map_err(StorageError::Io)?;

        let request = RunRequest {
            name: format!("kiln-{}-{}-setup", self.workspace.name(), step.id),
            workspace: self.workspace.name().to_string(),
            image: step.image.clone(),
            cmd: setup.cmd.clone(),
            env: step.container_env(),
            inputs: Vec::new(),
            output: Some(Mount::read_write(scratch, "/scratch")),
            caches: setup
                .caches
                .iter()
                .flatten()
                .map(|c| Mount::read_write(self.workspace.cache_path(&c.name), &c.path))
                .collect(),
            mounts: Vec::new(),
            sources: Vec::new(),
            network: if setup.allow_network {
                NetworkMode::Bridge
            } else {
                NetworkMode::None
            },
            timeout: step.timeout_secs.map(Duration::from_secs),
        };

        let outcome = self
            .runtime
            .run(request, self.log_sink(step.id.clone(), None))
            .await?;
        Ok(outcome)
    }

    fn run_request(&self, step: &Step, inputs: &[RunInput], output: Mount) -> RunRequest {
        RunRequest {
            name: format!("kiln-{}-{}", self.workspace.name(), step.id),
            workspace: self.workspace.name().to_string(),
            image: step.image.clone(),
            cmd: step.cmd.clone(),
            env: step.container_env(),
            inputs: inputs
                .iter()
                .map(|input| {
                    Mount::read_only(
                        self.workspace.run_artifacts_path(&input.run_id),
                        format!("{}/{}", kiln_core::RUN_INPUT_ROOT, input.alias),
                    )
                })
                .collect(),
            output: Some(output),
            caches: step
                .caches
                .iter()
                .flatten()
                .map(|c| Mount::read_write(self.workspace.cache_path(&c.name), &c.path))
                .collect(),
            mounts: step
                .mounts
                .iter()
                .flatten()
                .map(|m| Mount::read_only(self.project_root.join(&m.host_path), &m.container_path))
                .collect(),
            sources: step
                .sources
                .iter()
                .flatten()
                .map(|s| Mount::read_only(self.project_root.join(&s.host_path), &s.container_path))
                .collect(),
            network: step.network(),
            timeout: step.timeout_secs.map(Duration::from_secs),
        }
    }

    /// Log sink fanning each line to the reporter and, when a run id is
    /// given, to the staging `stdout.log`/`stderr.log`.
    fn log_sink(&self, step_id: String, run_id: Option<String>) -> LogSink {
        let reporter = self.reporter.clone();
        let workspace = self.workspace.clone();
        Arc::new(move |stream, line: String| {
            if let Some(run_id) = &run_id {
                let file = match stream {
                    kiln_core::LogStream::Stdout => "stdout.log",
                    kiln_core::LogStream::Stderr => "stderr.log",
                };
                if let Err(e) = workspace.append_staging_log(run_id, file, &line) {
                    warn!(%run_id, error = %e, "failed to persist log line");
                }
            }
            reporter.emit(PipelineEvent::StepLog {
                step_id: step_id.clone(),
                stream,
                line,
            });
        })
    }

    fn resolve_inputs(&self, step: &Step) -> Result<Vec<RunInput>, EngineError> {
        let state = self.state.lock();
        let mut resolved = Vec::new();
        for input in &step.inputs {
            match state.get_step(&input.step) {
                Some(entry) if self.workspace.artifacts_exist(&entry.run_id) => {
                    resolved.push(RunInput {
                        alias: input.alias.clone(),
                        run_id: entry.run_id.clone(),
                    });
                }
                _ if input.optional => {}
                _ => {
                    let error = EngineError::InputNotFound {
                        step: step.id.clone(),
                        reference: input.step.clone(),
                    };
                    self.reporter.emit(PipelineEvent::StepFailed {
                        step_id: step.id.clone(),
                        code: error.code().to_string(),
                        message: error.to_string(),
                        attempts: 0,
                    });
                    return Err(error);
                }
            }
        }
        Ok(resolved)
    }

    fn commit(
        &self,
        step: &Step,
        inputs: Vec<RunInput>,
        run_id: String,
        fingerprint: String,
        outcome: ContainerOutcome,
        attempts: u32,
    ) -> Result<StepOutcome, EngineError> {
        let record = RunRecord {
            run_id: run_id.clone(),
            step_id: step.id.clone(),
            step_name: step.name.clone(),
            image: step.image.clone(),
            cmd: step.cmd.clone(),
            env: step.container_env(),
            status: RunStatus::Success,
            exit_code: outcome.exit_code,
            duration_ms: outcome.finished_at.saturating_sub(outcome.started_at),
            started_at: outcome.started_at,
            finished_at: outcome.finished_at,
            fingerprint: fingerprint.clone(),
            inputs,
        };

        self.workspace.commit_run(&record)?;
        {
            let mut state = self.state.lock();
            state.set_step(step.id.clone(), run_id.clone(), fingerprint);
            state.save(&self.workspace.state_path())?;
        }

        self.reporter.emit(PipelineEvent::StepFinished {
            step_id: step.id.clone(),
            run_id: Some(run_id.clone()),
            status: RunStatus::Success,
            attempts,
            duration_ms: record.duration_ms,
        });
        Ok(StepOutcome::Succeeded { run_id })
    }

    fn fail(
        &self,
        step: &Step,
        attempts: u32,
        failure: AttemptFailure,
    ) -> Result<StepOutcome, EngineError> {
        let (code, message, exit_code) = match &failure {
            AttemptFailure::Exit(outcome) => (
                "CONTAINER_CRASH".to_string(),
                format!("exit code {}", outcome.exit_code),
                outcome.exit_code,
            ),
            AttemptFailure::Transient(e) => (e.code().to_string(), e.to_string(), -1),
        };

        if step.allow_failure {
            self.emit_failure(step, attempts, exit_code);
            return Ok(StepOutcome::FailedAllowed);
        }

        self.reporter.emit(PipelineEvent::StepFailed {
            step_id: step.id.clone(),
            code,
            message,
            attempts,
        });
        match failure {
            AttemptFailure::Exit(outcome) => Err(EngineError::StepFailed {
                step: step.id.clone(),
                exit_code: outcome.exit_code,
            }),
            AttemptFailure::Transient(e) => Err(e),
        }
    }

    fn emit_failure(&self, step: &Step, attempts: u32, _exit_code: i32) {
        self.reporter.emit(PipelineEvent::StepFinished {
            step_id: step.id.clone(),
            run_id: None,
            status: RunStatus::Failure,
            attempts,
            duration_ms: 0,
        });
    }
}

enum AttemptFailure {
    Exit(ContainerOutcome),
    Transient(EngineError),
}

/// Removes the ephemeral scratch directory on drop.
struct ScratchGuard(PathBuf);

impl Drop for ScratchGuard {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.0);
    }
}

/// Build the fingerprint input for a step given its resolved input run ids.
///
/// The step's optional sections carry their presence straight through:
/// a pipeline file that omits `env` fingerprints differently from one that
/// writes `env: {}`.
fn compute_fingerprint(step: &Step, input_ids: Vec<String>) -> Result<String, EngineError> {
    let input = FingerprintInput {
        image: step.image.clone(),
        cmd: step.cmd.clone(),
        env: step.env.clone(),
        input_artifact_ids: input_ids,
        mounts: step.mounts.clone(),
        sources: step.sources.clone(),
        caches: step.caches.clone(),
        setup: step.setup.as_ref().map(|setup| SetupFingerprint {
            cmd: setup.cmd.clone(),
            caches: setup.caches.clone(),
            allow_network: setup.allow_network,
        }),
    };
    fingerprint(&input).map_err(|e| EngineError::Storage(StorageError::Json(e)))
}

/// Fingerprint and cache prediction for a step, used by dry runs.
///
/// Inputs resolve best-effort against the current state; the prediction is
/// true when the state entry matches and its artifacts are still present.
pub fn fingerprint_for(
    step: &Step,
    state: &State,
    workspace: &WorkspaceStore,
) -> Result<(String, bool), EngineError> {
    let input_ids: Vec<String> = step
        .inputs
        .iter()
        .filter_map(|input| state.get_step(&input.step).map(|e| e.run_id.clone()))
        .collect();
    let fingerprint = compute_fingerprint(step, input_ids)?;
    let cached = state
        .get_step(&step.id)
        .map(|entry| entry.fingerprint == fingerprint && workspace.artifacts_exist(&entry.run_id))
        .unwrap_or(false);
    Ok((fingerprint, cached))
}

#[cfg(test)]
#[path = "step_runner_tests.rs"]
mod tests;
