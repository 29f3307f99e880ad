// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Level-wise pipeline execution with bounded concurrency.
//!
//! One run: plan the DAG, take the workspace lock, clean staging, verify the
//! runtime, then walk the levels. Steps inside a level run concurrently up
//! to the bound; a step is only scheduled when every dependency finished
//! successfully or was skipped. The first hard failure stops scheduling,
//! cancels in-flight steps, and kills the workspace's containers.

use crate::error::EngineError;
use crate::plan::{build_graph, subgraph, topological_levels, validate_graph};
use crate::report::Reporter;
use crate::step_runner::{fingerprint_for, StepOutcome, StepRunner};
use kiln_adapters::ContainerRuntime;
use kiln_core::{Clock, PipelineEvent, Step, SystemClock};
use kiln_storage::{State, WorkspaceLock, WorkspaceStore};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Options for one pipeline run.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RunOptions {
    pub workspace: String,
    /// Step ids that bypass the cache. Unknown ids are ignored.
    pub force: Vec<String>,
    /// Bypass the cache for every step.
    pub force_all: bool,
    pub dry_run: bool,
    /// Restrict execution to these steps and their ancestors.
    pub targets: Vec<String>,
    /// Parallelism bound; defaults to the host CPU count.
    pub concurrency: Option<usize>,
    /// Session environment for `if` conditions.
    pub session_env: BTreeMap<String, String>,
    /// Recorded in the workspace lock when running under a daemon.
    pub socket_path: Option<PathBuf>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            workspace: "default".to_string(),
            force: Vec::new(),
            force_all: false,
            dry_run: false,
            targets: Vec::new(),
            concurrency: None,
            session_env: BTreeMap::new(),
            socket_path: None,
        }
    }
}

/// Orchestrates steps across levels for one workspace.
pub struct PipelineRunner {
    workspaces_root: PathBuf,
    project_root: PathBuf,
    runtime: Arc<dyn ContainerRuntime>,
    reporter: Reporter,
    version: String,
}

impl PipelineRunner {
    pub fn new(
        workspaces_root: PathBuf,
        project_root: PathBuf,
        runtime: Arc<dyn ContainerRuntime>,
        reporter: Reporter,
    ) -> Self {
        Self {
            workspaces_root,
            project_root,
            runtime,
            reporter,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// Run a resolved pipeline. Returns `Ok(true)` on success, `Ok(false)`
    /// when the pipeline failed or was canceled (events carry the detail),
    /// and `Err` for failures that prevented the run from starting.
    pub async fn run(
        &self,
        steps: &[Step],
        options: RunOptions,
        external_cancel: watch::Receiver<bool>,
    ) -> Result<bool, EngineError> {
        let started = Instant::now();

        let mut graph = build_graph(steps)?;
        if !options.targets.is_empty() {
            graph = subgraph(&graph, &options.targets)?;
        }
        validate_graph(&graph)?;
        let levels = topological_levels(&graph);
        let step_map: HashMap<&str, &Step> =
            steps.iter().map(|step| (step.id.as_str(), step)).collect();

        let workspace = WorkspaceStore::open_or_create(&self.workspaces_root, &options.workspace)?;
        let state = Arc::new(Mutex::new(State::load(&workspace.state_path())?));

        if options.dry_run {
            return self.dry_run(&workspace, &state, &step_map, &levels, started);
        }

        let clock = SystemClock;
        let mut lock = WorkspaceLock::acquire(
            &workspace.lock_path(),
            options.socket_path.clone(),
            clock.epoch_ms(),
            &self.version,
        )?;

        workspace.cleanup_staging()?;
        for step in step_map.values() {
            for cache in step.caches.iter().flatten().chain(
                step.setup
                    .iter()
                    .flat_map(|setup| setup.caches.iter().flatten()),
            ) {
                workspace.prepare_cache(&cache.name)?;
            }
        }
        if let Err(e) = self.runtime.cleanup(workspace.name()).await {
            warn!(error = %e, "stale container cleanup failed");
        }
        self.runtime.check().await?;

        self.reporter.emit(PipelineEvent::PipelineStart {
            workspace: workspace.name().to_string(),
            levels: levels.clone(),
            dry_run: false,
        });

        let result = self
            .run_levels(&workspace, state, &step_map, &levels, &options, external_cancel)
            .await;

        lock.release();

        match result {
            Ok(None) => {
                self.reporter.emit(PipelineEvent::PipelineFinished {
                    duration_ms: started.elapsed().as_millis() as u64,
                });
                Ok(true)
            }
            Ok(Some(message)) => {
                if let Err(e) = self.runtime.kill_running(workspace.name()).await {
                    warn!(error = %e, "failed to kill running containers");
                }
                self.reporter.emit(PipelineEvent::PipelineFailed { message });
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Walk the levels. Returns `Ok(None)` on success or `Ok(Some(message))`
    /// describing why the pipeline failed.
    async fn run_levels(
        &self,
        workspace: &WorkspaceStore,
        state: Arc<Mutex<State>>,
        step_map: &HashMap<&str, &Step>,
        levels: &[Vec<String>],
        options: &RunOptions,
        external_cancel: watch::Receiver<bool>,
    ) -> Result<Option<String>, EngineError> {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let cancel_tx = Arc::new(cancel_tx);

        // Forward external cancellation (signal, daemon cancel) into the
        // run's own channel so step runners observe a single token.
        let forwarder = {
            let tx = Arc::clone(&cancel_tx);
            let mut external = external_cancel;
            tokio::spawn(async move {
                loop {
                    if *external.borrow() {
                        let _ = tx.send(true);
                        return;
                    }
                    if external.changed().await.is_err() {
                        return;
                    }
                }
            })
        };

        let concurrency = options
            .concurrency
            .unwrap_or_else(|| {
                std::thread::available_parallelism()
                    .map(|n| n.get())
                    .unwrap_or(4)
            })
            .max(1);
        let semaphore = Arc::new(Semaphore::new(concurrency));
        debug!(concurrency, "scheduling pipeline levels");

        let runner = StepRunner::new(
            workspace.clone(),
            Arc::clone(&self.runtime),
            self.reporter.clone(),
            state,
            self.project_root.clone(),
            options.session_env.clone(),
        );

        let graph = {
            // Rebuild the (validated) graph for dependency gating.
            let steps: Vec<Step> = step_map.values().map(|s| (*s).clone()).collect();
            build_graph(&steps)?
        };

        let mut outcomes: HashMap<String, StepOutcome> = HashMap::new();
        let mut failure: Option<String> = None;

        'levels: for level in levels {
            if failure.is_some() || *cancel_rx.borrow() {
                break;
            }

            let mut join: JoinSet<(String, Result<StepOutcome, EngineError>)> = JoinSet::new();
            for step_id in level {
                let Some(step) = step_map.get(step_id.as_str()) else {
                    continue;
                };
                let ready = graph
                    .get(step_id)
                    .map(|deps| {
                        deps.iter().all(|dep| {
                            outcomes
                                .get(dep)
                                .map(StepOutcome::unblocks_dependents)
                                .unwrap_or(false)
                        })
                    })
                    .unwrap_or(true);
                if !ready {
                    // A dependency failed under allow_failure (or was itself
                    // unscheduled); this step cannot run.
                    debug!(step = %step_id, "not scheduled: dependency did not complete");
                    continue;
                }

                let step = (*step).clone();
                let step_id = step_id.clone();
                let force = options.force_all || options.force.iter().any(|f| f == &step_id);
                let runner = runner.clone();
                let cancel = cancel_rx.clone();
                let semaphore = Arc::clone(&semaphore);
                join.spawn(async move {
                    let permit = semaphore.acquire_owned().await;
                    if permit.is_err() {
                        return (step_id, Err(EngineError::Canceled));
                    }
                    let outcome = runner.run(&step, force, &cancel).await;
                    (step_id, outcome)
                });
            }

            while let Some(joined) = join.join_next().await {
                match joined {
                    Ok((step_id, Ok(outcome))) => {
                        outcomes.insert(step_id, outcome);
                    }
                    Ok((step_id, Err(EngineError::Canceled))) => {
                        debug!(step = %step_id, "step canceled");
                    }
                    Ok((step_id, Err(e))) => {
                        if failure.is_none() {
                            failure = Some(format!("step {step_id} failed: {e}"));
                        }
                        // Stop scheduling; in-flight steps drain below.
                        let _ = cancel_tx.send(true);
                    }
                    Err(join_error) => {
                        if failure.is_none() {
                            failure = Some(format!("step task panicked: {join_error}"));
                        }
                        let _ = cancel_tx.send(true);
                    }
                }
            }

            if failure.is_some() {
                break 'levels;
            }
        }

        forwarder.abort();

        if failure.is_none() && *cancel_rx.borrow() {
            failure = Some("run canceled".to_string());
        }
        if failure.is_none() {
            info!(steps = outcomes.len(), "pipeline complete");
        }
        Ok(failure)
    }

    fn dry_run(
        &self,
        workspace: &WorkspaceStore,
        state: &Arc<Mutex<State>>,
        step_map: &HashMap<&str, &Step>,
        levels: &[Vec<String>],
        started: Instant,
    ) -> Result<bool, EngineError> {
        self.reporter.emit(PipelineEvent::PipelineStart {
            workspace: workspace.name().to_string(),
            levels: levels.to_vec(),
            dry_run: true,
        });

        let state = state.lock();
        for level in levels {
            for step_id in level {
                let Some(step) = step_map.get(step_id.as_str()) else {
                    continue;
                };
                let (fingerprint, cached) = fingerprint_for(step, &state, workspace)?;
                self.reporter.emit(PipelineEvent::StepWouldRun {
                    step_id: step_id.clone(),
                    fingerprint,
                    cached,
                });
            }
        }

        self.reporter.emit(PipelineEvent::PipelineFinished {
            duration_ms: started.elapsed().as_millis() as u64,
        });
        Ok(true)
    }
}

#[cfg(test)]
#[path = "runner_tests.rs"]
mod tests;
