// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fake container runtime for deterministic testing

use crate::runtime::{ContainerRuntime, LogSink, RunOutcome, RunRequest, RuntimeError};
use async_trait::async_trait;
use kiln_core::event::LogStream;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

/// Scripted result for one container invocation.
#[derive(Debug, Clone, Default)]
pub struct FakeResult {
    pub exit_code: i32,
    /// Log lines emitted before the container "exits".
    pub logs: Vec<(LogStream, String)>,
    /// Files written into the output mount, as (relative path, contents).
    pub output_files: Vec<(String, String)>,
    /// Simulate a transient timeout instead of exiting.
    pub timeout: bool,
}

impl FakeResult {
    pub fn success() -> Self {
        Self::default()
    }

    pub fn exit(code: i32) -> Self {
        Self {
            exit_code: code,
            ..Self::default()
        }
    }

    pub fn with_output(mut self, path: &str, contents: &str) -> Self {
        self.output_files
            .push((path.to_string(), contents.to_string()));
        self
    }

    pub fn with_log(mut self, stream: LogStream, line: &str) -> Self {
        self.logs.push((stream, line.to_string()));
        self
    }
}

struct FakeState {
    /// Per-container-name scripted results, consumed front to back.
    scripts: HashMap<String, VecDeque<FakeResult>>,
    requests: Vec<RunRequest>,
    check_error: Option<String>,
    killed_workspaces: Vec<String>,
    cleaned_workspaces: Vec<String>,
    clock_ms: u64,
}

/// Fake container runtime.
///
/// Records every request and replays scripted results keyed by container
/// name. Unscripted invocations succeed with exit code 0 and write a marker
/// file into the output mount.
#[derive(Clone)]
pub struct FakeRuntime {
    inner: Arc<Mutex<FakeState>>,
}

impl Default for FakeRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(FakeState {
                scripts: HashMap::new(),
                requests: Vec::new(),
                check_error: None,
                killed_workspaces: Vec::new(),
                cleaned_workspaces: Vec::new(),
                clock_ms: 1_000,
            })),
        }
    }

    /// Queue a result for the named container. Results are consumed in
    /// order; once the queue drains the default success applies again.
    pub fn script(&self, name: &str, result: FakeResult) {
        self.inner
            .lock()
            .scripts
            .entry(name.to_string())
            .or_default()
            .push_back(result);
    }

    /// Make `check()` fail.
    pub fn set_check_error(&self, message: impl Into<String>) {
        self.inner.lock().check_error = Some(message.into());
    }

    /// All requests seen so far.
    pub fn requests(&self) -> Vec<RunRequest> {
        self.inner.lock().requests.clone()
    }

    /// Container names run so far, in order.
    pub fn run_names(&self) -> Vec<String> {
        self.inner
            .lock()
            .requests
            .iter()
            .map(|r| r.name.clone())
            .collect()
    }

    pub fn killed_workspaces(&self) -> Vec<String> {
        self.inner.lock().killed_workspaces.clone()
    }

    pub fn cleaned_workspaces(&self) -> Vec<String> {
        self.inner.lock().cleaned_workspaces.clone()
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn check(&self) -> Result<(), RuntimeError> {
        let error = self.inner.lock().check_error.clone();
        match error {
            Some(message) => Err(RuntimeError::NotAvailable(message)),
            None => Ok(()),
        }
    }

    async fn run(
        &self,
        request: RunRequest,
        on_log: LogSink,
    ) -> Result<RunOutcome, RuntimeError> {
        let (result, started_at) = {
            let mut inner = self.inner.lock();
            inner.clock_ms += 10;
            let started_at = inner.clock_ms;
            let result = inner
                .scripts
                .get_mut(&request.name)
                .and_then(|queue| queue.pop_front())
                .unwrap_or_else(|| {
                    FakeResult::success().with_output(".kiln-fake", &request.name)
                });
            inner.requests.push(request.clone());
            (result, started_at)
        };

        for (stream, line) in &result.logs {
            on_log(*stream, line.clone());
        }

        if result.timeout {
            return Err(RuntimeError::Timeout(
                request.timeout.map(|d| d.as_secs()).unwrap_or(0),
            ));
        }

        if let Some(output) = &request.output {
            for (path, contents) in &result.output_files {
                let target = output.host_path.join(path);
                if let Some(parent) = target.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::write(target, contents)?;
            }
        }

        let finished_at = {
            let mut inner = self.inner.lock();
            inner.clock_ms += 10;
            inner.clock_ms
        };

        Ok(RunOutcome {
            exit_code: result.exit_code,
            started_at,
            finished_at,
        })
    }

    async fn kill_running(&self, workspace: &str) -> Result<(), RuntimeError> {
        self.inner
            .lock()
            .killed_workspaces
            .push(workspace.to_string());
        Ok(())
    }

    async fn cleanup(&self, workspace: &str) -> Result<(), RuntimeError> {
        self.inner
            .lock()
            .cleaned_workspaces
            .push(workspace.to_string());
        Ok(())
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;
