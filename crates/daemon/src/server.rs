// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon socket server.
//!
//! One daemon owns one workspace run at a time. Clients connect over a Unix
//! socket and speak newline-delimited JSON: `run` starts the pipeline,
//! `subscribe` streams a session snapshot, the buffered recent events, and
//! then live events; `cancel` drives the engine's cancellation path. The
//! server exits once the run has finished and the last subscriber is gone,
//! or after a cancel terminates the run.

use crate::protocol::{Request, Response};
use crate::wire::{write_line, LineDecoder, ProtocolError};
use kiln_adapters::ContainerRuntime;
use kiln_core::{new_run_id, PipelineEvent, Step};
use kiln_engine::{Aggregator, PipelineRunner, Reporter, RunOptions};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{mpsc, watch, Notify};
use tracing::{debug, info, warn};

/// How many recent events late subscribers receive before live ones.
const REPLAY_CAPACITY: usize = 1024;

/// Daemon server configuration.
pub struct ServerConfig {
    pub socket_path: PathBuf,
    pub workspaces_root: PathBuf,
    pub project_root: PathBuf,
    pub runtime: Arc<dyn ContainerRuntime>,
}

enum RunState {
    Idle,
    Running { cancel: watch::Sender<bool> },
    Finished,
}

struct Subscriber {
    tx: mpsc::UnboundedSender<Response>,
    logs: bool,
}

struct Inner {
    aggregator: Aggregator,
    /// Replay buffer and subscriber table share one lock so a subscriber
    /// never sees an event both replayed and live, or misses one between.
    fanout: Mutex<Fanout>,
    run_state: Mutex<RunState>,
    canceled: AtomicBool,
    next_client: AtomicU64,
    shutdown: Notify,
}

struct Fanout {
    replay: VecDeque<PipelineEvent>,
    subscribers: HashMap<u64, Subscriber>,
}

impl Inner {
    fn broadcast(&self, event: &PipelineEvent) {
        self.aggregator.apply(event);
        let mut fanout = self.fanout.lock();
        if fanout.replay.len() == REPLAY_CAPACITY {
            fanout.replay.pop_front();
        }
        fanout.replay.push_back(event.clone());

        fanout.subscribers.retain(|_, subscriber| {
            if !subscriber.logs && matches!(event, PipelineEvent::StepLog { .. }) {
                return true;
            }
            subscriber
                .tx
                .send(Response::Event {
                    event: event.clone(),
                })
                .is_ok()
        });
    }

    fn broadcast_response(&self, response: Response) {
        let mut fanout = self.fanout.lock();
        fanout
            .subscribers
            .retain(|_, subscriber| subscriber.tx.send(response.clone()).is_ok());
    }

    /// Register a subscriber: snapshot, then buffered events, then live.
    fn subscribe(&self, client_id: u64, tx: mpsc::UnboundedSender<Response>, logs: bool) {
        let mut fanout = self.fanout.lock();
        let _ = tx.send(Response::State {
            state: self.aggregator.snapshot(),
        });
        for event in &fanout.replay {
            if !logs && matches!(event, PipelineEvent::StepLog { .. }) {
                continue;
            }
            let _ = tx.send(Response::Event {
                event: event.clone(),
            });
        }
        fanout.subscribers.insert(client_id, Subscriber { tx, logs });
    }

    fn unsubscribe(&self, client_id: u64) {
        self.fanout.lock().subscribers.remove(&client_id);
    }

    fn maybe_shutdown(&self) {
        let finished = matches!(*self.run_state.lock(), RunState::Finished);
        let idle_clients = self.fanout.lock().subscribers.is_empty();
        if finished && (idle_clients || self.canceled.load(Ordering::SeqCst)) {
            // notify_one stores a permit, so a notification between two
            // select iterations in serve() is not lost.
            self.shutdown.notify_one();
        }
    }
}

/// Socket server hosting one pipeline run.
pub struct DaemonServer {
    config: ServerConfig,
    inner: Arc<Inner>,
}

impl DaemonServer {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            inner: Arc::new(Inner {
                aggregator: Aggregator::new(),
                fanout: Mutex::new(Fanout {
                    replay: VecDeque::new(),
                    subscribers: HashMap::new(),
                }),
                run_state: Mutex::new(RunState::Idle),
                canceled: AtomicBool::new(false),
                next_client: AtomicU64::new(1),
                shutdown: Notify::new(),
            }),
        }
    }

    pub fn socket_path(&self) -> &PathBuf {
        &self.config.socket_path
    }

    /// Bind the daemon socket, replacing any stale socket file.
    ///
    /// Separate from [`DaemonServer::serve`] so callers can signal readiness
    /// only once the socket actually accepts connections.
    pub fn bind(&self) -> Result<UnixListener, ProtocolError> {
        let _ = std::fs::remove_file(&self.config.socket_path);
        if let Some(parent) = self.config.socket_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let listener = UnixListener::bind(&self.config.socket_path)?;
        info!(socket = %self.config.socket_path.display(), "daemon listening");
        Ok(listener)
    }

    /// Serve an already-bound listener until auto-shutdown.
    pub async fn serve(self, listener: UnixListener) -> Result<(), ProtocolError> {
        let config = Arc::new(self.config);
        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, _addr) = accepted?;
                    let inner = Arc::clone(&self.inner);
                    let config = Arc::clone(&config);
                    tokio::spawn(async move {
                        handle_client(stream, inner, config).await;
                    });
                }
                _ = self.inner.shutdown.notified() => {
                    break;
                }
            }
        }

        let _ = std::fs::remove_file(&config.socket_path);
        info!("daemon shut down");
        Ok(())
    }

    /// Handle for the signal path and tests: cancels any running pipeline.
    /// Usable after `serve()` has consumed the server.
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Cancels the daemon's running pipeline, if any.
#[derive(Clone)]
pub struct CancelHandle {
    inner: Arc<Inner>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        request_cancel(&self.inner);
    }
}

async fn handle_client(stream: UnixStream, inner: Arc<Inner>, config: Arc<ServerConfig>) {
    use tokio::io::AsyncReadExt;

    let client_id = inner.next_client.fetch_add(1, Ordering::SeqCst);
    debug!(client_id, "client connected");

    let (mut reader, mut writer) = stream.into_split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Response>();

    let writer_task = tokio::spawn(async move {
        while let Some(response) = rx.recv().await {
            if write_line(&mut writer, &response).await.is_err() {
                break;
            }
        }
    });

    let mut decoder = LineDecoder::new();
    let mut chunk = [0u8; 8192];
    loop {
        let read = match reader.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => n,
        };
        for request in decoder.push::<Request>(&chunk[..read]) {
            handle_request(request, client_id, &tx, &inner, &config);
        }
    }

    inner.unsubscribe(client_id);
    drop(tx);
    let _ = writer_task.await;
    debug!(client_id, "client disconnected");
    inner.maybe_shutdown();
}

fn handle_request(
    request: Request,
    client_id: u64,
    tx: &mpsc::UnboundedSender<Response>,
    inner: &Arc<Inner>,
    config: &Arc<ServerConfig>,
) {
    match request {
        Request::Run { pipeline, options } => {
            let mut run_state = inner.run_state.lock();
            if !matches!(*run_state, RunState::Idle) {
                let _ = tx.send(Response::Error {
                    code: "ALREADY_RUNNING".to_string(),
                    message: "a pipeline is already running in this daemon".to_string(),
                });
                return;
            }

            let (cancel_tx, cancel_rx) = watch::channel(false);
            *run_state = RunState::Running {
                cancel: cancel_tx,
            };
            drop(run_state);

            let job_id = new_run_id();
            let _ = tx.send(Response::Ack {
                job_id: job_id.clone(),
            });
            info!(%job_id, steps = pipeline.len(), "starting pipeline run");

            tokio::spawn(run_pipeline(
                pipeline,
                options,
                cancel_rx,
                Arc::clone(inner),
                Arc::clone(config),
            ));
        }
        Request::Status => {
            let _ = tx.send(Response::State {
                state: inner.aggregator.snapshot(),
            });
        }
        Request::Subscribe { logs } => {
            inner.subscribe(client_id, tx.clone(), logs);
        }
        Request::Cancel => {
            if request_cancel(inner) {
                let _ = tx.send(Response::Ack {
                    job_id: "cancel".to_string(),
                });
            } else {
                let _ = tx.send(Response::Error {
                    code: "NO_RUN".to_string(),
                    message: "no pipeline is running".to_string(),
                });
            }
        }
    }
}

fn request_cancel(inner: &Arc<Inner>) -> bool {
    let run_state = inner.run_state.lock();
    match &*run_state {
        RunState::Running { cancel } => {
            inner.canceled.store(true, Ordering::SeqCst);
            let _ = cancel.send(true);
            true
        }
        _ => false,
    }
}

async fn run_pipeline(
    pipeline: Vec<Step>,
    options: RunOptions,
    cancel: watch::Receiver<bool>,
    inner: Arc<Inner>,
    config: Arc<ServerConfig>,
) {
    let (reporter, mut events) = Reporter::new();

    let consumer = {
        let inner = Arc::clone(&inner);
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                inner.broadcast(&event);
            }
        })
    };

    let options = RunOptions {
        socket_path: Some(config.socket_path.clone()),
        ..options
    };
    let runner = PipelineRunner::new(
        config.workspaces_root.clone(),
        config.project_root.clone(),
        Arc::clone(&config.runtime),
        reporter,
    );

    let success = match runner.run(&pipeline, options, cancel).await {
        Ok(success) => success,
        Err(e) => {
            warn!(error = %e, "pipeline run failed to start");
            inner.broadcast_response(Response::Error {
                code: e.code().to_string(),
                message: e.to_string(),
            });
            false
        }
    };

    // Drop the runner (and with it the last Reporter clone) so the consumer
    // sees end-of-stream and drains fully before Done goes out.
    drop(runner);
    let _ = consumer.await;

    *inner.run_state.lock() = RunState::Finished;
    inner.broadcast_response(Response::Done { success });
    inner.maybe_shutdown();
}

#[cfg(test)]
#[path = "server_tests.rs"]
mod tests;
