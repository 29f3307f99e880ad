// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::wire::write_line;
use kiln_adapters::FakeRuntime;
use kiln_core::session::PipelineStatus;
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::AsyncReadExt;
use tokio::net::UnixStream;
use tokio::task::JoinHandle;

struct TestDaemon {
    root: TempDir,
    socket_path: PathBuf,
    runtime: FakeRuntime,
    server: JoinHandle<Result<(), crate::wire::ProtocolError>>,
}

fn spawn_daemon() -> TestDaemon {
    let root = TempDir::new().unwrap();
    let socket_path = root.path().join("daemon.sock");
    let runtime = FakeRuntime::new();
    let server = DaemonServer::new(ServerConfig {
        socket_path: socket_path.clone(),
        workspaces_root: root.path().join("workspaces"),
        project_root: root.path().join("project"),
        runtime: Arc::new(runtime.clone()),
    });
    let listener = server.bind().unwrap();
    let handle = tokio::spawn(server.serve(listener));
    TestDaemon {
        root,
        socket_path,
        runtime,
        server: handle,
    }
}

async fn connect(daemon: &TestDaemon) -> UnixStream {
    for _ in 0..100 {
        if let Ok(stream) = UnixStream::connect(&daemon.socket_path).await {
            return stream;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("daemon socket never came up");
}

struct Client {
    stream: UnixStream,
    decoder: LineDecoder,
    pending: Vec<Response>,
}

impl Client {
    async fn new(daemon: &TestDaemon) -> Self {
        Self {
            stream: connect(daemon).await,
            decoder: LineDecoder::new(),
            pending: Vec::new(),
        }
    }

    async fn send(&mut self, request: &Request) {
        write_line(&mut self.stream, request).await.unwrap();
    }

    async fn next(&mut self) -> Response {
        loop {
            if !self.pending.is_empty() {
                return self.pending.remove(0);
            }
            let mut chunk = [0u8; 4096];
            let read = tokio::time::timeout(Duration::from_secs(5), self.stream.read(&mut chunk))
                .await
                .expect("timed out waiting for daemon response")
                .unwrap();
            assert!(read > 0, "daemon closed the connection");
            self.pending.extend(self.decoder.push::<Response>(&chunk[..read]));
        }
    }

    /// Read until a Done response, returning everything seen.
    async fn drain_until_done(&mut self) -> Vec<Response> {
        let mut responses = Vec::new();
        loop {
            let response = self.next().await;
            let done = matches!(response, Response::Done { .. });
            responses.push(response);
            if done {
                return responses;
            }
        }
    }
}

fn pipeline() -> Vec<Step> {
    vec![
        Step::new("a", "alpine:3", vec!["true".to_string()]),
        {
            let mut b = Step::new("b", "alpine:3", vec!["true".to_string()]);
            b.inputs.push(kiln_core::step::InputRef {
                alias: "a".to_string(),
                step: "a".to_string(),
                optional: false,
            });
            b
        },
    ]
}

#[tokio::test]
async fn run_with_subscriber_streams_events_to_done() {
    let daemon = spawn_daemon();
    let mut client = Client::new(&daemon).await;

    client.send(&Request::Subscribe { logs: true }).await;
    assert!(matches!(client.next().await, Response::State { .. }));

    client
        .send(&Request::Run {
            pipeline: pipeline(),
            options: RunOptions::default(),
        })
        .await;
    assert!(matches!(client.next().await, Response::Ack { .. }));

    let responses = client.drain_until_done().await;
    let events: Vec<&PipelineEvent> = responses
        .iter()
        .filter_map(|r| match r {
            Response::Event { event } => Some(event),
            _ => None,
        })
        .collect();

    assert!(matches!(events.first(), Some(PipelineEvent::PipelineStart { .. })));
    assert!(matches!(
        events.last(),
        Some(PipelineEvent::PipelineFinished { .. })
    ));
    assert!(matches!(
        responses.last(),
        Some(Response::Done { success: true })
    ));

    // With the run done and the last client gone, the daemon exits and
    // removes its socket.
    drop(client);
    tokio::time::timeout(Duration::from_secs(5), daemon.server)
        .await
        .expect("daemon did not auto-shutdown")
        .unwrap()
        .unwrap();
    assert!(!daemon.socket_path.exists());
    drop(daemon.root);
}

#[tokio::test]
async fn late_subscriber_gets_snapshot_then_buffered_events() {
    let daemon = spawn_daemon();

    let mut runner_client = Client::new(&daemon).await;
    runner_client
        .send(&Request::Run {
            pipeline: pipeline(),
            options: RunOptions::default(),
        })
        .await;
    assert!(matches!(runner_client.next().await, Response::Ack { .. }));

    // Give the run time to finish before subscribing late.
    tokio::time::sleep(Duration::from_millis(200)).await;

    let mut late = Client::new(&daemon).await;
    late.send(&Request::Subscribe { logs: false }).await;

    let snapshot = match late.next().await {
        Response::State { state } => state,
        other => panic!("expected snapshot first, got {other:?}"),
    };
    assert_eq!(snapshot.status, PipelineStatus::Finished);

    // Buffered events replay after the snapshot.
    let mut saw_start = false;
    loop {
        match late.next().await {
            Response::Event {
                event: PipelineEvent::PipelineStart { .. },
            } => saw_start = true,
            Response::Event {
                event: PipelineEvent::PipelineFinished { .. },
            } => break,
            Response::Event { .. } => {}
            other => panic!("unexpected response {other:?}"),
        }
    }
    assert!(saw_start);
}

#[tokio::test]
async fn socket_accepts_connections_as_soon_as_bind_returns() {
    // bind() happens synchronously in spawn_daemon, before serve() is even
    // polled; a single connect attempt with no retry must succeed. This is
    // what lets kilnd reply `ready` only after the socket exists.
    let daemon = spawn_daemon();
    UnixStream::connect(&daemon.socket_path).await.unwrap();
}

#[tokio::test]
async fn status_returns_snapshot_without_subscribing() {
    let daemon = spawn_daemon();
    let mut client = Client::new(&daemon).await;

    client.send(&Request::Status).await;
    let snapshot = match client.next().await {
        Response::State { state } => state,
        other => panic!("expected state, got {other:?}"),
    };
    assert_eq!(snapshot.status, PipelineStatus::Idle);
}

#[tokio::test]
async fn second_run_while_running_is_rejected() {
    let daemon = spawn_daemon();
    let mut client = Client::new(&daemon).await;

    let request = Request::Run {
        pipeline: vec![Step::new("only", "alpine:3", vec!["true".to_string()])],
        options: RunOptions::default(),
    };

    client.send(&request).await;
    assert!(matches!(client.next().await, Response::Ack { .. }));
    client.send(&request).await;

    // Rejected whether the first run is still in flight or already
    // finished: a daemon hosts one job per lifetime.
    match client.next().await {
        Response::Error { code, .. } => assert_eq!(code, "ALREADY_RUNNING"),
        other => panic!("expected error, got {other:?}"),
    }
}

#[tokio::test]
async fn cancel_without_a_run_is_an_error() {
    let daemon = spawn_daemon();
    let mut client = Client::new(&daemon).await;

    client.send(&Request::Cancel).await;
    match client.next().await {
        Response::Error { code, .. } => assert_eq!(code, "NO_RUN"),
        other => panic!("expected error, got {other:?}"),
    }
}

#[tokio::test]
async fn subscriber_without_logs_does_not_receive_log_events() {
    let daemon = spawn_daemon();
    daemon.runtime.script(
        "kiln-default-noisy",
        kiln_adapters::FakeResult::success()
            .with_log(kiln_core::LogStream::Stdout, "chatter"),
    );
    let mut client = Client::new(&daemon).await;

    client.send(&Request::Subscribe { logs: false }).await;
    assert!(matches!(client.next().await, Response::State { .. }));

    let noisy = Step::new("noisy", "alpine:3", vec!["true".to_string()]);
    client
        .send(&Request::Run {
            pipeline: vec![noisy],
            options: RunOptions::default(),
        })
        .await;
    assert!(matches!(client.next().await, Response::Ack { .. }));

    let responses = client.drain_until_done().await;
    assert!(responses.iter().all(|response| !matches!(
        response,
        Response::Event {
            event: PipelineEvent::StepLog { .. }
        }
    )));
}
