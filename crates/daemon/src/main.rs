// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! kiln daemon (kilnd)
//!
//! Background process for detached pipeline runs.
//!
//! Startup handshake: the parent writes one JSON line with the workspace
//! root to stdin; kilnd binds the socket, replies `{"type":"ready",...}` on
//! stdout, then runs independently of the parent.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

use kiln_daemon::{DaemonServer, Handshake, Ready, ServerConfig};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    if let Some(arg) = std::env::args().nth(1) {
        match arg.as_str() {
            "--version" | "-V" | "-v" => {
                println!("kilnd {}", env!("CARGO_PKG_VERSION"));
                return Ok(());
            }
            "--help" | "-h" | "help" => {
                println!("kilnd {}", env!("CARGO_PKG_VERSION"));
                println!("kiln daemon - detached pipeline execution");
                println!();
                println!("USAGE:");
                println!("    kilnd");
                println!();
                println!("The daemon is started by `kiln run --detach` and should not");
                println!("be invoked directly. It reads a handshake on stdin and then");
                println!("listens on a Unix socket for commands from `kiln`.");
                return Ok(());
            }
            _ => {
                eprintln!("error: unexpected argument '{arg}'");
                eprintln!("Usage: kilnd [--help | --version]");
                std::process::exit(1);
            }
        }
    }

    // Handshake: one JSON line on stdin tells us where to work.
    let mut stdin = BufReader::new(tokio::io::stdin());
    let mut line = String::new();
    stdin.read_line(&mut line).await?;
    let handshake: Handshake = serde_json::from_str(line.trim())?;

    let workspace = handshake
        .options
        .as_ref()
        .map(|options| options.workspace.clone())
        .unwrap_or_else(|| "default".to_string());
    let socket_path = handshake
        .workspace_root
        .join(&workspace)
        .join("daemon.sock");
    let project_root = handshake
        .cwd
        .clone()
        .unwrap_or_else(|| PathBuf::from("."));

    let _log_guard = setup_logging(&handshake.workspace_root)?;
    info!(pid = std::process::id(), "kilnd starting");

    let server = DaemonServer::new(ServerConfig {
        socket_path: socket_path.clone(),
        workspaces_root: handshake.workspace_root.clone(),
        project_root,
        runtime: Arc::new(kiln_adapters::DockerRuntime::new()),
    });

    // Bind before reporting ready: the parent connects the moment it reads
    // the reply, so the socket must already accept connections.
    let listener = server.bind()?;

    let mut stdout = tokio::io::stdout();
    let ready = serde_json::to_vec(&Ready::Ready {
        socket_path: socket_path.clone(),
    })?;
    stdout.write_all(&ready).await?;
    stdout.write_all(b"\n").await?;
    stdout.flush().await?;
    drop(stdout);
    drop(stdin);

    let canceler = server.cancel_handle();
    let signals = tokio::spawn(async move {
        let mut sigint = match signal(SignalKind::interrupt()) {
            Ok(s) => s,
            Err(_) => return,
        };
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(s) => s,
            Err(_) => return,
        };
        tokio::select! {
            _ = sigint.recv() => {}
            _ = sigterm.recv() => {}
        }
        info!("signal received, canceling run");
        canceler.cancel();
    });

    let result = server.serve(listener).await;
    signals.abort();

    if let Err(e) = result {
        error!(error = %e, "daemon exited with error");
        return Err(e.into());
    }
    Ok(())
}

fn setup_logging(
    workspace_root: &std::path::Path,
) -> Result<tracing_appender::non_blocking::WorkerGuard, Box<dyn std::error::Error>> {
    std::fs::create_dir_all(workspace_root)?;
    let appender = tracing_appender::rolling::never(workspace_root, "daemon.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(writer)
        .with_ansi(false)
        .init();
    Ok(guard)
}
