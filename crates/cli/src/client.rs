// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Client for the kilnd socket protocol.

use kiln_daemon::{wire, LineDecoder, Request, Response};
use std::path::Path;
use thiserror::Error;
use tokio::io::AsyncReadExt;
use tokio::net::UnixStream;

/// Client-side errors talking to the daemon.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("failed to connect to daemon socket {path}: {source}")]
    Connect {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("daemon connection closed unexpectedly")]
    Closed,

    #[error("protocol error: {0}")]
    Protocol(#[from] kiln_daemon::ProtocolError),

    #[error("failed to start daemon: {0}")]
    DaemonStartFailed(String),
}

/// Connection to a running daemon.
#[derive(Debug)]
pub struct DaemonClient {
    stream: UnixStream,
    decoder: LineDecoder,
    pending: Vec<Response>,
}

impl DaemonClient {
    /// Connect to the daemon socket.
    pub async fn connect(socket_path: &Path) -> Result<Self, ClientError> {
        let stream = UnixStream::connect(socket_path)
            .await
            .map_err(|source| ClientError::Connect {
                path: socket_path.display().to_string(),
                source,
            })?;
        Ok(Self {
            stream,
            decoder: LineDecoder::new(),
            pending: Vec::new(),
        })
    }

    /// Send one request.
    pub async fn send(&mut self, request: &Request) -> Result<(), ClientError> {
        wire::write_line(&mut self.stream, request).await?;
        Ok(())
    }

    /// Receive the next response, buffering across partial reads.
    pub async fn recv(&mut self) -> Result<Response, ClientError> {
        loop {
            if !self.pending.is_empty() {
                return Ok(self.pending.remove(0));
            }
            let mut chunk = [0u8; 8192];
            let read = self
                .stream
                .read(&mut chunk)
                .await
                .map_err(kiln_daemon::ProtocolError::Io)?;
            if read == 0 {
                return Err(ClientError::Closed);
            }
            self.pending
                .extend(self.decoder.push::<Response>(&chunk[..read]));
        }
    }
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;
