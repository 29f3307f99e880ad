// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire format encoding/decoding for the IPC protocol.
//!
//! Wire format: one JSON object per line, newline-terminated. Chosen for
//! diagnosability (`socat` + eyeballs) and tolerance to partial reads:
//! decoders buffer across chunks and skip malformed lines instead of
//! closing the connection.

use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;
use tracing::warn;

/// Protocol errors
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("line too long: {size} bytes (max {max})")]
    LineTooLong { size: usize, max: usize },

    #[error("connection closed")]
    ConnectionClosed,
}

/// Maximum line size (16 MB). A line this long is a bug, not a message.
pub const MAX_LINE_SIZE: usize = 16 * 1024 * 1024;

/// Encode a message as one newline-terminated JSON line.
pub fn encode_line<T: Serialize>(msg: &T) -> Result<Vec<u8>, ProtocolError> {
    let mut line = serde_json::to_vec(msg)?;
    if line.len() > MAX_LINE_SIZE {
        return Err(ProtocolError::LineTooLong {
            size: line.len(),
            max: MAX_LINE_SIZE,
        });
    }
    line.push(b'\n');
    Ok(line)
}

/// Streaming decoder that buffers partial lines across socket reads.
///
/// Malformed lines are skipped with a warning; the connection stays up.
#[derive(Debug, Default)]
pub struct LineDecoder {
    buf: Vec<u8>,
}

impl LineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk and decode every complete line it finishes.
    pub fn push<T: DeserializeOwned>(&mut self, chunk: &[u8]) -> Vec<T> {
        self.buf.extend_from_slice(chunk);

        let mut decoded = Vec::new();
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            let line = &line[..line.len() - 1];
            if line.is_empty() {
                continue;
            }
            match serde_json::from_slice(line) {
                Ok(msg) => decoded.push(msg),
                Err(e) => {
                    warn!(error = %e, "skipping malformed protocol line");
                }
            }
        }

        // Runaway unterminated line: drop it rather than grow forever.
        if self.buf.len() > MAX_LINE_SIZE {
            warn!(size = self.buf.len(), "dropping oversized protocol line");
            self.buf.clear();
        }

        decoded
    }
}

/// Write one message as a line to an async writer.
pub async fn write_line<W, T>(writer: &mut W, msg: &T) -> Result<(), ProtocolError>
where
    W: tokio::io::AsyncWriteExt + Unpin,
    T: Serialize,
{
    let line = encode_line(msg)?;
    writer.write_all(&line).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
#[path = "wire_tests.rs"]
mod tests;
