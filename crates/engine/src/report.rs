// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event reporting and aggregation.
//!
//! The [`Reporter`] is a cloneable handle step runners emit into without
//! blocking; the single consumer on the other end of the channel fans
//! events out to whatever sinks the session has (terminal printer, daemon
//! broadcast, aggregator). The [`Aggregator`] folds events into a
//! [`SessionState`] snapshot for late subscribers.

use kiln_core::{PipelineEvent, SessionState};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Cloneable, non-blocking event emitter.
#[derive(Clone)]
pub struct Reporter {
    tx: mpsc::UnboundedSender<PipelineEvent>,
}

impl Reporter {
    /// Create a reporter and the stream its events arrive on.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<PipelineEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// A reporter whose events go nowhere (for ephemeral helpers and tests).
    pub fn discard() -> Self {
        let (tx, _rx) = mpsc::unbounded_channel();
        Self { tx }
    }

    /// Emit one event. Never blocks; a closed consumer drops the event.
    pub fn emit(&self, event: PipelineEvent) {
        let _ = self.tx.send(event);
    }
}

/// Shared session snapshot built from the event stream.
#[derive(Clone, Default)]
pub struct Aggregator {
    state: Arc<Mutex<SessionState>>,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one event into the snapshot.
    pub fn apply(&self, event: &PipelineEvent) {
        self.state.lock().apply(event);
    }

    /// Current snapshot, cloned for serialization.
    pub fn snapshot(&self) -> SessionState {
        self.state.lock().clone()
    }
}

#[cfg(test)]
#[path = "report_tests.rs"]
mod tests;
