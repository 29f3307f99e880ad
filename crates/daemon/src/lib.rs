// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! kiln daemon (kilnd)
//!
//! Detached pipeline execution: a forked child listens on a local socket,
//! speaks newline-delimited JSON, and broadcasts pipeline events to every
//! subscribed client.

pub mod protocol;
pub mod server;
pub mod wire;

pub use protocol::{Handshake, Ready, Request, Response};
pub use server::{CancelHandle, DaemonServer, ServerConfig};
pub use wire::{LineDecoder, ProtocolError};
