// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bounded execution of short docker CLI invocations.
//!
//! `docker run`/`start --attach` are supervised with streaming in the
//! docker adapter itself; this helper covers the quick one-shot commands
//! around them (version, ps, create, cp, kill, rm), none of which should
//! ever hang a pipeline.

use std::process::Output;
use std::time::Duration;
use tokio::process::Command;

/// Default timeout for docker query commands (ps, version, rm).
pub const DOCKER_QUERY_TIMEOUT: Duration = Duration::from_secs(30);

/// Default timeout for docker cp of source trees.
pub const DOCKER_CP_TIMEOUT: Duration = Duration::from_secs(120);

/// Run one docker CLI invocation to completion with a deadline.
///
/// On expiry the error names `description` and the elapsed budget; the
/// child is reaped by tokio's `Child` drop. A timed-out `docker cp` leaves
/// a half-populated container behind, so the docker adapter removes the
/// container whenever a copy fails.
pub async fn run_with_timeout(
    mut cmd: Command,
    timeout: Duration,
    description: &str,
) -> Result<Output, String> {
    let completion = tokio::time::timeout(timeout, cmd.output()).await;
    match completion {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(io_err)) => Err(format!("{description} failed: {io_err}")),
        Err(_elapsed) => Err(format!(
            "{description} timed out after {}s",
            timeout.as_secs()
        )),
    }
}

#[cfg(test)]
#[path = "subprocess_tests.rs"]
mod tests;
