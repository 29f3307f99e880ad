// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-process cache locks for the setup phase.
//!
//! Caches are written only during setup, under an exclusive per-name lock;
//! the run phase mounts them shared without locking. Acquisition sorts the
//! requested names so two steps locking overlapping cache sets can never
//! deadlock, and tokio's fair mutex gives FIFO ordering per name.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Lock table keyed by cache name.
#[derive(Default)]
pub struct CacheLocks {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl CacheLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire exclusive locks on the named caches.
    ///
    /// Names are deduplicated and locked in lexicographic order. The
    /// returned guard releases every name when dropped or on
    /// [`CacheGuard::release`].
    pub async fn acquire(&self, names: &[String]) -> CacheGuard {
        let mut sorted: Vec<String> = names.to_vec();
        sorted.sort();
        sorted.dedup();

        let mut guards = Vec::with_capacity(sorted.len());
        for name in sorted {
            let lock = {
                let mut table = self.locks.lock();
                Arc::clone(table.entry(name).or_default())
            };
            guards.push(lock.lock_owned().await);
        }
        CacheGuard { guards }
    }
}

/// Held cache locks. Dropping releases all of them at once.
pub struct CacheGuard {
    guards: Vec<OwnedMutexGuard<()>>,
}

impl CacheGuard {
    /// Release all held locks. Idempotent.
    pub fn release(&mut self) {
        self.guards.clear();
    }
}

#[cfg(test)]
#[path = "cache_lock_tests.rs"]
mod tests;
