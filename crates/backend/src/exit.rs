// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Exit-notification fan-out
//!
//! Small registry of exit callbacks shared by every backend instance that
//! feeds it. Subscriptions deregister on drop, so a torn-down orchestrator
//! cannot receive callbacks into freed state.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

/// Callback invoked with `(server_id, exit_code)` when an instance dies.
pub type ExitCallback = Arc<dyn Fn(&str, Option<i64>) + Send + Sync>;

type Registry = Mutex<HashMap<u64, ExitCallback>>;

/// Fan-out registry for exit notifications.
#[derive(Clone, Default)]
pub struct ExitHub {
    callbacks: Arc<Registry>,
    next_id: Arc<AtomicU64>,
}

impl ExitHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback; the subscription removes it again on drop.
    pub fn subscribe(&self, callback: ExitCallback) -> ExitSubscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.callbacks.lock().insert(id, callback);
        ExitSubscription { registry: Arc::downgrade(&self.callbacks), id }
    }

    /// Invoke every registered callback.
    pub fn dispatch(&self, server_id: &str, exit_code: Option<i64>) {
        // Snapshot under the lock, call outside it: callbacks may re-enter.
        let snapshot: Vec<ExitCallback> = self.callbacks.lock().values().cloned().collect();
        for callback in snapshot {
            callback(server_id, exit_code);
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.callbacks.lock().len()
    }
}

/// Deregistration handle for one exit callback.
pub struct ExitSubscription {
    registry: Weak<Registry>,
    id: u64,
}

impl Drop for ExitSubscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.lock().remove(&self.id);
        }
    }
}

#[cfg(test)]
#[path = "exit_tests.rs"]
mod tests;
