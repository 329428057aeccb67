// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scriptable in-memory backend for orchestrator and integration tests.

use crate::exit::{ExitCallback, ExitHub, ExitSubscription};
use crate::{ExecutionBackend, ProcessStatus};
use async_trait::async_trait;
use garcon_core::{Error, Result, ServerConfig, Template};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// One recorded call, for assertions on call order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendCall {
    Start(String),
    Stop(String),
    Remove(String),
    Reconcile,
}

#[derive(Default)]
struct FakeState {
    /// server_id → running
    instances: HashMap<String, bool>,
    calls: Vec<BackendCall>,
    /// Operations scripted to fail: "start", "stop", "remove".
    failing: HashSet<String>,
}

/// In-memory [`ExecutionBackend`] with scriptable failures and exits.
#[derive(Clone, Default)]
pub struct FakeBackend {
    state: Arc<Mutex<FakeState>>,
    hub: ExitHub,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the named operation to fail until cleared.
    pub fn fail_on(&self, op: &str) {
        self.state.lock().failing.insert(op.to_string());
    }

    pub fn clear_failures(&self) {
        self.state.lock().failing.clear();
    }

    /// Simulate an unexpected exit: the artefact stays behind (a crashed
    /// container is retained for inspection), but stops running.
    pub fn emit_exit(&self, server_id: &str, exit_code: Option<i64>) {
        if let Some(running) = self.state.lock().instances.get_mut(server_id) {
            *running = false;
        }
        self.hub.dispatch(server_id, exit_code);
    }

    /// Seed an artefact without going through `start`.
    pub fn seed_instance(&self, server_id: &str, running: bool) {
        self.state.lock().instances.insert(server_id.to_string(), running);
    }

    pub fn calls(&self) -> Vec<BackendCall> {
        self.state.lock().calls.clone()
    }

    fn check_fail(&self, op: &str) -> Result<()> {
        if self.state.lock().failing.contains(op) {
            return Err(Error::Docker(format!("scripted {op} failure")));
        }
        Ok(())
    }
}

#[async_trait]
impl ExecutionBackend for FakeBackend {
    async fn check_availability(&self) -> bool {
        true
    }

    async fn start_event_monitoring(&self) {}

    fn on_process_exit(&self, callback: ExitCallback) -> ExitSubscription {
        self.hub.subscribe(callback)
    }

    async fn get_process_status(&self, server_id: &str) -> Result<ProcessStatus> {
        let state = self.state.lock();
        Ok(match state.instances.get(server_id) {
            Some(&running) => ProcessStatus {
                exists: true,
                running,
                native_id: Some(format!("fake-{server_id}")),
            },
            None => ProcessStatus::default(),
        })
    }

    async fn start(
        &self,
        config: &ServerConfig,
        _template: &Template,
        _data_path: &Path,
    ) -> Result<String> {
        let server_id = config.id.to_string();
        self.check_fail("start")?;
        let mut state = self.state.lock();
        if state.instances.get(&server_id) == Some(&true) {
            return Err(Error::Conflict(format!("server {server_id} is already running")));
        }
        state.instances.insert(server_id.clone(), true);
        state.calls.push(BackendCall::Start(server_id.clone()));
        Ok(format!("fake-{server_id}"))
    }

    async fn stop(
        &self,
        server_id: &str,
        _template: &Template,
        _timeout: Option<Duration>,
    ) -> Result<()> {
        self.check_fail("stop")?;
        let mut state = self.state.lock();
        state.instances.remove(server_id);
        state.calls.push(BackendCall::Stop(server_id.to_string()));
        Ok(())
    }

    async fn remove(&self, server_id: &str) -> Result<()> {
        self.check_fail("remove")?;
        let mut state = self.state.lock();
        state.instances.remove(server_id);
        state.calls.push(BackendCall::Remove(server_id.to_string()));
        Ok(())
    }

    async fn reconcile(&self) -> Result<()> {
        self.state.lock().calls.push(BackendCall::Reconcile);
        Ok(())
    }
}
