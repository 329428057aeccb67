// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! garcon-backend: execution providers
//!
//! One contract, two backends: containers via the Docker daemon and native
//! OS processes for games that cannot be containerised. Both report crashes
//! through the shared [`ExitHub`] fan-out; the orchestrator subscribes once
//! and receives `(server_id, exit_code)` regardless of backend.

pub mod docker;
pub mod exit;
pub mod native;
pub mod rcon;

#[cfg(any(test, feature = "test-support"))]
pub mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeBackend;

pub use docker::DockerBackend;
pub use exit::{ExitCallback, ExitHub, ExitSubscription};
pub use native::{NativeBackend, ProcessProbe, SystemProbe};

use async_trait::async_trait;
use garcon_core::{Result, ServerConfig, Template};
use std::path::Path;
use std::time::Duration;

/// Point-in-time status of a backend artefact.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessStatus {
    /// An artefact (container or pid record) exists for this server.
    pub exists: bool,
    /// The artefact is currently alive.
    pub running: bool,
    /// Backend-native identifier (container id / OS pid).
    pub native_id: Option<String>,
}

/// Contract implemented by both execution backends.
#[async_trait]
pub trait ExecutionBackend: Send + Sync + 'static {
    /// Whether this provider can operate on this host.
    async fn check_availability(&self) -> bool;

    /// Begin asynchronous delivery of exit notifications. May be a no-op for
    /// providers that observe exits purely by polling.
    async fn start_event_monitoring(&self);

    /// Register an exit callback. The returned subscription deregisters on
    /// drop; multiple callbacks may be registered.
    fn on_process_exit(&self, callback: ExitCallback) -> ExitSubscription;

    /// Point-in-time status for one server.
    async fn get_process_status(&self, server_id: &str) -> Result<ProcessStatus>;

    /// Create whatever artefact is needed and start it. Returns a
    /// backend-specific identifier. Fails with *conflict* when an instance is
    /// tracked and alive.
    async fn start(
        &self,
        config: &ServerConfig,
        template: &Template,
        data_path: &Path,
    ) -> Result<String>;

    /// Graceful stop with the template's timeout, force-killing on expiry.
    /// Idempotent if already stopped.
    async fn stop(
        &self,
        server_id: &str,
        template: &Template,
        timeout: Option<Duration>,
    ) -> Result<()>;

    /// Free backend resources (delete container / forget pid record);
    /// idempotent.
    async fn remove(&self, server_id: &str) -> Result<()>;

    /// At startup, reconcile in-memory tracking with ground truth.
    async fn reconcile(&self) -> Result<()>;
}
