// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! garcond: the Garcon control-plane daemon
//!
//! Composition root: wires file store → template registry → execution
//! backends → backup engine → orchestrator → event bus → scheduler, then
//! serves the HTTP + push facade until ctrl-c.

mod env;
mod http;
mod ws;

use garcon_backend::{DockerBackend, ExecutionBackend, NativeBackend};
use garcon_backup::BackupEngine;
use garcon_core::{Error, Result, SystemClock};
use garcon_engine::{EventBus, MaintenanceScheduler, Orchestrator, OrchestratorConfig};
use garcon_store::{fs as store, TemplateRegistry};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

fn init_tracing(settings: &env::Settings) {
    use tracing_subscriber::EnvFilter;
    let filter = EnvFilter::try_new(settings.log_level.as_deref().unwrap_or("info"))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if settings.log_pretty {
        builder.pretty().init();
    } else {
        builder.compact().init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let settings = env::Settings::from_env();
    init_tracing(&settings);
    info!(data_dir = %settings.data_dir.display(), "garcond starting");

    for dir in [
        settings.data_dir.clone(),
        settings.config_dir(),
        settings.templates_dir(),
        settings.servers_dir(),
        settings.backups_dir(),
        settings.logs_dir(),
    ] {
        store::ensure_dir(&dir).await?;
    }

    let templates = TemplateRegistry::load(&settings.templates_dir()).await?;

    let cancel = CancellationToken::new();
    let container = DockerBackend::connect(settings.docker_host.as_deref(), cancel.clone())?;
    if !container.check_availability().await {
        warn!("container daemon unreachable; containers will fail until it returns");
    }
    let native = NativeBackend::new(
        settings.native_records_path(),
        settings.logs_dir(),
        cancel.clone(),
    );

    let clock = SystemClock;
    let bus = EventBus::new();
    let backups = BackupEngine::new(
        settings.servers_dir(),
        settings.backups_dir(),
        settings.max_backups_per_type,
        clock.clone(),
    );

    let orchestrator = Orchestrator::new(
        OrchestratorConfig {
            servers_dir: settings.servers_dir(),
            host_servers_dir: settings.host_servers_dir(),
            auto_backup_on_stop: settings.auto_backup_on_stop,
        },
        templates.clone(),
        Arc::new(container),
        Arc::new(native),
        backups,
        bus.clone(),
        clock.clone(),
    );
    orchestrator.reconcile().await?;

    let scheduler = MaintenanceScheduler::start(Arc::clone(&orchestrator), clock);

    let state = http::AppState {
        orchestrator,
        templates,
        bus,
        settings: Arc::new(settings.clone()),
    };
    let app = http::router(state);

    let addr = format!("{}:{}", settings.host, settings.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| Error::Internal(format!("bind {addr}: {e}")))?;
    info!(%addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| Error::Internal(format!("server: {e}")))?;

    info!("shutting down");
    scheduler.shutdown();
    cancel.cancel();
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "ctrl-c handler failed, running until killed");
        std::future::pending::<()>().await;
    }
}
