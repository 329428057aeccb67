// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Server orchestrator
//!
//! Owns the per-server state machine. Transitions for one server are
//! serialized by a per-server lock held for the whole transition including
//! the sidecar write; operations on distinct servers run concurrently. Every
//! status transition publishes exactly one event, after the persistent side
//! effect has succeeded.

use crate::bus::EventBus;
use garcon_backend::{ExecutionBackend, ExitSubscription};
use garcon_backup::{BackupEngine, BackupType, RestoreOutcome};
use garcon_core::server::SIDECAR_FILENAME;
use garcon_core::template::ExecutionMode;
use garcon_core::{
    format_millis, parse_memory_limit, Clock, Error, PortMapping, PushMessage, Result,
    ServerConfig, ServerId, ServerState, ServerStatus, ServerView, Template, UpdateAction,
    UpdateStage,
};
use garcon_store::fs as store;
use garcon_store::TemplateRegistry;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// Import request body (`POST /servers`).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportRequest {
    pub name: String,
    pub template_id: String,
    pub source_path: String,
    /// Omitted ports map each template default to `host == container`.
    #[serde(default)]
    pub ports: Option<Vec<PortMapping>>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default)]
    pub memory_limit: Option<String>,
    #[serde(default)]
    pub cpu_limit: Option<f64>,
    #[serde(default)]
    pub maintenance_restart: bool,
}

/// Partial update body (`PATCH /servers/{id}`).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub ports: Option<Vec<PortMapping>>,
    #[serde(default)]
    pub env: Option<HashMap<String, String>>,
    #[serde(default)]
    pub memory_limit: Option<Option<String>>,
    #[serde(default)]
    pub cpu_limit: Option<Option<f64>>,
    #[serde(default)]
    pub maintenance_restart: Option<bool>,
}

/// Response of `initiate-update`: where to drop the new files and where the
/// safety backup went.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateInitiated {
    pub server_id: ServerId,
    pub source_path: String,
    pub backup_timestamp: String,
    pub backup_path: String,
}

/// Paths and flags the orchestrator operates under.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Managed server directories, as this process sees them.
    pub servers_dir: PathBuf,
    /// The same directories as the container daemon sees them, used verbatim
    /// in bind-mount specifications.
    pub host_servers_dir: PathBuf,
    /// Take an `auto` backup as part of every stop.
    pub auto_backup_on_stop: bool,
}

struct ServerEntry {
    config: RwLock<ServerConfig>,
    state: Mutex<ServerState>,
    /// Serializes transitions; held for the whole operation including the
    /// sidecar write.
    transition: tokio::sync::Mutex<()>,
}

impl ServerEntry {
    fn new(config: ServerConfig, state: ServerState) -> Arc<Self> {
        Arc::new(Self {
            config: RwLock::new(config),
            state: Mutex::new(state),
            transition: tokio::sync::Mutex::new(()),
        })
    }
}

/// The server lifecycle orchestrator.
pub struct Orchestrator<C: Clock> {
    cfg: OrchestratorConfig,
    templates: TemplateRegistry,
    container: Arc<dyn ExecutionBackend>,
    native: Arc<dyn ExecutionBackend>,
    backups: BackupEngine<C>,
    bus: EventBus,
    clock: C,
    servers: Mutex<HashMap<String, Arc<ServerEntry>>>,
    exit_subscriptions: Mutex<Vec<ExitSubscription>>,
}

impl<C: Clock> Orchestrator<C> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        cfg: OrchestratorConfig,
        templates: TemplateRegistry,
        container: Arc<dyn ExecutionBackend>,
        native: Arc<dyn ExecutionBackend>,
        backups: BackupEngine<C>,
        bus: EventBus,
        clock: C,
    ) -> Arc<Self> {
        Arc::new(Self {
            cfg,
            templates,
            container,
            native,
            backups,
            bus,
            clock,
            servers: Mutex::new(HashMap::new()),
            exit_subscriptions: Mutex::new(Vec::new()),
        })
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn backups(&self) -> &BackupEngine<C> {
        &self.backups
    }

    // ------------------------------------------------------------------
    // Lookup helpers
    // ------------------------------------------------------------------

    fn entry(&self, server_id: &str) -> Result<Arc<ServerEntry>> {
        self.servers
            .lock()
            .get(server_id)
            .cloned()
            .ok_or_else(|| Error::not_found("server", server_id))
    }

    fn data_dir(&self, server_id: &str) -> PathBuf {
        self.cfg.servers_dir.join(server_id)
    }

    fn sidecar_path(&self, server_id: &str) -> PathBuf {
        self.data_dir(server_id).join(SIDECAR_FILENAME)
    }

    /// Backend and start-path for a template: containers mount the
    /// host-visible path, native processes run in the daemon-visible one.
    fn backend_for(&self, template: &Template, server_id: &str) -> (Arc<dyn ExecutionBackend>, PathBuf) {
        match template.mode {
            ExecutionMode::Container => {
                (Arc::clone(&self.container), self.cfg.host_servers_dir.join(server_id))
            }
            ExecutionMode::Native => (Arc::clone(&self.native), self.data_dir(server_id)),
        }
    }

    async fn persist_config(&self, config: &ServerConfig) -> Result<()> {
        store::write_yaml(&self.sidecar_path(config.id.as_str()), config).await
    }

    /// Snapshot the config outside the lock, then write the sidecar.
    async fn persist_entry(&self, entry: &ServerEntry) -> Result<()> {
        let config = entry.config.read().clone();
        self.persist_config(&config).await
    }

    fn publish_status(&self, entry: &ServerEntry) {
        let (server_id, status, started_at, update_stage) = {
            let config = entry.config.read();
            let state = entry.state.lock();
            (
                config.id.clone(),
                state.status,
                state.started_at.map(format_millis),
                state.update_stage,
            )
        };
        self.bus.publish(
            server_id.as_str(),
            &PushMessage::ServerStatus {
                server_id: server_id.clone(),
                status,
                started_at,
                update_stage: Some(update_stage),
            },
        );
    }

    fn publish_update(&self, server_id: &ServerId, action: UpdateAction) {
        self.bus.publish(
            server_id.as_str(),
            &PushMessage::ServerUpdate { server_id: server_id.clone(), action },
        );
    }

    fn set_status(&self, entry: &ServerEntry, status: ServerStatus) {
        entry.state.lock().status = status;
    }

    fn view_of(&self, entry: &ServerEntry) -> ServerView {
        let config = entry.config.read();
        let state = entry.state.lock();
        let template_name = self.templates.lookup(&config.template_id).map(|t| t.name.clone());
        ServerView::from_parts(&config, &state, template_name)
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// All servers, ordered by `sort_order` then name.
    pub fn list(&self) -> Vec<ServerView> {
        let entries: Vec<Arc<ServerEntry>> = self.servers.lock().values().cloned().collect();
        let mut views: Vec<ServerView> = entries.iter().map(|e| self.view_of(e)).collect();
        views.sort_by(|a, b| {
            let ka = (a.sort_order.unwrap_or(u32::MAX), a.name.clone());
            let kb = (b.sort_order.unwrap_or(u32::MAX), b.name.clone());
            ka.cmp(&kb)
        });
        views
    }

    pub fn get(&self, server_id: &str) -> Result<ServerView> {
        Ok(self.view_of(&*self.entry(server_id)?))
    }

    // ------------------------------------------------------------------
    // Import / delete
    // ------------------------------------------------------------------

    pub async fn import(&self, request: ImportRequest) -> Result<ServerView> {
        if request.name.trim().is_empty() {
            return Err(Error::Validation("server name is empty".into()));
        }
        let source = PathBuf::from(&request.source_path);
        if !store::is_dir(&source).await {
            return Err(Error::Validation(format!(
                "source path is not a directory: {}",
                request.source_path
            )));
        }
        let template = self.templates.get(&request.template_id)?;
        for required in &template.required_files {
            if !store::exists(&source.join(required)).await {
                return Err(Error::Validation(format!(
                    "required file missing from source: {required}"
                )));
            }
        }
        if let Some(limit) = &request.memory_limit {
            parse_memory_limit(limit)?;
        }

        // Fresh id; regenerate on the unlikely directory collision.
        let mut id = ServerId::generate(&request.name);
        for _ in 0..3 {
            if !store::exists(&self.data_dir(id.as_str())).await {
                break;
            }
            id = ServerId::generate(&request.name);
        }

        let data_dir = self.data_dir(id.as_str());
        store::copy_dir(&source, &data_dir).await?;

        let ports = request.ports.clone().unwrap_or_else(|| {
            template
                .ports
                .iter()
                .map(|p| PortMapping {
                    host_port: p.container_port,
                    container_port: p.container_port,
                    protocol: p.protocol,
                })
                .collect()
        });

        // Template defaults first, request values win.
        let mut env = template.container.as_ref().map(|c| c.env.clone()).unwrap_or_default();
        env.extend(request.env.clone());

        let now = self.clock.now();
        let config = ServerConfig {
            id: id.clone(),
            name: request.name.clone(),
            template_id: template.id.clone(),
            source_path: request.source_path.clone(),
            created_at: now,
            updated_at: now,
            ports,
            env,
            memory_limit: request.memory_limit.clone(),
            cpu_limit: request.cpu_limit,
            update_stage: UpdateStage::None,
            maintenance_restart: request.maintenance_restart,
            sort_order: None,
        };
        self.persist_config(&config).await?;

        let entry = ServerEntry::new(config, ServerState::new(UpdateStage::None));
        let view = self.view_of(&entry);
        self.servers.lock().insert(id.to_string(), entry);

        info!(server_id = %id, template = %template.id, "server imported");
        self.publish_update(&id, UpdateAction::Created);
        Ok(view)
    }

    /// Delete a server. Its backups are preserved.
    pub async fn delete(&self, server_id: &str) -> Result<()> {
        let entry = self.entry(server_id)?;
        let _guard = entry
            .transition
            .try_lock()
            .map_err(|_| Error::Conflict(format!("operation in flight for {server_id}")))?;

        let (id, template_id) = {
            let state = entry.state.lock();
            if !matches!(state.status, ServerStatus::Stopped | ServerStatus::Error) {
                return Err(Error::State(format!(
                    "cannot delete server in status {}",
                    state.status
                )));
            }
            if !state.update_stage.is_none() {
                return Err(Error::State("cannot delete during an update".into()));
            }
            let config = entry.config.read();
            (config.id.clone(), config.template_id.clone())
        };

        // Backend artefact first, then the files.
        if let Ok(template) = self.templates.get(&template_id) {
            let (backend, _) = self.backend_for(&template, server_id);
            backend.remove(server_id).await?;
        } else {
            // Template gone: try both backends, best effort.
            if let Err(e) = self.container.remove(server_id).await {
                warn!(%server_id, error = %e, "container remove during delete failed");
            }
            if let Err(e) = self.native.remove(server_id).await {
                warn!(%server_id, error = %e, "native remove during delete failed");
            }
        }

        store::remove_dir(&self.data_dir(server_id)).await?;
        self.servers.lock().remove(server_id);

        info!(%server_id, "server deleted");
        self.publish_update(&id, UpdateAction::Deleted);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Start / stop / restart
    // ------------------------------------------------------------------

    pub async fn start(&self, server_id: &str) -> Result<()> {
        let entry = self.entry(server_id)?;
        let _guard = entry
            .transition
            .try_lock()
            .map_err(|_| Error::Conflict(format!("operation in flight for {server_id}")))?;
        self.start_locked(server_id, &entry).await
    }

    async fn start_locked(&self, server_id: &str, entry: &ServerEntry) -> Result<()> {
        {
            let state = entry.state.lock();
            if state.status != ServerStatus::Stopped {
                return Err(Error::State(format!(
                    "cannot start server in status {}",
                    state.status
                )));
            }
            if !state.update_stage.is_none() {
                return Err(Error::State("cannot start during an update".into()));
            }
        }

        let (config, template) = {
            let config = entry.config.read().clone();
            let template = self.templates.get(&config.template_id)?;
            (config, template)
        };

        self.set_status(entry, ServerStatus::Starting);
        self.publish_status(entry);

        let (backend, data_path) = self.backend_for(&template, server_id);
        match backend.start(&config, &template, &data_path).await {
            Ok(backend_id) => {
                {
                    let mut state = entry.state.lock();
                    state.status = ServerStatus::Running;
                    state.started_at = Some(self.clock.now());
                }
                info!(%server_id, %backend_id, "server started");
                self.publish_status(entry);
                Ok(())
            }
            Err(e) => {
                warn!(%server_id, error = %e, "start failed");
                self.set_status(entry, ServerStatus::Error);
                self.publish_status(entry);
                Err(e)
            }
        }
    }

    pub async fn stop(&self, server_id: &str) -> Result<()> {
        let entry = self.entry(server_id)?;
        let _guard = entry
            .transition
            .try_lock()
            .map_err(|_| Error::Conflict(format!("operation in flight for {server_id}")))?;
        self.stop_locked(server_id, &entry).await
    }

    async fn stop_locked(&self, server_id: &str, entry: &ServerEntry) -> Result<()> {
        {
            let state = entry.state.lock();
            if state.status != ServerStatus::Running {
                return Err(Error::State(format!(
                    "cannot stop server in status {}",
                    state.status
                )));
            }
        }

        let template = {
            let config = entry.config.read();
            self.templates.get(&config.template_id)?
        };

        self.set_status(entry, ServerStatus::Stopping);
        self.publish_status(entry);

        if self.cfg.auto_backup_on_stop {
            // A failed auto backup aborts the stop.
            if let Err(e) = self.backups.create(server_id, BackupType::Auto, None).await {
                warn!(%server_id, error = %e, "auto backup failed, aborting stop");
                self.set_status(entry, ServerStatus::Error);
                self.publish_status(entry);
                return Err(e);
            }
        }

        let (backend, _) = self.backend_for(&template, server_id);
        match backend.stop(server_id, &template, None).await {
            Ok(()) => {
                {
                    let mut state = entry.state.lock();
                    state.status = ServerStatus::Stopped;
                    state.started_at = None;
                }
                info!(%server_id, "server stopped");
                self.publish_status(entry);
                Ok(())
            }
            Err(e) => {
                warn!(%server_id, error = %e, "stop failed");
                self.set_status(entry, ServerStatus::Error);
                self.publish_status(entry);
                Err(e)
            }
        }
    }

    pub async fn restart(&self, server_id: &str) -> Result<()> {
        let entry = self.entry(server_id)?;
        let _guard = entry
            .transition
            .try_lock()
            .map_err(|_| Error::Conflict(format!("operation in flight for {server_id}")))?;
        self.stop_locked(server_id, &entry).await?;
        self.start_locked(server_id, &entry).await
    }

    // ------------------------------------------------------------------
    // Crash handling
    // ------------------------------------------------------------------

    /// Backend exit callback. Serializes after any in-flight transition;
    /// exits observed while stopping, updating, or stopped are expected (or
    /// already reconciled) and ignored.
    pub async fn handle_exit(&self, server_id: &str, exit_code: Option<i64>) {
        let Ok(entry) = self.entry(server_id) else {
            return; // unknown or already deleted
        };
        let _guard = entry.transition.lock().await;

        let crashed = {
            let mut state = entry.state.lock();
            if state.status.is_live() {
                state.status = ServerStatus::Error;
                state.started_at = None;
                true
            } else {
                false
            }
        };
        if crashed {
            warn!(%server_id, ?exit_code, "unexpected exit, server marked errored");
            self.publish_status(&entry);
        }
    }

    /// Clear an `error` status. The retained backend artefact is removed.
    pub async fn acknowledge_crash(&self, server_id: &str) -> Result<()> {
        let entry = self.entry(server_id)?;
        let _guard = entry
            .transition
            .try_lock()
            .map_err(|_| Error::Conflict(format!("operation in flight for {server_id}")))?;

        {
            let state = entry.state.lock();
            if state.status != ServerStatus::Error {
                return Err(Error::State(format!(
                    "cannot acknowledge crash in status {}",
                    state.status
                )));
            }
        }

        let template_id = entry.config.read().template_id.clone();
        let template = self.templates.get(&template_id)?;
        let (backend, _) = self.backend_for(&template, server_id);
        backend.remove(server_id).await?;

        {
            let mut state = entry.state.lock();
            state.status = ServerStatus::Stopped;
            state.started_at = None;
        }
        info!(%server_id, "crash acknowledged");
        self.publish_status(&entry);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Update protocol
    // ------------------------------------------------------------------

    pub async fn initiate_update(&self, server_id: &str) -> Result<UpdateInitiated> {
        let entry = self.entry(server_id)?;
        let _guard = entry
            .transition
            .try_lock()
            .map_err(|_| Error::Conflict(format!("operation in flight for {server_id}")))?;

        {
            let state = entry.state.lock();
            if !state.update_stage.is_none() {
                return Err(Error::State("update already in progress".into()));
            }
            if !matches!(state.status, ServerStatus::Stopped | ServerStatus::Running) {
                return Err(Error::State(format!(
                    "cannot initiate update in status {}",
                    state.status
                )));
            }
        }

        if entry.state.lock().status == ServerStatus::Running {
            self.stop_locked(server_id, &entry).await?;
        }

        // Blocking: no backup, no update.
        let backup = self.backups.create(server_id, BackupType::PreUpdate, None).await?;

        let (id, source_path) = {
            let mut config = entry.config.write();
            config.update_stage = UpdateStage::Initiated;
            (config.id.clone(), config.source_path.clone())
        };
        self.persist_entry(&entry).await?;
        {
            let mut state = entry.state.lock();
            state.update_stage = UpdateStage::Initiated;
            state.pre_update_backup = Some(backup.timestamp.clone());
            state.status = ServerStatus::Updating;
        }
        info!(%server_id, backup = %backup.timestamp, "update initiated");
        self.publish_status(&entry);

        Ok(UpdateInitiated {
            server_id: id,
            source_path,
            backup_timestamp: backup.timestamp,
            backup_path: backup.path,
        })
    }

    pub async fn apply_update(&self, server_id: &str) -> Result<()> {
        let entry = self.entry(server_id)?;
        let _guard = entry
            .transition
            .try_lock()
            .map_err(|_| Error::Conflict(format!("operation in flight for {server_id}")))?;

        {
            let state = entry.state.lock();
            if state.update_stage != UpdateStage::Initiated {
                return Err(Error::State(format!(
                    "apply requires an initiated update, stage is {}",
                    state.update_stage
                )));
            }
        }

        {
            entry.config.write().update_stage = UpdateStage::Applying;
        }
        self.persist_entry(&entry).await?;
        {
            let mut state = entry.state.lock();
            state.update_stage = UpdateStage::Applying;
            state.status = ServerStatus::Updating;
        }
        self.publish_status(&entry);

        // Pure copy over the live tree: files removed in the new source
        // survive in the server directory.
        let source = PathBuf::from(entry.config.read().source_path.clone());
        let copied = store::copy_dir(&source, &self.data_dir(server_id)).await;

        match copied {
            Ok(()) => {
                let id = {
                    let mut config = entry.config.write();
                    config.update_stage = UpdateStage::None;
                    config.updated_at = self.clock.now();
                    config.id.clone()
                };
                self.persist_entry(&entry).await?;
                {
                    let mut state = entry.state.lock();
                    state.update_stage = UpdateStage::None;
                    state.pre_update_backup = None;
                    state.status = ServerStatus::Stopped;
                }
                info!(%server_id, "update applied");
                self.publish_status(&entry);
                self.publish_update(&id, UpdateAction::Updated);
                Ok(())
            }
            Err(e) => {
                warn!(%server_id, error = %e, "update apply failed");
                {
                    entry.config.write().update_stage = UpdateStage::Initiated;
                }
                if let Err(persist_err) =
                    self.persist_entry(&entry).await
                {
                    warn!(%server_id, error = %persist_err, "failed to roll back update stage");
                }
                {
                    let mut state = entry.state.lock();
                    state.update_stage = UpdateStage::Initiated;
                    state.status = ServerStatus::Error;
                }
                self.publish_status(&entry);
                Err(e)
            }
        }
    }

    /// Abandon an update. The pre-update backup is retained for a manual
    /// restore.
    pub async fn cancel_update(&self, server_id: &str) -> Result<()> {
        let entry = self.entry(server_id)?;
        let _guard = entry
            .transition
            .try_lock()
            .map_err(|_| Error::Conflict(format!("operation in flight for {server_id}")))?;

        {
            let state = entry.state.lock();
            if state.update_stage.is_none() {
                return Err(Error::State("no update in progress".into()));
            }
        }

        {
            entry.config.write().update_stage = UpdateStage::None;
        }
        self.persist_entry(&entry).await?;
        {
            let mut state = entry.state.lock();
            state.update_stage = UpdateStage::None;
            state.pre_update_backup = None;
            state.status = ServerStatus::Stopped;
        }
        info!(%server_id, "update cancelled");
        self.publish_status(&entry);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Restore
    // ------------------------------------------------------------------

    pub async fn restore(&self, server_id: &str, timestamp: &str) -> Result<RestoreOutcome> {
        let entry = self.entry(server_id)?;
        let _guard = entry
            .transition
            .try_lock()
            .map_err(|_| Error::Conflict(format!("operation in flight for {server_id}")))?;

        {
            let state = entry.state.lock();
            if state.status != ServerStatus::Stopped {
                return Err(Error::State(format!(
                    "cannot restore server in status {}",
                    state.status
                )));
            }
            if !state.update_stage.is_none() {
                return Err(Error::State("cannot restore during an update".into()));
            }
        }

        let outcome = self.backups.restore(server_id, timestamp).await?;

        // The archive included the sidecar of its time; adopt it, but force
        // the update stage clear and rewrite so disk and memory agree.
        let sidecar = self.sidecar_path(server_id);
        match store::read_yaml::<ServerConfig>(&sidecar).await {
            Ok(mut restored) if restored.id.as_str() == server_id => {
                restored.update_stage = UpdateStage::None;
                self.persist_config(&restored).await?;
                *entry.config.write() = restored;
            }
            _ => {
                // Old archive without a usable sidecar: rewrite the current one.
                let config = entry.config.read().clone();
                self.persist_config(&config).await?;
            }
        }

        let id = entry.config.read().id.clone();
        info!(%server_id, restored_from = %timestamp, "server restored");
        self.publish_update(&id, UpdateAction::Updated);
        Ok(outcome)
    }

    // ------------------------------------------------------------------
    // Patch / ordering
    // ------------------------------------------------------------------

    pub async fn patch(&self, server_id: &str, patch: PatchRequest) -> Result<ServerView> {
        let entry = self.entry(server_id)?;
        let _guard = entry
            .transition
            .try_lock()
            .map_err(|_| Error::Conflict(format!("operation in flight for {server_id}")))?;

        {
            let state = entry.state.lock();
            if state.status != ServerStatus::Stopped || !state.update_stage.is_none() {
                return Err(Error::State(
                    "configuration changes require a stopped server outside an update".into(),
                ));
            }
        }
        if let Some(Some(limit)) = &patch.memory_limit {
            parse_memory_limit(limit)?;
        }

        let id = {
            let mut config = entry.config.write();
            if let Some(name) = patch.name {
                if name.trim().is_empty() {
                    return Err(Error::Validation("server name is empty".into()));
                }
                config.name = name;
            }
            if let Some(ports) = patch.ports {
                config.ports = ports;
            }
            if let Some(env) = patch.env {
                config.env = env;
            }
            if let Some(memory_limit) = patch.memory_limit {
                config.memory_limit = memory_limit;
            }
            if let Some(cpu_limit) = patch.cpu_limit {
                config.cpu_limit = cpu_limit;
            }
            if let Some(flag) = patch.maintenance_restart {
                config.maintenance_restart = flag;
            }
            config.updated_at = self.clock.now();
            config.id.clone()
        };
        self.persist_entry(&entry).await?;

        self.publish_update(&id, UpdateAction::Updated);
        Ok(self.view_of(&entry))
    }

    /// Persist display ordering; unknown ids are ignored.
    pub async fn set_order(&self, ordered_ids: &[String]) -> Result<()> {
        for (position, server_id) in ordered_ids.iter().enumerate() {
            let Ok(entry) = self.entry(server_id) else { continue };
            let _guard = entry.transition.lock().await;
            {
                entry.config.write().sort_order = Some(position as u32);
            }
            self.persist_entry(&entry).await?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Maintenance
    // ------------------------------------------------------------------

    /// Nightly routine: back up and stop every running server, restarting
    /// the ones whose configuration asks for it. Per-server failures are
    /// logged and never abort the loop.
    pub async fn run_maintenance(&self) {
        let running: Vec<(String, bool)> = {
            let servers = self.servers.lock();
            servers
                .iter()
                .filter(|(_, entry)| entry.state.lock().status == ServerStatus::Running)
                .map(|(id, entry)| (id.clone(), entry.config.read().maintenance_restart))
                .collect()
        };
        info!(count = running.len(), "maintenance pass");

        for (server_id, restart) in running {
            // stop() already takes the auto backup when configured to.
            if !self.cfg.auto_backup_on_stop {
                if let Err(e) = self.backups.create(&server_id, BackupType::Auto, None).await {
                    warn!(%server_id, error = %e, "maintenance backup failed");
                    continue;
                }
            }
            if let Err(e) = self.stop(&server_id).await {
                warn!(%server_id, error = %e, "maintenance stop failed");
                continue;
            }
            if restart {
                if let Err(e) = self.start(&server_id).await {
                    warn!(%server_id, error = %e, "maintenance restart failed");
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Startup reconciliation
    // ------------------------------------------------------------------

    /// Rebuild in-memory state from sidecars and backend ground truth, wire
    /// the crash callback, and start event monitoring.
    pub async fn reconcile(self: &Arc<Self>) -> Result<()> {
        store::ensure_dir(&self.cfg.servers_dir).await?;

        // Backend-side reconciliation first; an unreachable container daemon
        // is a warning, not a startup failure.
        if let Err(e) = self.container.reconcile().await {
            warn!(error = %e, "container backend reconcile failed, continuing");
        }
        if let Err(e) = self.native.reconcile().await {
            warn!(error = %e, "native backend reconcile failed, continuing");
        }

        for dir_name in store::list_subdirs(&self.cfg.servers_dir).await? {
            let sidecar = self.sidecar_path(&dir_name);
            let config: ServerConfig = match store::read_yaml(&sidecar).await {
                Ok(config) => config,
                Err(e) => {
                    warn!(directory = %dir_name, error = %e, "skipping directory without valid sidecar");
                    continue;
                }
            };
            if config.id.as_str() != dir_name {
                warn!(directory = %dir_name, sidecar_id = %config.id, "sidecar id mismatch, skipping");
                continue;
            }

            let state = self.derive_state(&config).await;
            info!(server_id = %config.id, status = %state.status, "server reconciled");
            let entry = ServerEntry::new(config, state);
            self.servers.lock().insert(dir_name, entry);
        }

        // Crash callback first, then event delivery.
        for backend in [&self.container, &self.native] {
            let weak = Arc::downgrade(self);
            let subscription = backend.on_process_exit(Arc::new(move |server_id, exit_code| {
                if let Some(orchestrator) = weak.upgrade() {
                    let server_id = server_id.to_string();
                    tokio::spawn(async move {
                        orchestrator.handle_exit(&server_id, exit_code).await;
                    });
                }
            }));
            self.exit_subscriptions.lock().push(subscription);
        }
        self.container.start_event_monitoring().await;
        self.native.start_event_monitoring().await;

        info!(count = self.servers.lock().len(), "orchestrator reconciled");
        Ok(())
    }

    /// Initial state for a reconciled server. `started_at` is a lower bound:
    /// the true start time is lost across a control-plane restart.
    async fn derive_state(&self, config: &ServerConfig) -> ServerState {
        let backend_status = match self.templates.lookup(&config.template_id) {
            Some(template) => {
                let (backend, _) = self.backend_for(&template, config.id.as_str());
                backend.get_process_status(config.id.as_str()).await
            }
            None => {
                warn!(server_id = %config.id, template = %config.template_id, "template missing, assuming container backend");
                self.container.get_process_status(config.id.as_str()).await
            }
        };

        let mut state = ServerState::new(config.update_stage);
        match backend_status {
            Ok(status) if status.running => {
                state.status = ServerStatus::Running;
                state.started_at = Some(self.clock.now());
            }
            Ok(_) if !config.update_stage.is_none() => {
                state.status = ServerStatus::Updating;
            }
            Ok(_) => {
                state.status = ServerStatus::Stopped;
            }
            Err(e) => {
                // Daemon unreachable: sidecar rules alone decide.
                warn!(server_id = %config.id, error = %e, "backend status query failed during reconcile");
                state.status = if config.update_stage.is_none() {
                    ServerStatus::Stopped
                } else {
                    ServerStatus::Updating
                };
            }
        }
        state
    }
}

#[cfg(test)]
#[path = "orchestrator_tests.rs"]
mod tests;
