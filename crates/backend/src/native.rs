// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Native-process execution backend
//!
//! Runs games that cannot be containerised as plain OS processes. Every
//! record change is persisted to `native-processes.json` so a control-plane
//! restart can re-adopt still-alive processes. Freshly spawned children are
//! observed through the child handle; re-adopted ones fall back to a polling
//! timer since the handle does not survive a restart.

use crate::exit::{ExitCallback, ExitHub, ExitSubscription};
use crate::rcon::RconClient;
use crate::{ExecutionBackend, ProcessStatus};
use async_trait::async_trait;
use garcon_core::template::RconConfig;
use garcon_core::{format_millis, Error, Result, ServerConfig, Template};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Poll interval for re-adopted processes.
const POLL_INTERVAL: Duration = Duration::from_secs(10);
/// How long to wait after a kill for the OS to release ports and file locks.
const RELEASE_WAIT: Duration = Duration::from_secs(10);
/// Liveness poll step while waiting for an exit.
const POLL_STEP: Duration = Duration::from_millis(250);

/// Liveness and process-image inspection, injectable for tests.
pub trait ProcessProbe: Send + Sync + 'static {
    fn is_alive(&self, pid: u32) -> bool;
    fn process_name(&self, pid: u32) -> Option<String>;
}

/// Probe backed by the OS process table.
pub struct SystemProbe {
    system: Mutex<sysinfo::System>,
}

impl SystemProbe {
    pub fn new() -> Self {
        Self { system: Mutex::new(sysinfo::System::new()) }
    }
}

impl Default for SystemProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessProbe for SystemProbe {
    fn is_alive(&self, pid: u32) -> bool {
        let mut system = self.system.lock();
        system.refresh_process(sysinfo::Pid::from_u32(pid))
    }

    fn process_name(&self, pid: u32) -> Option<String> {
        let mut system = self.system.lock();
        let pid = sysinfo::Pid::from_u32(pid);
        system.refresh_process(pid);
        system.process(pid).map(|p| p.name().to_string())
    }
}

/// Persisted record of one managed native process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NativeProcessRecord {
    pub server_id: String,
    pub pid: u32,
    pub process_name: String,
    pub started_at: String,
    /// Server data directory; needed for the RCON settings overlay after a
    /// control-plane restart.
    pub data_path: String,
}

/// The OS may truncate the stored image name (unix comm is 15 bytes), so a
/// prefix match in either direction counts as the same image.
fn names_match(recorded: &str, observed: &str) -> bool {
    recorded == observed || recorded.starts_with(observed) || observed.starts_with(recorded)
}

/// Substitute `{VAR}` tokens in each argument from the server's env map.
fn render_args(args: &[String], env: &HashMap<String, String>) -> Vec<String> {
    args.iter()
        .map(|arg| {
            let mut out = arg.clone();
            for (key, value) in env {
                out = out.replace(&format!("{{{key}}}"), value);
            }
            out
        })
        .collect()
}

/// Execution backend running servers as native OS processes.
#[derive(Clone)]
pub struct NativeBackend {
    records_path: PathBuf,
    logs_dir: PathBuf,
    records: Arc<Mutex<HashMap<String, NativeProcessRecord>>>,
    hub: ExitHub,
    probe: Arc<dyn ProcessProbe>,
    cancel: CancellationToken,
}

impl NativeBackend {
    /// `records_path` is the persisted record file; `logs_dir` receives one
    /// append-mode log per server.
    pub fn new(records_path: PathBuf, logs_dir: PathBuf, cancel: CancellationToken) -> Self {
        Self::with_probe(records_path, logs_dir, Arc::new(SystemProbe::new()), cancel)
    }

    pub fn with_probe(
        records_path: PathBuf,
        logs_dir: PathBuf,
        probe: Arc<dyn ProcessProbe>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            records_path,
            logs_dir,
            records: Arc::new(Mutex::new(HashMap::new())),
            hub: ExitHub::new(),
            probe,
            cancel,
        }
    }

    /// Write the current record set to disk.
    async fn persist(&self) -> Result<()> {
        persist_records(&self.records_path, &self.records).await
    }

    /// Drop a record only if it still names this pid (a restart may have
    /// replaced it), then persist and optionally notify.
    async fn release(&self, server_id: &str, pid: u32, exit_code: Option<i64>, notify: bool) {
        let removed = {
            let mut records = self.records.lock();
            match records.get(server_id) {
                Some(r) if r.pid == pid => {
                    records.remove(server_id);
                    true
                }
                _ => false,
            }
        };
        if removed {
            if let Err(e) = self.persist().await {
                warn!(%server_id, error = %e, "failed to persist record removal");
            }
            if notify {
                self.hub.dispatch(server_id, exit_code);
            }
        }
    }

    /// Watch a freshly spawned child; fires exit callbacks with its code.
    fn spawn_child_watcher(&self, server_id: String, pid: u32, mut child: tokio::process::Child) {
        let backend = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = backend.cancel.cancelled() => {}
                status = child.wait() => {
                    let exit_code = match status {
                        Ok(status) => status.code().map(i64::from),
                        Err(e) => {
                            warn!(%server_id, error = %e, "child wait failed");
                            None
                        }
                    };
                    info!(%server_id, pid, ?exit_code, "native process exited");
                    backend.release(&server_id, pid, exit_code, true).await;
                }
            }
        });
    }

    /// Watch a re-adopted process by polling; the child handle is gone after
    /// a restart, so the exit code is unknown.
    fn spawn_poll_watcher(&self, server_id: String, pid: u32) {
        let backend = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(POLL_INTERVAL);
            interval.tick().await; // first tick is immediate
            loop {
                tokio::select! {
                    _ = backend.cancel.cancelled() => break,
                    _ = interval.tick() => {
                        if !backend.probe.is_alive(pid) {
                            info!(%server_id, pid, "re-adopted process exited");
                            backend.release(&server_id, pid, None, true).await;
                            break;
                        }
                    }
                }
            }
        });
    }

    /// Poll until the pid is gone or the deadline passes. Returns liveness.
    async fn wait_for_exit(&self, pid: u32, deadline: Duration) -> bool {
        let start = tokio::time::Instant::now();
        while start.elapsed() < deadline {
            if !self.probe.is_alive(pid) {
                return true;
            }
            tokio::time::sleep(POLL_STEP).await;
        }
        !self.probe.is_alive(pid)
    }

    /// Graceful RCON shutdown; any failure falls through to the tree-kill.
    async fn try_rcon_stop(&self, server_id: &str, rcon: &RconConfig, data_path: &Path) -> bool {
        let (port, password) = rcon_credentials(rcon, data_path).await;
        let addr = format!("127.0.0.1:{port}");
        match RconClient::connect(&addr).await {
            Ok(mut client) => {
                match client.send_shutdown(&password, &rcon.shutdown_command).await {
                    Ok(()) => {
                        debug!(%server_id, %addr, "rcon shutdown sent");
                        true
                    }
                    Err(e) => {
                        warn!(%server_id, error = %e, "rcon shutdown failed");
                        false
                    }
                }
            }
            Err(e) => {
                warn!(%server_id, %addr, error = %e, "rcon connect failed");
                false
            }
        }
    }
}

/// Overlay RCON credentials from a settings file inside the data directory,
/// falling back to template values when the file or pointers are absent.
async fn rcon_credentials(rcon: &RconConfig, data_path: &Path) -> (u16, String) {
    let mut port = rcon.port;
    let mut password = rcon.password.clone();
    if let Some(overlay) = &rcon.settings_overlay {
        let path = data_path.join(&overlay.file);
        match garcon_store::fs::read_json::<serde_json::Value>(&path).await {
            Ok(doc) => {
                if let Some(p) = doc.pointer(&overlay.port_pointer).and_then(|v| v.as_u64()) {
                    port = p as u16;
                }
                if let Some(pw) = doc.pointer(&overlay.password_pointer).and_then(|v| v.as_str())
                {
                    password = pw.to_string();
                }
            }
            Err(e) => debug!(path = %path.display(), error = %e, "no rcon settings overlay"),
        }
    }
    (port, password)
}

async fn persist_records(
    path: &Path,
    records: &Mutex<HashMap<String, NativeProcessRecord>>,
) -> Result<()> {
    let mut snapshot: Vec<NativeProcessRecord> = records.lock().values().cloned().collect();
    snapshot.sort_by(|a, b| a.server_id.cmp(&b.server_id));
    garcon_store::fs::write_json(path, &snapshot).await
}

/// SIGKILL the whole process group (unix) / the process tree (windows).
async fn tree_kill(pid: u32) {
    #[cfg(unix)]
    {
        use nix::sys::signal::{kill, killpg, Signal};
        use nix::unistd::Pid;
        let target = Pid::from_raw(pid as i32);
        // Children are spawned as group leaders, so killpg takes the tree.
        if killpg(target, Signal::SIGKILL).is_err() {
            let _ = kill(target, Signal::SIGKILL);
        }
    }
    #[cfg(windows)]
    {
        let _ = tokio::process::Command::new("taskkill")
            .args(["/PID", &pid.to_string(), "/T", "/F"])
            .output()
            .await;
    }
}

#[async_trait]
impl ExecutionBackend for NativeBackend {
    async fn check_availability(&self) -> bool {
        cfg!(target_os = "windows")
    }

    async fn start_event_monitoring(&self) {
        // Exits are observed via child handles and the re-adoption poll.
        debug!("native backend uses child waits and polling, no event stream");
    }

    fn on_process_exit(&self, callback: ExitCallback) -> ExitSubscription {
        self.hub.subscribe(callback)
    }

    async fn get_process_status(&self, server_id: &str) -> Result<ProcessStatus> {
        let record = self.records.lock().get(server_id).cloned();
        Ok(match record {
            Some(record) => ProcessStatus {
                exists: true,
                running: self.probe.is_alive(record.pid),
                native_id: Some(record.pid.to_string()),
            },
            None => ProcessStatus::default(),
        })
    }

    async fn start(
        &self,
        config: &ServerConfig,
        template: &Template,
        data_path: &Path,
    ) -> Result<String> {
        let server_id = config.id.to_string();

        if let Some(record) = self.records.lock().get(&server_id) {
            if self.probe.is_alive(record.pid) {
                return Err(Error::Conflict(format!("server {server_id} is already running")));
            }
        }

        let executable = template.exec.executable.as_deref().ok_or_else(|| {
            Error::Validation(format!("template {} has no executable", template.id))
        })?;
        let exe_path = data_path.join(executable);
        if !garcon_store::fs::exists(&exe_path).await {
            return Err(Error::NativeProcess(format!(
                "executable not found: {}",
                exe_path.display()
            )));
        }

        std::fs::create_dir_all(&self.logs_dir)?;
        let log_path = self.logs_dir.join(format!("{server_id}.log"));
        let log = std::fs::OpenOptions::new().create(true).append(true).open(&log_path)?;
        let log_err = log.try_clone()?;

        let mut command = tokio::process::Command::new(&exe_path);
        command
            .args(render_args(&template.exec.args, &config.env))
            .current_dir(data_path)
            .stdin(Stdio::null())
            .stdout(Stdio::from(log))
            .stderr(Stdio::from(log_err));
        #[cfg(unix)]
        command.process_group(0);

        let child = command
            .spawn()
            .map_err(|e| Error::NativeProcess(format!("spawn {}: {e}", exe_path.display())))?;
        let pid = child
            .id()
            .ok_or_else(|| Error::NativeProcess("pid unavailable at launch".into()))?;

        let record = NativeProcessRecord {
            server_id: server_id.clone(),
            pid,
            process_name: executable.to_string(),
            started_at: format_millis(chrono::Utc::now()),
            data_path: data_path.display().to_string(),
        };
        self.records.lock().insert(server_id.clone(), record);
        self.persist().await?;

        info!(%server_id, pid, "native process started");
        self.spawn_child_watcher(server_id, pid, child);
        Ok(pid.to_string())
    }

    async fn stop(
        &self,
        server_id: &str,
        template: &Template,
        timeout: Option<Duration>,
    ) -> Result<()> {
        let Some(record) = self.records.lock().get(server_id).cloned() else {
            return Ok(()); // already stopped
        };
        let timeout = timeout.unwrap_or_else(|| template.stop_timeout());
        let data_path = PathBuf::from(&record.data_path);

        if let Some(rcon) = template.exec.rcon.as_ref().filter(|r| r.enabled) {
            if self.try_rcon_stop(server_id, rcon, &data_path).await
                && self.wait_for_exit(record.pid, timeout).await
            {
                info!(%server_id, "native process stopped gracefully");
                self.release(server_id, record.pid, None, false).await;
                return Ok(());
            }
        }

        if self.probe.is_alive(record.pid) {
            warn!(%server_id, pid = record.pid, "force-killing process tree");
            tree_kill(record.pid).await;
            // Give the OS time to release ports and file locks.
            if !self.wait_for_exit(record.pid, RELEASE_WAIT).await {
                return Err(Error::NativeProcess(format!(
                    "process {} survived force-kill",
                    record.pid
                )));
            }
        }

        self.release(server_id, record.pid, None, false).await;
        Ok(())
    }

    async fn remove(&self, server_id: &str) -> Result<()> {
        self.records.lock().remove(server_id);
        self.persist().await
    }

    async fn reconcile(&self) -> Result<()> {
        let persisted: Vec<NativeProcessRecord> =
            if garcon_store::fs::exists(&self.records_path).await {
                garcon_store::fs::read_json(&self.records_path).await?
            } else {
                Vec::new()
            };

        for record in persisted {
            if !self.probe.is_alive(record.pid) {
                info!(
                    server_id = %record.server_id,
                    pid = record.pid,
                    "recorded process no longer alive, dropping record"
                );
                continue;
            }
            match self.probe.process_name(record.pid) {
                Some(observed) if names_match(&record.process_name, &observed) => {
                    info!(
                        server_id = %record.server_id,
                        pid = record.pid,
                        "re-adopting native process"
                    );
                    self.spawn_poll_watcher(record.server_id.clone(), record.pid);
                    self.records.lock().insert(record.server_id.clone(), record);
                }
                observed => {
                    // Pid reuse: same pid, different image. Never adopt.
                    warn!(
                        server_id = %record.server_id,
                        pid = record.pid,
                        expected = %record.process_name,
                        observed = ?observed,
                        "pid is now a different process, dropping record"
                    );
                }
            }
        }

        self.persist().await?;
        info!(count = self.records.lock().len(), "native backend reconciled");
        Ok(())
    }
}

#[cfg(test)]
#[path = "native_tests.rs"]
mod tests;
