// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Container execution backend
//!
//! Containers are named `garcon-<server_id>` and labelled so the backend
//! only ever touches its own artefacts. Crash detection runs off a filtered
//! event stream; the id→container mapping is a cache refreshed on demand and
//! at startup reconciliation. The daemon is configured never to restart
//! containers — unexpected exits surface through the exit hub instead.

use crate::exit::{ExitCallback, ExitHub, ExitSubscription};
use crate::{ExecutionBackend, ProcessStatus};
use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, ListContainersOptions, RemoveContainerOptions,
    StartContainerOptions, StopContainerOptions,
};
use bollard::image::CreateImageOptions;
use bollard::system::EventsOptions;
use bollard::models::{HostConfig, PortBinding, RestartPolicy, RestartPolicyNameEnum};
use bollard::Docker;
use futures_util::StreamExt;
use garcon_core::{nano_cpus, parse_memory_limit, Error, Result, ServerConfig, Template};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Name prefix for every managed container.
pub const NAME_PREFIX: &str = "garcon-";
/// Marker label; the backend operates only on containers carrying it.
pub const LABEL_MANAGED: &str = "garcon.managed";
/// Label carrying the owning server id.
pub const LABEL_SERVER_ID: &str = "garcon.server_id";
/// Fixed non-root identity the server process runs under.
const RUN_AS_USER: &str = "1000:1000";

/// Container name for a server id.
pub fn container_name(server_id: &str) -> String {
    format!("{NAME_PREFIX}{server_id}")
}

/// The daemon's name filter is substring-based; results must be re-checked
/// for an exact `/<name>` match before use.
fn matches_exact_name(names: Option<&Vec<String>>, name: &str) -> bool {
    let wanted = format!("/{name}");
    names.map(|ns| ns.iter().any(|n| n == &wanted)).unwrap_or(false)
}

/// Port map in the daemon's wire shape: `"<port>/<proto>" → [{host_port}]`.
fn port_bindings(config: &ServerConfig) -> HashMap<String, Option<Vec<PortBinding>>> {
    config
        .ports
        .iter()
        .map(|p| {
            (
                format!("{}/{}", p.container_port, p.protocol),
                Some(vec![PortBinding {
                    host_ip: None,
                    host_port: Some(p.host_port.to_string()),
                }]),
            )
        })
        .collect()
}

/// `HOME` points at the mount path; the server's environment map follows.
fn container_env(config: &ServerConfig, mount_path: &str) -> Vec<String> {
    let mut env = vec![format!("HOME={mount_path}")];
    let mut pairs: Vec<_> = config.env.iter().collect();
    pairs.sort();
    env.extend(pairs.into_iter().map(|(k, v)| format!("{k}={v}")));
    env
}

fn docker_err(context: &str, e: bollard::errors::Error) -> Error {
    Error::Docker(format!("{context}: {e}"))
}

fn is_not_found(e: &bollard::errors::Error) -> bool {
    matches!(
        e,
        bollard::errors::Error::DockerResponseServerError { status_code: 404, .. }
    )
}

fn is_not_modified(e: &bollard::errors::Error) -> bool {
    matches!(
        e,
        bollard::errors::Error::DockerResponseServerError { status_code: 304, .. }
    )
}

/// Execution backend running servers as Docker containers.
#[derive(Clone)]
pub struct DockerBackend {
    docker: Docker,
    /// server_id → container id. A cache; ground truth is the daemon.
    containers: Arc<Mutex<HashMap<String, String>>>,
    hub: ExitHub,
    cancel: CancellationToken,
}

impl DockerBackend {
    /// Connect to the container daemon. `docker_host` overrides the
    /// OS-default socket; `tcp://`/`http://` addresses connect over HTTP.
    pub fn connect(docker_host: Option<&str>, cancel: CancellationToken) -> Result<Self> {
        let docker = match docker_host {
            Some(host) if host.starts_with("tcp://") || host.starts_with("http://") => {
                Docker::connect_with_http(host, 120, bollard::API_DEFAULT_VERSION)
            }
            Some(host) => {
                let path = host.strip_prefix("unix://").unwrap_or(host);
                Docker::connect_with_socket(path, 120, bollard::API_DEFAULT_VERSION)
            }
            None => Docker::connect_with_local_defaults(),
        }
        .map_err(|e| docker_err("connect", e))?;

        Ok(Self {
            docker,
            containers: Arc::new(Mutex::new(HashMap::new())),
            hub: ExitHub::new(),
            cancel,
        })
    }

    /// Pull the base image if it is not present locally, awaiting pull
    /// progress to completion before returning.
    async fn ensure_image(&self, image: &str) -> Result<()> {
        if self.docker.inspect_image(image).await.is_ok() {
            return Ok(());
        }
        info!(%image, "pulling image");
        let options = CreateImageOptions { from_image: image.to_string(), ..Default::default() };
        let mut stream = self.docker.create_image(Some(options), None, None);
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    return Err(Error::Docker(format!("pull of {image} cancelled")));
                }
                progress = stream.next() => match progress {
                    None => break,
                    Some(Ok(info)) => {
                        if let Some(status) = info.status {
                            debug!(%image, %status, "pull progress");
                        }
                    }
                    Some(Err(e)) => return Err(docker_err("pull", e)),
                },
            }
        }
        info!(%image, "image pulled");
        Ok(())
    }

    /// Force-remove any container with this name, tolerating absence.
    async fn remove_by_name(&self, name: &str) -> Result<()> {
        let options = RemoveContainerOptions { force: true, ..Default::default() };
        match self.docker.remove_container(name, Some(options)).await {
            Ok(()) => Ok(()),
            Err(e) if is_not_found(&e) => Ok(()),
            Err(e) => Err(docker_err("remove", e)),
        }
    }

    async fn list_managed(&self, all: bool) -> Result<Vec<bollard::models::ContainerSummary>> {
        let options = ListContainersOptions {
            all,
            filters: HashMap::from([(
                "label".to_string(),
                vec![format!("{LABEL_MANAGED}=true")],
            )]),
            ..Default::default()
        };
        self.docker.list_containers(Some(options)).await.map_err(|e| docker_err("list", e))
    }

    fn build_config(
        &self,
        config: &ServerConfig,
        template: &Template,
        data_path: &Path,
    ) -> Result<Config<String>> {
        let container = template.container.as_ref().ok_or_else(|| {
            Error::Validation(format!("template {} has no container block", template.id))
        })?;

        let mut binds = vec![format!("{}:{}", data_path.display(), container.mount_path)];
        for mount in &container.mounts {
            let ro = if mount.read_only { ":ro" } else { "" };
            binds.push(format!("{}:{}{ro}", mount.host_path, mount.container_path));
        }

        let memory = config.memory_limit.as_deref().map(parse_memory_limit).transpose()?;

        let host_config = HostConfig {
            binds: Some(binds),
            port_bindings: Some(port_bindings(config)),
            memory,
            nano_cpus: config.cpu_limit.map(nano_cpus),
            // Crashes are surfaced, never auto-recovered.
            restart_policy: Some(RestartPolicy {
                name: Some(RestartPolicyNameEnum::NO),
                maximum_retry_count: None,
            }),
            ..Default::default()
        };

        let exposed_ports: HashMap<String, HashMap<(), ()>> = config
            .ports
            .iter()
            .map(|p| (format!("{}/{}", p.container_port, p.protocol), HashMap::new()))
            .collect();

        let labels = HashMap::from([
            (LABEL_MANAGED.to_string(), "true".to_string()),
            (LABEL_SERVER_ID.to_string(), config.id.to_string()),
        ]);

        Ok(Config {
            image: Some(container.image.clone()),
            cmd: template
                .render_command(&config.env)
                .map(|cmd| vec!["/bin/sh".to_string(), "-c".to_string(), cmd]),
            env: Some(container_env(config, &container.mount_path)),
            user: Some(RUN_AS_USER.to_string()),
            working_dir: container.working_dir.clone(),
            labels: Some(labels),
            exposed_ports: Some(exposed_ports),
            host_config: Some(host_config),
            ..Default::default()
        })
    }

    /// One pass over the filtered event stream; returns on stream end/error.
    async fn pump_events(docker: &Docker, hub: &ExitHub) {
        let options = EventsOptions::<String> {
            filters: HashMap::from([
                ("type".to_string(), vec!["container".to_string()]),
                ("event".to_string(), vec!["die".to_string(), "stop".to_string()]),
                ("label".to_string(), vec![format!("{LABEL_MANAGED}=true")]),
            ]),
            ..Default::default()
        };
        let mut stream = docker.events(Some(options));
        while let Some(event) = stream.next().await {
            match event {
                Ok(message) => {
                    let Some(attributes) =
                        message.actor.and_then(|a| a.attributes)
                    else {
                        continue;
                    };
                    let Some(server_id) = attributes.get(LABEL_SERVER_ID) else {
                        continue;
                    };
                    let exit_code =
                        attributes.get("exitCode").and_then(|c| c.parse::<i64>().ok());
                    debug!(%server_id, ?exit_code, "container exit event");
                    hub.dispatch(server_id, exit_code);
                }
                Err(e) => {
                    warn!(error = %e, "docker event stream error");
                    break;
                }
            }
        }
    }
}

#[async_trait]
impl ExecutionBackend for DockerBackend {
    async fn check_availability(&self) -> bool {
        self.docker.ping().await.is_ok()
    }

    async fn start_event_monitoring(&self) {
        let docker = self.docker.clone();
        let hub = self.hub.clone();
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    () = Self::pump_events(&docker, &hub) => {
                        // Transient disconnect: back off briefly and re-open.
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
            debug!("docker event monitoring stopped");
        });
    }

    fn on_process_exit(&self, callback: ExitCallback) -> ExitSubscription {
        self.hub.subscribe(callback)
    }

    async fn get_process_status(&self, server_id: &str) -> Result<ProcessStatus> {
        let name = container_name(server_id);
        let options = ListContainersOptions {
            all: true,
            filters: HashMap::from([
                ("name".to_string(), vec![name.clone()]),
                ("label".to_string(), vec![format!("{LABEL_MANAGED}=true")]),
            ]),
            ..Default::default()
        };
        let summaries = self
            .docker
            .list_containers(Some(options))
            .await
            .map_err(|e| docker_err("status", e))?;

        let found = summaries.iter().find(|c| matches_exact_name(c.names.as_ref(), &name));
        Ok(match found {
            Some(c) => ProcessStatus {
                exists: true,
                running: c.state.as_deref() == Some("running"),
                native_id: c.id.clone(),
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
        let name = container_name(&server_id);

        let status = self.get_process_status(&server_id).await?;
        if status.running {
            return Err(Error::Conflict(format!("server {server_id} is already running")));
        }

        // A stale container with our name blocks creation; it is disposable.
        self.remove_by_name(&name).await?;

        let container = template.container.as_ref().ok_or_else(|| {
            Error::Validation(format!("template {} has no container block", template.id))
        })?;
        self.ensure_image(&container.image).await?;

        let create_config = self.build_config(config, template, data_path)?;
        let options = CreateContainerOptions { name: name.clone(), ..Default::default() };
        let created = self
            .docker
            .create_container(Some(options), create_config)
            .await
            .map_err(|e| docker_err("create", e))?;

        self.docker
            .start_container(&name, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| docker_err("start", e))?;

        info!(%server_id, container_id = %created.id, "container started");
        self.containers.lock().insert(server_id, created.id.clone());
        Ok(created.id)
    }

    async fn stop(
        &self,
        server_id: &str,
        template: &Template,
        timeout: Option<Duration>,
    ) -> Result<()> {
        let name = container_name(server_id);
        let timeout = timeout.unwrap_or_else(|| template.stop_timeout());

        let options = StopContainerOptions { t: timeout.as_secs() as i64 };
        match self.docker.stop_container(&name, Some(options)).await {
            Ok(()) => {}
            // Already stopped or already gone: stop is idempotent.
            Err(e) if is_not_found(&e) || is_not_modified(&e) => {}
            Err(e) => return Err(docker_err("stop", e)),
        }

        // Data lives on the bind mount; the container itself is disposable.
        self.remove_by_name(&name).await?;
        self.containers.lock().remove(server_id);
        info!(%server_id, "container stopped and removed");
        Ok(())
    }

    async fn remove(&self, server_id: &str) -> Result<()> {
        self.remove_by_name(&container_name(server_id)).await?;
        self.containers.lock().remove(server_id);
        Ok(())
    }

    async fn reconcile(&self) -> Result<()> {
        let summaries = self.list_managed(true).await?;
        let mut map = self.containers.lock();
        map.clear();
        for summary in &summaries {
            let Some(labels) = &summary.labels else { continue };
            let Some(server_id) = labels.get(LABEL_SERVER_ID) else { continue };
            if let Some(id) = &summary.id {
                map.insert(server_id.clone(), id.clone());
            }
        }
        info!(count = map.len(), "docker backend reconciled");
        Ok(())
    }
}

#[cfg(test)]
#[path = "docker_tests.rs"]
mod tests;
