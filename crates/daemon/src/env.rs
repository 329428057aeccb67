// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the daemon.

use serde::Serialize;
use std::path::PathBuf;

/// Resolved runtime settings.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub host: String,
    pub port: u16,
    /// Data root, as this process sees it.
    pub data_dir: PathBuf,
    /// Data root as the container daemon sees it; used verbatim in
    /// bind-mount specifications.
    pub host_data_dir: PathBuf,
    pub import_dir: PathBuf,
    pub host_import_dir: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub docker_host: Option<String>,
    pub max_backups_per_type: usize,
    pub auto_backup_on_stop: bool,
    #[serde(skip)]
    pub log_level: Option<String>,
    #[serde(skip)]
    pub log_pretty: bool,
}

fn var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

impl Settings {
    pub fn from_env() -> Self {
        let data_dir = PathBuf::from(var("DATA_DIR").unwrap_or_else(|| "./data".to_string()));
        let host_data_dir =
            var("HOST_DATA_DIR").map(PathBuf::from).unwrap_or_else(|| data_dir.clone());
        let import_dir =
            var("IMPORT_DIR").map(PathBuf::from).unwrap_or_else(|| data_dir.join("import"));
        let host_import_dir =
            var("HOST_IMPORT_DIR").map(PathBuf::from).unwrap_or_else(|| import_dir.clone());

        Self {
            host: var("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: var("PORT").and_then(|v| v.parse().ok()).unwrap_or(3001),
            data_dir,
            host_data_dir,
            import_dir,
            host_import_dir,
            docker_host: var("DOCKER_HOST"),
            max_backups_per_type: var("MAX_BACKUPS_PER_TYPE")
                .and_then(|v| v.parse().ok())
                .unwrap_or(5),
            auto_backup_on_stop: var("AUTO_BACKUP_ON_STOP")
                .and_then(|v| parse_bool(&v))
                .unwrap_or(true),
            log_level: var("LOG_LEVEL"),
            log_pretty: var("LOG_PRETTY").and_then(|v| parse_bool(&v)).unwrap_or(false),
        }
    }

    pub fn config_dir(&self) -> PathBuf {
        self.data_dir.join("config")
    }

    pub fn templates_dir(&self) -> PathBuf {
        self.data_dir.join("templates")
    }

    pub fn servers_dir(&self) -> PathBuf {
        self.data_dir.join("servers")
    }

    /// Servers directory as the container daemon sees it.
    pub fn host_servers_dir(&self) -> PathBuf {
        self.host_data_dir.join("servers")
    }

    pub fn backups_dir(&self) -> PathBuf {
        self.data_dir.join("backups")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.data_dir.join("logs")
    }

    pub fn native_records_path(&self) -> PathBuf {
        self.data_dir.join("native-processes.json")
    }
}

#[cfg(test)]
#[path = "env_tests.rs"]
mod tests;
