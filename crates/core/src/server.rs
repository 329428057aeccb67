// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Server configuration (sidecar document) and runtime state

use crate::id::ServerId;
use crate::status::{ServerStatus, UpdateStage};
use crate::template::Protocol;
use crate::timestamp;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Sidecar document filename, co-located with the server data directory.
pub const SIDECAR_FILENAME: &str = ".garcon.yaml";

/// One published port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortMapping {
    pub host_port: u16,
    pub container_port: u16,
    pub protocol: Protocol,
}

/// Persisted per-server configuration — the authoritative record, stored as
/// `.garcon.yaml` inside the server's data directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    pub id: ServerId,
    pub name: String,
    pub template_id: String,
    /// Original import location; the update protocol copies from here.
    pub source_path: String,
    #[serde(with = "timestamp::serde_millis")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "timestamp::serde_millis")]
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<PortMapping>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub env: HashMap<String, String>,
    /// `NNN[KMGT]` memory cap for the container.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_limit: Option<String>,
    /// Fractional CPU cores.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_limit: Option<f64>,
    #[serde(default)]
    pub update_stage: UpdateStage,
    /// Start the server again after the nightly maintenance stop.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub maintenance_restart: bool,
    /// Display ordering for listings; assigned via `PUT /servers/order`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_order: Option<u32>,
}

/// In-memory runtime state, rebuilt from the sidecar and the execution
/// backend at startup.
#[derive(Debug, Clone)]
pub struct ServerState {
    pub status: ServerStatus,
    pub started_at: Option<DateTime<Utc>>,
    /// Mirrors the persisted update stage.
    pub update_stage: UpdateStage,
    /// Timestamp of the pre-update backup taken at initiate time.
    pub pre_update_backup: Option<String>,
}

impl ServerState {
    pub fn new(update_stage: UpdateStage) -> Self {
        Self {
            status: ServerStatus::Stopped,
            started_at: None,
            update_stage,
            pre_update_backup: None,
        }
    }
}

/// Response view of one server row, config joined with runtime state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerView {
    pub id: ServerId,
    pub name: String,
    pub template_id: String,
    /// Display name resolved from the template registry; `None` when the
    /// template has since disappeared.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_name: Option<String>,
    pub status: ServerStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
    pub update_stage: UpdateStage,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<PortMapping>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub env: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_limit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_limit: Option<f64>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub maintenance_restart: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_order: Option<u32>,
    pub created_at: String,
    pub updated_at: String,
}

impl ServerView {
    pub fn from_parts(
        config: &ServerConfig,
        state: &ServerState,
        template_name: Option<String>,
    ) -> Self {
        Self {
            id: config.id.clone(),
            name: config.name.clone(),
            template_id: config.template_id.clone(),
            template_name,
            status: state.status,
            started_at: state.started_at.map(timestamp::format_millis),
            update_stage: state.update_stage,
            ports: config.ports.clone(),
            env: config.env.clone(),
            memory_limit: config.memory_limit.clone(),
            cpu_limit: config.cpu_limit,
            maintenance_restart: config.maintenance_restart,
            sort_order: config.sort_order,
            created_at: timestamp::format_millis(config.created_at),
            updated_at: timestamp::format_millis(config.updated_at),
        }
    }
}

#[cfg(test)]
#[path = "server_tests.rs"]
mod tests;
