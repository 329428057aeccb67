// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Template data model
//!
//! A template is an immutable description of how to run a class of servers:
//! base image or executable, command, default ports, required files, and
//! stop semantics. Documents are YAML with lower-camel keys.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Default graceful-stop timeout when a template does not set one.
pub const DEFAULT_STOP_TIMEOUT_SECS: u64 = 30;

/// How instances of this template are executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    Container,
    Native,
}

/// Port protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Tcp,
    Udp,
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tcp => write!(f, "tcp"),
            Self::Udp => write!(f, "udp"),
        }
    }
}

/// Additional bind mount for container-mode templates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MountSpec {
    pub host_path: String,
    pub container_path: String,
    #[serde(default)]
    pub read_only: bool,
}

/// Container-mode configuration block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerSpec {
    /// Base image reference, pulled on demand.
    pub image: String,
    /// Where the server data directory is mounted inside the container.
    pub mount_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mounts: Vec<MountSpec>,
    /// Environment defaults; request-supplied values overlay these at import.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub env: HashMap<String, String>,
}

/// Credential-override hook for the graceful RCON stop: a JSON document in
/// the server data directory, addressed with JSON pointers. Games that
/// rewrite their RCON settings at runtime keep working without template
/// edits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RconOverlay {
    /// Path relative to the server data directory.
    pub file: String,
    /// JSON pointer to the port value (e.g. `/Rcon/Port`).
    pub port_pointer: String,
    /// JSON pointer to the password value.
    pub password_pointer: String,
}

/// RCON block for graceful native stops.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RconConfig {
    #[serde(default)]
    pub enabled: bool,
    pub port: u16,
    #[serde(default)]
    pub password: String,
    pub shutdown_command: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings_overlay: Option<RconOverlay>,
}

/// Execution configuration shared by both modes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExecConfig {
    /// Executable filename, resolved against the server data directory.
    /// Required for native mode.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub executable: Option<String>,
    /// Shell command template with `{VAR}` placeholders.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    /// Argument list (native mode only).
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    /// Command sent on graceful stop (container stdin / RCON).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_command: Option<String>,
    /// Graceful-stop timeout in seconds before force-kill.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_timeout_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rcon: Option<RconConfig>,
}

/// Default port exposed by servers of this template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortSpec {
    pub container_port: u16,
    pub protocol: Protocol,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub user_facing: bool,
}

/// Immutable template definition. Loaded once at startup and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Template {
    /// Identifier slug, doubles as the document filename.
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub mode: ExecutionMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container: Option<ContainerSpec>,
    #[serde(default)]
    pub exec: ExecConfig,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<PortSpec>,
    /// Filenames that must exist under the import source path.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required_files: Vec<String>,
}

impl Template {
    /// Structural validation applied at load time.
    ///
    /// A container-mode template without a container block is never served
    /// to callers; native mode requires an executable.
    pub fn validate(&self) -> Result<()> {
        if self.id.is_empty() {
            return Err(Error::Validation("template id is empty".into()));
        }
        match self.mode {
            ExecutionMode::Container if self.container.is_none() => Err(Error::Validation(
                format!("template {}: container mode without container block", self.id),
            )),
            ExecutionMode::Native if self.exec.executable.is_none() => Err(Error::Validation(
                format!("template {}: native mode without executable", self.id),
            )),
            _ => Ok(()),
        }
    }

    /// Render the shell command, substituting every `{VAR}` token from the
    /// server's environment map (global substitution per token).
    pub fn render_command(&self, env: &HashMap<String, String>) -> Option<String> {
        let mut cmd = self.exec.command.clone()?;
        for (key, value) in env {
            cmd = cmd.replace(&format!("{{{key}}}"), value);
        }
        Some(cmd)
    }

    /// Graceful-stop timeout, falling back to the default.
    pub fn stop_timeout(&self) -> Duration {
        Duration::from_secs(self.exec.stop_timeout_secs.unwrap_or(DEFAULT_STOP_TIMEOUT_SECS))
    }

    /// Trimmed response shape: no secrets, no internal commands.
    pub fn summary(&self) -> TemplateSummary {
        TemplateSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            mode: self.mode,
            ports: self.ports.clone(),
            required_files: self.required_files.clone(),
        }
    }
}

/// Public listing view of a template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateSummary {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub mode: ExecutionMode,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<PortSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required_files: Vec<String>,
}

#[cfg(test)]
#[path = "template_tests.rs"]
mod tests;
