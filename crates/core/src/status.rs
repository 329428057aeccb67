// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Server lifecycle status and update stage

use serde::{Deserialize, Serialize};

/// Lifecycle status of a managed server.
///
/// `Error` is only entered on an unexpected exit reported by the execution
/// backend and only left via explicit crash acknowledgement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerStatus {
    Stopped,
    Starting,
    Running,
    Stopping,
    Error,
    Updating,
}

impl ServerStatus {
    /// True while the backend is expected to hold a live process.
    pub fn is_live(self) -> bool {
        matches!(self, Self::Starting | Self::Running)
    }
}

impl std::fmt::Display for ServerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Stopped => "stopped",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Error => "error",
            Self::Updating => "updating",
        };
        write!(f, "{s}")
    }
}

/// Progress through the three-phase update protocol, orthogonal to
/// [`ServerStatus`]. Persisted in the sidecar; anything other than `None`
/// blocks start/restore/delete until the update is applied or cancelled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateStage {
    #[default]
    None,
    Initiated,
    ReadyToApply,
    Applying,
}

impl UpdateStage {
    pub fn is_none(self) -> bool {
        self == Self::None
    }
}

impl std::fmt::Display for UpdateStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::None => "none",
            Self::Initiated => "initiated",
            Self::ReadyToApply => "ready_to_apply",
            Self::Applying => "applying",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
#[path = "status_tests.rs"]
mod tests;
