// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Push-protocol frames
//!
//! Serializes with `{"type": "...", ...fields}` format on both directions of
//! the push channel. Unknown inbound types deserialize to
//! [`ClientMessage::Unknown`] so the facade can answer with an `error` frame
//! instead of dropping the connection.

use crate::id::ServerId;
use crate::status::{ServerStatus, UpdateStage};
use serde::{Deserialize, Serialize};

/// Membership-change kind carried by `server_update` frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateAction {
    Created,
    Updated,
    Deleted,
}

/// Outbound frames, daemon → subscriber.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PushMessage {
    /// Status transition for one server. Published after the authoritative
    /// mutation has been persisted, in transition order per server.
    ServerStatus {
        server_id: ServerId,
        status: ServerStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        started_at: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        update_stage: Option<UpdateStage>,
    },

    /// Membership change (created/updated/deleted).
    ServerUpdate {
        server_id: ServerId,
        action: UpdateAction,
    },

    /// Error frame, including replies to malformed inbound messages.
    Error {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        code: Option<String>,
    },

    /// Heartbeat response to `ping`.
    Pong,
}

/// Inbound frames, subscriber → daemon.
///
/// `subscribe`/`unsubscribe` without a server id flip the subscriber's
/// "all" flag instead of touching the per-server set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Subscribe {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        server_id: Option<ServerId>,
    },
    Unsubscribe {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        server_id: Option<ServerId>,
    },
    Ping,

    /// Catch-all for unknown inbound types.
    #[serde(other, skip_serializing)]
    Unknown,
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
