// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! garcon-core: shared types for the Garcon control plane
//!
//! Data model (templates, server configuration, runtime state), the push
//! protocol frames, the error taxonomy, and small shared utilities (ids,
//! clock, resource-limit parsing, timestamp formatting).

pub mod clock;
pub mod error;
pub mod event;
pub mod id;
pub mod limits;
pub mod server;
pub mod status;
pub mod template;
pub mod timestamp;

pub use clock::{Clock, FakeClock, SystemClock};
pub use error::{Error, ErrorKind, Result};
pub use event::{ClientMessage, PushMessage, UpdateAction};
pub use id::{slug, ServerId};
pub use limits::{nano_cpus, parse_memory_limit};
pub use server::{PortMapping, ServerConfig, ServerState, ServerView};
pub use status::{ServerStatus, UpdateStage};
pub use template::{
    ContainerSpec, ExecConfig, ExecutionMode, MountSpec, PortSpec, Protocol, RconConfig,
    RconOverlay, Template, TemplateSummary,
};
pub use timestamp::{format_millis, parse_millis};
