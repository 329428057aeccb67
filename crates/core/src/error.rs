// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error taxonomy shared across the control plane
//!
//! One variant per error kind; the HTTP facade maps kinds onto status codes
//! and everything below it stays transport-agnostic.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Classification of an [`Error`], used for user-visible mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Validation,
    Conflict,
    State,
    Docker,
    NativeProcess,
    FileSystem,
    Internal,
}

/// Control-plane error.
#[derive(Debug, Error)]
pub enum Error {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("illegal in current state: {0}")]
    State(String),

    #[error("docker: {0}")]
    Docker(String),

    #[error("native process: {0}")]
    NativeProcess(String),

    #[error("filesystem: {0}")]
    FileSystem(String),

    #[error("internal: {0}")]
    Internal(String),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Validation(_) => ErrorKind::Validation,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::State(_) => ErrorKind::State,
            Self::Docker(_) => ErrorKind::Docker,
            Self::NativeProcess(_) => ErrorKind::NativeProcess,
            Self::FileSystem(_) => ErrorKind::FileSystem,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// HTTP status for the user-visible mapping.
    pub fn http_status(&self) -> u16 {
        match self.kind() {
            ErrorKind::Validation => 400,
            ErrorKind::NotFound => 404,
            ErrorKind::Conflict | ErrorKind::State => 409,
            _ => 500,
        }
    }

    /// Convenience constructor for not-found on a named entity.
    pub fn not_found(entity: &str, id: impl std::fmt::Display) -> Self {
        Self::NotFound(format!("{entity} {id}"))
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::FileSystem(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Internal(format!("json: {e}"))
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
