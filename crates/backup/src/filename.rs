// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Backup filename codec
//!
//! `backup-<sanitised-timestamp>-<type>.tar.gz`, where the timestamp is the
//! ISO-8601 millisecond form with `:` and `.` replaced by `-` so the name is
//! valid on every filesystem. Parsing reverses the substitution; names that
//! do not match the grammar are ignored by listings.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

const PREFIX: &str = "backup-";
const SUFFIX: &str = ".tar.gz";

/// Why a backup was taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackupType {
    Manual,
    Auto,
    PreUpdate,
    PreRestore,
}

impl BackupType {
    pub const ALL: [BackupType; 4] =
        [Self::Manual, Self::Auto, Self::PreUpdate, Self::PreRestore];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Auto => "auto",
            Self::PreUpdate => "pre-update",
            Self::PreRestore => "pre-restore",
        }
    }
}

impl std::fmt::Display for BackupType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Make a millisecond timestamp filesystem-safe: `:` and `.` become `-`.
pub fn sanitize_timestamp(ts: &str) -> String {
    ts.replace([':', '.'], "-")
}

fn sanitized_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        #[allow(clippy::unwrap_used)] // literal pattern, checked by tests
        Regex::new(r"^(\d{4}-\d{2}-\d{2}T\d{2})-(\d{2})-(\d{2})-(\d{3}Z)$").unwrap()
    })
}

/// Reverse [`sanitize_timestamp`]; `None` when the input does not match the
/// sanitised grammar.
pub fn desanitize_timestamp(s: &str) -> Option<String> {
    let captures = sanitized_pattern().captures(s)?;
    Some(format!("{}:{}:{}.{}", &captures[1], &captures[2], &captures[3], &captures[4]))
}

/// On-disk name for a backup of the given timestamp and type.
pub fn backup_filename(timestamp: &str, backup_type: BackupType) -> String {
    format!("{PREFIX}{}-{}{SUFFIX}", sanitize_timestamp(timestamp), backup_type)
}

/// Parse a filename back into `(timestamp, type)`; `None` for anything that
/// does not match the grammar (operator-placed files are skipped, not
/// errors).
pub fn parse_backup_filename(name: &str) -> Option<(String, BackupType)> {
    let stem = name.strip_prefix(PREFIX)?.strip_suffix(SUFFIX)?;
    for backup_type in BackupType::ALL {
        if let Some(sanitized) = stem.strip_suffix(backup_type.as_str()) {
            let sanitized = sanitized.strip_suffix('-')?;
            return Some((desanitize_timestamp(sanitized)?, backup_type));
        }
    }
    None
}

#[cfg(test)]
#[path = "filename_tests.rs"]
mod tests;
