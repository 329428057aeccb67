// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Server id generation

use serde::{Deserialize, Serialize};

/// Alphabet for the random id suffix: 40 bits as 10 lowercase hex chars.
const HEX: [char; 16] = [
    '0', '1', '2', '3', '4', '5', '6', '7', '8', '9', 'a', 'b', 'c', 'd', 'e', 'f',
];

/// Length of the random hex suffix.
const SUFFIX_LEN: usize = 10;

/// Unique identifier for a managed server: `slug(name)-<40-bit-hex>`.
///
/// The slug keeps ids operator-readable; the suffix keeps them unique when
/// two servers share a display name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServerId(String);

impl ServerId {
    /// Generate a fresh id from a display name.
    pub fn generate(name: &str) -> Self {
        Self(format!("{}-{}", slug(name), nanoid::nanoid!(SUFFIX_LEN, &HEX)))
    }

    /// Wrap an existing id string (parsing/deserialization paths).
    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ServerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ServerId {
    fn from(s: &str) -> Self {
        Self::from_string(s)
    }
}

impl From<String> for ServerId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for ServerId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::borrow::Borrow<str> for ServerId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for ServerId {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for ServerId {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// Lowercase a display name into a filesystem- and DNS-safe slug.
///
/// Alphanumerics pass through lowered; every other run of characters
/// collapses to a single `-`. Leading/trailing dashes are trimmed. An empty
/// result falls back to `"server"` so generated ids always have a stem.
pub fn slug(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut dash_pending = false;
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            if dash_pending && !out.is_empty() {
                out.push('-');
            }
            dash_pending = false;
            out.push(c.to_ascii_lowercase());
        } else {
            dash_pending = true;
        }
    }
    if out.is_empty() {
        out.push_str("server");
    }
    out
}

#[cfg(test)]
#[path = "id_tests.rs"]
mod tests;
