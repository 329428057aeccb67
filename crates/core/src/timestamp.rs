// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! ISO-8601 millisecond timestamp formatting
//!
//! Backup filenames and the sidecar encode timestamps as
//! `YYYY-MM-DDTHH:MM:SS.SSSZ` — always UTC, always exactly three fractional
//! digits, so that formatting and parsing round-trip byte-for-byte.

use chrono::{DateTime, SecondsFormat, Utc};

/// Format a UTC timestamp with exactly millisecond precision.
pub fn format_millis(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse a timestamp produced by [`format_millis`].
pub fn parse_millis(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.with_timezone(&Utc))
}

/// Serde adapter for `DateTime<Utc>` fields that must keep the millisecond
/// wire format (`#[serde(with = "garcon_core::timestamp::serde_millis")]`).
pub mod serde_millis {
    use super::*;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_str(&format_millis(*ts))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<DateTime<Utc>, D::Error> {
        let s = String::deserialize(de)?;
        parse_millis(&s)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {s:?}")))
    }
}

/// Same adapter for `Option<DateTime<Utc>>` fields.
pub mod serde_millis_opt {
    use super::*;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        ts: &Option<DateTime<Utc>>,
        ser: S,
    ) -> Result<S::Ok, S::Error> {
        match ts {
            Some(ts) => ser.serialize_some(&format_millis(*ts)),
            None => ser.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        de: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        let s = Option::<String>::deserialize(de)?;
        match s {
            None => Ok(None),
            Some(s) => parse_millis(&s)
                .map(Some)
                .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {s:?}"))),
        }
    }
}

#[cfg(test)]
#[path = "timestamp_tests.rs"]
mod tests;
