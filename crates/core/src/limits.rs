// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Resource-limit parsing for container creation

use crate::error::{Error, Result};

/// Parse a `NNN[KMGT]` memory-limit string into bytes.
///
/// Suffixes are binary multiples (K = 1024, ...); a bare integer is bytes.
pub fn parse_memory_limit(s: &str) -> Result<i64> {
    let s = s.trim();
    if s.is_empty() {
        return Err(Error::Validation("empty memory limit".into()));
    }
    let (digits, multiplier) = match s.chars().last() {
        Some(c) if c.eq_ignore_ascii_case(&'K') => (&s[..s.len() - 1], 1i64 << 10),
        Some(c) if c.eq_ignore_ascii_case(&'M') => (&s[..s.len() - 1], 1i64 << 20),
        Some(c) if c.eq_ignore_ascii_case(&'G') => (&s[..s.len() - 1], 1i64 << 30),
        Some(c) if c.eq_ignore_ascii_case(&'T') => (&s[..s.len() - 1], 1i64 << 40),
        _ => (s, 1),
    };
    let value: i64 = digits
        .parse()
        .map_err(|_| Error::Validation(format!("invalid memory limit: {s:?}")))?;
    if value <= 0 {
        return Err(Error::Validation(format!("memory limit must be positive: {s:?}")));
    }
    value
        .checked_mul(multiplier)
        .ok_or_else(|| Error::Validation(format!("memory limit overflows: {s:?}")))
}

/// Convert fractional CPU cores into the daemon's nano-CPU unit.
pub fn nano_cpus(cores: f64) -> i64 {
    (cores * 1e9) as i64
}

#[cfg(test)]
#[path = "limits_tests.rs"]
mod tests;
