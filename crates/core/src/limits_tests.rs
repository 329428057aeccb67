// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[parameterized(
    bare_bytes = { "1048576", 1_048_576 },
    kilo = { "512K", 512 * 1024 },
    mega = { "256M", 256 * 1024 * 1024 },
    giga = { "2G", 2 * 1024 * 1024 * 1024 },
    tera = { "1T", 1_i64 << 40 },
    lowercase = { "2g", 2 * 1024 * 1024 * 1024 },
    padded = { " 128M ", 128 * 1024 * 1024 },
)]
fn parses_valid_limits(input: &str, bytes: i64) {
    assert_eq!(parse_memory_limit(input).unwrap(), bytes);
}

#[parameterized(
    empty = { "" },
    words = { "lots" },
    negative = { "-5M" },
    zero = { "0" },
    fractional = { "1.5G" },
)]
fn rejects_invalid_limits(input: &str) {
    assert!(parse_memory_limit(input).is_err());
}

#[test]
fn nano_cpus_scales_cores() {
    assert_eq!(nano_cpus(1.0), 1_000_000_000);
    assert_eq!(nano_cpus(1.5), 1_500_000_000);
    assert_eq!(nano_cpus(0.25), 250_000_000);
}
