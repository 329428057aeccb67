// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn fake_clock_advances() {
    let clock = FakeClock::new();
    let t0 = clock.now();
    clock.advance(Duration::milliseconds(1500));
    assert_eq!(clock.now() - t0, Duration::milliseconds(1500));
}

#[test]
fn fake_clock_set() {
    let clock = FakeClock::new();
    let target = DateTime::from_timestamp_millis(1_800_000_000_123).unwrap();
    clock.set(target);
    assert_eq!(clock.now(), target);
}

#[test]
fn fake_clock_is_shared_across_clones() {
    let clock = FakeClock::new();
    let other = clock.clone();
    clock.advance(Duration::seconds(10));
    assert_eq!(clock.now(), other.now());
}

#[test]
fn system_clock_is_monotonic_enough() {
    let clock = SystemClock;
    let a = clock.now();
    let b = clock.now();
    assert!(b >= a);
}
