// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Maintenance scheduler
//!
//! Fires the nightly routine at 04:00 America/New_York. The wall-clock math
//! comes from the timezone database, so spring/fall transitions shift the
//! UTC fire time automatically. A second task ticks at 00:00 UTC and re-arms
//! the maintenance sleep, keeping it honest across a DST boundary that falls
//! inside an armed sleep.

use crate::orchestrator::Orchestrator;
use chrono::{DateTime, Datelike, Duration as ChronoDuration, TimeZone, Timelike, Utc};
use chrono_tz::America::New_York;
use garcon_core::Clock;
use std::sync::Arc;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Local wall-clock hour of the nightly routine.
const MAINTENANCE_HOUR: u32 = 4;

/// Next 04:00 America/New_York strictly after `now`, as a UTC instant.
pub fn next_maintenance_fire(now: DateTime<Utc>) -> DateTime<Utc> {
    let local_now = now.with_timezone(&New_York);
    let mut date = local_now.date_naive();
    loop {
        // 04:00 exists on every civil day in this zone (transitions are at
        // 02:00); earliest() resolves the theoretical ambiguity.
        if let Some(candidate) = New_York
            .with_ymd_and_hms(date.year(), date.month(), date.day(), MAINTENANCE_HOUR, 0, 0)
            .earliest()
        {
            let candidate = candidate.with_timezone(&Utc);
            if candidate > now {
                return candidate;
            }
        }
        date += ChronoDuration::days(1);
    }
}

/// Next 00:00 UTC strictly after `now`.
pub fn next_utc_midnight(now: DateTime<Utc>) -> DateTime<Utc> {
    let today = now
        .with_hour(0)
        .and_then(|t| t.with_minute(0))
        .and_then(|t| t.with_second(0))
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(now);
    if today > now {
        today
    } else {
        today + ChronoDuration::days(1)
    }
}

/// Handle over the two scheduler tasks.
pub struct MaintenanceScheduler {
    cancel: CancellationToken,
}

impl MaintenanceScheduler {
    /// Spawn the maintenance loop and the midnight re-arm tick.
    pub fn start<C: Clock>(orchestrator: Arc<Orchestrator<C>>, clock: C) -> Self {
        let cancel = CancellationToken::new();
        let rearm = Arc::new(Notify::new());

        {
            let cancel = cancel.clone();
            let rearm = Arc::clone(&rearm);
            let clock = clock.clone();
            tokio::spawn(async move {
                loop {
                    let now = clock.now();
                    let fire_at = next_maintenance_fire(now);
                    let wait = (fire_at - now).to_std().unwrap_or_default();
                    debug!(fire_at = %fire_at, "maintenance armed");
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = rearm.notified() => continue, // recompute the offset
                        _ = tokio::time::sleep(wait) => {
                            info!("maintenance window start");
                            orchestrator.run_maintenance().await;
                        }
                    }
                }
                debug!("maintenance loop stopped");
            });
        }

        {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                loop {
                    let now = clock.now();
                    let wait = (next_utc_midnight(now) - now).to_std().unwrap_or_default();
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(wait) => rearm.notify_waiters(),
                    }
                }
                debug!("re-arm loop stopped");
            });
        }

        Self { cancel }
    }

    /// Stop both scheduled tasks.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

impl Drop for MaintenanceScheduler {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
