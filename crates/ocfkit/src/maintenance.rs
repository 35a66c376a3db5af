// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Background maintenance loop.
//!
//! A single thread ticks every two seconds and classifies the directory
//! into three disjoint lists: idle devices to evict, devices that stopped
//! answering discovery, and devices with missing metadata. A device
//! classified idle is excluded from the other two lists for that tick.
//! Eviction happens under the registry lock; metadata fetches and
//! not-responding events run outside it.
//!
//! Shutdown is cooperative: `stop()` wakes the timed condition wait and
//! joins, and dropping the task does the same.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::config::FrameworkConfig;
use crate::device::EntryRef;
use crate::framework::FrameworkInner;
use crate::time::now_ms;

/// Disjoint classification of one maintenance tick.
pub(crate) struct TickLists {
    /// Unopened long enough to evict.
    pub idle: Vec<EntryRef>,
    /// Newly silent; the indication flag was flipped during
    /// classification.
    pub not_responding: Vec<EntryRef>,
    /// At least one metadata kind still missing.
    pub incomplete: Vec<EntryRef>,
}

/// Classify a directory snapshot at `now_ms`.
///
/// An entry is idle when it is unopened, past the idle threshold since its
/// last close, and not pinned by a security workflow or an outstanding
/// observe subscription. Idle entries are excluded from the other lists.
pub(crate) fn classify_devices(
    devices: &[EntryRef],
    now_ms: u64,
    config: &FrameworkConfig,
) -> TickLists {
    let mut lists = TickLists {
        idle: Vec::new(),
        not_responding: Vec::new(),
        incomplete: Vec::new(),
    };

    for entry in devices {
        let mut details = entry.lock().unwrap_or_else(|e| e.into_inner());

        if details.open_count == 0
            && now_ms.saturating_sub(details.last_close_time_ms) > config.idle_eviction_after_ms
            && !details.security.started
            && details.active_observe_count == 0
        {
            lists.idle.push(Arc::clone(entry));
            continue; // about to be deleted
        }

        if !details.not_responding_indicated
            && now_ms.saturating_sub(details.last_discovery_response_ms)
                > config.not_responding_after_ms
        {
            details.not_responding_indicated = true;
            lists.not_responding.push(Arc::clone(entry));
        }

        if details.metadata_incomplete() {
            lists.incomplete.push(Arc::clone(entry));
        }
    }

    lists
}

impl FrameworkInner {
    /// One maintenance pass over the directory.
    pub(crate) fn run_maintenance_tick(&self, now_ms: u64) {
        let devices = self.registry.snapshot_devices();
        let lists = classify_devices(&devices, now_ms, &self.config);

        for entry in &lists.idle {
            let device_id = {
                let details = entry.lock().unwrap_or_else(|e| e.into_inner());
                details.device_id.clone()
            };
            // Conditions re-checked under the lock: an open, observe, or
            // access request since classification cancels the eviction.
            self.registry.evict_if(&device_id, |details| {
                details.open_count == 0
                    && now_ms.saturating_sub(details.last_close_time_ms)
                        > self.config.idle_eviction_after_ms
                    && !details.security.started
                    && details.active_observe_count == 0
            });
        }

        for entry in &lists.incomplete {
            self.fetch_common_resources(entry);
        }

        for entry in &lists.not_responding {
            let (info, resource_types) = {
                let details = entry.lock().unwrap_or_else(|e| e.into_inner());
                (details.device_info.clone(), details.resource_types.clone())
            };
            self.notify_discovered(false, false, &info, &resource_types);
        }
    }
}

struct StopSignal {
    stopping: Mutex<bool>,
    cv: Condvar,
}

impl StopSignal {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            stopping: Mutex::new(false),
            cv: Condvar::new(),
        })
    }

    fn request(&self) {
        let mut stopping = self.stopping.lock();
        *stopping = true;
        self.cv.notify_all();
    }

    fn is_stopping(&self) -> bool {
        *self.stopping.lock()
    }

    /// Sleep until the next tick or a stop request. Returns true when
    /// stopping.
    fn wait_for_tick(&self, period: Duration) -> bool {
        let mut stopping = self.stopping.lock();
        if *stopping {
            return true;
        }
        self.cv.wait_for(&mut stopping, period);
        *stopping
    }
}

/// Owned handle of the maintenance thread.
pub(crate) struct MaintenanceTask {
    handle: Option<JoinHandle<()>>,
    stop: Arc<StopSignal>,
}

impl MaintenanceTask {
    /// Spawn the loop over the shared framework state.
    pub(crate) fn spawn(inner: Arc<FrameworkInner>) -> Self {
        let stop = StopSignal::new();
        let stop_clone = Arc::clone(&stop);

        let handle = thread::spawn(move || maintenance_loop(&inner, &stop_clone));

        Self {
            handle: Some(handle),
            stop,
        }
    }

    /// Wake the loop and wait for it to exit.
    pub(crate) fn shutdown(mut self) {
        self.stop.request();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for MaintenanceTask {
    fn drop(&mut self) {
        self.stop.request();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn maintenance_loop(inner: &FrameworkInner, stop: &StopSignal) {
    log::debug!("[maintenance] loop started");

    loop {
        if stop.is_stopping() {
            break;
        }
        inner.run_maintenance_tick(now_ms());
        if stop.wait_for_tick(inner.config.maintenance_tick) {
            break;
        }
    }

    log::debug!("[maintenance] loop exited");
}
