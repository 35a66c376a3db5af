// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Per-device directory entry.
//!
//! One [`DeviceEntry`] aggregates everything the framework knows about a
//! discovered device: identity, host URIs, resource table, metadata
//! availability, liveness timestamps, and security sub-state. Entries are
//! shared between the primary map, the URI index, and in-flight callbacks
//! as `Arc<Mutex<..>>`; the registry lock is always taken before an entry
//! lock, never after.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::proto::{MotDevice, Resource};

/// Shared handle to a directory entry.
pub(crate) type EntryRef = Arc<Mutex<DeviceEntry>>;

/// Device metadata assembled from discovery and the device-info resource.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Stable device id (UUID text).
    pub device_id: String,
    /// Host URIs the device answered from, discovery order, de-duplicated.
    pub device_uris: Vec<String>,
    /// Human-readable device name (`n`).
    pub device_name: String,
    /// Software version (`icv`).
    pub device_software_version: String,
    /// Data model versions (`dmv`).
    pub data_model_versions: Vec<String>,
    /// Protocol independent id (`piid`).
    pub protocol_independent_id: String,
}

/// Platform metadata from the platform-info resource, one field per
/// well-known key.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlatformInfo {
    /// `pi`
    pub platform_id: String,
    /// `mnmn`
    pub manufacturer_name: String,
    /// `mnml`
    pub manufacturer_url: String,
    /// `mnmo`
    pub model_number: String,
    /// `mndt`
    pub manufacturing_date: String,
    /// `mnpv`
    pub platform_version: String,
    /// `mnos`
    pub os_version: String,
    /// `mnhw`
    pub hardware_version: String,
    /// `mnfv`
    pub firmware_version: String,
    /// `mnsl`
    pub manufacturer_support_url: String,
    /// `st`
    pub reference_time: String,
}

impl PlatformInfo {
    /// Fields in [`crate::config::PLATFORM_KEYS`] order, for bulk
    /// population from a representation.
    pub(crate) fn fields_mut(&mut self) -> [&mut String; 11] {
        [
            &mut self.platform_id,
            &mut self.manufacturer_name,
            &mut self.manufacturer_url,
            &mut self.model_number,
            &mut self.manufacturing_date,
            &mut self.platform_version,
            &mut self.os_version,
            &mut self.hardware_version,
            &mut self.firmware_version,
            &mut self.manufacturer_support_url,
            &mut self.reference_time,
        ]
    }
}

/// Rendezvous between a security worker and the transfer-completion
/// callback. `signal` is also how `stop()` releases a stuck worker.
pub(crate) struct CompletionSignal {
    done: parking_lot::Mutex<bool>,
    cv: parking_lot::Condvar,
}

impl CompletionSignal {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            done: parking_lot::Mutex::new(false),
            cv: parking_lot::Condvar::new(),
        })
    }

    /// Arm the signal for a fresh wait.
    pub(crate) fn reset(&self) {
        *self.done.lock() = false;
    }

    /// Mark completion and wake every waiter.
    pub(crate) fn signal(&self) {
        let mut done = self.done.lock();
        *done = true;
        self.cv.notify_all();
    }

    /// Wait until signalled or `timeout` elapses. Returns true when the
    /// signal fired.
    pub(crate) fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut done = self.done.lock();
        while !*done {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            if self.cv.wait_for(&mut done, deadline - now).timed_out() && !*done {
                return false;
            }
        }
        true
    }
}

/// Security sub-state of one entry.
pub(crate) struct SecurityState {
    /// True from `request_access` until shutdown drain; enforces
    /// at-most-one workflow per device.
    pub started: bool,
    /// True once the application is enrolled as a subowner.
    pub subowner: bool,
    /// True once the MOT probe returned a usable handle.
    pub info_available: bool,
    /// MOT handle from the discovery probe.
    pub device: Option<Arc<dyn MotDevice>>,
    /// Worker task handle, joined by the shutdown drain.
    pub worker: Option<JoinHandle<()>>,
    /// Completion rendezvous for the transfer handshake.
    pub completion: Arc<CompletionSignal>,
}

impl Default for SecurityState {
    fn default() -> Self {
        Self {
            started: false,
            subowner: false,
            info_available: false,
            device: None,
            worker: None,
            completion: CompletionSignal::new(),
        }
    }
}

/// Everything known about one discovered device.
pub(crate) struct DeviceEntry {
    /// Stable device id; immutable after creation.
    pub device_id: String,
    /// Host URIs, discovery order, de-duplicated.
    pub device_uris: Vec<String>,
    /// Resource path -> engine handle.
    pub resources: BTreeMap<String, Arc<dyn Resource>>,
    /// Union of resource types across all resources.
    pub resource_types: Vec<String>,
    /// Union of resource interfaces across all resources.
    pub resource_interfaces: Vec<String>,

    pub device_info: DeviceInfo,
    pub device_info_available: bool,
    pub device_info_requests: u32,

    pub platform_info: PlatformInfo,
    pub platform_info_available: bool,
    pub platform_info_requests: u32,

    pub maintenance_resource_available: bool,
    pub maintenance_resource_requests: u32,

    /// Open handles held by the application.
    pub open_count: u32,
    /// When `open_count` last returned to zero, ms.
    pub last_close_time_ms: u64,
    /// Last discovery response, ms.
    pub last_discovery_response_ms: u64,
    /// Set once a not-responding event has been delivered; cleared by the
    /// next discovery response.
    pub not_responding_indicated: bool,
    /// Last successful ping dispatch, ms.
    pub last_ping_time_ms: u64,

    pub security: SecurityState,

    /// Observe subscriptions currently bound to this device's handles.
    /// Non-zero blocks eviction.
    pub active_observe_count: u32,
}

impl DeviceEntry {
    /// Fresh entry for a device first seen at `now_ms`. The device starts
    /// unopened, so the idle clock runs from discovery.
    pub(crate) fn new(device_id: &str, now_ms: u64) -> Self {
        let device_info = DeviceInfo {
            device_id: device_id.to_owned(),
            ..DeviceInfo::default()
        };

        Self {
            device_id: device_id.to_owned(),
            device_uris: Vec::new(),
            resources: BTreeMap::new(),
            resource_types: Vec::new(),
            resource_interfaces: Vec::new(),
            device_info,
            device_info_available: false,
            device_info_requests: 0,
            platform_info: PlatformInfo::default(),
            platform_info_available: false,
            platform_info_requests: 0,
            maintenance_resource_available: false,
            maintenance_resource_requests: 0,
            open_count: 0,
            last_close_time_ms: now_ms,
            last_discovery_response_ms: now_ms,
            not_responding_indicated: false,
            last_ping_time_ms: 0,
            security: SecurityState::default(),
            active_observe_count: 0,
        }
    }

    /// Append `uri` if unseen. Returns true when it was new.
    pub(crate) fn add_uri(&mut self, uri: &str) -> bool {
        if self.device_uris.iter().any(|u| u == uri) {
            return false;
        }
        self.device_uris.push(uri.to_owned());
        self.device_info.device_uris = self.device_uris.clone();
        true
    }

    /// Record a discovery response: refresh the liveness stamp and clear
    /// any pending not-responding indication.
    pub(crate) fn note_discovery_response(&mut self, now_ms: u64) {
        self.not_responding_indicated = false;
        self.last_discovery_response_ms = now_ms;
    }

    /// True when at least one metadata kind is still missing.
    pub(crate) fn metadata_incomplete(&self) -> bool {
        !self.device_info_available
            || !self.platform_info_available
            || !self.maintenance_resource_available
    }

    /// Resource handle for an operation: exact path match first, else the
    /// first resource carrying `resource_type`.
    pub(crate) fn find_resource(
        &self,
        resource_path: &str,
        resource_type: &str,
    ) -> Option<Arc<dyn Resource>> {
        if let Some(resource) = self.resources.get(resource_path) {
            return Some(Arc::clone(resource));
        }

        self.resources
            .values()
            .find(|resource| {
                resource
                    .resource_types()
                    .iter()
                    .any(|rt| rt == resource_type)
            })
            .map(Arc::clone)
    }
}

/// Append the strings from `source` that `target` does not hold yet.
/// Returns true when anything was added.
pub(crate) fn add_new_strings(target: &mut Vec<String>, source: &[String]) -> bool {
    let mut added = false;
    for item in source {
        if !target.iter().any(|existing| existing == item) {
            target.push(item.clone());
            added = true;
        }
    }
    added
}
