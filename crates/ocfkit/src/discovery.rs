// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Discovery and metadata acquisition.
//!
//! Two application entry points (`discover_all_on_host`,
//! `discover_by_types`) and three engine-driven response paths: resource
//! found, device info, platform info. Response handlers fold into the
//! registry under its lock and deliver listener events from a snapshot
//! after the lock is released.

use std::sync::Arc;

use crate::config::{
    DEVICE_URI, KEY_DATA_MODEL_VERSIONS, KEY_DEVICE_NAME, KEY_PROTOCOL_INDEPENDENT_ID,
    KEY_SOFTWARE_VERSION, MAX_METADATA_REQUESTS, PLATFORM_URI, RT_MAINTENANCE, WELL_KNOWN_URI,
};
use crate::device::EntryRef;
use crate::framework::FrameworkInner;
use crate::proto::{DiscoveryHandler, InfoHandler, PropertyKind, Representation, Resource};
use crate::status::{ProtocolCode, Result, Status};
use crate::time::now_ms;

impl FrameworkInner {
    /// Wildcard-resource query against a known host.
    pub(crate) fn discover_all_on_host(&self, host: &str) -> Result<()> {
        if self
            .engine
            .find_resource(host, WELL_KNOWN_URI, self.discovery_handler())
            != ProtocolCode::Ok
        {
            return Err(Status::Fail);
        }
        Ok(())
    }

    /// Multicast discovery, one query per resource type. An empty type
    /// string queries without an `rt=` filter.
    pub(crate) fn discover_by_types(&self, resource_types: &[String]) -> Result<()> {
        for resource_type in resource_types {
            let uri = if resource_type.is_empty() {
                WELL_KNOWN_URI.to_owned()
            } else {
                format!("{}?rt={}", WELL_KNOWN_URI, resource_type)
            };

            if self.engine.find_resource("", &uri, self.discovery_handler()) != ProtocolCode::Ok {
                return Err(Status::Fail);
            }
        }
        Ok(())
    }

    /// Handler routing engine discovery responses back into the registry.
    pub(crate) fn discovery_handler(&self) -> DiscoveryHandler {
        let weak = self.self_weak.clone();
        Arc::new(move |resource| {
            if let Some(inner) = weak.upgrade() {
                inner.on_resource_found(resource);
            }
        })
    }

    /// One discovered resource arrived from the engine.
    pub(crate) fn on_resource_found(&self, resource: Arc<dyn Resource>) {
        log::info!(
            "[discovery] resource found: sid [{}] uri [{}]",
            resource.sid(),
            resource.uri()
        );

        let outcome = self.registry.insert_or_update(&resource, now_ms());

        let (info, resource_types) = {
            let mut details = outcome
                .entry
                .lock()
                .unwrap_or_else(|e| e.into_inner());

            // A directory answer carrying the maintenance type completes
            // that metadata kind.
            if !details.maintenance_resource_available
                && resource.resource_types().iter().any(|rt| rt == RT_MAINTENANCE)
            {
                details.maintenance_resource_available = true;
            }

            (details.device_info.clone(), details.resource_types.clone())
        };

        if outcome.is_new {
            // Pull the rest of the device's directory and its common
            // resources; device info arrives in a follow-up event.
            let host = resource.host();
            if self.discover_all_on_host(&host).is_err() {
                log::warn!("[discovery] directory query failed for {}", host);
            }
            self.fetch_common_resources(&outcome.entry);
        }

        self.notify_discovered(true, outcome.changed, &info, &resource_types);
    }

    /// Issue fetches for whichever of device info, platform info, and the
    /// maintenance resource is still missing, each capped at three
    /// attempts. The per-kind counter increments on issue regardless of
    /// outcome.
    pub(crate) fn fetch_common_resources(&self, entry: &EntryRef) {
        let mut platform_target = None;
        let mut device_target = None;
        let mut maintenance_target = None;

        {
            let mut details = entry.lock().unwrap_or_else(|e| e.into_inner());
            if details.device_uris.is_empty() {
                return;
            }
            let first_uri = details.device_uris[0].clone();

            if !details.platform_info_available
                && details.platform_info_requests < MAX_METADATA_REQUESTS
            {
                details.platform_info_requests += 1;
                // Prefer the host the directory listed for /oic/p.
                platform_target = Some(
                    details
                        .find_resource(PLATFORM_URI, "")
                        .map(|r| r.host())
                        .unwrap_or_else(|| first_uri.clone()),
                );
            }

            if !details.device_info_available
                && details.device_info_requests < MAX_METADATA_REQUESTS
            {
                details.device_info_requests += 1;
                device_target = Some(
                    details
                        .find_resource(DEVICE_URI, "")
                        .map(|r| r.host())
                        .unwrap_or_else(|| first_uri.clone()),
                );
            }

            if !details.maintenance_resource_available
                && details.maintenance_resource_requests < MAX_METADATA_REQUESTS
            {
                details.maintenance_resource_requests += 1;
                maintenance_target = Some(first_uri);
            }
        }

        if let Some(host) = platform_target {
            let code = self
                .engine
                .get_platform_info(&host, PLATFORM_URI, self.platform_info_handler());
            if code != ProtocolCode::Ok {
                log::warn!("[discovery] get_platform_info failed for {}: {:?}", host, code);
            }
        }

        if let Some(host) = device_target {
            let code = self
                .engine
                .get_device_info(&host, DEVICE_URI, self.device_info_handler());
            if code != ProtocolCode::Ok {
                log::warn!("[discovery] get_device_info failed for {}: {:?}", host, code);
            }
        }

        if let Some(host) = maintenance_target {
            let uri = format!("{}?rt={}", WELL_KNOWN_URI, RT_MAINTENANCE);
            let code = self.engine.find_resource(&host, &uri, self.discovery_handler());
            if code != ProtocolCode::Ok {
                log::warn!(
                    "[discovery] maintenance resource query failed for {}: {:?}",
                    host,
                    code
                );
            }
        }
    }

    fn device_info_handler(&self) -> InfoHandler {
        let weak = self.self_weak.clone();
        Box::new(move |rep| {
            if let Some(inner) = weak.upgrade() {
                inner.on_device_info(rep);
            }
        })
    }

    fn platform_info_handler(&self) -> InfoHandler {
        let weak = self.self_weak.clone();
        Box::new(move |rep| {
            if let Some(inner) = weak.upgrade() {
                inner.on_platform_info(rep);
            }
        })
    }

    /// Device-info response. Located through the URI index; dropped when
    /// the host is unknown or the info was already populated.
    pub(crate) fn on_device_info(&self, rep: Representation) {
        let Some(entry) = self.registry.lookup_by_uri(rep.host()) else {
            log::warn!("[discovery] device info from unknown host: [{}]", rep.host());
            return;
        };

        let (info, resource_types, new_uri) = {
            let mut details = entry.lock().unwrap_or_else(|e| e.into_inner());

            if details.device_info_available {
                return; // processed before
            }

            if let Some(name) = rep.get_str(KEY_DEVICE_NAME) {
                details.device_info.device_name = name.to_owned();
            }
            if let Some(version) = rep.get_str(KEY_SOFTWARE_VERSION) {
                details.device_info.device_software_version = version.to_owned();
            }

            let new_uri = details.add_uri(rep.host());

            // Data model versions and the protocol independent id come
            // from the engine's generic property store, with the response
            // payload as fallback.
            details.device_info.data_model_versions = self
                .engine
                .property_value(PropertyKind::Device, KEY_DATA_MODEL_VERSIONS)
                .map(value_as_string_list)
                .filter(|versions| !versions.is_empty())
                .unwrap_or_else(|| rep.get_str_list(KEY_DATA_MODEL_VERSIONS));

            if let Some(piid) = self
                .engine
                .property_value(PropertyKind::Device, KEY_PROTOCOL_INDEPENDENT_ID)
                .and_then(|v| v.as_str().map(str::to_owned))
                .or_else(|| rep.get_str(KEY_PROTOCOL_INDEPENDENT_ID).map(str::to_owned))
            {
                details.device_info.protocol_independent_id = piid;
            }

            details.device_info_available = true;
            (
                details.device_info.clone(),
                details.resource_types.clone(),
                new_uri,
            )
        };

        // Index outside the entry lock; the registry lock is never taken
        // while an entry lock is held.
        if new_uri {
            self.registry.index_uri(rep.host(), &entry);
        }

        self.notify_discovered(true, true, &info, &resource_types);
    }

    /// Platform-info response. No listener event; the data is served by
    /// `platform_info` copies.
    pub(crate) fn on_platform_info(&self, rep: Representation) {
        let Some(entry) = self.registry.lookup_by_uri(rep.host()) else {
            log::warn!(
                "[discovery] platform info from unknown host: [{}]",
                rep.host()
            );
            return;
        };

        let mut details = entry.lock().unwrap_or_else(|e| e.into_inner());
        if details.platform_info_available {
            return; // multiple platform info received
        }

        for (key, field) in crate::config::PLATFORM_KEYS
            .iter()
            .zip(details.platform_info.fields_mut())
        {
            if let Some(value) = rep.get_str(key) {
                *field = value.to_owned();
            }
        }
        details.platform_info_available = true;
    }
}

fn value_as_string_list(value: serde_json::Value) -> Vec<String> {
    match value {
        serde_json::Value::String(s) => vec![s],
        serde_json::Value::Array(items) => items
            .into_iter()
            .filter_map(|v| v.as_str().map(str::to_owned))
            .collect(),
        _ => Vec::new(),
    }
}
