// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Device directory: primary map, URI index, and the listener list.
//!
//! One mutex guards all three jointly, so the URI index is never observed
//! out of sync with the primary map and listener registration is FIFO
//! consistent with event snapshots. There is no lock reentrancy: public
//! methods acquire the lock, `*_locked` helpers assume it is held, and no
//! helper calls back into a public method.
//!
//! Listener callbacks are never invoked under this lock. Callers take a
//! [`snapshot_listeners`](Registry::snapshot_listeners) copy, drop out of
//! the lock, and deliver from the snapshot.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::device::{add_new_strings, DeviceEntry, EntryRef};
use crate::listener::FrameworkListener;
use crate::proto::Resource;

/// Result of folding one discovery record into the directory.
pub(crate) struct UpsertOutcome {
    /// The (possibly new) entry.
    pub entry: EntryRef,
    /// True when the record created the entry.
    pub is_new: bool,
    /// True when anything observable changed: new resource, new URI, new
    /// type, or new interface.
    pub changed: bool,
}

struct RegistryInner {
    devices: HashMap<String, EntryRef>,
    by_uri: HashMap<String, EntryRef>,
    listeners: Vec<Arc<dyn FrameworkListener>>,
}

/// The device directory.
pub(crate) struct Registry {
    inner: Mutex<RegistryInner>,
}

impl Registry {
    pub(crate) fn new() -> Self {
        Self {
            inner: Mutex::new(RegistryInner {
                devices: HashMap::new(),
                by_uri: HashMap::new(),
                listeners: Vec::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RegistryInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Entry for a device id.
    pub(crate) fn lookup(&self, device_id: &str) -> Option<EntryRef> {
        self.lock().devices.get(device_id).map(Arc::clone)
    }

    /// Entry that answered from a host URI.
    pub(crate) fn lookup_by_uri(&self, uri: &str) -> Option<EntryRef> {
        self.lock().by_uri.get(uri).map(Arc::clone)
    }

    /// Fold one discovered resource into the directory.
    pub(crate) fn insert_or_update(
        &self,
        resource: &Arc<dyn Resource>,
        now_ms: u64,
    ) -> UpsertOutcome {
        let device_id = resource.sid();
        let resource_path = resource.uri();
        let host = resource.host();

        let mut inner = self.lock();

        let is_new = !inner.devices.contains_key(&device_id);
        let entry = if is_new {
            let entry: EntryRef = Arc::new(Mutex::new(DeviceEntry::new(&device_id, now_ms)));
            inner.devices.insert(device_id.clone(), Arc::clone(&entry));
            log::info!(
                "[registry] added device {} ({} known)",
                device_id,
                inner.devices.len()
            );
            entry
        } else {
            Arc::clone(&inner.devices[&device_id])
        };

        let mut changed = false;
        {
            let mut details = entry.lock().unwrap_or_else(|e| e.into_inner());
            details.note_discovery_response(now_ms);

            if !details.resources.contains_key(&resource_path) {
                changed = true; // new resource
            }
            details
                .resources
                .insert(resource_path, Arc::clone(resource));

            if details.add_uri(&host) {
                inner.by_uri.insert(host, Arc::clone(&entry));
                changed = true; // new device uri
            }

            if add_new_strings(&mut details.resource_types, &resource.resource_types()) {
                changed = true; // new resource type
            }
            if add_new_strings(
                &mut details.resource_interfaces,
                &resource.resource_interfaces(),
            ) {
                changed = true; // new resource interface
            }
        }

        UpsertOutcome {
            entry,
            is_new,
            changed,
        }
    }

    /// Register a host URI learned outside discovery (a metadata response
    /// from a previously unknown address).
    pub(crate) fn index_uri(&self, uri: &str, entry: &EntryRef) {
        let mut inner = self.lock();
        inner.by_uri.insert(uri.to_owned(), Arc::clone(entry));
    }

    /// Drop a device: erase each of its URIs from the index, then the
    /// entry itself. Returns false for an unknown id.
    pub(crate) fn evict(&self, device_id: &str) -> bool {
        self.evict_if(device_id, |_| true)
    }

    /// Drop a device if `predicate` still holds under the lock. The
    /// maintenance loop classifies on a snapshot, so the eviction
    /// conditions are re-checked here before anything is erased.
    pub(crate) fn evict_if(
        &self,
        device_id: &str,
        predicate: impl FnOnce(&DeviceEntry) -> bool,
    ) -> bool {
        let mut inner = self.lock();

        let Some(entry) = inner.devices.get(device_id).map(Arc::clone) else {
            return false;
        };

        let uris = {
            let details = entry.lock().unwrap_or_else(|e| e.into_inner());
            if !predicate(&details) {
                return false;
            }
            details.device_uris.clone()
        };
        for uri in &uris {
            inner.by_uri.remove(uri);
        }
        inner.devices.remove(device_id);

        log::info!("[registry] device deleted: {}", device_id);
        true
    }

    /// Copy of every entry handle, for maintenance scans.
    pub(crate) fn snapshot_devices(&self) -> Vec<EntryRef> {
        self.lock().devices.values().map(Arc::clone).collect()
    }

    /// Number of known devices.
    pub(crate) fn device_count(&self) -> usize {
        self.lock().devices.len()
    }

    /// True when a host URI is indexed.
    pub(crate) fn has_uri(&self, uri: &str) -> bool {
        self.lock().by_uri.contains_key(uri)
    }

    /// Append a listener. Delivery order is registration order.
    pub(crate) fn register_listener(&self, listener: Arc<dyn FrameworkListener>) {
        self.lock().listeners.push(listener);
    }

    /// Remove a listener by identity. A removed listener receives no
    /// further events once in-flight snapshots drain.
    pub(crate) fn unregister_listener(&self, listener: &Arc<dyn FrameworkListener>) {
        let mut inner = self.lock();
        if let Some(pos) = inner
            .listeners
            .iter()
            .position(|l| Arc::ptr_eq(l, listener))
        {
            inner.listeners.remove(pos);
        }
    }

    /// Copy of the listener list taken under the lock; invoke outside it.
    pub(crate) fn snapshot_listeners(&self) -> Vec<Arc<dyn FrameworkListener>> {
        self.lock().listeners.iter().map(Arc::clone).collect()
    }
}
