// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Injected protocol capabilities (SPI).
//!
//! The framework owns no sockets and no security database. Everything that
//! touches the wire or the credential store arrives through the traits in
//! this module, implemented by the hosting stack and handed to
//! [`Framework::start`](crate::Framework::start). Tests script them with
//! in-memory doubles.
//!
//! # Capability map
//!
//! ```text
//! ProtocolClient      discovery, device/platform info, registration
//! Resource            per-resource CRUD + observe handle
//! Provisioning        security DB init, MOT probe, PIN callback registry
//! MotDevice           multiple-ownership-transfer handle for one device
//! PersistentStorage   five-operation stdio capability for credentials
//! ```
//!
//! # Callback threading
//!
//! Response handlers are invoked from engine-owned threads. They must be
//! `Send` and must not assume the dispatching thread; the framework copies
//! whatever it needs into the closure.

use std::collections::BTreeMap;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use crate::config::PlatformConfig;
use crate::listener::PinBuffer;
use crate::status::ProtocolCode;

/// Response payload from a device, keyed by the well-known payload keys.
#[derive(Debug, Clone, Default)]
pub struct Representation {
    host: String,
    values: serde_json::Map<String, serde_json::Value>,
}

impl Representation {
    /// Create an empty representation originating from `host`.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            values: serde_json::Map::new(),
        }
    }

    /// Host URI the response arrived from.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Set a value for a payload key.
    pub fn set(&mut self, key: &str, value: impl Into<serde_json::Value>) -> &mut Self {
        self.values.insert(key.to_owned(), value.into());
        self
    }

    /// Raw value for a payload key.
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.values.get(key)
    }

    /// String value for a payload key, if present and a string.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.values.get(key).and_then(|v| v.as_str())
    }

    /// String-array value for a payload key. A bare string is returned as a
    /// one-element list.
    pub fn get_str_list(&self, key: &str) -> Vec<String> {
        match self.values.get(key) {
            Some(serde_json::Value::String(s)) => vec![s.clone()],
            Some(serde_json::Value::Array(items)) => items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_owned))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// All payload values.
    pub fn values(&self) -> &serde_json::Map<String, serde_json::Value> {
        &self.values
    }
}

/// Query parameters appended to a resource request (`rt=`, `if=`, ...).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams(BTreeMap<String, String>);

impl QueryParams {
    /// Empty query.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a key/value pair, replacing any previous value.
    pub fn insert(&mut self, key: &str, value: &str) {
        self.0.insert(key.to_owned(), value.to_owned());
    }

    /// Value for a key.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// True when no parameters are set.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

// ========================================================================
// Handler aliases
// ========================================================================

/// Per-resource discovery callback; invoked once per discovered resource.
pub type DiscoveryHandler = Arc<dyn Fn(Arc<dyn Resource>) + Send + Sync>;

/// Terminal callback for a device-info or platform-info fetch.
pub type InfoHandler = Box<dyn FnOnce(Representation) + Send>;

/// Terminal callback for a get request.
pub type ReadHandler = Box<dyn FnOnce(ProtocolCode, Representation) + Send>;

/// Terminal callback for a post (set/create) request.
pub type WriteHandler = Box<dyn FnOnce(ProtocolCode, Representation) + Send>;

/// Terminal callback for a delete request.
pub type DeleteHandler = Box<dyn FnOnce(ProtocolCode) + Send>;

/// Notification callback for an observe subscription; invoked per update
/// with the engine-assigned sequence number.
pub type ObserveHandler = Arc<dyn Fn(ProtocolCode, Representation, u32) + Send + Sync>;

/// Completion callback for an ownership transfer. The flag is true when the
/// transfer failed.
pub type TransferHandler = Box<dyn FnOnce(bool) + Send>;

/// Global random-PIN prompt installed at start; fills the buffer with the
/// PIN for `device`.
pub type InputPinHandler = Arc<dyn Fn(&Uuid, &mut PinBuffer) + Send + Sync>;

/// Global display-PIN forwarder installed at start.
pub type DisplayPinHandler = Arc<dyn Fn(&str) + Send + Sync>;

/// Opaque registration handle for a PIN callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PinHandle(pub u64);

// ========================================================================
// Engine-facing traits
// ========================================================================

/// Property namespace for [`ProtocolClient::property_value`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyKind {
    /// Device payload properties.
    Device,
    /// Platform payload properties.
    Platform,
}

/// Local device identity registered with the engine at start.
#[derive(Debug, Clone, Default)]
pub struct LocalDeviceInfo {
    /// Device name announced to peers.
    pub name: String,
    /// Software version announced to peers.
    pub software_version: String,
}

/// Local platform identity registered with the engine at start.
#[derive(Debug, Clone, Default)]
pub struct LocalPlatformInfo {
    /// Platform id (UUID text).
    pub platform_id: String,
    /// Manufacturer name.
    pub manufacturer_name: String,
    /// Manufacturer URL.
    pub manufacturer_url: String,
}

/// Client surface of the protocol engine.
///
/// `find_resource` multicasts when `host` is empty and unicasts otherwise;
/// `resource_uri` is the well-known directory path with an optional `?rt=`
/// filter already appended.
pub trait ProtocolClient: Send + Sync {
    /// Configure the engine as client and server. Called once per start.
    fn configure(&self, config: PlatformConfig) -> ProtocolCode;

    /// Issue a discovery query. Empty `host` means multicast.
    fn find_resource(&self, host: &str, resource_uri: &str, handler: DiscoveryHandler)
        -> ProtocolCode;

    /// Fetch the device-info resource of `host`.
    fn get_device_info(&self, host: &str, uri: &str, handler: InfoHandler) -> ProtocolCode;

    /// Fetch the platform-info resource of `host`.
    fn get_platform_info(&self, host: &str, uri: &str, handler: InfoHandler) -> ProtocolCode;

    /// Generic property lookup against the engine's payload store.
    fn property_value(&self, kind: PropertyKind, key: &str) -> Option<serde_json::Value>;

    /// Register the local device identity. Skipped in unit-test mode.
    fn register_device_info(&self, info: LocalDeviceInfo) -> ProtocolCode;

    /// Register the local platform identity. Skipped in unit-test mode.
    fn register_platform_info(&self, info: LocalPlatformInfo) -> ProtocolCode;
}

/// Handle to one discovered resource, owned by the protocol engine.
///
/// Handles are cheap to clone via `Arc` and stay valid after the owning
/// directory entry is evicted; operations on a stale handle fail at the
/// engine with a terminal code.
pub trait Resource: Send + Sync {
    /// Stable device id of the owning device.
    fn sid(&self) -> String;

    /// Resource path (e.g. `/oic/d`).
    fn uri(&self) -> String;

    /// Host URI the resource was discovered at.
    fn host(&self) -> String;

    /// Resource types carried by this resource.
    fn resource_types(&self) -> Vec<String>;

    /// Resource interfaces carried by this resource.
    fn resource_interfaces(&self) -> Vec<String>;

    /// True when the resource supports observe.
    fn is_observable(&self) -> bool;

    /// Issue a get.
    fn get(&self, query: &QueryParams, handler: ReadHandler) -> ProtocolCode;

    /// Issue a post. Carries both set and create semantics.
    fn post(
        &self,
        rep: &Representation,
        query: &QueryParams,
        handler: WriteHandler,
    ) -> ProtocolCode;

    /// Issue a delete.
    fn delete(&self, handler: DeleteHandler) -> ProtocolCode;

    /// Start an observe subscription.
    fn observe(&self, query: &QueryParams, handler: ObserveHandler) -> ProtocolCode;

    /// Cancel the observe subscription started on this handle.
    fn cancel_observe(&self) -> ProtocolCode;
}

/// Provisioning and ownership-transfer surface of the security stack.
pub trait Provisioning: Send + Sync {
    /// Initialize the credential database backing provisioning.
    fn provision_init(&self, db_path: &str) -> ProtocolCode;

    /// Synchronously probe for a multiple-owner-enabled device with the
    /// given UUID. `Ok(None)` means the probe completed without finding the
    /// device.
    fn discover_mot_device(
        &self,
        timeout: Duration,
        device: &Uuid,
    ) -> std::result::Result<Option<Arc<dyn MotDevice>>, ProtocolCode>;

    /// Install the global random-PIN prompt.
    fn register_input_pin_handler(&self, handler: InputPinHandler) -> PinHandle;

    /// Remove a previously installed random-PIN prompt.
    fn deregister_input_pin_handler(&self, handle: PinHandle);

    /// Install the global display-PIN forwarder.
    fn register_display_pin_handler(&self, handler: DisplayPinHandler) -> PinHandle;

    /// Remove a previously installed display-PIN forwarder.
    fn deregister_display_pin_handler(&self, handle: PinHandle);
}

/// Ownership-transfer method selected on a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OwnershipTransferMethod {
    /// Owner-assisted just-works transfer.
    JustWorks,
    /// Device generates and displays a random PIN.
    RandomDevicePin,
    /// Certificate-based transfer.
    ManufacturerCertificate,
    /// PIN preconfigured on the device out of band.
    PreconfiguredPin,
}

/// Multiple-ownership-transfer handle for one device, returned by the MOT
/// discovery probe.
pub trait MotDevice: Send + Sync {
    /// True when the calling application is already enrolled as a subowner.
    fn is_subowner(&self) -> std::result::Result<bool, ProtocolCode>;

    /// Transfer method currently selected on the device.
    fn selected_transfer_method(&self) -> OwnershipTransferMethod;

    /// Store the preconfigured PIN ahead of the transfer.
    fn add_preconfig_pin(&self, pin: &str) -> ProtocolCode;

    /// Start the ownership transfer. `on_complete` fires from an engine
    /// thread when the handshake terminates.
    fn do_ownership_transfer(&self, on_complete: TransferHandler) -> ProtocolCode;
}

// ========================================================================
// Persistent storage capability
// ========================================================================

/// Open mode for the storage capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageMode {
    /// Read-only.
    Read,
    /// Create or truncate for writing.
    Write,
    /// Read and write, created if absent.
    ReadWrite,
}

/// An open storage file. Closing happens on drop.
pub trait StorageFile: io::Read + io::Write + Send {}

impl<T: io::Read + io::Write + Send> StorageFile for T {}

/// Five-operation stdio capability the security database is stored
/// through: open, read, write, close (drop), unlink.
pub trait PersistentStorage: Send + Sync {
    /// Open `path` in the given mode.
    fn open(&self, path: &str, mode: StorageMode) -> io::Result<Box<dyn StorageFile>>;

    /// Remove `path`.
    fn unlink(&self, path: &str) -> io::Result<()>;
}
