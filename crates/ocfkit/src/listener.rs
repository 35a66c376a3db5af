// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Application listener traits and per-operation context.
//!
//! Listeners provide callback-based notification for discovery, operation
//! completion, observe updates, and security PIN exchange.
//!
//! # Thread Safety
//!
//! Listeners are called from background threads (engine callbacks, the
//! maintenance loop, security workers). They must be `Send + Sync` and may
//! re-enter any public framework API: delivery always happens from a
//! snapshot taken under the registry lock and invoked after the lock is
//! released, so re-entry cannot deadlock.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::config::MAX_PRECONFIG_PIN_LEN;
use crate::device::DeviceInfo;
use crate::proto::{OwnershipTransferMethod, Representation, Resource};
use crate::status::Status;

/// Operation a [`CallbackInfo`] is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    /// Get request; terminal event `get_complete`.
    Get,
    /// Set request; terminal event `set_complete`.
    Set,
    /// Create request; terminal event `create_complete`.
    Create,
    /// Delete request; terminal event `delete_complete`.
    Delete,
    /// Observe subscription; events `observe_update` until cancelled.
    Observe,
    /// Security access request; terminal event `request_access_complete`.
    RequestAccess,
    /// PIN prompt context handed back in `password_input_requested`.
    PasswordInput,
    /// PIN display context handed back in `password_display`.
    PasswordDisplay,
}

/// Per-operation context attached to a pending request.
///
/// Created by the application, handed to the dispatcher, and returned
/// verbatim in every callback for the operation. The dispatcher pins the
/// resolved resource handle here on observe so cancellation targets the
/// exact subscription.
pub struct CallbackInfo {
    kind: OperationKind,
    device_id: String,
    resource_path: String,
    resource_type: String,
    resource_interface: String,
    /// Application-opaque correlation token.
    token: u64,
    bound_resource: Mutex<Option<Arc<dyn Resource>>>,
    request_sent_ms: AtomicU64,
}

/// Shared reference to a [`CallbackInfo`].
pub type CallbackInfoPtr = Arc<CallbackInfo>;

impl CallbackInfo {
    /// Build a context for an operation against `device_id`.
    pub fn new(
        kind: OperationKind,
        device_id: impl Into<String>,
        resource_path: impl Into<String>,
        resource_type: impl Into<String>,
        resource_interface: impl Into<String>,
        token: u64,
    ) -> CallbackInfoPtr {
        Arc::new(Self {
            kind,
            device_id: device_id.into(),
            resource_path: resource_path.into(),
            resource_type: resource_type.into(),
            resource_interface: resource_interface.into(),
            token,
            bound_resource: Mutex::new(None),
            request_sent_ms: AtomicU64::new(0),
        })
    }

    /// Operation this context belongs to.
    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    /// Target device id.
    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// Requested resource path (may be empty).
    pub fn resource_path(&self) -> &str {
        &self.resource_path
    }

    /// Requested resource type (may be empty).
    pub fn resource_type(&self) -> &str {
        &self.resource_type
    }

    /// Requested resource interface (may be empty).
    pub fn resource_interface(&self) -> &str {
        &self.resource_interface
    }

    /// Application-opaque correlation token.
    pub fn token(&self) -> u64 {
        self.token
    }

    /// Resource handle pinned by an observe dispatch, if any.
    pub fn bound_resource(&self) -> Option<Arc<dyn Resource>> {
        self.bound_resource
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Millisecond timestamp of the dispatch, zero before dispatch.
    pub fn request_sent_ms(&self) -> u64 {
        self.request_sent_ms.load(Ordering::Relaxed)
    }

    pub(crate) fn bind_resource(&self, resource: Arc<dyn Resource>) {
        *self
            .bound_resource
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = Some(resource);
    }

    pub(crate) fn take_bound_resource(&self) -> Option<Arc<dyn Resource>> {
        self.bound_resource
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
    }

    pub(crate) fn mark_sent(&self, now_ms: u64) {
        self.request_sent_ms.store(now_ms, Ordering::Relaxed);
    }
}

impl std::fmt::Debug for CallbackInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackInfo")
            .field("kind", &self.kind)
            .field("device_id", &self.device_id)
            .field("resource_path", &self.resource_path)
            .field("token", &self.token)
            .finish()
    }
}

/// Bounded PIN buffer filled by the application during a PIN prompt.
///
/// Capacity matches the longest PIN the transfer primitive accepts; an
/// over-long PIN is rejected at `set` time so the failure surfaces in the
/// prompting listener rather than deep in the security worker.
#[derive(Debug)]
pub struct PinBuffer {
    value: String,
    capacity: usize,
}

impl PinBuffer {
    /// Empty buffer with the default PIN capacity.
    pub fn new() -> Self {
        Self::with_capacity(MAX_PRECONFIG_PIN_LEN)
    }

    /// Empty buffer with an explicit capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            value: String::new(),
            capacity,
        }
    }

    /// Store a PIN. Returns false (leaving the buffer unchanged) when the
    /// PIN exceeds the capacity.
    pub fn set(&mut self, pin: &str) -> bool {
        if pin.len() > self.capacity {
            return false;
        }
        self.value.clear();
        self.value.push_str(pin);
        true
    }

    /// Stored PIN, empty until `set`.
    pub fn as_str(&self) -> &str {
        &self.value
    }

    /// True when no PIN has been stored.
    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }

    /// Buffer capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for PinBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Listener for framework events.
///
/// All methods have default no-op implementations; applications override
/// the events they care about and register the listener with
/// [`Framework::register_listener`](crate::Framework::register_listener).
///
/// Callbacks should return quickly; long work belongs on an application
/// thread.
pub trait FrameworkListener: Send + Sync {
    /// A device responded to discovery (`responsive == true`) or stopped
    /// responding (`responsive == false`). `updated` reports whether
    /// anything observable about the device changed since the last event.
    fn device_discovered(
        &self,
        responsive: bool,
        updated: bool,
        info: &DeviceInfo,
        resource_types: &[String],
    ) {
        let _ = (responsive, updated, info, resource_types);
    }

    /// Terminal status of a get request.
    fn get_complete(&self, status: Status, rep: &Representation, ctx: &CallbackInfoPtr) {
        let _ = (status, rep, ctx);
    }

    /// Terminal status of a set request.
    fn set_complete(&self, status: Status, rep: &Representation, ctx: &CallbackInfoPtr) {
        let _ = (status, rep, ctx);
    }

    /// Terminal status of a create request.
    fn create_complete(&self, status: Status, rep: &Representation, ctx: &CallbackInfoPtr) {
        let _ = (status, rep, ctx);
    }

    /// Terminal status of a delete request.
    fn delete_complete(&self, status: Status, ctx: &CallbackInfoPtr) {
        let _ = (status, ctx);
    }

    /// One observe notification.
    fn observe_update(&self, status: Status, rep: &Representation, ctx: &CallbackInfoPtr) {
        let _ = (status, rep, ctx);
    }

    /// Terminal status of a security access request.
    fn request_access_complete(&self, status: Status, ctx: &CallbackInfoPtr) {
        let _ = (status, ctx);
    }

    /// The security workflow needs a PIN for `device_id`. Fill `pin` before
    /// returning; when several listeners are registered the last writer
    /// wins.
    fn password_input_requested(
        &self,
        device_id: &str,
        method: OwnershipTransferMethod,
        pin: &mut PinBuffer,
        ctx: &CallbackInfoPtr,
    ) {
        let _ = (device_id, method, pin, ctx);
    }

    /// The stack generated a PIN that should be shown to the user.
    fn password_display(
        &self,
        device_id: &str,
        method: OwnershipTransferMethod,
        pin: &str,
        ctx: &CallbackInfoPtr,
    ) {
        let _ = (device_id, method, pin, ctx);
    }
}
