// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Framework lifecycle and public facade.
//!
//! [`Framework`] is the entry point: construct it with the injected
//! protocol capabilities, `start` it, register listeners, and drive
//! discovery and resource operations. `start`/`stop` are idempotent and
//! serialized by their own mutex; `stop` drains in-flight security workers
//! and joins the maintenance loop before returning.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, Weak};

use crate::config::{AppInfo, FrameworkConfig, PlatformConfig, QualityOfService, RoleMode};
use crate::device::{DeviceInfo, PlatformInfo};
use crate::listener::{CallbackInfoPtr, FrameworkListener, PinBuffer};
use crate::maintenance::MaintenanceTask;
use crate::proto::{
    LocalDeviceInfo, LocalPlatformInfo, OwnershipTransferMethod, PersistentStorage, PinHandle,
    ProtocolClient, Provisioning, Representation,
};
use crate::registry::Registry;
use crate::status::{ProtocolCode, Result, Status};

pub(crate) struct PinForwarders {
    input: PinHandle,
    display: PinHandle,
}

/// Shared framework state. Public operations live in `impl` blocks across
/// the component modules (discovery, dispatch, maintenance, access).
pub(crate) struct FrameworkInner {
    /// Self-reference handed to engine callback closures. `Weak` so that
    /// handlers retained by the engine never keep the framework alive.
    pub(crate) self_weak: Weak<FrameworkInner>,
    pub(crate) engine: Arc<dyn ProtocolClient>,
    pub(crate) provisioning: Arc<dyn Provisioning>,
    pub(crate) storage: Arc<dyn PersistentStorage>,
    pub(crate) config: FrameworkConfig,
    pub(crate) registry: Registry,
    started: AtomicBool,
    stopping: AtomicBool,
    maintenance: StdMutex<Option<MaintenanceTask>>,
    pin_forwarders: StdMutex<Option<PinForwarders>>,
    /// `start`/`stop` serialization. Separate from the registry lock and
    /// not reentrant; nothing under it calls back into `start` or `stop`.
    start_stop: parking_lot::Mutex<()>,
}

impl FrameworkInner {
    /// True while `stop` is tearing the framework down. Checked by the
    /// security workers and by `request_access`.
    pub(crate) fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::SeqCst)
    }

    /// Deliver a discovery event for `entry` outside the registry lock.
    /// The info/type copies must have been captured under the lock.
    pub(crate) fn notify_discovered(
        &self,
        responsive: bool,
        updated: bool,
        info: &DeviceInfo,
        resource_types: &[String],
    ) {
        for listener in self.registry.snapshot_listeners() {
            listener.device_discovered(responsive, updated, info, resource_types);
        }
    }
}

/// Client-side coordination layer for an OCF-style device framework.
///
/// Owns the device directory, the maintenance loop, and the security
/// workers. Cheap to clone through `Arc` internally; the facade itself is
/// `Send + Sync` and all methods take `&self`.
pub struct Framework {
    inner: Arc<FrameworkInner>,
}

impl Framework {
    /// Build a framework over the injected capabilities with default
    /// configuration.
    pub fn new(
        engine: Arc<dyn ProtocolClient>,
        provisioning: Arc<dyn Provisioning>,
        storage: Arc<dyn PersistentStorage>,
    ) -> Self {
        Self::with_config(engine, provisioning, storage, FrameworkConfig::default())
    }

    /// Build a framework with explicit configuration. Tests use this to
    /// shrink the maintenance and rendezvous intervals.
    pub fn with_config(
        engine: Arc<dyn ProtocolClient>,
        provisioning: Arc<dyn Provisioning>,
        storage: Arc<dyn PersistentStorage>,
        config: FrameworkConfig,
    ) -> Self {
        Self {
            inner: Arc::new_cyclic(|self_weak| FrameworkInner {
                self_weak: self_weak.clone(),
                engine,
                provisioning,
                storage,
                config,
                registry: Registry::new(),
                started: AtomicBool::new(false),
                stopping: AtomicBool::new(false),
                maintenance: StdMutex::new(None),
                pin_forwarders: StdMutex::new(None),
                start_stop: parking_lot::Mutex::new(()),
            }),
        }
    }

    /// Start the framework: configure the engine as client and server,
    /// initialize the provisioning database, register the application's
    /// device and platform identity (skipped in unit-test mode), install
    /// the global PIN forwarders, and spawn the maintenance loop.
    ///
    /// Idempotent: a second `start` without an intervening `stop` is a
    /// no-op `Ok`.
    pub fn start(&self, app_info: &AppInfo, unit_test_mode: bool) -> Result<()> {
        let inner = &self.inner;
        let _guard = inner.start_stop.lock();

        if inner.started.load(Ordering::SeqCst) {
            return Ok(());
        }

        let platform = PlatformConfig {
            // Server mode is required for security provisioning.
            mode: RoleMode::Both,
            // Bind all interfaces on an ephemeral port.
            address: "0.0.0.0".to_owned(),
            port: 0,
            qos: QualityOfService::Default,
            storage: Arc::clone(&inner.storage),
        };
        if inner.engine.configure(platform) != ProtocolCode::Ok {
            log::warn!("[framework] engine configuration failed");
            return Err(Status::Fail);
        }

        if inner.provisioning.provision_init("") != ProtocolCode::Ok {
            log::warn!("[framework] provision_init failed");
            return Err(Status::Fail);
        }

        if !unit_test_mode {
            let platform_info = LocalPlatformInfo {
                platform_id: String::new(),
                manufacturer_name: app_info.company_name.clone(),
                manufacturer_url: String::new(),
            };
            if inner.engine.register_platform_info(platform_info) != ProtocolCode::Ok {
                return Err(Status::Fail);
            }

            let device_info = LocalDeviceInfo {
                name: app_info.name.clone(),
                software_version: app_info.software_version.clone(),
            };
            if inner.engine.register_device_info(device_info) != ProtocolCode::Ok {
                return Err(Status::Fail);
            }
        }

        self.register_pin_forwarders();

        let task = MaintenanceTask::spawn(Arc::clone(inner));
        *inner
            .maintenance
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = Some(task);

        inner.started.store(true, Ordering::SeqCst);
        log::info!("[framework] started (unit_test_mode={})", unit_test_mode);
        Ok(())
    }

    /// Stop the framework: drain in-flight security workers, deregister
    /// the PIN forwarders, and join the maintenance loop. The device
    /// directory survives a stop; a later `start` sees the old entries.
    ///
    /// Idempotent: `stop` without a preceding `start` is a no-op `Ok`.
    pub fn stop(&self) -> Result<()> {
        let inner = &self.inner;
        let _guard = inner.start_stop.lock();

        if !inner.started.load(Ordering::SeqCst) {
            return Ok(());
        }

        inner.drain_security_workers();

        if let Some(forwarders) = inner
            .pin_forwarders
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            inner
                .provisioning
                .deregister_input_pin_handler(forwarders.input);
            inner
                .provisioning
                .deregister_display_pin_handler(forwarders.display);
        }

        inner.stopping.store(true, Ordering::SeqCst);

        if let Some(task) = inner
            .maintenance
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            task.shutdown();
        }

        inner.stopping.store(false, Ordering::SeqCst);
        inner.started.store(false, Ordering::SeqCst);
        log::info!("[framework] stopped");
        Ok(())
    }

    /// Register an application listener. Events are delivered in
    /// registration order.
    pub fn register_listener(&self, listener: Arc<dyn FrameworkListener>) {
        self.inner.registry.register_listener(listener);
    }

    /// Remove a listener. It receives no events after the in-flight
    /// delivery snapshots drain.
    pub fn unregister_listener(&self, listener: &Arc<dyn FrameworkListener>) {
        self.inner.registry.unregister_listener(listener);
    }

    /// Number of devices currently in the directory.
    pub fn device_count(&self) -> usize {
        self.inner.registry.device_count()
    }

    /// Install the global input/display PIN forwarders with the
    /// provisioning stack. Random-PIN prompts originate from the stack
    /// itself, not from a particular access request, so the forwarders
    /// bridge them onto the listener bus.
    fn register_pin_forwarders(&self) {
        let inner = &self.inner;

        let weak = Arc::downgrade(inner);
        let input = inner.provisioning.register_input_pin_handler(Arc::new(
            move |device: &uuid::Uuid, pin: &mut PinBuffer| {
                let Some(inner) = weak.upgrade() else { return };
                let device_id = device.to_string();
                let ctx = crate::listener::CallbackInfo::new(
                    crate::listener::OperationKind::PasswordInput,
                    device_id.clone(),
                    "",
                    "",
                    "",
                    0,
                );
                for listener in inner.registry.snapshot_listeners() {
                    listener.password_input_requested(
                        &device_id,
                        OwnershipTransferMethod::RandomDevicePin,
                        pin,
                        &ctx,
                    );
                }
            },
        ));

        let weak = Arc::downgrade(inner);
        let display = inner
            .provisioning
            .register_display_pin_handler(Arc::new(move |pin: &str| {
                let Some(inner) = weak.upgrade() else { return };
                let ctx = crate::listener::CallbackInfo::new(
                    crate::listener::OperationKind::PasswordDisplay,
                    "",
                    "",
                    "",
                    "",
                    0,
                );
                for listener in inner.registry.snapshot_listeners() {
                    // The stack does not say which device generated the
                    // PIN; the device id is left empty.
                    listener.password_display(
                        "",
                        OwnershipTransferMethod::RandomDevicePin,
                        pin,
                        &ctx,
                    );
                }
            }));

        *inner
            .pin_forwarders
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = Some(PinForwarders { input, display });
    }

    // ====================================================================
    // Discovery (C4)
    // ====================================================================

    /// Query a known host for all of its resources.
    pub fn discover_all_on_host(&self, host: &str) -> Result<()> {
        self.inner.discover_all_on_host(host)
    }

    /// Multicast a discovery query per resource type. An empty type string
    /// queries without a filter.
    pub fn discover_by_types(&self, resource_types: &[String]) -> Result<()> {
        self.inner.discover_by_types(resource_types)
    }

    // ====================================================================
    // Resource operations (C5)
    // ====================================================================

    /// Issue a get; terminal event `get_complete`.
    pub fn get_properties(&self, ctx: &CallbackInfoPtr) -> Result<()> {
        self.inner.dispatch_operation(ctx, None)
    }

    /// Issue a set; terminal event `set_complete`.
    pub fn set_properties(&self, ctx: &CallbackInfoPtr, rep: &Representation) -> Result<()> {
        self.inner.dispatch_operation(ctx, Some(rep))
    }

    /// Issue a create; terminal event `create_complete`.
    pub fn create_resource(&self, ctx: &CallbackInfoPtr, rep: &Representation) -> Result<()> {
        self.inner.dispatch_operation(ctx, Some(rep))
    }

    /// Issue a delete; terminal event `delete_complete`.
    pub fn delete_resource(&self, ctx: &CallbackInfoPtr) -> Result<()> {
        self.inner.dispatch_operation(ctx, None)
    }

    /// Start an observe subscription; events arrive as `observe_update`
    /// until [`stop_observe`](Self::stop_observe).
    pub fn observe(&self, ctx: &CallbackInfoPtr) -> Result<()> {
        self.inner.dispatch_operation(ctx, None)
    }

    /// Cancel the observe subscription bound to `ctx`.
    pub fn stop_observe(&self, ctx: &CallbackInfoPtr) -> Result<()> {
        self.inner.stop_observe(ctx)
    }

    /// Probe a device's liveness with a typed discovery query.
    pub fn ping(&self, device_id: &str) -> Result<()> {
        self.inner.ping(device_id)
    }

    /// Millisecond timestamp of the last successful ping dispatch.
    pub fn last_ping_time(&self, device_id: &str) -> Result<u64> {
        self.inner.last_ping_time(device_id)
    }

    /// Whether the resource at `resource_path` supports observe.
    pub fn is_observable(&self, device_id: &str, resource_path: &str) -> Result<bool> {
        self.inner.is_observable(device_id, resource_path)
    }

    /// Record an application open of the device.
    pub fn device_open(&self, device_id: &str) -> Result<()> {
        self.inner.device_open(device_id)
    }

    /// Record an application close of the device. When the open count
    /// returns to zero the idle-eviction clock starts.
    pub fn device_close(&self, device_id: &str) -> Result<()> {
        self.inner.device_close(device_id)
    }

    /// Copy of the device metadata. `InformationNotAvailable` until the
    /// device-info resource has been received.
    pub fn device_info(&self, device_id: &str) -> Result<DeviceInfo> {
        self.inner.copy_device_info(device_id)
    }

    /// Copy of the platform metadata. `InformationNotAvailable` until the
    /// platform-info resource has been received.
    pub fn platform_info(&self, device_id: &str) -> Result<PlatformInfo> {
        self.inner.copy_platform_info(device_id)
    }

    /// Resource paths on a device, optionally filtered by interface and
    /// type.
    pub fn resource_paths(
        &self,
        device_id: &str,
        resource_interface: &str,
        resource_type: &str,
    ) -> Result<Vec<String>> {
        self.inner
            .copy_resource_paths(device_id, resource_interface, resource_type)
    }

    /// Types or interfaces of one resource, or of the whole device when
    /// `resource_path` is empty.
    pub fn resource_info(
        &self,
        device_id: &str,
        resource_path: &str,
        kind: crate::dispatch::ResourceInfoKind,
    ) -> Result<Vec<String>> {
        self.inner.copy_resource_info(device_id, resource_path, kind)
    }

    // ====================================================================
    // Security access (C7)
    // ====================================================================

    /// Enroll the application as a subowner of `device_id`. Terminal event
    /// `request_access_complete`; at most one workflow per device may be
    /// in flight.
    pub fn request_access(
        &self,
        device_id: &str,
        ctx: &CallbackInfoPtr,
        pin_ctx: &CallbackInfoPtr,
    ) -> Result<()> {
        crate::access::request_access(&self.inner, device_id, ctx, pin_ctx)
    }

    /// Whether an access workflow has obtained the device's security
    /// information (the ownership-transfer probe returned a handle).
    pub fn security_info_available(&self, device_id: &str) -> Result<bool> {
        self.inner.security_info_available(device_id)
    }
}

impl Drop for Framework {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}
