// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Security access orchestration (multiple ownership transfer).
//!
//! `request_access` spawns one worker per device:
//!
//! ```text
//! Preflight -> DiscoverMOT -> Preconfigure? -> Transfer -> AwaitCompletion
//! ```
//!
//! The worker blocks on the synchronous MOT probe (<= 5 s), on the
//! application PIN prompt, and on the transfer-completion rendezvous
//! (<= 30 s). At most one workflow runs per device; a second
//! `request_access` while one is in flight fails synchronously. The
//! shutdown drain signals every rendezvous and joins every worker, so
//! `stop()` never hangs on a stuck handshake.

use std::sync::Arc;
use std::thread;

use uuid::Uuid;

use crate::device::EntryRef;
use crate::framework::FrameworkInner;
use crate::listener::{CallbackInfoPtr, PinBuffer};
use crate::proto::{MotDevice, OwnershipTransferMethod, TransferHandler};
use crate::status::{map_protocol_code, ProtocolCode, Result, Status};

/// Start a subowner enrollment for `device_id`. Fails synchronously when
/// the framework is stopping, the device is unknown, or a workflow is
/// already running for the device.
pub(crate) fn request_access(
    inner: &Arc<FrameworkInner>,
    device_id: &str,
    ctx: &CallbackInfoPtr,
    pin_ctx: &CallbackInfoPtr,
) -> Result<()> {
    if inner.is_stopping() {
        return Err(Status::Fail);
    }

    let entry = inner
        .registry
        .lookup(device_id)
        .ok_or(Status::DeviceNotDiscovered)?;

    {
        let mut details = entry.lock().unwrap_or_else(|e| e.into_inner());
        if details.security.started {
            // An access request is already in progress for this device.
            return Err(Status::Fail);
        }
        details.security.started = true;
        details.security.completion.reset();
    }

    let worker_inner = Arc::clone(inner);
    let worker_entry = Arc::clone(&entry);
    let worker_device_id = device_id.to_owned();
    let worker_ctx = Arc::clone(ctx);
    let worker_pin_ctx = Arc::clone(pin_ctx);

    let handle = thread::spawn(move || {
        access_worker(
            &worker_inner,
            &worker_entry,
            &worker_device_id,
            &worker_ctx,
            &worker_pin_ctx,
        );
    });

    let mut details = entry.lock().unwrap_or_else(|e| e.into_inner());
    details.security.worker = Some(handle);
    Ok(())
}

fn access_worker(
    inner: &Arc<FrameworkInner>,
    entry: &EntryRef,
    device_id: &str,
    ctx: &CallbackInfoPtr,
    pin_ctx: &CallbackInfoPtr,
) {
    if let Err(status) = run_access(inner, entry, device_id, ctx, pin_ctx) {
        inner.notify_access_complete(status, ctx);
    }
    log::debug!("[access] worker finished for {}", device_id);
}

/// The workflow body. `Ok(())` means the terminal event has already been
/// delivered (already-subowner, or by the transfer-completion callback);
/// `Err` carries the terminal status the worker must still report.
fn run_access(
    inner: &Arc<FrameworkInner>,
    entry: &EntryRef,
    device_id: &str,
    ctx: &CallbackInfoPtr,
    pin_ctx: &CallbackInfoPtr,
) -> std::result::Result<(), Status> {
    // Preflight: nothing is attempted against a stopping framework.
    if inner.is_stopping() {
        return Err(Status::SecurityUpdateRequestFailed);
    }

    let uuid = Uuid::parse_str(device_id).map_err(|err| {
        log::warn!("[access] device id is not a uuid ({}): {}", device_id, err);
        Status::SecurityUpdateRequestFailed
    })?;

    // Synchronous MOT probe scoped to this device.
    let device: Arc<dyn MotDevice> = match inner
        .provisioning
        .discover_mot_device(inner.config.mot_discovery_timeout, &uuid)
    {
        Ok(Some(device)) => device,
        Ok(None) => {
            log::warn!("[access] no MOT-enabled device found for {}", device_id);
            return Err(Status::SecurityUpdateRequestFailed);
        }
        Err(code) => {
            log::warn!(
                "[access] MOT discovery failed for {}: {}",
                device_id,
                map_protocol_code(code)
            );
            return Err(Status::SecurityUpdateRequestFailed);
        }
    };

    let subowner = device.is_subowner().map_err(|code| {
        log::warn!(
            "[access] is_subowner failed for {}: {}",
            device_id,
            map_protocol_code(code)
        );
        Status::SecurityUpdateRequestFailed
    })?;

    // Record the probe outcome on the entry; the remaining steps and the
    // completion path work from the stored state.
    let (device, already_subowner, completion) = {
        let mut details = entry.lock().unwrap_or_else(|e| e.into_inner());
        details.security.device = Some(device);
        details.security.subowner = subowner;
        details.security.info_available = true;
        (
            details
                .security
                .device
                .clone()
                .ok_or(Status::SecurityUpdateRequestFailed)?,
            details.security.subowner,
            Arc::clone(&details.security.completion),
        )
    };

    if already_subowner {
        // Nothing to transfer; report success straight away.
        inner.notify_access_complete(Status::SecurityUpdateRequestFinished, ctx);
        return Ok(());
    }

    match device.selected_transfer_method() {
        OwnershipTransferMethod::RandomDevicePin => {
            // The stack prompts through the global input-PIN forwarder.
        }
        OwnershipTransferMethod::PreconfiguredPin => {
            let mut pin = PinBuffer::new();
            for listener in inner.registry.snapshot_listeners() {
                listener.password_input_requested(
                    device_id,
                    OwnershipTransferMethod::PreconfiguredPin,
                    &mut pin,
                    pin_ctx,
                );
            }

            if device.add_preconfig_pin(pin.as_str()) != ProtocolCode::Ok {
                log::warn!("[access] add_preconfig_pin failed for {}", device_id);
                return Err(Status::SecurityUpdateRequestFailed);
            }
        }
        other => {
            // Only random and preconfigured PIN are supported; the
            // selected method needs admin intervention.
            log::warn!(
                "[access] unsupported transfer method {:?} on {}",
                other,
                device_id
            );
            return Err(Status::SecurityUpdateRequestNotSupported);
        }
    }

    completion.reset();

    let on_complete: TransferHandler = {
        let weak = Arc::downgrade(inner);
        let device_id = device_id.to_owned();
        let ctx = Arc::clone(ctx);
        Box::new(move |error| {
            if let Some(inner) = weak.upgrade() {
                on_transfer_complete(&inner, &device_id, &ctx, error);
            }
        })
    };

    let code = device.do_ownership_transfer(on_complete);
    if code != ProtocolCode::Ok {
        log::warn!(
            "[access] ownership transfer dispatch failed for {}: {}",
            device_id,
            map_protocol_code(code)
        );
        return Err(Status::SecurityUpdateRequestFailed);
    }

    // Wait for the completion callback. A timeout or a stop request ends
    // the worker so the application can shut down cleanly.
    let signalled = completion.wait_timeout(inner.config.access_completion_timeout);
    if !signalled || inner.is_stopping() {
        log::warn!(
            "[access] completion wait ended without transfer result for {} (signalled={})",
            device_id,
            signalled
        );
        return Err(Status::SecurityUpdateRequestFailed);
    }

    Ok(())
}

/// Transfer-completion callback from the security stack. Reports the
/// outcome, records subownership, and releases the waiting worker.
fn on_transfer_complete(
    inner: &Arc<FrameworkInner>,
    device_id: &str,
    ctx: &CallbackInfoPtr,
    error: bool,
) {
    let status = if error {
        Status::SecurityUpdateRequestFailed
    } else {
        Status::SecurityUpdateRequestFinished
    };
    inner.notify_access_complete(status, ctx);

    if let Some(entry) = inner.registry.lookup(device_id) {
        let completion = {
            let mut details = entry.lock().unwrap_or_else(|e| e.into_inner());
            details.security.subowner = true;
            Arc::clone(&details.security.completion)
        };
        completion.signal();
    }
}

impl FrameworkInner {
    /// True once an access workflow's MOT probe returned a handle for the
    /// device.
    pub(crate) fn security_info_available(&self, device_id: &str) -> Result<bool> {
        let entry = self
            .registry
            .lookup(device_id)
            .ok_or(Status::DeviceNotDiscovered)?;
        let details = entry.lock().unwrap_or_else(|e| e.into_inner());
        Ok(details.security.info_available)
    }

    /// Deliver a `request_access_complete` event from a listener snapshot.
    pub(crate) fn notify_access_complete(&self, status: Status, ctx: &CallbackInfoPtr) {
        for listener in self.registry.snapshot_listeners() {
            listener.request_access_complete(status, ctx);
        }
    }

    /// Shutdown drain: signal every active workflow's rendezvous and join
    /// its worker. After this returns no security worker remains joinable.
    pub(crate) fn drain_security_workers(&self) {
        let active: Vec<EntryRef> = self
            .registry
            .snapshot_devices()
            .into_iter()
            .filter(|entry| {
                let details = entry.lock().unwrap_or_else(|e| e.into_inner());
                details.security.started
            })
            .collect();

        for entry in active {
            let (completion, worker) = {
                let mut details = entry.lock().unwrap_or_else(|e| e.into_inner());
                (
                    Arc::clone(&details.security.completion),
                    details.security.worker.take(),
                )
            };

            completion.signal();
            if let Some(handle) = worker {
                let _ = handle.join();
            }
        }
    }
}
