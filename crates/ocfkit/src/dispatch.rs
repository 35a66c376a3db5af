// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Operation dispatch: application requests to engine calls.
//!
//! Each operation resolves its target resource (exact path first, then
//! first resource carrying the requested type), builds the `rt=`/`if=`
//! query, and binds the terminal engine callback to the caller's
//! [`CallbackInfo`]. Terminal status delivery happens before the context
//! is released; listener snapshots are taken at moment of delivery.

use std::sync::Arc;

use crate::config::{QUERY_INTERFACE, QUERY_RESOURCE_TYPE, RT_DEVICE, WELL_KNOWN_URI};
use crate::framework::FrameworkInner;
use crate::listener::{CallbackInfoPtr, OperationKind};
use crate::proto::{QueryParams, Representation};
use crate::status::{map_protocol_code, terminal_read_status, ProtocolCode, Result, Status};
use crate::time::now_ms;

/// Selector for [`Framework::resource_info`](crate::Framework::resource_info).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceInfoKind {
    /// Resource types.
    Types,
    /// Resource interfaces.
    Interfaces,
}

impl FrameworkInner {
    /// Dispatch a get/set/create/delete/observe described by `ctx`.
    /// Set and create require a payload.
    pub(crate) fn dispatch_operation(
        &self,
        ctx: &CallbackInfoPtr,
        payload: Option<&Representation>,
    ) -> Result<()> {
        let entry = self
            .registry
            .lookup(ctx.device_id())
            .ok_or(Status::DeviceNotDiscovered)?;

        let resource = {
            let details = entry.lock().unwrap_or_else(|e| e.into_inner());
            details
                .find_resource(ctx.resource_path(), ctx.resource_type())
                .ok_or(Status::ResourceNotFound)?
        };

        let mut query = QueryParams::new();
        if !ctx.resource_type().is_empty() {
            query.insert(QUERY_RESOURCE_TYPE, ctx.resource_type());
        }
        if !ctx.resource_interface().is_empty() {
            query.insert(QUERY_INTERFACE, ctx.resource_interface());
        }

        let weak = self.self_weak.clone();
        let code = match ctx.kind() {
            OperationKind::Get => {
                let ctx = Arc::clone(ctx);
                resource.get(
                    &query,
                    Box::new(move |code, rep| {
                        if let Some(inner) = weak.upgrade() {
                            let status = terminal_read_status(code);
                            for listener in inner.registry.snapshot_listeners() {
                                listener.get_complete(status, &rep, &ctx);
                            }
                        }
                    }),
                )
            }

            OperationKind::Set => {
                let rep = payload.ok_or(Status::InvalidArgument)?;
                let ctx = Arc::clone(ctx);
                resource.post(
                    rep,
                    &query,
                    Box::new(move |code, rep| {
                        if let Some(inner) = weak.upgrade() {
                            let status = map_protocol_code(code);
                            for listener in inner.registry.snapshot_listeners() {
                                listener.set_complete(status, &rep, &ctx);
                            }
                        }
                    }),
                )
            }

            OperationKind::Create => {
                let rep = payload.ok_or(Status::InvalidArgument)?;
                let ctx = Arc::clone(ctx);
                resource.post(
                    rep,
                    &query,
                    Box::new(move |code, rep| {
                        if let Some(inner) = weak.upgrade() {
                            let status = map_protocol_code(code);
                            for listener in inner.registry.snapshot_listeners() {
                                listener.create_complete(status, &rep, &ctx);
                            }
                        }
                    }),
                )
            }

            OperationKind::Delete => {
                let ctx = Arc::clone(ctx);
                resource.delete(Box::new(move |code| {
                    if let Some(inner) = weak.upgrade() {
                        let status = map_protocol_code(code);
                        for listener in inner.registry.snapshot_listeners() {
                            listener.delete_complete(status, &ctx);
                        }
                    }
                }))
            }

            OperationKind::Observe => {
                // Pin the handle so stop_observe cancels this exact
                // subscription.
                ctx.bind_resource(Arc::clone(&resource));
                let ctx = Arc::clone(ctx);
                resource.observe(
                    &query,
                    Arc::new(move |code, rep, _sequence| {
                        if let Some(inner) = weak.upgrade() {
                            let status = terminal_read_status(code);
                            for listener in inner.registry.snapshot_listeners() {
                                listener.observe_update(status, &rep, &ctx);
                            }
                        }
                    }),
                )
            }

            _ => return Err(Status::InvalidArgument),
        };

        if code != ProtocolCode::Ok {
            if ctx.kind() == OperationKind::Observe {
                ctx.take_bound_resource();
            }
            return Err(Status::Fail);
        }

        if ctx.kind() == OperationKind::Observe {
            let mut details = entry.lock().unwrap_or_else(|e| e.into_inner());
            details.active_observe_count += 1;
        }

        ctx.mark_sent(now_ms());
        Ok(())
    }

    /// Cancel the observe subscription pinned in `ctx`.
    pub(crate) fn stop_observe(&self, ctx: &CallbackInfoPtr) -> Result<()> {
        let resource = ctx.take_bound_resource().ok_or(Status::InvalidArgument)?;

        let code = resource.cancel_observe();
        if code != ProtocolCode::Ok {
            log::warn!(
                "[dispatch] cancel_observe returned {:?} for {}",
                code,
                resource.uri()
            );
        }

        if let Some(entry) = self.registry.lookup(ctx.device_id()) {
            let mut details = entry.lock().unwrap_or_else(|e| e.into_inner());
            details.active_observe_count = details.active_observe_count.saturating_sub(1);
        }
        Ok(())
    }

    /// Typed discovery probe against the device's first known URI.
    pub(crate) fn ping(&self, device_id: &str) -> Result<()> {
        let entry = self
            .registry
            .lookup(device_id)
            .ok_or(Status::DeviceNotDiscovered)?;

        let host = {
            let details = entry.lock().unwrap_or_else(|e| e.into_inner());
            details
                .device_uris
                .first()
                .cloned()
                .ok_or(Status::Fail)?
        };

        let uri = format!("{}?rt={}", WELL_KNOWN_URI, RT_DEVICE);
        if self.engine.find_resource(&host, &uri, self.discovery_handler()) != ProtocolCode::Ok {
            return Err(Status::Fail);
        }

        let mut details = entry.lock().unwrap_or_else(|e| e.into_inner());
        details.last_ping_time_ms = now_ms();
        Ok(())
    }

    /// Timestamp of the last successful ping dispatch, zero if never
    /// pinged.
    pub(crate) fn last_ping_time(&self, device_id: &str) -> Result<u64> {
        let entry = self
            .registry
            .lookup(device_id)
            .ok_or(Status::DeviceNotDiscovered)?;
        let details = entry.lock().unwrap_or_else(|e| e.into_inner());
        Ok(details.last_ping_time_ms)
    }

    /// Observability of the resource at an exact path.
    pub(crate) fn is_observable(&self, device_id: &str, resource_path: &str) -> Result<bool> {
        let entry = self
            .registry
            .lookup(device_id)
            .ok_or(Status::DeviceNotDiscovered)?;
        let details = entry.lock().unwrap_or_else(|e| e.into_inner());
        details
            .resources
            .get(resource_path)
            .map(|resource| resource.is_observable())
            .ok_or(Status::ResourceNotFound)
    }

    /// Application opened the device.
    pub(crate) fn device_open(&self, device_id: &str) -> Result<()> {
        let entry = self
            .registry
            .lookup(device_id)
            .ok_or(Status::DeviceNotDiscovered)?;
        let mut details = entry.lock().unwrap_or_else(|e| e.into_inner());
        details.open_count += 1;
        Ok(())
    }

    /// Application closed the device. The idle clock starts when the open
    /// count returns to zero.
    pub(crate) fn device_close(&self, device_id: &str) -> Result<()> {
        let entry = self
            .registry
            .lookup(device_id)
            .ok_or(Status::DeviceNotDiscovered)?;
        let mut details = entry.lock().unwrap_or_else(|e| e.into_inner());

        if details.open_count == 0 {
            log::warn!("[dispatch] close without open for {}", device_id);
            return Err(Status::Fail);
        }

        details.open_count -= 1;
        if details.open_count == 0 {
            details.last_close_time_ms = now_ms();
        }
        Ok(())
    }

    /// Owned copy of the device metadata.
    pub(crate) fn copy_device_info(&self, device_id: &str) -> Result<crate::device::DeviceInfo> {
        let entry = self
            .registry
            .lookup(device_id)
            .ok_or(Status::DeviceNotDiscovered)?;
        let details = entry.lock().unwrap_or_else(|e| e.into_inner());

        if !details.device_info_available {
            return Err(Status::InformationNotAvailable);
        }
        Ok(details.device_info.clone())
    }

    /// Owned copy of the platform metadata.
    pub(crate) fn copy_platform_info(
        &self,
        device_id: &str,
    ) -> Result<crate::device::PlatformInfo> {
        let entry = self
            .registry
            .lookup(device_id)
            .ok_or(Status::DeviceNotDiscovered)?;
        let details = entry.lock().unwrap_or_else(|e| e.into_inner());

        if !details.platform_info_available {
            return Err(Status::InformationNotAvailable);
        }
        Ok(details.platform_info.clone())
    }

    /// Paths of the device's resources, filtered by interface and type
    /// when the filters are non-empty.
    pub(crate) fn copy_resource_paths(
        &self,
        device_id: &str,
        resource_interface: &str,
        resource_type: &str,
    ) -> Result<Vec<String>> {
        let entry = self
            .registry
            .lookup(device_id)
            .ok_or(Status::DeviceNotDiscovered)?;
        let details = entry.lock().unwrap_or_else(|e| e.into_inner());

        let mut paths = Vec::new();
        for resource in details.resources.values() {
            if !resource_interface.is_empty()
                && !resource
                    .resource_interfaces()
                    .iter()
                    .any(|ri| ri == resource_interface)
            {
                continue;
            }
            if !resource_type.is_empty()
                && !resource
                    .resource_types()
                    .iter()
                    .any(|rt| rt == resource_type)
            {
                continue;
            }
            paths.push(resource.uri());
        }
        Ok(paths)
    }

    /// Types or interfaces of one resource; with an empty path, the
    /// device-wide unions.
    pub(crate) fn copy_resource_info(
        &self,
        device_id: &str,
        resource_path: &str,
        kind: ResourceInfoKind,
    ) -> Result<Vec<String>> {
        let entry = self
            .registry
            .lookup(device_id)
            .ok_or(Status::DeviceNotDiscovered)?;
        let details = entry.lock().unwrap_or_else(|e| e.into_inner());

        if resource_path.is_empty() {
            return Ok(match kind {
                ResourceInfoKind::Types => details.resource_types.clone(),
                ResourceInfoKind::Interfaces => details.resource_interfaces.clone(),
            });
        }

        let resource = details
            .resources
            .get(resource_path)
            .ok_or(Status::ResourceNotFound)?;
        Ok(match kind {
            ResourceInfoKind::Types => resource.resource_types(),
            ResourceInfoKind::Interfaces => resource.resource_interfaces(),
        })
    }
}
