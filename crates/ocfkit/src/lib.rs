// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # ocfkit - client-side coordination for OCF-style device frameworks
//!
//! `ocfkit` sits between an application and an OCF protocol engine. It
//! discovers devices advertising resources on the local network, builds an
//! evolving directory of devices and their resources, fetches device and
//! platform metadata, dispatches CRUD and observe operations, and runs the
//! multiple-ownership-transfer handshake that enrolls the application as a
//! subowner of a device.
//!
//! The protocol engine itself (CoAP transport, DTLS, provisioning
//! primitives, credential storage) is injected through the traits in
//! [`proto`]; this crate owns the coordination: the directory, its
//! maintenance, callback routing, and worker lifecycles.
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use ocfkit::{AppInfo, Framework, FrameworkListener};
//!
//! struct Printer;
//! impl FrameworkListener for Printer {
//!     fn device_discovered(&self, responsive: bool, _updated: bool,
//!                          info: &ocfkit::DeviceInfo, _types: &[String]) {
//!         println!("{} responsive={}", info.device_id, responsive);
//!     }
//! }
//!
//! let framework = Framework::new(engine, provisioning, storage);
//! framework.start(&AppInfo::default(), false)?;
//! framework.register_listener(Arc::new(Printer));
//! framework.discover_by_types(&[String::new()])?; // unfiltered multicast
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +--------------------------------------------------------------+
//! |                        Application                           |
//! |        Framework facade  |  FrameworkListener callbacks      |
//! +--------------------------------------------------------------+
//! |                     Coordination layer                       |
//! |  Registry (directory + URI index + listeners, one lock)      |
//! |  Dispatcher | Discovery/Metadata | Maintenance | Access      |
//! +--------------------------------------------------------------+
//! |                  Injected capabilities (proto)               |
//! |  ProtocolClient | Resource | Provisioning | Storage          |
//! +--------------------------------------------------------------+
//! ```
//!
//! ## Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Framework`] | Entry point; start/stop, discovery, operations |
//! | [`FrameworkListener`] | Application event sink |
//! | [`CallbackInfo`] | Per-operation context echoed in callbacks |
//! | [`Status`] | Operation/terminal status taxonomy |
//! | [`DeviceInfo`] / [`PlatformInfo`] | Copied device metadata |
//!
//! ## Threading
//!
//! Public methods may block briefly on the directory lock. Listener
//! callbacks arrive on engine threads, the maintenance thread, and
//! security worker threads; they are always invoked outside the directory
//! lock and may re-enter any public API.

pub mod config;
pub mod proto;

mod access;
mod device;
mod discovery;
mod dispatch;
mod framework;
mod listener;
mod maintenance;
mod registry;
mod status;
mod time;

pub use config::{AppInfo, FrameworkConfig, PlatformConfig, QualityOfService, RoleMode};
pub use device::{DeviceInfo, PlatformInfo};
pub use dispatch::ResourceInfoKind;
pub use framework::Framework;
pub use listener::{CallbackInfo, CallbackInfoPtr, FrameworkListener, OperationKind, PinBuffer};
pub use proto::{
    MotDevice, OwnershipTransferMethod, PersistentStorage, ProtocolClient, Provisioning,
    QueryParams, Representation, Resource, StorageFile, StorageMode,
};
pub use status::{map_protocol_code, terminal_read_status, ProtocolCode, Result, Status};
