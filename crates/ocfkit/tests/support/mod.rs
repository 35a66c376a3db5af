// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Scripted protocol doubles for the integration suites.
//!
//! `MockEngine` and `MockProvisioning` capture every handler the framework
//! registers so tests can inject discovery records, metadata responses,
//! and terminal codes at chosen moments, from the test thread, the way the
//! real engine would from its callback threads.

#![allow(dead_code)] // each integration binary uses a subset

use std::collections::HashMap;
use std::io::{self, Cursor, Read, Write};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use uuid::Uuid;

use ocfkit::proto::{
    DeleteHandler, DiscoveryHandler, DisplayPinHandler, InfoHandler, InputPinHandler,
    LocalDeviceInfo, LocalPlatformInfo, ObserveHandler, PinHandle, PropertyKind, ReadHandler,
    TransferHandler, WriteHandler,
};
use ocfkit::{
    CallbackInfoPtr, DeviceInfo, FrameworkListener, MotDevice, OwnershipTransferMethod,
    PersistentStorage, PinBuffer, PlatformConfig, ProtocolCode, ProtocolClient, Provisioning,
    QueryParams, Representation, Resource, Status, StorageFile, StorageMode,
};

/// Poll `condition` until it holds or `timeout` elapses.
pub fn wait_for(timeout: Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}

// ========================================================================
// Resource
// ========================================================================

/// Scripted resource handle. Dispatches capture their terminal handler;
/// the test completes them with `complete_*`.
pub struct MockResource {
    sid: String,
    uri: String,
    host: String,
    types: Vec<String>,
    interfaces: Vec<String>,
    observable: bool,
    read_handlers: Mutex<Vec<ReadHandler>>,
    write_handlers: Mutex<Vec<WriteHandler>>,
    delete_handlers: Mutex<Vec<DeleteHandler>>,
    observe_handlers: Mutex<Vec<ObserveHandler>>,
    pub cancel_count: AtomicUsize,
    pub last_posted: Mutex<Option<Representation>>,
}

impl MockResource {
    pub fn new(sid: &str, uri: &str, host: &str, types: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            sid: sid.to_owned(),
            uri: uri.to_owned(),
            host: host.to_owned(),
            types: types.iter().map(|t| (*t).to_owned()).collect(),
            interfaces: vec!["oic.if.baseline".to_owned()],
            observable: true,
            read_handlers: Mutex::new(Vec::new()),
            write_handlers: Mutex::new(Vec::new()),
            delete_handlers: Mutex::new(Vec::new()),
            observe_handlers: Mutex::new(Vec::new()),
            cancel_count: AtomicUsize::new(0),
            last_posted: Mutex::new(None),
        })
    }

    pub fn complete_read(&self, code: ProtocolCode, rep: Representation) -> bool {
        match self.read_handlers.lock().unwrap().pop() {
            Some(handler) => {
                handler(code, rep);
                true
            }
            None => false,
        }
    }

    pub fn complete_write(&self, code: ProtocolCode, rep: Representation) -> bool {
        match self.write_handlers.lock().unwrap().pop() {
            Some(handler) => {
                handler(code, rep);
                true
            }
            None => false,
        }
    }

    pub fn complete_delete(&self, code: ProtocolCode) -> bool {
        match self.delete_handlers.lock().unwrap().pop() {
            Some(handler) => {
                handler(code);
                true
            }
            None => false,
        }
    }

    /// Push one observe notification to every live subscription.
    pub fn push_observe(&self, code: ProtocolCode, rep: Representation, sequence: u32) -> usize {
        let handlers = self.observe_handlers.lock().unwrap();
        for handler in handlers.iter() {
            handler(code, rep.clone(), sequence);
        }
        handlers.len()
    }

    pub fn pending_reads(&self) -> usize {
        self.read_handlers.lock().unwrap().len()
    }

    pub fn pending_writes(&self) -> usize {
        self.write_handlers.lock().unwrap().len()
    }
}

impl Resource for MockResource {
    fn sid(&self) -> String {
        self.sid.clone()
    }
    fn uri(&self) -> String {
        self.uri.clone()
    }
    fn host(&self) -> String {
        self.host.clone()
    }
    fn resource_types(&self) -> Vec<String> {
        self.types.clone()
    }
    fn resource_interfaces(&self) -> Vec<String> {
        self.interfaces.clone()
    }
    fn is_observable(&self) -> bool {
        self.observable
    }
    fn get(&self, _query: &QueryParams, handler: ReadHandler) -> ProtocolCode {
        self.read_handlers.lock().unwrap().push(handler);
        ProtocolCode::Ok
    }
    fn post(
        &self,
        rep: &Representation,
        _query: &QueryParams,
        handler: WriteHandler,
    ) -> ProtocolCode {
        *self.last_posted.lock().unwrap() = Some(rep.clone());
        self.write_handlers.lock().unwrap().push(handler);
        ProtocolCode::Ok
    }
    fn delete(&self, handler: DeleteHandler) -> ProtocolCode {
        self.delete_handlers.lock().unwrap().push(handler);
        ProtocolCode::Ok
    }
    fn observe(&self, _query: &QueryParams, handler: ObserveHandler) -> ProtocolCode {
        self.observe_handlers.lock().unwrap().push(handler);
        ProtocolCode::Ok
    }
    fn cancel_observe(&self) -> ProtocolCode {
        self.cancel_count.fetch_add(1, Ordering::SeqCst);
        ProtocolCode::Ok
    }
}

// ========================================================================
// Engine
// ========================================================================

#[derive(Default)]
struct EngineState {
    discovery_handlers: Vec<(String, String, DiscoveryHandler)>,
    device_info_handlers: Vec<(String, InfoHandler)>,
    platform_info_handlers: Vec<(String, InfoHandler)>,
    properties: HashMap<String, serde_json::Value>,
}

/// Scripted protocol engine.
pub struct MockEngine {
    state: Mutex<EngineState>,
    pub configured: AtomicUsize,
    pub find_resource_calls: AtomicUsize,
    pub device_info_registrations: AtomicUsize,
    pub platform_info_registrations: AtomicUsize,
}

impl MockEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(EngineState::default()),
            configured: AtomicUsize::new(0),
            find_resource_calls: AtomicUsize::new(0),
            device_info_registrations: AtomicUsize::new(0),
            platform_info_registrations: AtomicUsize::new(0),
        })
    }

    /// Seed the generic property store (`dmv`, `piid`, ...).
    pub fn set_property(&self, key: &str, value: serde_json::Value) {
        self.state
            .lock()
            .unwrap()
            .properties
            .insert(key.to_owned(), value);
    }

    /// Deliver a discovery record through every captured discovery
    /// handler, as a multicast response would be.
    pub fn deliver_resource(&self, resource: &Arc<MockResource>) -> usize {
        let handlers: Vec<DiscoveryHandler> = self
            .state
            .lock()
            .unwrap()
            .discovery_handlers
            .iter()
            .map(|(_, _, h)| Arc::clone(h))
            .collect();
        let as_dyn: Arc<dyn Resource> = Arc::clone(resource) as Arc<dyn Resource>;
        for handler in &handlers {
            handler(Arc::clone(&as_dyn));
        }
        handlers.len()
    }

    /// Complete the oldest pending device-info fetch with `rep`.
    pub fn complete_device_info(&self, rep: Representation) -> bool {
        let handler = {
            let mut state = self.state.lock().unwrap();
            if state.device_info_handlers.is_empty() {
                None
            } else {
                Some(state.device_info_handlers.remove(0).1)
            }
        };
        match handler {
            Some(handler) => {
                handler(rep);
                true
            }
            None => false,
        }
    }

    /// Complete the oldest pending platform-info fetch with `rep`.
    pub fn complete_platform_info(&self, rep: Representation) -> bool {
        let handler = {
            let mut state = self.state.lock().unwrap();
            if state.platform_info_handlers.is_empty() {
                None
            } else {
                Some(state.platform_info_handlers.remove(0).1)
            }
        };
        match handler {
            Some(handler) => {
                handler(rep);
                true
            }
            None => false,
        }
    }

    pub fn pending_device_info_fetches(&self) -> usize {
        self.state.lock().unwrap().device_info_handlers.len()
    }

    pub fn pending_platform_info_fetches(&self) -> usize {
        self.state.lock().unwrap().platform_info_handlers.len()
    }

    /// Hosts and URIs of every discovery query issued so far.
    pub fn discovery_queries(&self) -> Vec<(String, String)> {
        self.state
            .lock()
            .unwrap()
            .discovery_handlers
            .iter()
            .map(|(host, uri, _)| (host.clone(), uri.clone()))
            .collect()
    }
}

impl ProtocolClient for MockEngine {
    fn configure(&self, _config: PlatformConfig) -> ProtocolCode {
        self.configured.fetch_add(1, Ordering::SeqCst);
        ProtocolCode::Ok
    }

    fn find_resource(
        &self,
        host: &str,
        resource_uri: &str,
        handler: DiscoveryHandler,
    ) -> ProtocolCode {
        self.find_resource_calls.fetch_add(1, Ordering::SeqCst);
        self.state.lock().unwrap().discovery_handlers.push((
            host.to_owned(),
            resource_uri.to_owned(),
            handler,
        ));
        ProtocolCode::Ok
    }

    fn get_device_info(&self, host: &str, _uri: &str, handler: InfoHandler) -> ProtocolCode {
        self.state
            .lock()
            .unwrap()
            .device_info_handlers
            .push((host.to_owned(), handler));
        ProtocolCode::Ok
    }

    fn get_platform_info(&self, host: &str, _uri: &str, handler: InfoHandler) -> ProtocolCode {
        self.state
            .lock()
            .unwrap()
            .platform_info_handlers
            .push((host.to_owned(), handler));
        ProtocolCode::Ok
    }

    fn property_value(&self, _kind: PropertyKind, key: &str) -> Option<serde_json::Value> {
        self.state.lock().unwrap().properties.get(key).cloned()
    }

    fn register_device_info(&self, _info: LocalDeviceInfo) -> ProtocolCode {
        self.device_info_registrations.fetch_add(1, Ordering::SeqCst);
        ProtocolCode::Ok
    }

    fn register_platform_info(&self, _info: LocalPlatformInfo) -> ProtocolCode {
        self.platform_info_registrations.fetch_add(1, Ordering::SeqCst);
        ProtocolCode::Ok
    }
}

// ========================================================================
// Provisioning / MOT
// ========================================================================

/// Scripted multiple-ownership-transfer handle.
pub struct MockMotDevice {
    pub subowner: Mutex<bool>,
    pub method: Mutex<OwnershipTransferMethod>,
    pub preconfig_pins: Mutex<Vec<String>>,
    pub transfer_dispatch_code: Mutex<ProtocolCode>,
    transfer_handlers: Mutex<Vec<TransferHandler>>,
}

impl MockMotDevice {
    pub fn new(method: OwnershipTransferMethod, subowner: bool) -> Arc<Self> {
        Arc::new(Self {
            subowner: Mutex::new(subowner),
            method: Mutex::new(method),
            preconfig_pins: Mutex::new(Vec::new()),
            transfer_dispatch_code: Mutex::new(ProtocolCode::Ok),
            transfer_handlers: Mutex::new(Vec::new()),
        })
    }

    pub fn has_transfer_handler(&self) -> bool {
        !self.transfer_handlers.lock().unwrap().is_empty()
    }

    /// Fire the captured completion callback. `error == true` reports a
    /// failed handshake.
    pub fn complete_transfer(&self, error: bool) -> bool {
        match self.transfer_handlers.lock().unwrap().pop() {
            Some(handler) => {
                handler(error);
                true
            }
            None => false,
        }
    }
}

impl MotDevice for MockMotDevice {
    fn is_subowner(&self) -> Result<bool, ProtocolCode> {
        Ok(*self.subowner.lock().unwrap())
    }

    fn selected_transfer_method(&self) -> OwnershipTransferMethod {
        *self.method.lock().unwrap()
    }

    fn add_preconfig_pin(&self, pin: &str) -> ProtocolCode {
        self.preconfig_pins.lock().unwrap().push(pin.to_owned());
        ProtocolCode::Ok
    }

    fn do_ownership_transfer(&self, on_complete: TransferHandler) -> ProtocolCode {
        let code = *self.transfer_dispatch_code.lock().unwrap();
        if code == ProtocolCode::Ok {
            self.transfer_handlers.lock().unwrap().push(on_complete);
        }
        code
    }
}

/// Outcome script for the MOT discovery probe.
pub enum MotProbe {
    Found(Arc<MockMotDevice>),
    NotFound,
    Error(ProtocolCode),
}

/// Scripted provisioning stack.
pub struct MockProvisioning {
    probe: Mutex<MotProbe>,
    pub probed_uuids: Mutex<Vec<Uuid>>,
    pub init_calls: AtomicUsize,
    input_pin_handlers: Mutex<HashMap<u64, InputPinHandler>>,
    display_pin_handlers: Mutex<HashMap<u64, DisplayPinHandler>>,
    next_handle: AtomicU64,
}

impl MockProvisioning {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            probe: Mutex::new(MotProbe::NotFound),
            probed_uuids: Mutex::new(Vec::new()),
            init_calls: AtomicUsize::new(0),
            input_pin_handlers: Mutex::new(HashMap::new()),
            display_pin_handlers: Mutex::new(HashMap::new()),
            next_handle: AtomicU64::new(1),
        })
    }

    pub fn script_probe(&self, probe: MotProbe) {
        *self.probe.lock().unwrap() = probe;
    }

    pub fn registered_input_handlers(&self) -> usize {
        self.input_pin_handlers.lock().unwrap().len()
    }

    pub fn registered_display_handlers(&self) -> usize {
        self.display_pin_handlers.lock().unwrap().len()
    }

    /// Drive the stack-originated random-PIN prompt, returning the PIN
    /// the listeners produced.
    pub fn prompt_input_pin(&self, device: &Uuid) -> Option<String> {
        let handlers: Vec<InputPinHandler> = self
            .input_pin_handlers
            .lock()
            .unwrap()
            .values()
            .cloned()
            .collect();
        let mut pin = PinBuffer::new();
        for handler in handlers {
            handler(device, &mut pin);
        }
        if pin.is_empty() {
            None
        } else {
            Some(pin.as_str().to_owned())
        }
    }

    /// Drive the stack-originated display-PIN event.
    pub fn display_pin(&self, pin: &str) {
        let handlers: Vec<DisplayPinHandler> = self
            .display_pin_handlers
            .lock()
            .unwrap()
            .values()
            .cloned()
            .collect();
        for handler in handlers {
            handler(pin);
        }
    }
}

impl Provisioning for MockProvisioning {
    fn provision_init(&self, _db_path: &str) -> ProtocolCode {
        self.init_calls.fetch_add(1, Ordering::SeqCst);
        ProtocolCode::Ok
    }

    fn discover_mot_device(
        &self,
        _timeout: Duration,
        device: &Uuid,
    ) -> Result<Option<Arc<dyn MotDevice>>, ProtocolCode> {
        self.probed_uuids.lock().unwrap().push(*device);
        match &*self.probe.lock().unwrap() {
            MotProbe::Found(mot) => Ok(Some(Arc::clone(mot) as Arc<dyn MotDevice>)),
            MotProbe::NotFound => Ok(None),
            MotProbe::Error(code) => Err(*code),
        }
    }

    fn register_input_pin_handler(&self, handler: InputPinHandler) -> PinHandle {
        let handle = self.next_handle.fetch_add(1, Ordering::SeqCst);
        self.input_pin_handlers
            .lock()
            .unwrap()
            .insert(handle, handler);
        PinHandle(handle)
    }

    fn deregister_input_pin_handler(&self, handle: PinHandle) {
        self.input_pin_handlers.lock().unwrap().remove(&handle.0);
    }

    fn register_display_pin_handler(&self, handler: DisplayPinHandler) -> PinHandle {
        let handle = self.next_handle.fetch_add(1, Ordering::SeqCst);
        self.display_pin_handlers
            .lock()
            .unwrap()
            .insert(handle, handler);
        PinHandle(handle)
    }

    fn deregister_display_pin_handler(&self, handle: PinHandle) {
        self.display_pin_handlers.lock().unwrap().remove(&handle.0);
    }
}

// ========================================================================
// Storage
// ========================================================================

struct MemFile {
    buf: Cursor<Vec<u8>>,
    path: String,
    writable: bool,
    store: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl Read for MemFile {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        self.buf.read(out)
    }
}

impl Write for MemFile {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        if !self.writable {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "read-only"));
        }
        self.buf.write(data)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for MemFile {
    fn drop(&mut self) {
        // Close semantics: persist on drop.
        if self.writable {
            self.store
                .lock()
                .unwrap()
                .insert(self.path.clone(), self.buf.get_ref().clone());
        }
    }
}

/// In-memory five-operation storage capability.
pub struct MemStorage {
    files: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl MemStorage {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            files: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    pub fn contents(&self, path: &str) -> Option<Vec<u8>> {
        self.files.lock().unwrap().get(path).cloned()
    }
}

impl PersistentStorage for MemStorage {
    fn open(&self, path: &str, mode: StorageMode) -> io::Result<Box<dyn StorageFile>> {
        let mut files = self.files.lock().unwrap();
        let existing = files.get(path).cloned();

        let (initial, writable) = match mode {
            StorageMode::Read => match existing {
                Some(data) => (data, false),
                None => return Err(io::Error::new(io::ErrorKind::NotFound, "no such file")),
            },
            StorageMode::Write => (Vec::new(), true),
            StorageMode::ReadWrite => (existing.unwrap_or_default(), true),
        };

        if writable {
            files.entry(path.to_owned()).or_default();
        }

        Ok(Box::new(MemFile {
            buf: Cursor::new(initial),
            path: path.to_owned(),
            writable,
            store: Arc::clone(&self.files),
        }))
    }

    fn unlink(&self, path: &str) -> io::Result<()> {
        match self.files.lock().unwrap().remove(path) {
            Some(_) => Ok(()),
            None => Err(io::Error::new(io::ErrorKind::NotFound, "no such file")),
        }
    }
}

// ========================================================================
// Listener
// ========================================================================

/// Captured listener event.
#[derive(Debug, Clone)]
pub enum Event {
    Discovered {
        responsive: bool,
        updated: bool,
        device_id: String,
        device_name: String,
        resource_types: Vec<String>,
    },
    Get(Status),
    Set(Status),
    Create(Status),
    Delete(Status),
    Observe(Status),
    Access(Status),
    PasswordInput {
        device_id: String,
        method: OwnershipTransferMethod,
    },
    PasswordDisplay {
        pin: String,
    },
}

/// Listener recording every event, with an optional scripted PIN answer.
pub struct RecordingListener {
    events: Mutex<Vec<Event>>,
    pub pin_response: Mutex<Option<String>>,
}

impl RecordingListener {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            events: Mutex::new(Vec::new()),
            pin_response: Mutex::new(None),
        })
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    pub fn access_statuses(&self) -> Vec<Status> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Access(status) => Some(status),
                _ => None,
            })
            .collect()
    }

    pub fn discovered(&self) -> Vec<(bool, bool, String, String)> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Discovered {
                    responsive,
                    updated,
                    device_id,
                    device_name,
                    ..
                } => Some((responsive, updated, device_id, device_name)),
                _ => None,
            })
            .collect()
    }

    pub fn not_responding_count(&self, device_id: &str) -> usize {
        self.discovered()
            .into_iter()
            .filter(|(responsive, _, id, _)| !responsive && id == device_id)
            .count()
    }

    fn push(&self, event: Event) {
        self.events.lock().unwrap().push(event);
    }
}

impl FrameworkListener for RecordingListener {
    fn device_discovered(
        &self,
        responsive: bool,
        updated: bool,
        info: &DeviceInfo,
        resource_types: &[String],
    ) {
        self.push(Event::Discovered {
            responsive,
            updated,
            device_id: info.device_id.clone(),
            device_name: info.device_name.clone(),
            resource_types: resource_types.to_vec(),
        });
    }

    fn get_complete(&self, status: Status, _rep: &Representation, _ctx: &CallbackInfoPtr) {
        self.push(Event::Get(status));
    }

    fn set_complete(&self, status: Status, _rep: &Representation, _ctx: &CallbackInfoPtr) {
        self.push(Event::Set(status));
    }

    fn create_complete(&self, status: Status, _rep: &Representation, _ctx: &CallbackInfoPtr) {
        self.push(Event::Create(status));
    }

    fn delete_complete(&self, status: Status, _ctx: &CallbackInfoPtr) {
        self.push(Event::Delete(status));
    }

    fn observe_update(&self, status: Status, _rep: &Representation, _ctx: &CallbackInfoPtr) {
        self.push(Event::Observe(status));
    }

    fn request_access_complete(&self, status: Status, _ctx: &CallbackInfoPtr) {
        self.push(Event::Access(status));
    }

    fn password_input_requested(
        &self,
        device_id: &str,
        method: OwnershipTransferMethod,
        pin: &mut PinBuffer,
        _ctx: &CallbackInfoPtr,
    ) {
        if let Some(response) = self.pin_response.lock().unwrap().as_deref() {
            pin.set(response);
        }
        self.push(Event::PasswordInput {
            device_id: device_id.to_owned(),
            method,
        });
    }

    fn password_display(
        &self,
        _device_id: &str,
        _method: OwnershipTransferMethod,
        pin: &str,
        _ctx: &CallbackInfoPtr,
    ) {
        self.push(Event::PasswordDisplay {
            pin: pin.to_owned(),
        });
    }
}
