// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Framework configuration - single source of truth.
//!
//! Centralizes the reserved URIs, well-known payload keys, and every
//! timeout/threshold the framework relies on. **Never hardcode these
//! elsewhere!** Runtime knobs live in [`FrameworkConfig`] so tests can
//! shrink the intervals without touching production defaults.

use std::sync::Arc;
use std::time::Duration;

use crate::proto::PersistentStorage;

// =======================================================================
// Reserved URIs and resource types
// =======================================================================

/// Well-known directory resource queried during discovery.
pub const WELL_KNOWN_URI: &str = "/oic/res";

/// Device information resource.
pub const DEVICE_URI: &str = "/oic/d";

/// Platform information resource.
pub const PLATFORM_URI: &str = "/oic/p";

/// Resource type carried by every device resource.
pub const RT_DEVICE: &str = "oic.wk.d";

/// Resource type of the maintenance resource.
pub const RT_MAINTENANCE: &str = "oic.wk.mnt";

// =======================================================================
// Well-known payload keys
// =======================================================================

/// Device info: human-readable device name.
pub const KEY_DEVICE_NAME: &str = "n";
/// Device info: software version.
pub const KEY_SOFTWARE_VERSION: &str = "icv";
/// Device info: data model version (also a generic device property).
pub const KEY_DATA_MODEL_VERSIONS: &str = "dmv";
/// Device info: protocol independent id (generic device property).
pub const KEY_PROTOCOL_INDEPENDENT_ID: &str = "piid";

/// Platform info keys in the order the fields are populated.
pub const PLATFORM_KEYS: [&str; 11] = [
    "pi", "mnmn", "mnml", "mnmo", "mndt", "mnpv", "mnos", "mnhw", "mnfv", "mnsl", "st",
];

/// Query key selecting a resource type.
pub const QUERY_RESOURCE_TYPE: &str = "rt";
/// Query key selecting a resource interface.
pub const QUERY_INTERFACE: &str = "if";

// =======================================================================
// Timeouts and thresholds
// =======================================================================

/// Maintenance loop period.
pub const MAINTENANCE_TICK: Duration = Duration::from_secs(2);

/// A device with `open_count == 0` becomes an eviction candidate this long
/// after its last close.
pub const IDLE_EVICTION_AFTER_MS: u64 = 300_000;

/// A device is reported not-responding this long after its last discovery
/// response.
pub const NOT_RESPONDING_AFTER_MS: u64 = 60_000;

/// Per-kind cap on metadata fetch attempts (device info, platform info,
/// maintenance resource).
pub const MAX_METADATA_REQUESTS: u32 = 3;

/// Timeout for the scoped multiple-owner discovery probe.
pub const MOT_DISCOVERY_TIMEOUT: Duration = Duration::from_secs(5);

/// Upper bound on the ownership-transfer completion rendezvous.
pub const ACCESS_COMPLETION_TIMEOUT: Duration = Duration::from_secs(30);

/// Longest preconfigured PIN the transfer primitive accepts.
pub const MAX_PRECONFIG_PIN_LEN: usize = 32;

// =======================================================================
// Runtime configuration
// =======================================================================

/// Runtime knobs for the framework.
///
/// Defaults mirror the constants above; tests shrink them to drive the
/// maintenance and rendezvous paths without wall-clock waits.
#[derive(Debug, Clone)]
pub struct FrameworkConfig {
    /// Maintenance loop period.
    pub maintenance_tick: Duration,
    /// Idle-eviction threshold since last close, in milliseconds.
    pub idle_eviction_after_ms: u64,
    /// Not-responding threshold since last discovery response, in
    /// milliseconds.
    pub not_responding_after_ms: u64,
    /// Scoped MOT discovery timeout.
    pub mot_discovery_timeout: Duration,
    /// Ownership-transfer completion rendezvous timeout.
    pub access_completion_timeout: Duration,
}

impl Default for FrameworkConfig {
    fn default() -> Self {
        Self {
            maintenance_tick: MAINTENANCE_TICK,
            idle_eviction_after_ms: IDLE_EVICTION_AFTER_MS,
            not_responding_after_ms: NOT_RESPONDING_AFTER_MS,
            mot_discovery_timeout: MOT_DISCOVERY_TIMEOUT,
            access_completion_timeout: ACCESS_COMPLETION_TIMEOUT,
        }
    }
}

/// Identity of the hosting application, registered with the protocol
/// engine at start unless unit-test mode is requested.
#[derive(Debug, Clone, Default)]
pub struct AppInfo {
    /// Application name, registered as the local device name.
    pub name: String,
    /// Application software version.
    pub software_version: String,
    /// Company name, registered as the platform manufacturer.
    pub company_name: String,
}

/// Service role requested from the protocol engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleMode {
    /// Client only.
    Client,
    /// Client and server. Server mode is required for security
    /// provisioning.
    Both,
}

/// Delivery guarantee requested from the protocol engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QualityOfService {
    /// Engine default.
    #[default]
    Default,
    /// Best-effort delivery.
    Low,
    /// Confirmed delivery.
    High,
}

/// Engine bootstrap parameters handed to `ProtocolClient::configure`.
#[derive(Clone)]
pub struct PlatformConfig {
    /// Role to run the engine in.
    pub mode: RoleMode,
    /// Bind address. `0.0.0.0` binds all interfaces.
    pub address: String,
    /// Bind port. `0` picks an ephemeral port.
    pub port: u16,
    /// Default delivery guarantee.
    pub qos: QualityOfService,
    /// Storage capability backing the security database.
    pub storage: Arc<dyn PersistentStorage>,
}

impl std::fmt::Debug for PlatformConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlatformConfig")
            .field("mode", &self.mode)
            .field("address", &self.address)
            .field("port", &self.port)
            .field("qos", &self.qos)
            .finish()
    }
}
