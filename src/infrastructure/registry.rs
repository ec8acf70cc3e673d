//! Session Registry
//!
//! Process-wide record of the active session per transport. Sessions get an
//! `Arc<SessionRegistry>` at construction and report `set`/`clear`/operating
//! changes to it; everything else reads [`RegistrySnapshot`]s.

use crate::domain::models::{ConnectionStatus, DeviceHandle, Transport};
use crate::error::{DeviceError, DeviceResult};
use crate::infrastructure::capabilities::ServiceName;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tracing::debug;

use super::notifier::Notifier;

/// What the registry knows about one active session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub device: DeviceHandle,
    pub version: String,
    /// Wireless services found during discovery, empty for USB transports
    pub services: Vec<ServiceName>,
    pub operating: bool,
}

impl SessionInfo {
    pub fn new(device: DeviceHandle, version: impl Into<String>) -> Self {
        Self {
            device,
            version: version.into(),
            services: Vec::new(),
            operating: false,
        }
    }

    pub fn with_services(mut self, services: Vec<ServiceName>) -> Self {
        self.services = services;
        self
    }

    pub fn has_service(&self, service: ServiceName) -> bool {
        self.services.contains(&service)
    }
}

/// Point-in-time copy of all slots
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistrySnapshot {
    pub sessions: BTreeMap<Transport, SessionInfo>,
}

impl RegistrySnapshot {
    pub fn session(&self, transport: Transport) -> Option<&SessionInfo> {
        self.sessions.get(&transport)
    }

    pub fn status(&self, transport: Transport) -> ConnectionStatus {
        if self.sessions.contains_key(&transport) {
            ConnectionStatus::Connected
        } else {
            ConnectionStatus::Disconnected
        }
    }

    pub fn is_operating(&self, transport: Transport) -> bool {
        self.session(transport).map(|s| s.operating).unwrap_or(false)
    }
}

/// One slot per transport, empty on creation
pub struct SessionRegistry {
    slots: Mutex<BTreeMap<Transport, SessionInfo>>,
    notifier: Option<Arc<dyn Notifier>>,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(BTreeMap::new()),
            notifier: None,
        }
    }

    /// Registry that forwards status changes to a notifier
    pub fn with_notifier(notifier: Arc<dyn Notifier>) -> Self {
        Self {
            slots: Mutex::new(BTreeMap::new()),
            notifier: Some(notifier),
        }
    }

    pub fn set(&self, transport: Transport, info: SessionInfo) {
        debug!("{} session set: {}", transport, info.device.display_name());
        self.lock().insert(transport, info);
        self.emit(transport, ConnectionStatus::Connected);
    }

    pub fn clear(&self, transport: Transport) {
        if self.lock().remove(&transport).is_some() {
            debug!("{} session cleared", transport);
            self.emit(transport, ConnectionStatus::Disconnected);
        }
    }

    pub fn set_operating(&self, transport: Transport, operating: bool) {
        if let Some(info) = self.lock().get_mut(&transport) {
            info.operating = operating;
        }
    }

    /// Mark the session as operating until the returned guard drops.
    ///
    /// Fails with `Busy` if an operation already runs on this transport.
    pub fn begin_operation(self: &Arc<Self>, transport: Transport) -> DeviceResult<OperatingGuard> {
        let mut slots = self.lock();
        let info = slots.get_mut(&transport).ok_or(DeviceError::NotConnected)?;
        if info.operating {
            return Err(DeviceError::Busy(transport));
        }
        info.operating = true;
        Ok(OperatingGuard {
            registry: self.clone(),
            transport,
        })
    }

    pub fn get(&self, transport: Transport) -> Option<SessionInfo> {
        self.lock().get(&transport).cloned()
    }

    pub fn snapshot(&self) -> RegistrySnapshot {
        RegistrySnapshot {
            sessions: self.lock().clone(),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<Transport, SessionInfo>> {
        // Slots stay consistent even if a holder panicked; every write is a
        // single map operation.
        self.slots.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn emit(&self, transport: Transport, status: ConnectionStatus) {
        if let Some(notifier) = &self.notifier {
            notifier.connection_status(transport, status);
        }
    }
}

/// Clears the operating flag on drop, whatever way the operation ended
pub struct OperatingGuard {
    registry: Arc<SessionRegistry>,
    transport: Transport,
}

impl Drop for OperatingGuard {
    fn drop(&mut self) {
        self.registry.set_operating(self.transport, false);
    }
}

/// Remote input page: needs the input service
pub fn input_available(snapshot: &RegistrySnapshot) -> bool {
    wireless_has(snapshot, ServiceName::Input)
}

/// Spectator camera page: needs the camera service
pub fn camera_available(snapshot: &RegistrySnapshot) -> bool {
    wireless_has(snapshot, ServiceName::Camera)
}

/// Device settings page: needs the settings service
pub fn settings_available(snapshot: &RegistrySnapshot) -> bool {
    wireless_has(snapshot, ServiceName::Settings)
}

fn wireless_has(snapshot: &RegistrySnapshot, service: ServiceName) -> bool {
    snapshot
        .session(Transport::Wireless)
        .map(|s| s.has_service(service))
        .unwrap_or(false)
}
