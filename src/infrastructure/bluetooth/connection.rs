//! BLE Connection Module
//!
//! Opens the link to a picked device and discovers every service and
//! characteristic in the capability registry. Misses are not errors:
//! firmware variants expose different feature subsets.

use crate::domain::models::{DeviceInfo, MessageSeverity};
use crate::error::{DeviceError, DeviceResult, TransportError};
use crate::infrastructure::bluetooth::adapter::{
    GattAdapter, GattCharacteristic, GattDevice, GattService,
};
use crate::infrastructure::capabilities::{self, CharacteristicName, ServiceName};
use crate::infrastructure::notifier::Notifier;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A discovered service and whichever of its characteristics were found
#[derive(Clone)]
pub struct DiscoveredService {
    pub service: Arc<dyn GattService>,
    pub characteristics: BTreeMap<CharacteristicName, Arc<dyn GattCharacteristic>>,
}

/// Discovery result, built once per connection
#[derive(Clone, Default)]
pub struct ServiceMap {
    services: BTreeMap<ServiceName, DiscoveredService>,
}

impl ServiceMap {
    pub fn has_service(&self, service: ServiceName) -> bool {
        self.services.contains_key(&service)
    }

    pub fn service_names(&self) -> Vec<ServiceName> {
        self.services.keys().copied().collect()
    }

    pub fn characteristic(
        &self,
        service: ServiceName,
        characteristic: CharacteristicName,
    ) -> Option<Arc<dyn GattCharacteristic>> {
        self.services
            .get(&service)
            .and_then(|s| s.characteristics.get(&characteristic))
            .cloned()
    }

    fn insert(&mut self, name: ServiceName, service: DiscoveredService) {
        self.services.insert(name, service);
    }
}

/// Result of a successful connection
pub struct ConnectionResult {
    pub device: Arc<dyn GattDevice>,
    pub services: ServiceMap,
    pub info: DeviceInfo,
}

/// BLE Connection handler
pub struct BleConnection {
    notifier: Arc<dyn Notifier>,
}

impl BleConnection {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self { notifier }
    }

    /// Pick a device, open the link and run discovery
    pub async fn connect(&self, adapter: &dyn GattAdapter) -> DeviceResult<ConnectionResult> {
        // Step 1: Device picker filtered by every known service
        let device = adapter
            .request_device(&capabilities::service_filters())
            .await
            .map_err(|e| match e {
                TransportError::Cancelled | TransportError::NotFound => {
                    DeviceError::NoDeviceSelected
                }
                other => DeviceError::LinkFailed(other),
            })?;
        let handle = device.handle();
        info!("Connecting to Bluetooth device: {}", handle.display_name());
        self.notifier
            .notify("Connecting to device...", MessageSeverity::Info);

        // Step 2: Open the link
        device.connect().await.map_err(DeviceError::LinkFailed)?;

        // Step 3: Discovery
        let services = Self::discover(device.as_ref()).await;

        // Step 4: Identity, best effort
        let info = read_device_info(&services).await;
        info!(
            "Device {} running {} ({}@{})",
            handle.display_name(),
            info.version,
            info.branch,
            info.commit
        );

        Ok(ConnectionResult {
            device,
            services,
            info,
        })
    }

    async fn discover(device: &dyn GattDevice) -> ServiceMap {
        let mut map = ServiceMap::default();

        for entry in capabilities::SERVICES {
            let service = match device.primary_service(entry.uuid).await {
                Ok(service) => service,
                Err(e) => {
                    info!(
                        "Failed to find service {} ({}): {}",
                        entry.name, entry.uuid, e
                    );
                    continue;
                }
            };
            debug!("Found service {}", entry.name);

            let mut characteristics = BTreeMap::new();
            for (char_name, char_uuid) in entry.characteristics {
                match service.characteristic(*char_uuid).await {
                    Ok(c) => {
                        characteristics.insert(*char_name, c);
                    }
                    Err(_) => {
                        warn!(
                            "Service {} doesn't have characteristic '{}' ({})",
                            entry.name, char_name, char_uuid
                        );
                    }
                }
            }

            map.insert(
                entry.name,
                DiscoveredService {
                    service,
                    characteristics,
                },
            );
        }

        map
    }
}

/// Read a characteristic, treating every miss as absence
pub async fn read_characteristic(
    services: &ServiceMap,
    service: ServiceName,
    characteristic: CharacteristicName,
) -> Option<Vec<u8>> {
    let Some(target) = services.characteristic(service, characteristic) else {
        debug!(
            "Failed to read {}:{}: not discovered",
            service, characteristic
        );
        return None;
    };

    match target.read_value().await {
        Ok(bytes) => Some(bytes),
        Err(e) => {
            warn!("Failed to read {}:{}: {}", service, characteristic, e);
            None
        }
    }
}

pub async fn read_characteristic_utf8(
    services: &ServiceMap,
    service: ServiceName,
    characteristic: CharacteristicName,
) -> Option<String> {
    read_characteristic(services, service, characteristic)
        .await
        .map(|bytes| decode_utf8(&bytes))
}

/// Lossy UTF-8 decode with trailing NULs removed
pub fn decode_utf8(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .trim_end_matches('\0')
        .to_string()
}

async fn read_device_info(services: &ServiceMap) -> DeviceInfo {
    let mut info = DeviceInfo::default();
    let fields = [
        (CharacteristicName::Version, &mut info.version),
        (CharacteristicName::Branch, &mut info.branch),
        (CharacteristicName::Commit, &mut info.commit),
    ];
    for (name, slot) in fields {
        if let Some(value) = read_characteristic_utf8(services, ServiceName::Version, name).await {
            *slot = value;
        }
    }
    info
}
