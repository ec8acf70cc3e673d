//! Bluetooth Service Module
//!
//! Wireless session: owns the link to one controller, the discovered
//! service map and the write queue for that device.

use crate::domain::input::InputState;
use crate::domain::models::{DeviceHandle, DeviceInfo, MessageSeverity, Transport};
use crate::domain::settings::WriteSettings;
use crate::error::{DeviceError, DeviceResult};
use crate::infrastructure::bluetooth::{
    adapter::{GattAdapter, GattDevice},
    connection::{self, BleConnection, ServiceMap},
    scheduler::{PendingWrite, WriteOutcome, WriteScheduler},
};
use crate::infrastructure::capabilities::{CharacteristicName, ServiceName};
use crate::infrastructure::notifier::Notifier;
use crate::infrastructure::registry::{SessionInfo, SessionRegistry};
use std::sync::Arc;
use tracing::{debug, info, warn};

struct ActiveDevice {
    device: Arc<dyn GattDevice>,
    services: ServiceMap,
    info: DeviceInfo,
    scheduler: WriteScheduler,
}

/// Main Bluetooth service coordinating all BLE operations
pub struct BluetoothService {
    adapter: Arc<dyn GattAdapter>,
    active: Option<ActiveDevice>,
    registry: Arc<SessionRegistry>,
    notifier: Arc<dyn Notifier>,
    write_settings: WriteSettings,
}

impl BluetoothService {
    pub fn new(
        adapter: Arc<dyn GattAdapter>,
        registry: Arc<SessionRegistry>,
        notifier: Arc<dyn Notifier>,
        write_settings: WriteSettings,
    ) -> Self {
        Self {
            adapter,
            active: None,
            registry,
            notifier,
            write_settings,
        }
    }

    /// Pick a device, connect and discover its capabilities.
    ///
    /// A failure leaves any existing session untouched.
    pub async fn connect(&mut self) -> DeviceResult<DeviceInfo> {
        let connection = BleConnection::new(self.notifier.clone());
        let result = match connection.connect(self.adapter.as_ref()).await {
            Ok(result) => result,
            Err(e) => {
                warn!("Bluetooth connect failed: {}", e);
                self.notifier
                    .notify(&format!("Failed to connect: {}", e), MessageSeverity::Error);
                return Err(e);
            }
        };

        // One session per transport: drop the previous one only now
        let handle = result.device.handle();
        self.teardown_except(Some(handle.id.as_str())).await;

        self.registry.set(
            Transport::Wireless,
            SessionInfo::new(handle, result.info.version.clone())
                .with_services(result.services.service_names()),
        );
        self.active = Some(ActiveDevice {
            device: result.device,
            services: result.services,
            info: result.info.clone(),
            scheduler: WriteScheduler::new(self.write_settings.max_attempts),
        });

        self.notifier.notify("Connected!", MessageSeverity::Success);
        Ok(result.info)
    }

    /// Tear down the link if there is one. Always leaves no session.
    pub async fn disconnect(&mut self) {
        self.teardown().await;
        info!("Disconnected from device");
        self.notifier.notify("Disconnected.", MessageSeverity::Info);
    }

    async fn teardown(&mut self) {
        self.teardown_except(None).await;
    }

    /// Drop the session. The link stays up when the old device is
    /// `keep_id`, the one the new session has just connected.
    async fn teardown_except(&mut self, keep_id: Option<&str>) {
        if let Some(active) = self.active.take() {
            active.scheduler.close();
            if keep_id == Some(active.device.handle().id.as_str()) {
                debug!("Keeping GATT link to {}", active.device.handle().id);
            } else if let Err(e) = active.device.disconnect().await {
                warn!("GATT disconnect failed: {}", e);
            }
        }
        self.registry.clear(Transport::Wireless);
    }

    pub fn is_connected(&self) -> bool {
        self.active
            .as_ref()
            .map(|a| a.device.is_connected())
            .unwrap_or(false)
    }

    pub fn device(&self) -> Option<DeviceHandle> {
        self.active.as_ref().map(|a| a.device.handle())
    }

    pub fn device_info(&self) -> Option<&DeviceInfo> {
        self.active.as_ref().map(|a| &a.info)
    }

    pub fn has_service(&self, service: ServiceName) -> bool {
        self.active
            .as_ref()
            .map(|a| a.services.has_service(service))
            .unwrap_or(false)
    }

    /// Read a characteristic. `None` when there is no session, the
    /// capability was not discovered, or the read failed.
    pub async fn read_capability(
        &self,
        service: ServiceName,
        characteristic: CharacteristicName,
    ) -> Option<Vec<u8>> {
        let active = self.active.as_ref()?;
        connection::read_characteristic(&active.services, service, characteristic).await
    }

    pub async fn read_capability_utf8(
        &self,
        service: ServiceName,
        characteristic: CharacteristicName,
    ) -> Option<String> {
        self.read_capability(service, characteristic)
            .await
            .map(|bytes| connection::decode_utf8(&bytes))
    }

    /// Queue a write through the scheduler. The queue position is fixed
    /// when this returns.
    pub fn submit_write(
        &self,
        service: ServiceName,
        characteristic: CharacteristicName,
        payload: Vec<u8>,
    ) -> DeviceResult<PendingWrite> {
        let active = self.active.as_ref().ok_or(DeviceError::NotConnected)?;
        let target = active
            .services
            .characteristic(service, characteristic)
            .ok_or_else(|| DeviceError::CapabilityMissing(format!("{}:{}", service, characteristic)))?;
        Ok(active.scheduler.submit(target, payload))
    }

    pub async fn write_capability(
        &self,
        service: ServiceName,
        characteristic: CharacteristicName,
        payload: Vec<u8>,
    ) -> DeviceResult<WriteOutcome> {
        self.submit_write(service, characteristic, payload)?.await
    }

    /// Send the current button state
    pub async fn set_input_state(&self, state: InputState) -> DeviceResult<WriteOutcome> {
        self.checked_write(
            ServiceName::Input,
            CharacteristicName::Input,
            state.as_bytes().to_vec(),
            "Failed to write input.",
        )
        .await
    }

    /// Switch the spectator camera
    pub async fn set_camera(&self, index: u8) -> DeviceResult<WriteOutcome> {
        self.checked_write(
            ServiceName::Camera,
            CharacteristicName::CameraSelect,
            vec![index],
            "Failed to set camera.",
        )
        .await
    }

    pub async fn reset_camera(&self, index: u8) -> DeviceResult<WriteOutcome> {
        self.checked_write(
            ServiceName::Camera,
            CharacteristicName::CameraReset,
            vec![index],
            "Failed to reset camera.",
        )
        .await
    }

    async fn checked_write(
        &self,
        service: ServiceName,
        characteristic: CharacteristicName,
        payload: Vec<u8>,
        failure_message: &str,
    ) -> DeviceResult<WriteOutcome> {
        if self.active.is_none() {
            self.notifier
                .notify("No connected device.", MessageSeverity::Error);
            return Err(DeviceError::NotConnected);
        }

        let result = self
            .write_capability(service, characteristic, payload)
            .await;
        if let Err(e) = &result {
            warn!("{} {}", failure_message, e);
            self.notifier.notify(failure_message, MessageSeverity::Error);
        }
        result
    }
}
