//! DFU Service Module
//!
//! Update session: finds the controller in update mode, drives it into
//! dfuIDLE (detaching and resetting it out of application mode if needed)
//! and runs firmware reads and writes against it.

use crate::domain::models::{DeviceHandle, MessageSeverity, Transport, UNKNOWN_VERSION};
use crate::domain::settings::DfuSettings;
use crate::error::{DeviceError, DeviceResult, TransportError};
use crate::infrastructure::capabilities::UPDATE_DEVICE;
use crate::infrastructure::dfu::device::{DfuInterface, DfuInterfaceDescriptor, UsbDevice, UsbHost};
use crate::infrastructure::dfu::protocol::{DfuState, TransferState};
use crate::infrastructure::dfu::transfer;
use crate::infrastructure::notifier::Notifier;
use crate::infrastructure::registry::{SessionInfo, SessionRegistry};
use std::sync::Arc;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

struct ActiveDfu {
    device: Arc<dyn UsbDevice>,
    descriptor: DfuInterfaceDescriptor,
    interface: Arc<dyn DfuInterface>,
    state: TransferState,
}

pub struct DfuService {
    host: Arc<dyn UsbHost>,
    active: Option<ActiveDfu>,
    registry: Arc<SessionRegistry>,
    notifier: Arc<dyn Notifier>,
    settings: DfuSettings,
}

impl DfuService {
    pub fn new(
        host: Arc<dyn UsbHost>,
        registry: Arc<SessionRegistry>,
        notifier: Arc<dyn Notifier>,
        settings: DfuSettings,
    ) -> Self {
        Self {
            host,
            active: None,
            registry,
            notifier,
            settings,
        }
    }

    /// Select an update-mode device and bring it to dfuIDLE.
    ///
    /// A failure leaves any existing session untouched.
    pub async fn connect(&mut self) -> DeviceResult<()> {
        let active = match self.open_session().await {
            Ok(active) => active,
            Err(e) => {
                warn!("DFU connect failed: {}", e);
                self.notifier.notify(
                    &format!("Failed to connect to DFU device: {}", e),
                    MessageSeverity::Error,
                );
                return Err(e);
            }
        };

        let handle = active.device.handle();
        self.teardown_except(Some(handle.id.as_str())).await;

        info!(
            "DFU device {} ready on interface {}",
            handle.display_name(),
            active.descriptor.interface
        );
        self.registry
            .set(Transport::Update, SessionInfo::new(handle, UNKNOWN_VERSION));
        self.active = Some(active);

        self.notifier
            .notify("USB device connected!", MessageSeverity::Success);
        Ok(())
    }

    pub async fn disconnect(&mut self) {
        self.teardown().await;
        info!("DFU session closed");
    }

    async fn teardown(&mut self) {
        self.teardown_except(None).await;
    }

    /// Drop the session. The device is left open when it is `keep_id`,
    /// i.e. the picker handed back the device the new session now uses.
    async fn teardown_except(&mut self, keep_id: Option<&str>) {
        if let Some(active) = self.active.take() {
            if keep_id == Some(active.device.handle().id.as_str()) {
                debug!("Reusing open USB device {}", active.device.handle().id);
            } else {
                close_quietly(active.device.as_ref()).await;
            }
        }
        self.registry.clear(Transport::Update);
    }

    pub fn is_connected(&self) -> bool {
        self.active.is_some()
    }

    pub fn device(&self) -> Option<DeviceHandle> {
        self.active.as_ref().map(|a| a.device.handle())
    }

    pub fn transfer_state(&self) -> Option<TransferState> {
        self.active.as_ref().map(|a| a.state)
    }

    pub fn is_operating(&self) -> bool {
        self.registry.snapshot().is_operating(Transport::Update)
    }

    /// Read the current firmware image off the device
    pub async fn upload(&mut self, transfer_size: u16) -> DeviceResult<Vec<u8>> {
        let (iface, _) = match self.ready_session(transfer_size) {
            Ok(session) => session,
            Err(e) => return Err(self.fail(e)),
        };
        let guard = match self.registry.begin_operation(Transport::Update) {
            Ok(guard) => guard,
            Err(e) => return Err(self.fail(e)),
        };

        self.set_state(TransferState::Uploading);
        let result = transfer::upload(iface.as_ref(), transfer_size).await;
        drop(guard);

        match result {
            Ok(image) => {
                self.set_state(TransferState::DfuIdle);
                self.notifier.notify(
                    &format!("Read {} bytes from device.", image.len()),
                    MessageSeverity::Success,
                );
                Ok(image)
            }
            Err(e) => {
                warn!("DFU upload failed: {}", e);
                self.set_state(TransferState::Error);
                match transfer::abort_to_idle(iface.as_ref()).await {
                    Ok(()) => self.set_state(TransferState::DfuIdle),
                    Err(abort_err) => {
                        warn!("Could not return to dfuIDLE: {}, closing session", abort_err);
                        self.teardown().await;
                    }
                }
                self.notifier
                    .notify(&format!("Failed to read firmware: {}", e), MessageSeverity::Error);
                Err(e)
            }
        }
    }

    /// Write `image` to the device. The session is closed afterwards,
    /// whatever the outcome, since the device reboots or is left in error.
    pub async fn download(&mut self, transfer_size: u16, image: &[u8]) -> DeviceResult<()> {
        let (iface, device) = match self.ready_session(transfer_size) {
            Ok(session) => session,
            Err(e) => return Err(self.fail(e)),
        };
        let guard = match self.registry.begin_operation(Transport::Update) {
            Ok(guard) => guard,
            Err(e) => return Err(self.fail(e)),
        };

        self.set_state(TransferState::Downloading);
        self.notifier.notify(
            &format!("Flashing {} bytes...", image.len()),
            MessageSeverity::Info,
        );

        let outcome =
            transfer::download(iface.as_ref(), device.as_ref(), transfer_size, image).await;
        let result = match outcome {
            Err(e) if e.is_benign_manifestation_reset() => {
                info!("Ignoring {}", e);
                Ok(())
            }
            other => other,
        };
        drop(guard);
        self.teardown().await;

        match &result {
            Ok(()) => self
                .notifier
                .notify("Successfully flashed!", MessageSeverity::Success),
            Err(e) => {
                warn!("DFU download failed: {}", e);
                self.notifier
                    .notify(&format!("Failed to flash: {}", e), MessageSeverity::Error);
            }
        }
        result
    }

    /// Transfers only start from dfuIDLE; checked before any I/O
    fn ready_session(
        &self,
        transfer_size: u16,
    ) -> DeviceResult<(Arc<dyn DfuInterface>, Arc<dyn UsbDevice>)> {
        let active = self.active.as_ref().ok_or(DeviceError::NotConnected)?;
        transfer::check_transfer_size(transfer_size)?;
        if !active.state.is_ready() {
            return Err(DeviceError::NotReady(active.state));
        }
        Ok((active.interface.clone(), active.device.clone()))
    }

    fn set_state(&mut self, state: TransferState) {
        if let Some(active) = self.active.as_mut() {
            active.state = state;
        }
    }

    fn fail(&self, e: DeviceError) -> DeviceError {
        warn!("DFU operation rejected: {}", e);
        self.notifier.notify(&e.to_string(), MessageSeverity::Error);
        e
    }

    async fn open_session(&self) -> DeviceResult<ActiveDfu> {
        let device = self
            .host
            .request_device(&[UPDATE_DEVICE])
            .await
            .map_err(|e| match e {
                TransportError::Cancelled | TransportError::NotFound => DeviceError::NoDeviceSelected,
                other => DeviceError::LinkFailed(other),
            })?;
        device.open().await.map_err(DeviceError::LinkFailed)?;

        let claimed = self.claim_and_detach(device.as_ref()).await;
        let (descriptor, iface, state) = self.close_on_error(device.as_ref(), claimed).await?;

        if state == DfuState::AppDetach {
            let device = self.reenumerate(device).await?;
            let claimed = claim_in_dfu_idle(device.as_ref()).await;
            let (descriptor, iface) = self.close_on_error(device.as_ref(), claimed).await?;
            return Ok(ActiveDfu {
                device,
                descriptor,
                interface: iface,
                state: TransferState::DfuIdle,
            });
        }

        let recovered = recover_to_idle(iface.as_ref(), state).await;
        self.close_on_error(device.as_ref(), recovered).await?;

        Ok(ActiveDfu {
            device,
            descriptor,
            interface: iface,
            state: TransferState::DfuIdle,
        })
    }

    /// Close `device` if `result` failed, unless the current session is
    /// still using it
    async fn close_on_error<T>(
        &self,
        device: &dyn UsbDevice,
        result: DeviceResult<T>,
    ) -> DeviceResult<T> {
        let in_use = self
            .active
            .as_ref()
            .is_some_and(|a| a.device.handle().id == device.handle().id);
        if result.is_err() && !in_use {
            close_quietly(device).await;
        }
        result
    }

    /// Claim the DFU interface and, from appIDLE, request a detach
    async fn claim_and_detach(
        &self,
        device: &dyn UsbDevice,
    ) -> DeviceResult<(DfuInterfaceDescriptor, Arc<dyn DfuInterface>, DfuState)> {
        let descriptor = single_dfu_interface(device)?;
        let iface = device.claim(&descriptor).await?;

        let mut state = transfer::get_state(iface.as_ref()).await?;
        debug!("Initial DFU state: {}", state);

        if state == DfuState::AppIdle {
            iface.detach(self.settings.detach_timeout_ms).await?;
            state = transfer::get_state(iface.as_ref()).await?;
            if state != DfuState::AppDetach {
                return Err(DeviceError::UnexpectedState {
                    step: "detaching",
                    expected: DfuState::AppDetach,
                    actual: state,
                });
            }
        }
        Ok((descriptor, iface, state))
    }

    /// Reset a detached device and wait for it to come back in DFU mode
    async fn reenumerate(&self, device: Arc<dyn UsbDevice>) -> DeviceResult<Arc<dyn UsbDevice>> {
        let original = device.handle();

        if let Err(e) = device.reset().await {
            warn!("USB reset failed: {}, continuing anyway", e);
            sleep(self.settings.reset_backoff()).await;
        }

        let deadline = Instant::now() + self.settings.rediscovery_window();
        let found = loop {
            if let Some(found) = self.find_device(&original).await {
                break Some(found);
            }
            if Instant::now() >= deadline {
                break None;
            }
            sleep(self.settings.rediscovery_poll()).await;
        };
        // The detached handle is stale whether or not the device came back
        close_quietly(device.as_ref()).await;
        let device = found.ok_or(DeviceError::NotFoundAfterReset)?;

        sleep(self.settings.settle_delay()).await;
        device.open().await.map_err(DeviceError::LinkFailed)?;
        debug!("Re-opened {} after reset", device.handle().display_name());
        Ok(device)
    }

    async fn find_device(&self, original: &DeviceHandle) -> Option<Arc<dyn UsbDevice>> {
        match self.host.devices().await {
            Ok(devices) => devices
                .into_iter()
                .find(|d| d.handle().same_hardware(original)),
            Err(e) => {
                debug!("Listing USB devices failed: {}", e);
                None
            }
        }
    }
}

async fn claim_in_dfu_idle(
    device: &dyn UsbDevice,
) -> DeviceResult<(DfuInterfaceDescriptor, Arc<dyn DfuInterface>)> {
    let descriptor = single_dfu_interface(device)?;
    let iface = device.claim(&descriptor).await?;
    let state = transfer::get_state(iface.as_ref()).await?;
    if state != DfuState::DfuIdle {
        return Err(DeviceError::UnexpectedState {
            step: "resetting",
            expected: DfuState::DfuIdle,
            actual: state,
        });
    }
    Ok((descriptor, iface))
}

async fn recover_to_idle(iface: &dyn DfuInterface, state: DfuState) -> DeviceResult<()> {
    match state {
        DfuState::DfuIdle => Ok(()),
        DfuState::DfuError => {
            info!("Device in dfuERROR, clearing status");
            iface.clear_status().await?;
            let state = transfer::get_state(iface).await?;
            if state != DfuState::DfuIdle {
                return Err(DeviceError::UnexpectedState {
                    step: "clearing status",
                    expected: DfuState::DfuIdle,
                    actual: state,
                });
            }
            Ok(())
        }
        other => {
            info!("Device in {}, aborting to dfuIDLE", other);
            transfer::abort_to_idle(iface).await
        }
    }
}

async fn close_quietly(device: &dyn UsbDevice) {
    if let Err(e) = device.close().await {
        warn!("Closing USB device failed: {}", e);
    }
}

fn single_dfu_interface(device: &dyn UsbDevice) -> DeviceResult<DfuInterfaceDescriptor> {
    let mut interfaces = device.dfu_interfaces();
    match interfaces.len() {
        0 => Err(DeviceError::NoDfuInterface),
        1 => Ok(interfaces.remove(0)),
        n => Err(DeviceError::MultipleDfuInterfaces(n)),
    }
}
