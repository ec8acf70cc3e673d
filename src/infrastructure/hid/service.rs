//! HID Service Module
//!
//! Provisioning session over HID feature reports.

use crate::domain::models::{DeviceHandle, MessageSeverity, Transport};
use crate::error::{DeviceError, DeviceResult, TransportError};
use crate::infrastructure::capabilities::PROVISIONING_DEVICES;
use crate::infrastructure::hid::device::{HidDevice, HidHost};
use crate::infrastructure::hid::protocol::{self, MAX_CHUNKS};
use crate::infrastructure::notifier::Notifier;
use crate::infrastructure::registry::{SessionInfo, SessionRegistry};
use std::sync::Arc;
use tracing::{debug, info, warn};

struct ActiveHid {
    device: Arc<dyn HidDevice>,
    version: String,
}

pub struct HidService {
    host: Arc<dyn HidHost>,
    active: Option<ActiveHid>,
    registry: Arc<SessionRegistry>,
    notifier: Arc<dyn Notifier>,
}

impl HidService {
    pub fn new(
        host: Arc<dyn HidHost>,
        registry: Arc<SessionRegistry>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            host,
            active: None,
            registry,
            notifier,
        }
    }

    /// Pick a provisioning-mode device, open it and read its version
    pub async fn connect(&mut self) -> DeviceResult<String> {
        let active = match self.open_session().await {
            Ok(active) => active,
            Err(e) => {
                warn!("HID connect failed: {}", e);
                self.notifier.notify(
                    &format!("Failed to connect to HID device: {}", e),
                    MessageSeverity::Error,
                );
                return Err(e);
            }
        };

        let handle = active.device.handle();
        self.teardown_except(Some(handle.id.as_str())).await;

        info!(
            "HID device {} connected, version {}",
            handle.display_name(),
            active.version
        );
        let version = active.version.clone();
        self.registry.set(
            Transport::Provisioning,
            SessionInfo::new(handle, version.clone()),
        );
        self.active = Some(active);

        self.notifier
            .notify("HID device connected!", MessageSeverity::Success);
        Ok(version)
    }

    pub async fn disconnect(&mut self) {
        self.teardown().await;
        info!("HID session closed");
    }

    async fn teardown(&mut self) {
        self.teardown_except(None).await;
    }

    /// Drop the session, leaving the device open if it is `keep_id`
    async fn teardown_except(&mut self, keep_id: Option<&str>) {
        if let Some(active) = self.active.take() {
            if keep_id == Some(active.device.handle().id.as_str()) {
                debug!("Reusing open HID device {}", active.device.handle().id);
            } else if let Err(e) = active.device.close().await {
                warn!("Closing HID device failed: {}", e);
            }
        }
        self.registry.clear(Transport::Provisioning);
    }

    pub fn is_connected(&self) -> bool {
        self.active.is_some()
    }

    pub fn device(&self) -> Option<DeviceHandle> {
        self.active.as_ref().map(|a| a.device.handle())
    }

    pub fn version(&self) -> Option<&str> {
        self.active.as_ref().map(|a| a.version.as_str())
    }

    pub fn is_operating(&self) -> bool {
        self.registry.snapshot().is_operating(Transport::Provisioning)
    }

    /// Send `data` as chunk reports, commit, then ask the device to reboot.
    ///
    /// The session is closed afterwards whatever the outcome. Oversized
    /// payloads are rejected before any report is sent.
    pub async fn provision(&mut self, data: &[u8]) -> DeviceResult<()> {
        let device = match self.active.as_ref() {
            Some(active) => active.device.clone(),
            None => return Err(self.fail(DeviceError::NotConnected)),
        };
        let reports = match protocol::chunk_reports(data) {
            Some(reports) => reports,
            None => {
                return Err(self.fail(DeviceError::PayloadTooLarge {
                    len: data.len(),
                    max_chunks: MAX_CHUNKS,
                }))
            }
        };
        let guard = match self.registry.begin_operation(Transport::Provisioning) {
            Ok(guard) => guard,
            Err(e) => return Err(self.fail(e)),
        };

        self.notifier.notify(
            &format!("Provisioning with {} bytes...", data.len()),
            MessageSeverity::Info,
        );

        let result = send_and_commit(device.as_ref(), &reports).await;
        if result.is_ok() {
            self.notifier
                .notify("Done provisioning, rebooting...", MessageSeverity::Success);
            // The device reboots immediately, so this usually errors
            if let Err(e) = device
                .send_feature_report(protocol::REPORT_REBOOT, &[1])
                .await
            {
                debug!("Ignoring reboot report error: {}", e);
            }
        }

        drop(guard);
        self.teardown().await;

        if let Err(e) = &result {
            warn!("Provisioning failed: {}", e);
            self.notifier
                .notify(&format!("Failed to provision: {}", e), MessageSeverity::Error);
        }
        result
    }

    fn fail(&self, e: DeviceError) -> DeviceError {
        warn!("HID operation rejected: {}", e);
        self.notifier.notify(&e.to_string(), MessageSeverity::Error);
        e
    }

    async fn open_session(&self) -> DeviceResult<ActiveHid> {
        let devices = self
            .host
            .request_devices(PROVISIONING_DEVICES)
            .await
            .map_err(|e| match e {
                TransportError::Cancelled | TransportError::NotFound => DeviceError::NoDeviceSelected,
                other => DeviceError::LinkFailed(other),
            })?;
        let device = devices
            .into_iter()
            .next()
            .ok_or(DeviceError::NoDeviceSelected)?;

        device.open().await.map_err(DeviceError::LinkFailed)?;

        let version_report = device.receive_feature_report(protocol::REPORT_VERSION).await;
        match version_report {
            Ok(bytes) => Ok(ActiveHid {
                version: protocol::decode_version(&bytes),
                device,
            }),
            Err(e) => {
                let in_use = self
                    .active
                    .as_ref()
                    .is_some_and(|a| a.device.handle().id == device.handle().id);
                if !in_use {
                    if let Err(close_err) = device.close().await {
                        debug!("Closing HID device failed: {}", close_err);
                    }
                }
                Err(DeviceError::Transport(e))
            }
        }
    }
}

async fn send_and_commit(device: &dyn HidDevice, reports: &[Vec<u8>]) -> DeviceResult<()> {
    for report in reports {
        debug!("Writing chunk {} ({} bytes)", report[0], report.len() - 1);
        device
            .send_feature_report(protocol::REPORT_CHUNK, report)
            .await?;
    }
    device
        .send_feature_report(protocol::REPORT_COMMIT, &protocol::commit_report())
        .await?;
    Ok(())
}
