//! HID backend interface for the provisioning transport

use crate::domain::models::DeviceHandle;
use crate::error::TransportError;
use crate::infrastructure::capabilities::UsbDeviceFilter;
use async_trait::async_trait;
use std::sync::Arc;

#[async_trait]
pub trait HidHost: Send + Sync {
    /// Device picker restricted to the given filters. An empty list means
    /// nothing was chosen.
    async fn request_devices(
        &self,
        filters: &[UsbDeviceFilter],
    ) -> Result<Vec<Arc<dyn HidDevice>>, TransportError>;
}

#[async_trait]
pub trait HidDevice: Send + Sync {
    fn handle(&self) -> DeviceHandle;

    async fn open(&self) -> Result<(), TransportError>;

    async fn close(&self) -> Result<(), TransportError>;

    /// Feature report payload, without the report id
    async fn send_feature_report(&self, report_id: u8, data: &[u8]) -> Result<(), TransportError>;

    async fn receive_feature_report(&self, report_id: u8) -> Result<Vec<u8>, TransportError>;
}
