//! USB backend interface for the update transport

use crate::domain::models::DeviceHandle;
use crate::error::TransportError;
use crate::infrastructure::capabilities::UsbDeviceFilter;
use async_trait::async_trait;
use std::sync::Arc;

/// A DFU interface found in the active configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DfuInterfaceDescriptor {
    pub configuration: u8,
    pub interface: u8,
    pub alternate: u8,
    pub name: Option<String>,
}

#[async_trait]
pub trait UsbHost: Send + Sync {
    /// Device picker restricted to the given filters
    async fn request_device(
        &self,
        filters: &[UsbDeviceFilter],
    ) -> Result<Arc<dyn UsbDevice>, TransportError>;

    /// Devices the host already has access to, used after re-enumeration
    async fn devices(&self) -> Result<Vec<Arc<dyn UsbDevice>>, TransportError>;
}

#[async_trait]
pub trait UsbDevice: Send + Sync {
    fn handle(&self) -> DeviceHandle;

    async fn open(&self) -> Result<(), TransportError>;

    async fn close(&self) -> Result<(), TransportError>;

    /// Port reset; the device drops off the bus and re-enumerates
    async fn reset(&self) -> Result<(), TransportError>;

    /// DFU interfaces (class 0xFE, subclass 0x01) of the open device
    fn dfu_interfaces(&self) -> Vec<DfuInterfaceDescriptor>;

    async fn claim(
        &self,
        descriptor: &DfuInterfaceDescriptor,
    ) -> Result<Arc<dyn DfuInterface>, TransportError>;
}

/// Raw DFU class requests on a claimed interface
#[async_trait]
pub trait DfuInterface: Send + Sync {
    async fn detach(&self, timeout_ms: u16) -> Result<(), TransportError>;

    /// DFU_DNLOAD; an empty block marks the end of the image
    async fn download(&self, block: u16, data: &[u8]) -> Result<usize, TransportError>;

    /// DFU_UPLOAD of up to `length` bytes
    async fn upload(&self, block: u16, length: u16) -> Result<Vec<u8>, TransportError>;

    /// Raw 6-byte DFU_GETSTATUS response
    async fn get_status(&self) -> Result<Vec<u8>, TransportError>;

    async fn get_state(&self) -> Result<u8, TransportError>;

    async fn clear_status(&self) -> Result<(), TransportError>;

    async fn abort(&self) -> Result<(), TransportError>;
}
