//! GATT backend interface
//!
//! The engine talks to the host Bluetooth stack through these traits. A
//! backend only has to expose device selection, the link, and plain
//! characteristic reads and writes; discovery policy and write ordering
//! live in the engine.

use crate::domain::models::DeviceHandle;
use crate::error::TransportError;
use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

#[async_trait]
pub trait GattAdapter: Send + Sync {
    /// Ask the user (or policy) to pick a device advertising any of the
    /// given services. `Err(Cancelled)` when nothing was picked.
    async fn request_device(
        &self,
        service_filters: &[Uuid],
    ) -> Result<Arc<dyn GattDevice>, TransportError>;
}

#[async_trait]
pub trait GattDevice: Send + Sync {
    fn handle(&self) -> DeviceHandle;

    async fn connect(&self) -> Result<(), TransportError>;

    async fn disconnect(&self) -> Result<(), TransportError>;

    fn is_connected(&self) -> bool;

    async fn primary_service(&self, uuid: Uuid) -> Result<Arc<dyn GattService>, TransportError>;
}

#[async_trait]
pub trait GattService: Send + Sync {
    fn uuid(&self) -> Uuid;

    async fn characteristic(
        &self,
        uuid: Uuid,
    ) -> Result<Arc<dyn GattCharacteristic>, TransportError>;
}

/// The underlying write primitive tolerates only one outstanding operation
/// per device; callers go through the write scheduler.
#[async_trait]
pub trait GattCharacteristic: Send + Sync {
    fn uuid(&self) -> Uuid;

    async fn read_value(&self) -> Result<Vec<u8>, TransportError>;

    async fn write_value(&self, data: &[u8]) -> Result<(), TransportError>;
}
