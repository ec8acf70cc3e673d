//! In-memory GATT backend for tests

use crate::domain::models::DeviceHandle;
use crate::error::TransportError;
use crate::infrastructure::bluetooth::adapter::{
    GattAdapter, GattCharacteristic, GattDevice, GattService,
};
use crate::infrastructure::capabilities::{self, ServiceName};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

#[derive(Default)]
struct CharacteristicLog {
    attempted: Vec<Vec<u8>>,
    written: Vec<Vec<u8>>,
}

pub struct MockCharacteristic {
    uuid: Uuid,
    value: Mutex<Option<Vec<u8>>>,
    log: Mutex<CharacteristicLog>,
    failures_left: AtomicUsize,
    write_delay: Mutex<Duration>,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl MockCharacteristic {
    pub fn new(uuid: Uuid) -> Self {
        Self {
            uuid,
            value: Mutex::new(None),
            log: Mutex::new(CharacteristicLog::default()),
            failures_left: AtomicUsize::new(0),
            write_delay: Mutex::new(Duration::ZERO),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
        }
    }

    /// Readable characteristic with a fixed value
    pub fn with_value(uuid: Uuid, value: &[u8]) -> Self {
        let c = Self::new(uuid);
        *c.value.lock().unwrap() = Some(value.to_vec());
        c
    }

    pub fn fail_next_writes(&self, count: usize) {
        self.failures_left.store(count, Ordering::SeqCst);
    }

    pub fn set_write_delay(&self, delay: Duration) {
        *self.write_delay.lock().unwrap() = delay;
    }

    /// Payloads of successful writes, in order
    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.log.lock().unwrap().written.clone()
    }

    /// Payloads of every write attempt, failed ones included
    pub fn attempted_payloads(&self) -> Vec<Vec<u8>> {
        self.log.lock().unwrap().attempted.clone()
    }

    pub fn write_attempts(&self) -> usize {
        self.log.lock().unwrap().attempted.len()
    }

    pub fn max_concurrent_writes(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GattCharacteristic for MockCharacteristic {
    fn uuid(&self) -> Uuid {
        self.uuid
    }

    async fn read_value(&self) -> Result<Vec<u8>, TransportError> {
        self.value
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| TransportError::Io("read not permitted".to_string()))
    }

    async fn write_value(&self, data: &[u8]) -> Result<(), TransportError> {
        let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now_active, Ordering::SeqCst);
        self.log.lock().unwrap().attempted.push(data.to_vec());

        let delay = *self.write_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let fail = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        self.active.fetch_sub(1, Ordering::SeqCst);

        if fail {
            return Err(TransportError::Io("GATT operation failed".to_string()));
        }
        self.log.lock().unwrap().written.push(data.to_vec());
        Ok(())
    }
}

pub struct MockService {
    uuid: Uuid,
    characteristics: HashMap<Uuid, Arc<MockCharacteristic>>,
}

#[async_trait]
impl GattService for MockService {
    fn uuid(&self) -> Uuid {
        self.uuid
    }

    async fn characteristic(
        &self,
        uuid: Uuid,
    ) -> Result<Arc<dyn GattCharacteristic>, TransportError> {
        self.characteristics
            .get(&uuid)
            .cloned()
            .map(|c| c as Arc<dyn GattCharacteristic>)
            .ok_or(TransportError::NotFound)
    }
}

pub struct MockDevice {
    handle: DeviceHandle,
    services: HashMap<Uuid, Arc<MockService>>,
    characteristics: HashMap<Uuid, Arc<MockCharacteristic>>,
    connected: AtomicBool,
    fail_connect: AtomicBool,
    connects: AtomicUsize,
    service_lookups: AtomicUsize,
}

impl MockDevice {
    /// Device exposing the given services with all their characteristics.
    /// Version characteristics answer with `version`, `branch`, `commit`.
    pub fn with_services(id: &str, services: &[ServiceName]) -> Self {
        Self::build(id, services, &[])
    }

    /// Like [`with_services`](Self::with_services) but leaving out some
    /// characteristics
    pub fn build(id: &str, services: &[ServiceName], missing_chars: &[Uuid]) -> Self {
        let mut service_map = HashMap::new();
        let mut char_map = HashMap::new();

        for name in services {
            let entry = capabilities::service(*name);
            let mut characteristics = HashMap::new();
            for (char_name, uuid) in entry.characteristics {
                if missing_chars.contains(uuid) {
                    continue;
                }
                let c = if *name == ServiceName::Version {
                    Arc::new(MockCharacteristic::with_value(
                        *uuid,
                        char_name.to_string().as_bytes(),
                    ))
                } else {
                    Arc::new(MockCharacteristic::new(*uuid))
                };
                char_map.insert(*uuid, c.clone());
                characteristics.insert(*uuid, c);
            }
            service_map.insert(
                entry.uuid,
                Arc::new(MockService {
                    uuid: entry.uuid,
                    characteristics,
                }),
            );
        }

        Self {
            handle: DeviceHandle {
                id: id.to_string(),
                name: Some(format!("Mock {}", id)),
                ..Default::default()
            },
            services: service_map,
            characteristics: char_map,
            connected: AtomicBool::new(false),
            fail_connect: AtomicBool::new(false),
            connects: AtomicUsize::new(0),
            service_lookups: AtomicUsize::new(0),
        }
    }

    pub fn characteristic(&self, uuid: Uuid) -> Arc<MockCharacteristic> {
        self.characteristics[&uuid].clone()
    }

    pub fn set_fail_connect(&self, fail: bool) {
        self.fail_connect.store(fail, Ordering::SeqCst);
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn service_lookups(&self) -> usize {
        self.service_lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GattDevice for MockDevice {
    fn handle(&self) -> DeviceHandle {
        self.handle.clone()
    }

    async fn connect(&self) -> Result<(), TransportError> {
        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(TransportError::Io("GATT server unreachable".to_string()));
        }
        self.connects.fetch_add(1, Ordering::SeqCst);
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn primary_service(&self, uuid: Uuid) -> Result<Arc<dyn GattService>, TransportError> {
        self.service_lookups.fetch_add(1, Ordering::SeqCst);
        self.services
            .get(&uuid)
            .cloned()
            .map(|s| s as Arc<dyn GattService>)
            .ok_or(TransportError::NotFound)
    }
}

/// Adapter whose picker returns a preset device, or cancels
#[derive(Default)]
pub struct MockAdapter {
    device: Mutex<Option<Arc<MockDevice>>>,
    filters: Mutex<Vec<Uuid>>,
}

impl MockAdapter {
    pub fn with_device(device: Arc<MockDevice>) -> Self {
        Self {
            device: Mutex::new(Some(device)),
            filters: Mutex::new(Vec::new()),
        }
    }

    pub fn set_device(&self, device: Option<Arc<MockDevice>>) {
        *self.device.lock().unwrap() = device;
    }

    pub fn last_filters(&self) -> Vec<Uuid> {
        self.filters.lock().unwrap().clone()
    }
}

#[async_trait]
impl GattAdapter for MockAdapter {
    async fn request_device(
        &self,
        service_filters: &[Uuid],
    ) -> Result<Arc<dyn GattDevice>, TransportError> {
        *self.filters.lock().unwrap() = service_filters.to_vec();
        self.device
            .lock()
            .unwrap()
            .clone()
            .map(|d| d as Arc<dyn GattDevice>)
            .ok_or(TransportError::Cancelled)
    }
}
