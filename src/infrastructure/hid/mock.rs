//! In-memory HID backend for tests

use crate::domain::models::DeviceHandle;
use crate::error::TransportError;
use crate::infrastructure::capabilities::UsbDeviceFilter;
use crate::infrastructure::hid::device::{HidDevice, HidHost};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HidEvent {
    Open,
    Close,
    Send(u8, Vec<u8>),
    Receive(u8),
}

pub struct MockHidDevice {
    handle: DeviceHandle,
    version_report: Vec<u8>,
    events: Mutex<Vec<HidEvent>>,
    failing_reports: Mutex<HashMap<u8, TransportError>>,
}

impl MockHidDevice {
    pub fn new(id: &str, vendor_id: u16, product_id: u16, version_report: &[u8]) -> Self {
        Self {
            handle: DeviceHandle {
                id: id.to_string(),
                name: Some("PassingLink".to_string()),
                serial_number: None,
                vendor_id: Some(vendor_id),
                product_id: Some(product_id),
            },
            version_report: version_report.to_vec(),
            events: Mutex::new(Vec::new()),
            failing_reports: Mutex::new(HashMap::new()),
        }
    }

    /// Sending or receiving `report_id` fails with `error`
    pub fn fail_report(&self, report_id: u8, error: TransportError) {
        self.failing_reports.lock().unwrap().insert(report_id, error);
    }

    pub fn events(&self) -> Vec<HidEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn sent(&self) -> Vec<(u8, Vec<u8>)> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                HidEvent::Send(id, data) => Some((id, data)),
                _ => None,
            })
            .collect()
    }

    fn failure(&self, report_id: u8) -> Option<TransportError> {
        self.failing_reports.lock().unwrap().get(&report_id).cloned()
    }

    fn record(&self, event: HidEvent) {
        self.events.lock().unwrap().push(event);
    }
}

#[async_trait]
impl HidDevice for MockHidDevice {
    fn handle(&self) -> DeviceHandle {
        self.handle.clone()
    }

    async fn open(&self) -> Result<(), TransportError> {
        self.record(HidEvent::Open);
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.record(HidEvent::Close);
        Ok(())
    }

    async fn send_feature_report(&self, report_id: u8, data: &[u8]) -> Result<(), TransportError> {
        self.record(HidEvent::Send(report_id, data.to_vec()));
        match self.failure(report_id) {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn receive_feature_report(&self, report_id: u8) -> Result<Vec<u8>, TransportError> {
        self.record(HidEvent::Receive(report_id));
        match self.failure(report_id) {
            Some(e) => Err(e),
            None => Ok(self.version_report.clone()),
        }
    }
}

#[derive(Default)]
pub struct MockHidHost {
    devices: Mutex<Vec<Arc<MockHidDevice>>>,
    filters: Mutex<Vec<UsbDeviceFilter>>,
}

impl MockHidHost {
    pub fn with_devices(devices: Vec<Arc<MockHidDevice>>) -> Self {
        Self {
            devices: Mutex::new(devices),
            filters: Mutex::new(Vec::new()),
        }
    }

    pub fn last_filters(&self) -> Vec<UsbDeviceFilter> {
        self.filters.lock().unwrap().clone()
    }
}

#[async_trait]
impl HidHost for MockHidHost {
    async fn request_devices(
        &self,
        filters: &[UsbDeviceFilter],
    ) -> Result<Vec<Arc<dyn HidDevice>>, TransportError> {
        *self.filters.lock().unwrap() = filters.to_vec();
        Ok(self
            .devices
            .lock()
            .unwrap()
            .iter()
            .filter(|d| {
                filters
                    .iter()
                    .any(|f| f.matches(d.handle.vendor_id, d.handle.product_id))
            })
            .map(|d| d.clone() as Arc<dyn HidDevice>)
            .collect())
    }
}
