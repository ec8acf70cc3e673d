//! In-memory USB/DFU backend for tests

use crate::domain::models::DeviceHandle;
use crate::error::TransportError;
use crate::infrastructure::capabilities::UsbDeviceFilter;
use crate::infrastructure::dfu::device::{
    DfuInterface, DfuInterfaceDescriptor, UsbDevice, UsbHost,
};
use crate::infrastructure::dfu::protocol::DfuState;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

struct DfuModel {
    state: DfuState,
    status: u8,
    image: Vec<u8>,
    downloaded: Vec<u8>,
    upload_blocks: Vec<u16>,
    download_blocks: Vec<(u16, usize)>,
    fail_download_at: Option<u16>,
    upload_error: Option<TransportError>,
    abort_error: Option<TransportError>,
    detach_to: DfuState,
}

/// DFU state machine good enough to drive connect and transfers
pub struct MockDfu {
    model: Mutex<DfuModel>,
    requests: AtomicUsize,
}

impl MockDfu {
    pub fn with_state(state: DfuState) -> Self {
        Self {
            model: Mutex::new(DfuModel {
                state,
                status: 0,
                image: Vec::new(),
                downloaded: Vec::new(),
                upload_blocks: Vec::new(),
                download_blocks: Vec::new(),
                fail_download_at: None,
                upload_error: None,
                abort_error: None,
                detach_to: DfuState::AppDetach,
            }),
            requests: AtomicUsize::new(0),
        }
    }

    pub fn dfu_idle() -> Self {
        Self::with_state(DfuState::DfuIdle)
    }

    pub fn app_idle() -> Self {
        Self::with_state(DfuState::AppIdle)
    }

    pub fn set_image(&self, image: Vec<u8>) {
        self.model().image = image;
    }

    /// State the device reports after DETACH
    pub fn set_detach_result(&self, state: DfuState) {
        self.model().detach_to = state;
    }

    /// Report errWRITE/dfuERROR once the given block has been written
    pub fn fail_download_at_block(&self, block: u16) {
        self.model().fail_download_at = Some(block);
    }

    /// The next UPLOAD request fails with `error`
    pub fn fail_next_upload(&self, error: TransportError) {
        self.model().upload_error = Some(error);
    }

    /// Every subsequent ABORT fails with `error`
    pub fn fail_aborts(&self, error: TransportError) {
        self.model().abort_error = Some(error);
    }

    pub fn upload_blocks(&self) -> Vec<u16> {
        self.model().upload_blocks.clone()
    }

    /// (block number, length) of every DNLOAD, final empty block included
    pub fn download_blocks(&self) -> Vec<(u16, usize)> {
        self.model().download_blocks.clone()
    }

    pub fn downloaded(&self) -> Vec<u8> {
        self.model().downloaded.clone()
    }

    /// Number of class requests issued so far
    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    fn model(&self) -> std::sync::MutexGuard<'_, DfuModel> {
        self.model.lock().unwrap()
    }

    fn count(&self) {
        self.requests.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl DfuInterface for MockDfu {
    async fn detach(&self, _timeout_ms: u16) -> Result<(), TransportError> {
        self.count();
        let mut m = self.model();
        if m.state == DfuState::AppIdle {
            m.state = m.detach_to;
        }
        Ok(())
    }

    async fn download(&self, block: u16, data: &[u8]) -> Result<usize, TransportError> {
        self.count();
        let mut m = self.model();
        m.download_blocks.push((block, data.len()));
        if data.is_empty() {
            m.state = DfuState::ManifestSync;
            return Ok(0);
        }
        m.downloaded.extend_from_slice(data);
        if m.fail_download_at == Some(block) {
            m.state = DfuState::DfuError;
            m.status = 0x03;
        } else {
            m.state = DfuState::DnBusy;
        }
        Ok(data.len())
    }

    async fn upload(&self, block: u16, length: u16) -> Result<Vec<u8>, TransportError> {
        self.count();
        let mut m = self.model();
        if let Some(e) = m.upload_error.take() {
            return Err(e);
        }
        m.upload_blocks.push(block);
        let start = (usize::from(block) * usize::from(length)).min(m.image.len());
        let end = (start + usize::from(length)).min(m.image.len());
        let chunk = m.image[start..end].to_vec();
        m.state = if chunk.len() < usize::from(length) {
            DfuState::DfuIdle
        } else {
            DfuState::UploadIdle
        };
        Ok(chunk)
    }

    async fn get_status(&self) -> Result<Vec<u8>, TransportError> {
        self.count();
        let mut m = self.model();
        let reported = m.state;
        // Busy states advance on the next poll
        m.state = match m.state {
            DfuState::DnBusy => DfuState::DnloadIdle,
            DfuState::ManifestSync => DfuState::ManifestWaitReset,
            other => other,
        };
        let poll_ms: u8 = if reported == DfuState::DnBusy { 1 } else { 0 };
        Ok(vec![m.status, poll_ms, 0, 0, u8::from(reported), 0])
    }

    async fn get_state(&self) -> Result<u8, TransportError> {
        self.count();
        Ok(u8::from(self.model().state))
    }

    async fn clear_status(&self) -> Result<(), TransportError> {
        self.count();
        let mut m = self.model();
        if m.state == DfuState::DfuError {
            m.state = DfuState::DfuIdle;
            m.status = 0;
        }
        Ok(())
    }

    async fn abort(&self) -> Result<(), TransportError> {
        self.count();
        let mut m = self.model();
        if let Some(e) = m.abort_error.clone() {
            return Err(e);
        }
        match m.state {
            DfuState::AppIdle | DfuState::AppDetach | DfuState::DfuError => {}
            _ => m.state = DfuState::DfuIdle,
        }
        Ok(())
    }
}

/// Devices currently visible to the mock host
#[derive(Default)]
pub struct MockBus {
    devices: Mutex<Vec<Arc<MockUsbDevice>>>,
}

impl MockBus {
    fn replace(&self, old_id: &str, next: Option<Arc<MockUsbDevice>>) {
        let mut devices = self.devices.lock().unwrap();
        devices.retain(|d| d.handle.id != old_id);
        if let Some(next) = next {
            devices.push(next);
        }
    }
}

pub struct MockUsbDevice {
    handle: DeviceHandle,
    dfu: Arc<MockDfu>,
    interfaces: Mutex<Vec<DfuInterfaceDescriptor>>,
    reset_error: Mutex<Option<TransportError>>,
    /// Set when a reset makes this device re-enumerate as another one
    reenumerate: Mutex<Option<(Arc<MockBus>, Option<Arc<MockUsbDevice>>)>>,
    opens: AtomicUsize,
    closes: AtomicUsize,
    resets: AtomicUsize,
}

impl MockUsbDevice {
    fn new(id: &str, serial: &str, product_id: u16, dfu: Arc<MockDfu>) -> Self {
        Self {
            handle: DeviceHandle {
                id: id.to_string(),
                name: Some("PassingLink".to_string()),
                serial_number: Some(serial.to_string()),
                vendor_id: Some(0x1209),
                product_id: Some(product_id),
            },
            dfu,
            interfaces: Mutex::new(vec![DfuInterfaceDescriptor {
                configuration: 1,
                interface: 0,
                alternate: 0,
                name: Some("Internal Flash".to_string()),
            }]),
            reset_error: Mutex::new(None),
            reenumerate: Mutex::new(None),
            opens: AtomicUsize::new(0),
            closes: AtomicUsize::new(0),
            resets: AtomicUsize::new(0),
        }
    }

    /// Update-mode device (0x1209:0x214d) backed by `dfu`
    pub fn update_mode(serial: &str, dfu: Arc<MockDfu>) -> Self {
        Self::new(&format!("usb-{}", serial), serial, 0x214d, dfu)
    }

    /// Same hardware after re-enumeration: new id, same vid/pid/serial
    pub fn reenumerated(serial: &str, dfu: Arc<MockDfu>) -> Self {
        Self::new(&format!("usb-{}-dfu", serial), serial, 0x214d, dfu)
    }

    pub fn set_interfaces(&self, interfaces: Vec<DfuInterfaceDescriptor>) {
        *self.interfaces.lock().unwrap() = interfaces;
    }

    /// Every subsequent reset fails with `error`
    pub fn fail_resets(&self, error: TransportError) {
        *self.reset_error.lock().unwrap() = Some(error);
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn resets(&self) -> usize {
        self.resets.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl UsbDevice for MockUsbDevice {
    fn handle(&self) -> DeviceHandle {
        self.handle.clone()
    }

    async fn open(&self) -> Result<(), TransportError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn reset(&self) -> Result<(), TransportError> {
        self.resets.fetch_add(1, Ordering::SeqCst);
        // The device drops off the bus whether or not the host saw an error
        if let Some((bus, next)) = self.reenumerate.lock().unwrap().take() {
            bus.replace(&self.handle.id, next);
        }
        match self.reset_error.lock().unwrap().clone() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn dfu_interfaces(&self) -> Vec<DfuInterfaceDescriptor> {
        self.interfaces.lock().unwrap().clone()
    }

    async fn claim(
        &self,
        _descriptor: &DfuInterfaceDescriptor,
    ) -> Result<Arc<dyn DfuInterface>, TransportError> {
        Ok(self.dfu.clone())
    }
}

/// Host whose picker returns a preset device, or cancels
#[derive(Default)]
pub struct MockUsbHost {
    picker: Mutex<Option<Arc<MockUsbDevice>>>,
    bus: Arc<MockBus>,
    filters: Mutex<Vec<UsbDeviceFilter>>,
    device_queries: AtomicUsize,
}

impl MockUsbHost {
    /// Host with `device` plugged in and offered by the picker
    pub fn with_device(device: Arc<MockUsbDevice>) -> Self {
        let host = Self::default();
        host.bus.devices.lock().unwrap().push(device.clone());
        *host.picker.lock().unwrap() = Some(device);
        host
    }

    pub fn set_picker(&self, device: Option<Arc<MockUsbDevice>>) {
        *self.picker.lock().unwrap() = device;
    }

    /// Resetting `device` makes it vanish and `next` (if any) appear
    pub fn reenumerate_on_reset(&self, device: &MockUsbDevice, next: Option<Arc<MockUsbDevice>>) {
        *device.reenumerate.lock().unwrap() = Some((self.bus.clone(), next));
    }

    pub fn last_filters(&self) -> Vec<UsbDeviceFilter> {
        self.filters.lock().unwrap().clone()
    }

    pub fn device_queries(&self) -> usize {
        self.device_queries.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl UsbHost for MockUsbHost {
    async fn request_device(
        &self,
        filters: &[UsbDeviceFilter],
    ) -> Result<Arc<dyn UsbDevice>, TransportError> {
        *self.filters.lock().unwrap() = filters.to_vec();
        self.picker
            .lock()
            .unwrap()
            .clone()
            .map(|d| d as Arc<dyn UsbDevice>)
            .ok_or(TransportError::Cancelled)
    }

    async fn devices(&self) -> Result<Vec<Arc<dyn UsbDevice>>, TransportError> {
        self.device_queries.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .bus
            .devices
            .lock()
            .unwrap()
            .iter()
            .map(|d| d.clone() as Arc<dyn UsbDevice>)
            .collect())
    }
}
