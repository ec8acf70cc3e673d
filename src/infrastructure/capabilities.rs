//! Capability Registry
//!
//! Static table of everything the engine knows how to talk to: GATT
//! services and characteristics for the wireless link, USB vendor/product
//! ids for the update and provisioning modes.
//!
//! All GATT identifiers share the `1209214d-246d-2815-27c6-f57dad45xxxx`
//! base. The high byte of the last group selects the service, the low byte
//! the characteristic.

use std::fmt;
use uuid::Uuid;

/// Logical GATT service names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ServiceName {
    Version,
    Input,
    Settings,
    /// Spectator camera control
    Camera,
}

impl fmt::Display for ServiceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Version => "version",
            Self::Input => "input",
            Self::Settings => "settings",
            Self::Camera => "camera",
        };
        f.write_str(name)
    }
}

/// Logical GATT characteristic names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CharacteristicName {
    Version,
    Branch,
    Commit,
    Input,
    CameraSelect,
    CameraReset,
}

impl fmt::Display for CharacteristicName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Version => "version",
            Self::Branch => "branch",
            Self::Commit => "commit",
            Self::Input => "input",
            Self::CameraSelect => "camera",
            Self::CameraReset => "reset",
        };
        f.write_str(name)
    }
}

#[derive(Debug)]
pub struct ServiceEntry {
    pub name: ServiceName,
    pub uuid: Uuid,
    pub characteristics: &'static [(CharacteristicName, Uuid)],
}

const fn gatt_uuid(suffix: u16) -> Uuid {
    Uuid::from_u128(0x1209214d_246d_2815_27c6_f57dad450000 | suffix as u128)
}

pub const VERSION_SERVICE_UUID: Uuid = gatt_uuid(0x0000);
pub const VERSION_CHAR_UUID: Uuid = gatt_uuid(0x0001);
pub const BRANCH_CHAR_UUID: Uuid = gatt_uuid(0x0002);
pub const COMMIT_CHAR_UUID: Uuid = gatt_uuid(0x0003);

pub const INPUT_SERVICE_UUID: Uuid = gatt_uuid(0x0100);
pub const INPUT_CHAR_UUID: Uuid = gatt_uuid(0x0101);

pub const SETTINGS_SERVICE_UUID: Uuid = gatt_uuid(0x0200);

pub const CAMERA_SERVICE_UUID: Uuid = gatt_uuid(0x2800);
pub const CAMERA_SELECT_CHAR_UUID: Uuid = gatt_uuid(0x2801);
pub const CAMERA_RESET_CHAR_UUID: Uuid = gatt_uuid(0x2802);

pub static SERVICES: &[ServiceEntry] = &[
    ServiceEntry {
        name: ServiceName::Version,
        uuid: VERSION_SERVICE_UUID,
        characteristics: &[
            (CharacteristicName::Version, VERSION_CHAR_UUID),
            (CharacteristicName::Branch, BRANCH_CHAR_UUID),
            (CharacteristicName::Commit, COMMIT_CHAR_UUID),
        ],
    },
    ServiceEntry {
        name: ServiceName::Input,
        uuid: INPUT_SERVICE_UUID,
        characteristics: &[(CharacteristicName::Input, INPUT_CHAR_UUID)],
    },
    ServiceEntry {
        name: ServiceName::Settings,
        uuid: SETTINGS_SERVICE_UUID,
        characteristics: &[],
    },
    ServiceEntry {
        name: ServiceName::Camera,
        uuid: CAMERA_SERVICE_UUID,
        characteristics: &[
            (CharacteristicName::CameraSelect, CAMERA_SELECT_CHAR_UUID),
            (CharacteristicName::CameraReset, CAMERA_RESET_CHAR_UUID),
        ],
    },
];

pub fn service(name: ServiceName) -> &'static ServiceEntry {
    SERVICES
        .iter()
        .find(|s| s.name == name)
        .unwrap_or_else(|| unreachable!("every ServiceName has a registry entry"))
}

/// Service UUIDs used to filter the device picker
pub fn service_filters() -> Vec<Uuid> {
    SERVICES.iter().map(|s| s.uuid).collect()
}

/// USB vendor/product pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsbDeviceFilter {
    pub vendor_id: u16,
    pub product_id: u16,
}

impl UsbDeviceFilter {
    pub fn matches(&self, vendor_id: Option<u16>, product_id: Option<u16>) -> bool {
        vendor_id == Some(self.vendor_id) && product_id == Some(self.product_id)
    }
}

impl fmt::Display for UsbDeviceFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04x}:{:04x}", self.vendor_id, self.product_id)
    }
}

/// Controller booted into its DFU-capable firmware update mode
pub const UPDATE_DEVICE: UsbDeviceFilter = UsbDeviceFilter {
    vendor_id: 0x1209,
    product_id: 0x214d,
};

/// Controllers that accept provisioning over HID feature reports
pub const PROVISIONING_DEVICES: &[UsbDeviceFilter] = &[
    UsbDeviceFilter {
        vendor_id: 0x1209,
        product_id: 0x214c,
    },
    // HORI-compatible mode
    UsbDeviceFilter {
        vendor_id: 0x0f0d,
        product_id: 0x0092,
    },
];
