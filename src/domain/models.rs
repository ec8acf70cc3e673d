use std::fmt;

/// Identity of a physical device as reported by the transport layer.
///
/// The engine only holds this for the lifetime of a session and never
/// persists it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceHandle {
    /// Backend specific identifier (Bluetooth address, USB bus path, ...)
    pub id: String,
    pub name: Option<String>,
    pub serial_number: Option<String>,
    pub vendor_id: Option<u16>,
    pub product_id: Option<u16>,
}

impl DeviceHandle {
    /// Human readable label for notifications and logs
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }

    /// True if both handles describe the same vendor/product/serial triple.
    ///
    /// Used to find a device again after it re-enumerates with a new `id`.
    pub fn same_hardware(&self, other: &DeviceHandle) -> bool {
        self.vendor_id == other.vendor_id
            && self.product_id == other.product_id
            && self.serial_number == other.serial_number
    }
}

/// The three transports the engine can hold a session on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Transport {
    /// GATT link used for identity, input streaming and camera control
    Wireless,
    /// USB DFU mode used for firmware upload/download
    Update,
    /// USB HID mode used for provisioning
    Provisioning,
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Wireless => write!(f, "wireless"),
            Self::Update => write!(f, "update"),
            Self::Provisioning => write!(f, "provisioning"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

/// Identity strings read from the wireless version service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub version: String,
    pub branch: String,
    pub commit: String,
}

pub const UNKNOWN_VERSION: &str = "unknown";

impl Default for DeviceInfo {
    fn default() -> Self {
        Self {
            version: UNKNOWN_VERSION.to_string(),
            branch: UNKNOWN_VERSION.to_string(),
            commit: UNKNOWN_VERSION.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum AppEvent {
    ConnectionStatus(Transport, ConnectionStatus),
    LogMessage(StatusMessage),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusMessage {
    pub message: String,
    pub severity: MessageSeverity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageSeverity {
    Info,
    Success,
    Warning,
    Error,
}
