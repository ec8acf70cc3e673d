//! USB DFU 1.1 protocol definitions
//!
//! Device states and status codes as reported by DFU_GETSTATUS and
//! DFU_GETSTATE, plus the engine-level [`TransferState`] derived from them.

use std::fmt;
use std::time::Duration;

/// DFU class request codes
pub mod request {
    pub const DETACH: u8 = 0x00;
    pub const DNLOAD: u8 = 0x01;
    pub const UPLOAD: u8 = 0x02;
    pub const GETSTATUS: u8 = 0x03;
    pub const CLRSTATUS: u8 = 0x04;
    pub const GETSTATE: u8 = 0x05;
    pub const ABORT: u8 = 0x06;
}

/// USB interface class/subclass identifying a DFU interface
pub const DFU_INTERFACE_CLASS: u8 = 0xFE;
pub const DFU_INTERFACE_SUBCLASS: u8 = 0x01;

/// Length of a DFU_GETSTATUS response
pub const STATUS_LEN: usize = 6;

/// Device-reported DFU state (bState)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DfuState {
    AppIdle,
    AppDetach,
    DfuIdle,
    DnloadSync,
    DnBusy,
    DnloadIdle,
    ManifestSync,
    Manifest,
    ManifestWaitReset,
    UploadIdle,
    DfuError,
    Unknown(u8),
}

impl From<u8> for DfuState {
    fn from(value: u8) -> Self {
        match value {
            0 => Self::AppIdle,
            1 => Self::AppDetach,
            2 => Self::DfuIdle,
            3 => Self::DnloadSync,
            4 => Self::DnBusy,
            5 => Self::DnloadIdle,
            6 => Self::ManifestSync,
            7 => Self::Manifest,
            8 => Self::ManifestWaitReset,
            9 => Self::UploadIdle,
            10 => Self::DfuError,
            other => Self::Unknown(other),
        }
    }
}

impl From<DfuState> for u8 {
    fn from(state: DfuState) -> Self {
        match state {
            DfuState::AppIdle => 0,
            DfuState::AppDetach => 1,
            DfuState::DfuIdle => 2,
            DfuState::DnloadSync => 3,
            DfuState::DnBusy => 4,
            DfuState::DnloadIdle => 5,
            DfuState::ManifestSync => 6,
            DfuState::Manifest => 7,
            DfuState::ManifestWaitReset => 8,
            DfuState::UploadIdle => 9,
            DfuState::DfuError => 10,
            DfuState::Unknown(v) => v,
        }
    }
}

impl fmt::Display for DfuState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::AppIdle => "appIDLE",
            Self::AppDetach => "appDETACH",
            Self::DfuIdle => "dfuIDLE",
            Self::DnloadSync => "dfuDNLOAD-SYNC",
            Self::DnBusy => "dfuDNBUSY",
            Self::DnloadIdle => "dfuDNLOAD-IDLE",
            Self::ManifestSync => "dfuMANIFEST-SYNC",
            Self::Manifest => "dfuMANIFEST",
            Self::ManifestWaitReset => "dfuMANIFEST-WAIT-RESET",
            Self::UploadIdle => "dfuUPLOAD-IDLE",
            Self::DfuError => "dfuERROR",
            Self::Unknown(v) => return write!(f, "unknown({})", v),
        };
        f.write_str(name)
    }
}

/// Device-reported status (bStatus)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DfuStatusCode {
    Ok,
    ErrTarget,
    ErrFile,
    ErrWrite,
    ErrErase,
    ErrCheckErased,
    ErrProg,
    ErrVerify,
    ErrAddress,
    ErrNotDone,
    ErrFirmware,
    ErrVendor,
    ErrUsbReset,
    ErrPowerOnReset,
    ErrUnknown,
    ErrStalledPkt,
    Other(u8),
}

impl From<u8> for DfuStatusCode {
    fn from(value: u8) -> Self {
        match value {
            0x00 => Self::Ok,
            0x01 => Self::ErrTarget,
            0x02 => Self::ErrFile,
            0x03 => Self::ErrWrite,
            0x04 => Self::ErrErase,
            0x05 => Self::ErrCheckErased,
            0x06 => Self::ErrProg,
            0x07 => Self::ErrVerify,
            0x08 => Self::ErrAddress,
            0x09 => Self::ErrNotDone,
            0x0A => Self::ErrFirmware,
            0x0B => Self::ErrVendor,
            0x0C => Self::ErrUsbReset,
            0x0D => Self::ErrPowerOnReset,
            0x0E => Self::ErrUnknown,
            0x0F => Self::ErrStalledPkt,
            other => Self::Other(other),
        }
    }
}

impl fmt::Display for DfuStatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Other(v) => write!(f, "0x{:02x}", v),
            other => write!(f, "{:?}", other),
        }
    }
}

/// Parsed DFU_GETSTATUS response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DfuStatus {
    pub status: DfuStatusCode,
    /// bwPollTimeout: minimum wait before the next GETSTATUS
    pub poll_timeout: Duration,
    pub state: DfuState,
}

impl DfuStatus {
    /// Parse the 6-byte response: bStatus, bwPollTimeout (24-bit LE),
    /// bState, iString. `None` if too short.
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < STATUS_LEN {
            return None;
        }
        let poll_ms = u32::from_le_bytes([bytes[1], bytes[2], bytes[3], 0]);
        Some(Self {
            status: DfuStatusCode::from(bytes[0]),
            poll_timeout: Duration::from_millis(u64::from(poll_ms)),
            state: DfuState::from(bytes[4]),
        })
    }

    pub fn is_ok(&self) -> bool {
        self.status == DfuStatusCode::Ok
    }
}

/// Engine view of an update session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferState {
    AppIdle,
    AppDetach,
    DfuIdle,
    Downloading,
    Uploading,
    Error,
}

impl From<DfuState> for TransferState {
    fn from(state: DfuState) -> Self {
        match state {
            DfuState::AppIdle => Self::AppIdle,
            DfuState::AppDetach => Self::AppDetach,
            DfuState::DfuIdle => Self::DfuIdle,
            DfuState::DnloadSync
            | DfuState::DnBusy
            | DfuState::DnloadIdle
            | DfuState::ManifestSync
            | DfuState::Manifest
            | DfuState::ManifestWaitReset => Self::Downloading,
            DfuState::UploadIdle => Self::Uploading,
            DfuState::DfuError | DfuState::Unknown(_) => Self::Error,
        }
    }
}

impl TransferState {
    /// Upload and download may only start from here
    pub fn is_ready(&self) -> bool {
        *self == Self::DfuIdle
    }
}
