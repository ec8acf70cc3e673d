use crate::domain::models::Transport;
use crate::infrastructure::dfu::protocol::{DfuState, DfuStatusCode, TransferState};
use thiserror::Error;

/// Failure reported by a hardware backend.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("device selection cancelled")]
    Cancelled,

    #[error("device not found")]
    NotFound,

    #[error("device disconnected")]
    Disconnected,

    #[error("endpoint stalled")]
    Stall,

    #[error("timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("{0}")]
    Io(String),
}

impl TransportError {
    /// True for errors that mean the device dropped off the bus
    pub fn is_device_gone(&self) -> bool {
        matches!(self, Self::NotFound | Self::Disconnected)
    }
}

/// Engine level failure taxonomy.
#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("No connected device.")]
    NotConnected,

    #[error("a {0} transfer is already in progress")]
    Busy(Transport),

    #[error("No device found")]
    NoDeviceSelected,

    #[error("failed to open link: {0}")]
    LinkFailed(#[source] TransportError),

    #[error("device does not expose {0}")]
    CapabilityMissing(String),

    #[error("Failed to find DFU interface")]
    NoDfuInterface,

    #[error("Found multiple DFU interfaces ({0})")]
    MultipleDfuInterfaces(usize),

    #[error("DFU state not {expected} after {step} (got {actual})")]
    UnexpectedState {
        step: &'static str,
        expected: DfuState,
        actual: DfuState,
    },

    #[error("Failed to find device after USB reset")]
    NotFoundAfterReset,

    #[error("invalid DFU transfer size {0}")]
    InvalidTransferSize(u16),

    #[error("device not ready for transfers (state {0:?})")]
    NotReady(TransferState),

    #[error("DFU {phase} failed state={state}, status={status}")]
    TransferStatus {
        phase: &'static str,
        state: DfuState,
        status: DfuStatusCode,
    },

    #[error("Error during reset for manifestation: {0}")]
    ManifestationReset(#[source] TransportError),

    #[error("payload of {len} bytes needs more than {max_chunks} chunks")]
    PayloadTooLarge { len: usize, max_chunks: usize },

    #[error("write failed after {attempts} attempts: {source}")]
    WriteExhausted {
        attempts: u8,
        #[source]
        source: TransportError,
    },

    #[error("write queue closed")]
    QueueClosed,

    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl DeviceError {
    /// The post-transfer reset error that accompanies a normal reboot
    pub fn is_benign_manifestation_reset(&self) -> bool {
        matches!(self, Self::ManifestationReset(_))
    }
}

pub type DeviceResult<T> = Result<T, DeviceError>;
