//! Chunked DFU image transfer
//!
//! Upload (device → host) and download (host → device) loops on top of a
//! claimed [`DfuInterface`]. Block numbers start at 0 and wrap at u16.

use crate::error::{DeviceError, DeviceResult, TransportError};
use crate::infrastructure::dfu::device::{DfuInterface, UsbDevice};
use crate::infrastructure::dfu::protocol::{DfuState, DfuStatus};
use tracing::{debug, info, trace, warn};

pub async fn get_status(iface: &dyn DfuInterface) -> DeviceResult<DfuStatus> {
    let raw = iface.get_status().await?;
    DfuStatus::parse(&raw).ok_or_else(|| {
        DeviceError::Transport(TransportError::Io(format!(
            "short DFU_GETSTATUS response ({} bytes)",
            raw.len()
        )))
    })
}

pub async fn get_state(iface: &dyn DfuInterface) -> DeviceResult<DfuState> {
    Ok(DfuState::from(iface.get_state().await?))
}

/// Poll DFU_GETSTATUS, honoring bwPollTimeout, until the state satisfies
/// `done` or the device enters dfuERROR.
pub async fn poll_until(
    iface: &dyn DfuInterface,
    done: impl Fn(DfuState) -> bool,
) -> DeviceResult<DfuStatus> {
    let mut status = get_status(iface).await?;
    while !done(status.state) && status.state != DfuState::DfuError {
        tokio::time::sleep(status.poll_timeout).await;
        status = get_status(iface).await?;
    }
    Ok(status)
}

/// Bring the interface back to dfuIDLE from any DFU-mode state
pub async fn abort_to_idle(iface: &dyn DfuInterface) -> DeviceResult<()> {
    iface.abort().await?;
    let mut state = get_state(iface).await?;
    if state == DfuState::DfuError {
        iface.clear_status().await?;
        state = get_state(iface).await?;
    }
    if state != DfuState::DfuIdle {
        return Err(DeviceError::UnexpectedState {
            step: "abort",
            expected: DfuState::DfuIdle,
            actual: state,
        });
    }
    Ok(())
}

/// Blocks must carry at least one byte, or a short block never comes
pub fn check_transfer_size(transfer_size: u16) -> DeviceResult<u16> {
    if transfer_size == 0 {
        return Err(DeviceError::InvalidTransferSize(transfer_size));
    }
    Ok(transfer_size)
}

/// Read the device image in `transfer_size` blocks until a short block
pub async fn upload(iface: &dyn DfuInterface, transfer_size: u16) -> DeviceResult<Vec<u8>> {
    let transfer_size = check_transfer_size(transfer_size)?;
    let mut image = Vec::new();
    let mut block: u16 = 0;

    loop {
        let chunk = iface.upload(block, transfer_size).await?;
        trace!("Upload block {}: {} bytes", block, chunk.len());
        let short = chunk.len() < usize::from(transfer_size);
        image.extend_from_slice(&chunk);
        block = block.wrapping_add(1);
        if short {
            break;
        }
    }

    abort_to_idle(iface).await?;

    info!("Read {} bytes in {} blocks", image.len(), block);
    Ok(image)
}

/// Write an image in `transfer_size` blocks, then manifest and reset.
///
/// A reset failure that is not the device disappearing is returned as
/// [`DeviceError::ManifestationReset`] so the caller can decide.
pub async fn download(
    iface: &dyn DfuInterface,
    device: &dyn UsbDevice,
    transfer_size: u16,
    data: &[u8],
) -> DeviceResult<()> {
    let transfer_size = check_transfer_size(transfer_size)?;
    let mut block: u16 = 0;
    let total = data.len();
    let mut written = 0usize;

    for chunk in data.chunks(usize::from(transfer_size)) {
        let sent = iface.download(block, chunk).await?;
        if sent != chunk.len() {
            return Err(DeviceError::Transport(TransportError::Io(format!(
                "short DFU_DNLOAD write: {} of {} bytes",
                sent,
                chunk.len()
            ))));
        }
        block = block.wrapping_add(1);

        let status = poll_until(iface, |s| s == DfuState::DnloadIdle).await?;
        if !status.is_ok() || status.state != DfuState::DnloadIdle {
            return Err(DeviceError::TransferStatus {
                phase: "DOWNLOAD",
                state: status.state,
                status: status.status,
            });
        }

        written += sent;
        trace!("Wrote {} of {} bytes", written, total);
    }

    debug!("Sending final empty block");
    iface.download(block, &[]).await?;

    // Poll once to kick off manifestation; the device may already be gone
    if let Err(e) = iface.get_status().await {
        debug!("Ignoring status error after final block: {}", e);
    }

    match device.reset().await {
        Ok(()) => Ok(()),
        Err(e) if e.is_device_gone() => {
            debug!("Ignored reset error: {}", e);
            Ok(())
        }
        Err(e) => {
            warn!("Reset for manifestation failed: {}", e);
            Err(DeviceError::ManifestationReset(e))
        }
    }
}
