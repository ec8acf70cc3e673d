//! Provisioning feature reports

/// Firmware version string, read on connect
pub const REPORT_VERSION: u8 = 0x40;
/// Reboot request, payload `[1]`
pub const REPORT_REBOOT: u8 = 0x41;
/// One chunk of provisioning data, prefixed by its index
pub const REPORT_CHUNK: u8 = 0x43;
/// Commit the received chunks
pub const REPORT_COMMIT: u8 = 0x44;

/// Payload bytes per chunk report
pub const CHUNK_SIZE: usize = 62;
/// The index is one byte
pub const MAX_CHUNKS: usize = 256;

pub const COMMIT_MAGIC: u32 = 0x1209_214c;

/// Split `data` into chunk report payloads: `[index, bytes...]`.
///
/// `None` if the index would not fit in a byte.
pub fn chunk_reports(data: &[u8]) -> Option<Vec<Vec<u8>>> {
    if data.len().div_ceil(CHUNK_SIZE) > MAX_CHUNKS {
        return None;
    }
    Some(
        data.chunks(CHUNK_SIZE)
            .enumerate()
            .map(|(index, chunk)| {
                let mut report = Vec::with_capacity(chunk.len() + 1);
                report.push(index as u8);
                report.extend_from_slice(chunk);
                report
            })
            .collect(),
    )
}

pub fn commit_report() -> [u8; 4] {
    COMMIT_MAGIC.to_le_bytes()
}

/// Version reports are NUL padded
pub fn decode_version(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .trim_matches(char::from(0))
        .to_string()
}
