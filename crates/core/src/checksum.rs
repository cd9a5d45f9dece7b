//! CRC16-CCITT page checksum (initial value 0xFFFF, polynomial 0x1021).
//!
//! The directory page and every profile page end with this checksum,
//! stored big-endian over all preceding bytes.

const POLY: u16 = 0x1021;

/// Compute the page checksum over `data`.
pub fn crc16_ccitt(data: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;
    for &byte in data {
        crc ^= (byte as u16) << 8;
        for _ in 0..8 {
            if crc & 0x8000 != 0 {
                crc = (crc << 1) ^ POLY;
            } else {
                crc <<= 1;
            }
        }
    }
    crc
}

/// Stored (trailing, big-endian) and computed checksum of a verified page.
///
/// Returns `None` for buffers too short to carry a checksum.
pub fn split_checksum(page: &[u8]) -> Option<(u16, u16)> {
    let body_len = page.len().checked_sub(2)?;
    let stored = u16::from_be_bytes([page[body_len], page[body_len + 1]]);
    Some((stored, crc16_ccitt(&page[..body_len])))
}

/// Whether the trailing two bytes of `page` match its content.
pub fn verify(page: &[u8]) -> bool {
    matches!(split_checksum(page), Some((stored, computed)) if stored == computed)
}
