//! Report rate selector stored in byte 0 of a profile page.
//!
//! Two encodings exist:
//!   - fixed: the byte is the report interval in ms, 1=1000Hz, 2=500Hz, 4=250Hz, 8=125Hz
//!   - extended (devices with feature 0x8061): the byte indexes
//!     125, 250, 500, 1000, 2000, 4000, 8000 Hz

use crate::error::{Error, Result};

/// Intervals accepted by the fixed encoding, in ms.
pub const FIXED_INTERVALS: [u8; 4] = [1, 2, 4, 8];

/// Rates addressed by the extended encoding, in Hz.
pub const EXTENDED_RATES: [u16; 7] = [125, 250, 500, 1000, 2000, 4000, 8000];

/// Decode the stored selector byte into a rate in Hz.
pub fn rate_from_byte(byte: u8, extended: bool) -> Result<u16> {
    if extended {
        return EXTENDED_RATES
            .get(byte as usize)
            .copied()
            .ok_or(Error::InvalidReportRate(byte as u16));
    }
    if FIXED_INTERVALS.contains(&byte) {
        Ok(1000 / byte as u16)
    } else {
        Err(Error::InvalidReportRate(byte as u16))
    }
}

/// Encode a rate in Hz into the selector byte.
pub fn rate_to_byte(hz: u16, extended: bool) -> Result<u8> {
    if extended {
        return EXTENDED_RATES
            .iter()
            .position(|&rate| rate == hz)
            .map(|pos| pos as u8)
            .ok_or(Error::InvalidReportRate(hz));
    }
    FIXED_INTERVALS
        .iter()
        .copied()
        .find(|&interval| 1000 / interval as u16 == hz)
        .ok_or(Error::InvalidReportRate(hz))
}

/// Every rate representable with the given encoding, ascending.
pub fn supported_rates(extended: bool) -> Vec<u16> {
    if extended {
        EXTENDED_RATES.to_vec()
    } else {
        FIXED_INTERVALS
            .iter()
            .rev()
            .map(|&interval| 1000 / interval as u16)
            .collect()
    }
}
