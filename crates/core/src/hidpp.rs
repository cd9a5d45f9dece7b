//! HID++ 2.0 protocol encoding and decoding.
//!
//! HID++ uses two report formats:
//! - Short reports: 7 bytes (report ID 0x10)
//! - Long reports: 20 bytes (report ID 0x11)
//!
//! Feature calls are always sent as long reports. Devices may answer with
//! either format, so both are accepted on decode.

use crate::error::{Error, Result};

/// HID++ report ID for short messages (7 bytes total).
pub const SHORT_REPORT_ID: u8 = 0x10;
/// HID++ report ID for long messages (20 bytes total).
pub const LONG_REPORT_ID: u8 = 0x11;

/// Short report length (including report ID).
pub const SHORT_REPORT_LEN: usize = 7;
/// Long report length (including report ID).
pub const LONG_REPORT_LEN: usize = 20;

/// Maximum parameter bytes carried by a long report.
pub const MAX_PARAMS: usize = LONG_REPORT_LEN - 4;

/// Feature index carried by HID++ 2.0 error reports.
pub const ERROR_FEATURE_INDEX: u8 = 0xFF;

/// HID++ 2.0 well-known feature IDs.
pub mod features {
    /// Root feature: device ping and feature index lookup.
    pub const ROOT: u16 = 0x0000;
    /// Feature set: enumerate all supported features.
    pub const FEATURE_SET: u16 = 0x0001;
    /// Device name and type.
    pub const DEVICE_NAME: u16 = 0x0005;
    /// Extended report rate (up to 8 kHz).
    pub const EXTENDED_REPORT_RATE: u16 = 0x8061;
    /// Onboard profiles.
    pub const ONBOARD_PROFILES: u16 = 0x8100;
}

/// A HID++ 2.0 request message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HidppRequest {
    /// Device index (0xFF wired, 0x00 bluetooth, 0x01..0x06 for receiver-paired devices).
    pub device_index: u8,
    /// Feature index (looked up from feature ID via ROOT feature).
    pub feature_index: u8,
    /// Function ID within the feature (bits 7:4) and software ID (bits 3:0).
    pub function_sw: u8,
    /// Parameter bytes (up to 16).
    pub params: Vec<u8>,
}

impl HidppRequest {
    /// Create a new request for a given feature index and function.
    pub fn new(
        device_index: u8,
        feature_index: u8,
        function: u8,
        software_id: u8,
        params: Vec<u8>,
    ) -> Self {
        Self {
            device_index,
            feature_index,
            function_sw: (function << 4) | (software_id & 0x0F),
            params,
        }
    }

    /// Encode into a 20-byte long HID report, zero padded.
    pub fn encode(&self) -> Result<Vec<u8>> {
        if self.params.len() > MAX_PARAMS {
            return Err(Error::OutOfRange {
                field: "params",
                value: self.params.len() as u32,
                min: 0,
                max: MAX_PARAMS as u32,
            });
        }

        let mut buf = vec![0u8; LONG_REPORT_LEN];
        buf[0] = LONG_REPORT_ID;
        buf[1] = self.device_index;
        buf[2] = self.feature_index;
        buf[3] = self.function_sw;
        buf[4..4 + self.params.len()].copy_from_slice(&self.params);
        Ok(buf)
    }

    /// The three header bytes a matching reply must echo.
    pub fn header(&self) -> [u8; 3] {
        [self.device_index, self.feature_index, self.function_sw]
    }
}

/// A decoded HID++ 2.0 response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HidppResponse {
    /// Whether this is a long report.
    pub is_long: bool,
    /// Device index.
    pub device_index: u8,
    /// Feature index.
    pub feature_index: u8,
    /// Function and software ID byte.
    pub function_sw: u8,
    /// Response payload bytes.
    pub params: Vec<u8>,
}

impl HidppResponse {
    /// Decode a raw HID report into a structured response.
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < SHORT_REPORT_LEN {
            return Err(Error::Hid(format!(
                "response too short: {} bytes (minimum {})",
                data.len(),
                SHORT_REPORT_LEN
            )));
        }

        let (is_long, expected_len) = match data[0] {
            SHORT_REPORT_ID => (false, SHORT_REPORT_LEN),
            LONG_REPORT_ID => (true, LONG_REPORT_LEN),
            other => {
                return Err(Error::Hid(format!("unknown report ID: 0x{other:02X}")));
            }
        };

        if data.len() < expected_len {
            return Err(Error::Hid(format!(
                "incomplete report: got {} bytes, expected {}",
                data.len(),
                expected_len
            )));
        }

        Ok(Self {
            is_long,
            device_index: data[1],
            feature_index: data[2],
            function_sw: data[3],
            params: data[4..expected_len].to_vec(),
        })
    }

    /// Extract the function ID from the function_sw byte.
    pub fn function(&self) -> u8 {
        self.function_sw >> 4
    }

    /// Check if this response is an error report.
    /// HID++ 2.0 errors have feature_index == 0xFF.
    pub fn is_error(&self) -> bool {
        self.feature_index == ERROR_FEATURE_INDEX
    }

    /// Header bytes (device, feature, function+software id).
    pub fn header(&self) -> [u8; 3] {
        [self.device_index, self.feature_index, self.function_sw]
    }

    /// Parameter byte at `pos`, or zero when the report is shorter.
    pub fn param(&self, pos: usize) -> u8 {
        self.params.get(pos).copied().unwrap_or(0)
    }
}
