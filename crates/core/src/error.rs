//! Error types for logi-omm-core.

use thiserror::Error;

/// Core library error type.
#[derive(Debug, Error)]
pub enum Error {
    /// HID device communication failure.
    #[error("HID error: {0}")]
    Hid(String),

    /// No reply arrived within the transport's bound.
    #[error("timeout: {0}")]
    Timeout(String),

    /// HID++ protocol error (device returned an error report).
    #[error("HID++ error: feature 0x{feature:04X}, code {code}")]
    HidppProtocol { feature: u16, code: u8 },

    /// Device capability fields are outside the supported set.
    #[error("unsupported device: {0}")]
    UnsupportedDevice(String),

    /// The root feature reported the feature as absent.
    #[error("feature 0x{0:04X} is not supported by the device")]
    UnsupportedFeature(u16),

    /// Reply header does not echo the request header.
    #[error(
        "reply header mismatch: expected {expected:02X?} (device, feature, function), got {actual:02X?}"
    )]
    FrameMismatch { expected: [u8; 3], actual: [u8; 3] },

    /// Trailing page checksum disagrees with the page content.
    #[error("checksum error on page {page}: stored 0x{stored:04X}, computed 0x{computed:04X}")]
    ChecksumMismatch { page: u16, stored: u16, computed: u16 },

    /// Page buffer length differs from the device page size.
    #[error("wrong page size: expected {expected} bytes, got {actual}")]
    WrongPageSize { expected: usize, actual: usize },

    /// Directory guard refused the requested profile state change.
    #[error("invalid profile state transition: {0}")]
    InvalidStateTransition(String),

    /// Macro bytecode or text could not be interpreted.
    #[error("malformed macro: {0}")]
    MalformedMacro(String),

    /// Macro text presses keys it never releases, or releases keys it never pressed.
    #[error("unbalanced macro keys: {0}")]
    UnbalancedMacroKeys(String),

    /// Macros need more overflow pages than the page layout provides.
    #[error("macro too large: needs {required} page(s), {available} available")]
    MacroTooLarge { required: usize, available: usize },

    /// Report rate not representable for the device.
    #[error("invalid report rate: {0}")]
    InvalidReportRate(u16),

    /// Unknown RGB zone mode name.
    #[error("invalid rgb mode: {0}")]
    InvalidRgbMode(String),

    /// An opaque or fixed-width field has the wrong length.
    #[error("wrong size for {field}: expected {expected} bytes, got {actual}")]
    WrongFieldSize {
        field: &'static str,
        expected: usize,
        actual: usize,
    },

    /// Value out of range.
    #[error("value out of range: {field} = {value} (allowed {min}..={max})")]
    OutOfRange {
        field: &'static str,
        value: u32,
        min: u32,
        max: u32,
    },

    /// Structured profile document is not well formed.
    #[error("profile document error: {0}")]
    Document(String),
}

/// Convenience Result alias.
pub type Result<T> = std::result::Result<T, Error>;
