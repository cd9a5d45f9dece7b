//! logi-omm-core: HID++ 2.0 feature calls and onboard profile memory.
//!
//! This crate talks to Logitech gaming mice over the HID++ 2.0 protocol and
//! manages the profiles they keep in onboard flash: the profile directory,
//! raw page access, the binary profile and macro formats, and an editable
//! JSON document form of a whole profile.

pub mod buttons;
pub mod checksum;
pub mod config;
pub mod device;
pub mod document;
pub mod error;
pub mod feature;
pub mod hidpp;
#[cfg(test)]
mod integration_tests;
pub mod keycodes;
pub mod macros;
pub mod onboard;
pub mod profile;
pub mod report_rate;
pub mod transport;

/// Logitech USB Vendor ID.
pub const LOGITECH_VID: u16 = 0x046D;
