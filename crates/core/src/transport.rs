//! HID transport abstraction for device communication.
//!
//! Provides a trait-based transport layer so that real HID devices and
//! mock devices share the same interface. A transport carries exactly one
//! request at a time: it writes a frame and blocks until one reply frame
//! arrives or its timeout elapses.

use crate::error::{Error, Result};
use tracing::trace;

/// Reference reply timeout.
pub const DEFAULT_TIMEOUT_MS: u32 = 5000;

/// Abstraction over raw HID read/write.
///
/// Implementations must be able to send a HID++ request and receive a response.
pub trait HidTransport: Send {
    /// Write a raw HID report and return the response.
    ///
    /// Fails with [`Error::Timeout`] when no reply arrives within the bound.
    fn send_report(&self, data: &[u8]) -> Result<Vec<u8>>;
}

impl<T: HidTransport + Sync + ?Sized> HidTransport for std::sync::Arc<T> {
    fn send_report(&self, data: &[u8]) -> Result<Vec<u8>> {
        (**self).send_report(data)
    }
}

/// Transport over an already opened `hidapi` device (the HID++ long-report interface).
pub struct HidapiTransport {
    device: hidapi::HidDevice,
    timeout_ms: u32,
}

impl HidapiTransport {
    pub fn new(device: hidapi::HidDevice, timeout_ms: u32) -> Self {
        Self { device, timeout_ms }
    }
}

impl HidTransport for HidapiTransport {
    fn send_report(&self, data: &[u8]) -> Result<Vec<u8>> {
        self.device
            .write(data)
            .map_err(|e| Error::Hid(format!("write: {e}")))?;

        let mut response = [0u8; 64];
        let timeout = i32::try_from(self.timeout_ms).unwrap_or(i32::MAX);
        let n = self
            .device
            .read_timeout(&mut response, timeout)
            .map_err(|e| Error::Hid(format!("read_timeout: {e}")))?;

        if n == 0 {
            return Err(Error::Timeout(format!(
                "hid_read timed out after {}ms",
                self.timeout_ms
            )));
        }

        trace!(len = n, "HID report received");
        Ok(response[..n].to_vec())
    }
}


#[cfg(test)]
mod tests {
    use super::mock::*;
    use super::*;

    #[test]
    fn mock_returns_registered_reply() {
        let mock = MockTransport::new();
        mock.on_call(0xFF, 0x00, 0x0F, &[0x81, 0x00], &[0x0C]);
        let reply = mock
            .send_report(&long_frame(0xFF, 0x00, 0x0F, &[0x81, 0x00]))
            .unwrap();
        assert_eq!(reply[4], 0x0C);
    }

    #[test]
    fn mock_times_out_on_unknown_request() {
        let mock = MockTransport::new();
        let result = mock.send_report(&long_frame(0xFF, 0x00, 0x0F, &[]));
        assert!(matches!(result, Err(Error::Timeout(_))));
    }

    #[test]
    fn simulated_device_streams_page_write() {
        let sim = SimulatedDevice::new(5, 11, 16, 256);
        sim.send_report(&long_frame(0xFF, SIM_ONBOARD_IDX, 0x6F, &[0, 9, 0, 0, 1, 0]))
            .unwrap();
        for chunk in 0..16u8 {
            sim.send_report(&long_frame(0xFF, SIM_ONBOARD_IDX, 0x7F, &[chunk; 16]))
                .unwrap();
        }
        sim.send_report(&long_frame(0xFF, SIM_ONBOARD_IDX, 0x8F, &[]))
            .unwrap();
        assert_eq!(sim.commits(), vec![9]);
        assert_eq!(sim.page(9)[16], 1);
        assert_eq!(sim.page(9)[255], 15);
    }
}
