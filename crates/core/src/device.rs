//! Device discovery: Logitech HID interfaces and the HID++ long-report port.

use crate::error::{Error, Result};
use crate::hidpp::LONG_REPORT_ID;
use crate::transport::HidapiTransport;
use crate::LOGITECH_VID;
use tracing::{debug, info};

/// Vendor-defined usage pages start here; HID++ lives on one of them.
pub const VENDOR_USAGE_PAGE_MIN: u16 = 0xFF00;

/// HID item prefix announcing a report id.
const REPORT_ID_ITEM: u8 = 0x85;

const MAX_DESCRIPTOR_LEN: usize = 4096;

/// Information about one Logitech HID interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub vid: u16,
    pub pid: u16,
    pub path: String,
    pub product: Option<String>,
    pub serial: Option<String>,
    pub usage_page: u16,
    pub interface_number: i32,
}

impl DeviceInfo {
    fn from_hidapi(info: &hidapi::DeviceInfo) -> Self {
        Self {
            vid: info.vendor_id(),
            pid: info.product_id(),
            path: info.path().to_string_lossy().into_owned(),
            product: info.product_string().map(str::to_string),
            serial: info.serial_number().map(str::to_string),
            usage_page: info.usage_page(),
            interface_number: info.interface_number(),
        }
    }

    /// Whether the interface uses a vendor-defined usage page.
    pub fn is_vendor_interface(&self) -> bool {
        self.usage_page >= VENDOR_USAGE_PAGE_MIN
    }

    fn matches(&self, pid: Option<u16>) -> bool {
        self.vid == LOGITECH_VID && pid.map_or(true, |pid| self.pid == pid)
    }
}

/// Whether a report descriptor declares the HID++ long report id.
pub fn declares_long_report(descriptor: &[u8]) -> bool {
    descriptor
        .windows(2)
        .any(|item| item[0] == REPORT_ID_ITEM && item[1] == LONG_REPORT_ID)
}

/// One entry per physical device, first interface wins.
pub fn unique_devices(interfaces: &[DeviceInfo]) -> Vec<DeviceInfo> {
    let mut seen: Vec<(u16, Option<&str>)> = Vec::new();
    let mut out = Vec::new();
    for info in interfaces {
        let key = (info.pid, info.serial.as_deref());
        if !seen.contains(&key) {
            seen.push(key);
            out.push(info.clone());
        }
    }
    out
}

/// Enumerate Logitech HID interfaces, optionally restricted to one product id.
pub fn discover_devices(pid: Option<u16>) -> Result<Vec<DeviceInfo>> {
    debug!("Starting HID device enumeration");
    let api = hidapi::HidApi::new().map_err(|e| Error::Hid(e.to_string()))?;

    let devices: Vec<DeviceInfo> = api
        .device_list()
        .map(DeviceInfo::from_hidapi)
        .filter(|info| info.matches(pid))
        .collect();

    debug!(count = devices.len(), "Device enumeration complete");
    Ok(devices)
}

/// Open the HID++ long-report interface of the first matching device.
pub fn open_hidpp(pid: Option<u16>, timeout_ms: u32) -> Result<(DeviceInfo, HidapiTransport)> {
    let api = hidapi::HidApi::new().map_err(|e| Error::Hid(e.to_string()))?;

    for raw in api.device_list() {
        let info = DeviceInfo::from_hidapi(raw);
        if !info.matches(pid) || !info.is_vendor_interface() {
            continue;
        }
        let device = match raw.open_device(&api) {
            Ok(device) => device,
            Err(e) => {
                debug!(
                    path = %info.path,
                    interface = info.interface_number,
                    error = %e,
                    "Cannot open interface"
                );
                continue;
            }
        };
        let mut descriptor = [0u8; MAX_DESCRIPTOR_LEN];
        match device.get_report_descriptor(&mut descriptor) {
            Ok(len) if !declares_long_report(&descriptor[..len]) => continue,
            Ok(_) => {}
            Err(e) => {
                debug!(path = %info.path, error = %e, "Report descriptor unavailable, using vendor interface");
            }
        }

        info!(
            pid = format_args!("0x{:04X}", info.pid),
            product = info.product.as_deref().unwrap_or("?"),
            interface = info.interface_number,
            path = %info.path,
            "Opened HID++ interface"
        );
        return Ok((info, HidapiTransport::new(device, timeout_ms)));
    }

    Err(Error::UnsupportedDevice(match pid {
        Some(pid) => format!("no HID++ interface for PID 0x{pid:04X}"),
        None => "no Logitech HID++ interface found".into(),
    }))
}
