//! Session configuration.

use std::path::Path;

use crate::error::{Error, Result};
use crate::transport::DEFAULT_TIMEOUT_MS;
use serde::{Deserialize, Serialize};

/// Wired connection device index.
pub const DEVICE_INDEX_WIRED: u8 = 0xFF;

/// Software ID stamped into every request.
pub const DEFAULT_SOFTWARE_ID: u8 = 0x0F;

/// Settings for one device session. Every field has a default, so an empty
/// JSON object is a valid configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// 0xFF wired, 0x00 bluetooth, 0x01..=0x06 for receiver-paired devices.
    pub device_index: u8,
    /// Low nibble of the function byte.
    pub software_id: u8,
    /// Reply timeout in milliseconds.
    pub timeout_ms: u32,
    /// Explicit page plan per profile, `[primary, overflow...]`, replacing the computed one.
    pub page_layout: Option<Vec<Vec<u16>>>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            device_index: DEVICE_INDEX_WIRED,
            software_id: DEFAULT_SOFTWARE_ID,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            page_layout: None,
        }
    }
}

impl SessionConfig {
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| Error::Document(format!("config: {e}")))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Document(format!("config {}: {e}", path.display())))?;
        Self::from_json(&text)
    }
}
