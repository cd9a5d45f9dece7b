//! Feature-addressed remote procedure calls over a [`HidTransport`].
//!
//! Every HID++ 2.0 capability is a feature with a 16-bit ID, exposed by the
//! device at an 8-bit index that must be looked up through the ROOT feature:
//!   - ROOT function 0: getFeatureID(id_hi, id_lo) → params[0] = index (0 = absent)
//!   - ROOT function 1: getProtocolVersion → params[0] = major, params[1] = minor
//!
//! Indices are stable for a session, so [`FeatureClient`] caches them.

use std::collections::HashMap;

use crate::config::SessionConfig;
use crate::error::{Error, Result};
use crate::hidpp::{features, HidppRequest, HidppResponse};
use crate::transport::HidTransport;
use tracing::{debug, trace, warn};

/// ROOT feature functions.
const ROOT_FN_GET_FEATURE: u8 = 0x00;
const ROOT_FN_GET_PROTOCOL_VERSION: u8 = 0x01;

/// FEATURE_SET functions.
const FEATURE_SET_FN_COUNT: u8 = 0x00;
const FEATURE_SET_FN_GET_ID: u8 = 0x01;

/// DEVICE_NAME functions.
const DEVICE_NAME_FN_LENGTH: u8 = 0x00;
const DEVICE_NAME_FN_CHUNK: u8 = 0x01;

/// Per-session feature ID → feature index map.
#[derive(Debug, Default, Clone)]
pub struct FeatureTable {
    indices: HashMap<u16, u8>,
}

impl FeatureTable {
    pub fn get(&self, feature_id: u16) -> Option<u8> {
        if feature_id == features::ROOT {
            return Some(0x00);
        }
        self.indices.get(&feature_id).copied()
    }

    pub fn insert(&mut self, feature_id: u16, index: u8) {
        self.indices.insert(feature_id, index);
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

/// HID++ 2.0 feature client bound to one device on one link.
pub struct FeatureClient {
    transport: Box<dyn HidTransport>,
    device_index: u8,
    software_id: u8,
    features: FeatureTable,
}

impl FeatureClient {
    pub fn new(transport: Box<dyn HidTransport>, device_index: u8, software_id: u8) -> Self {
        Self {
            transport,
            device_index,
            software_id: software_id & 0x0F,
            features: FeatureTable::default(),
        }
    }

    pub fn from_config(transport: Box<dyn HidTransport>, config: &SessionConfig) -> Self {
        Self::new(transport, config.device_index, config.software_id)
    }

    pub fn device_index(&self) -> u8 {
        self.device_index
    }

    pub fn software_id(&self) -> u8 {
        self.software_id
    }

    /// Indices resolved so far in this session.
    pub fn feature_table(&self) -> &FeatureTable {
        &self.features
    }

    /// Send one request at a known feature index and validate the reply.
    fn transact(
        &self,
        feature_id: u16,
        feature_index: u8,
        function: u8,
        params: &[u8],
    ) -> Result<HidppResponse> {
        let req = HidppRequest::new(
            self.device_index,
            feature_index,
            function,
            self.software_id,
            params.to_vec(),
        );
        let encoded = req.encode()?;
        trace!(
            device_index = req.device_index,
            feature_index = req.feature_index,
            function_sw = format_args!("0x{:02X}", req.function_sw),
            report_hex = format_args!("{:02X?}", encoded),
            "HID++ TX"
        );

        let raw = self.transport.send_report(&encoded)?;
        let resp = HidppResponse::decode(&raw)?;

        trace!(
            is_long = resp.is_long,
            feature_index = resp.feature_index,
            function = resp.function(),
            params_hex = format_args!("{:02X?}", resp.params),
            "HID++ RX"
        );

        if resp.is_error()
            && resp.device_index == req.device_index
            && resp.function_sw == req.feature_index
            && resp.param(0) == req.function_sw
        {
            let code = resp.param(1);
            warn!(
                feature_id = format_args!("0x{:04X}", feature_id),
                function,
                error_code = code,
                "HID++ error response"
            );
            return Err(Error::HidppProtocol {
                feature: feature_id,
                code,
            });
        }

        if resp.header() != req.header() {
            return Err(Error::FrameMismatch {
                expected: req.header(),
                actual: resp.header(),
            });
        }

        Ok(resp)
    }

    /// Resolve a feature ID to its device-local index.
    ///
    /// ROOT always lives at index 0 and needs no round trip. Fails with
    /// [`Error::UnsupportedFeature`] when the device reports index 0.
    pub fn resolve(&mut self, feature_id: u16) -> Result<u8> {
        if let Some(index) = self.features.get(feature_id) {
            return Ok(index);
        }

        let resp = self.transact(
            features::ROOT,
            0x00,
            ROOT_FN_GET_FEATURE,
            &feature_id.to_be_bytes(),
        )?;
        let feature_index = resp.param(0);
        if feature_index == 0 {
            debug!(
                feature_id = format_args!("0x{:04X}", feature_id),
                "Feature not supported by device"
            );
            return Err(Error::UnsupportedFeature(feature_id));
        }

        debug!(
            feature_id = format_args!("0x{:04X}", feature_id),
            feature_index, "Feature lookup success"
        );
        self.features.insert(feature_id, feature_index);
        Ok(feature_index)
    }

    /// Whether the device exposes `feature_id`.
    pub fn has_feature(&mut self, feature_id: u16) -> Result<bool> {
        match self.resolve(feature_id) {
            Ok(_) => Ok(true),
            Err(Error::UnsupportedFeature(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Call `function` of `feature_id` and return the reply parameters.
    pub fn call(&mut self, feature_id: u16, function: u8, params: &[u8]) -> Result<Vec<u8>> {
        let feature_index = self.resolve(feature_id)?;
        let resp = self.transact(feature_id, feature_index, function, params)?;
        Ok(resp.params)
    }

    /// HID++ protocol version as (major, minor).
    pub fn protocol_version(&mut self) -> Result<(u8, u8)> {
        let params = self.call(features::ROOT, ROOT_FN_GET_PROTOCOL_VERSION, &[])?;
        Ok((byte_at(&params, 0), byte_at(&params, 1)))
    }

    /// IDs of every feature the device exposes, in index order starting at ROOT.
    pub fn feature_list(&mut self) -> Result<Vec<u16>> {
        let count = self.call(features::FEATURE_SET, FEATURE_SET_FN_COUNT, &[])?;
        let mut ids = Vec::new();
        for index in 0..=byte_at(&count, 0) {
            let params = self.call(features::FEATURE_SET, FEATURE_SET_FN_GET_ID, &[index])?;
            ids.push(u16::from_be_bytes([byte_at(&params, 0), byte_at(&params, 1)]));
        }
        Ok(ids)
    }

    /// Marketing name reported by the device, read in chunks.
    pub fn device_name(&mut self) -> Result<String> {
        let params = self.call(features::DEVICE_NAME, DEVICE_NAME_FN_LENGTH, &[])?;
        let length = byte_at(&params, 0) as usize;
        let mut name = Vec::with_capacity(length);
        while name.len() < length {
            let chunk = self.call(
                features::DEVICE_NAME,
                DEVICE_NAME_FN_CHUNK,
                &[name.len() as u8],
            )?;
            let take = (length - name.len()).min(chunk.len());
            if take == 0 {
                return Err(Error::Hid("device name read returned no data".into()));
            }
            name.extend_from_slice(&chunk[..take]);
        }
        Ok(String::from_utf8_lossy(&name).into_owned())
    }
}

fn byte_at(params: &[u8], pos: usize) -> u8 {
    params.get(pos).copied().unwrap_or(0)
}
