//! Profile page codec.
//!
//! Field layout of a profile page (all offsets in bytes):
//!
//! | range              | content                                        |
//! |--------------------|------------------------------------------------|
//! | 0                  | report rate selector                           |
//! | 1, 2               | default DPI slot, DPI shift value              |
//! | 3..13              | five DPI presets, little-endian u16            |
//! | 13..16             | color, RGB                                     |
//! | 16..32             | opaque                                         |
//! | 32..96             | button keymaps, 4 bytes each, then padding     |
//! | 96..160            | G-shift keymaps, 4 bytes each, then padding    |
//! | 160..208           | profile name, UTF-16LE                         |
//! | 208..252           | four RGB zones, 11 bytes each                  |
//! | 252..size-2        | opaque                                         |
//! | size-2..size       | CRC16-CCITT, big-endian                        |

use crate::buttons::ButtonAction;
use crate::checksum;
use crate::error::{Error, Result};
use crate::report_rate;
use tracing::warn;

pub const DPI_SLOTS: usize = 5;
pub const CHUNK1_RANGE: std::ops::Range<usize> = 16..32;
pub const BUTTONS_OFFSET: usize = 32;
pub const GSHIFT_OFFSET: usize = 96;
/// Bytes reserved for one keymap table (16 buttons).
pub const KEYMAP_TABLE_LEN: usize = 64;
pub const NAME_OFFSET: usize = 160;
pub const NAME_LEN: usize = 48;
pub const RGB_OFFSET: usize = 208;
pub const RGB_ZONE_LEN: usize = 11;
pub const RGB_ZONES: usize = 4;
pub const CHUNK2_OFFSET: usize = RGB_OFFSET + RGB_ZONES * RGB_ZONE_LEN;

pub const RGB_DURATION_MIN: u16 = 50;
pub const RGB_DURATION_MAX: u16 = 60000;
pub const RGB_BRIGHTNESS_MAX: u8 = 100;

const KEY_PREFIX: [u8; 2] = [0x80, 0x02];

/// Device-specific sizes the codec needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProfileGeometry {
    pub button_count: usize,
    pub gshift_button_count: usize,
    pub page_size: usize,
    pub extended_report_rate: bool,
}

/// What one button does, as stored in its 4-byte keymap slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeymapEntry {
    Button(ButtonAction),
    /// Keyboard usage `keycode` with the HID modifier byte `modifiers`.
    Key { modifiers: u8, keycode: u8 },
    /// Start of a macro in onboard memory.
    MacroRef { page: u16, offset: u16 },
    Unknown([u8; 4]),
}

impl KeymapEntry {
    pub fn decode(raw: [u8; 4]) -> Self {
        if let Some(action) = ButtonAction::from_code(u32::from_be_bytes(raw)) {
            return Self::Button(action);
        }
        if raw[..2] == KEY_PREFIX {
            return Self::Key {
                modifiers: raw[2],
                keycode: raw[3],
            };
        }
        if raw[0] == 0x00 {
            return Self::MacroRef {
                page: u16::from_be_bytes([raw[0], raw[1]]),
                offset: u16::from_be_bytes([raw[2], raw[3]]),
            };
        }
        Self::Unknown(raw)
    }

    pub fn encode(&self) -> [u8; 4] {
        match *self {
            Self::Button(action) => action.code().to_be_bytes(),
            Self::Key { modifiers, keycode } => [KEY_PREFIX[0], KEY_PREFIX[1], modifiers, keycode],
            Self::MacroRef { page, offset } => {
                let [p0, p1] = page.to_be_bytes();
                let [o0, o1] = offset.to_be_bytes();
                [p0, p1, o0, o1]
            }
            Self::Unknown(raw) => raw,
        }
    }
}

/// RGB zone mode bytes.
pub mod rgb_modes {
    pub const OFF: u8 = 0x00;
    pub const ON: u8 = 0x01;
    pub const CYCLING: u8 = 0x03;
    pub const BREATHING: u8 = 0x0A;
}

/// One lighting zone. Colors are 24-bit `0xRRGGBB`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RgbZone {
    Off,
    On { color: u32 },
    Cycling { duration: u16, brightness: u8 },
    Breathing { color: u32, duration: u16, brightness: u8 },
    /// Mode this codec does not interpret, kept byte for byte.
    Unrecognized([u8; RGB_ZONE_LEN]),
}

impl RgbZone {
    pub fn decode(raw: &[u8; RGB_ZONE_LEN]) -> Self {
        let color = u32::from_be_bytes([0, raw[1], raw[2], raw[3]]);
        match raw[0] {
            rgb_modes::OFF => Self::Off,
            rgb_modes::ON => Self::On { color },
            rgb_modes::CYCLING => Self::Cycling {
                duration: u16::from_be_bytes([raw[6], raw[7]]),
                brightness: raw[8],
            },
            rgb_modes::BREATHING => Self::Breathing {
                color,
                duration: u16::from_be_bytes([raw[4], raw[5]]),
                brightness: raw[7],
            },
            _ => Self::Unrecognized(*raw),
        }
    }

    /// Encode, clamping duration to 50..=60000 ms and brightness to 0..=100.
    pub fn encode(&self) -> [u8; RGB_ZONE_LEN] {
        let mut raw = [0u8; RGB_ZONE_LEN];
        match *self {
            Self::Off => raw[0] = rgb_modes::OFF,
            Self::On { color } => {
                raw[0] = rgb_modes::ON;
                raw[1..4].copy_from_slice(&color.to_be_bytes()[1..]);
            }
            Self::Cycling {
                duration,
                brightness,
            } => {
                raw[0] = rgb_modes::CYCLING;
                raw[6..8].copy_from_slice(&clamp_duration(duration).to_be_bytes());
                raw[8] = brightness.min(RGB_BRIGHTNESS_MAX);
            }
            Self::Breathing {
                color,
                duration,
                brightness,
            } => {
                raw[0] = rgb_modes::BREATHING;
                raw[1..4].copy_from_slice(&color.to_be_bytes()[1..]);
                raw[4..6].copy_from_slice(&clamp_duration(duration).to_be_bytes());
                raw[7] = brightness.min(RGB_BRIGHTNESS_MAX);
            }
            Self::Unrecognized(bytes) => raw = bytes,
        }
        raw
    }

    /// Mode name used in profile documents.
    pub fn mode_name(&self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::On { .. } => "on",
            Self::Cycling { .. } => "cycling",
            Self::Breathing { .. } => "breathing",
            Self::Unrecognized(_) => "unknown",
        }
    }
}

fn clamp_duration(duration: u16) -> u16 {
    duration.clamp(RGB_DURATION_MIN, RGB_DURATION_MAX)
}

/// Decoded profile page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileRecord {
    /// Report rate in Hz.
    pub report_rate: u16,
    pub dpi_default: u8,
    pub dpi_shift: u8,
    pub dpi_list: [u16; DPI_SLOTS],
    pub color: u32,
    pub chunk1: Vec<u8>,
    pub buttons: Vec<KeymapEntry>,
    pub buttons_padding: Vec<u8>,
    pub buttons_gshift: Vec<KeymapEntry>,
    pub buttons_gshift_padding: Vec<u8>,
    pub name: String,
    pub rgb: [RgbZone; RGB_ZONES],
    pub chunk2: Vec<u8>,
    /// Checksum read from the page; recomputed on encode.
    pub checksum: u16,
}

fn keymap_table(page: &[u8], offset: usize, count: usize) -> (Vec<KeymapEntry>, Vec<u8>) {
    let used = offset + count * 4;
    let entries = page[offset..used]
        .chunks_exact(4)
        .map(|raw| KeymapEntry::decode([raw[0], raw[1], raw[2], raw[3]]))
        .collect();
    (entries, page[used..offset + KEYMAP_TABLE_LEN].to_vec())
}

fn check_geometry(geometry: &ProfileGeometry) -> Result<()> {
    for (field, count) in [
        ("buttons", geometry.button_count),
        ("buttons_gshift", geometry.gshift_button_count),
    ] {
        if count * 4 > KEYMAP_TABLE_LEN {
            return Err(Error::OutOfRange {
                field,
                value: count as u32,
                min: 0,
                max: (KEYMAP_TABLE_LEN / 4) as u32,
            });
        }
    }
    Ok(())
}

/// UTF-16LE name without trailing NULs. Unpaired surrogates become U+FFFD.
fn decode_name(units: &[u16]) -> String {
    let mut replaced = 0usize;
    let name: String = char::decode_utf16(units.iter().copied())
        .map(|c| {
            c.unwrap_or_else(|_| {
                replaced += 1;
                char::REPLACEMENT_CHARACTER
            })
        })
        .collect();
    if replaced > 0 {
        warn!(replaced, "Profile name has unpaired UTF-16 surrogates, rewriting them on save");
    }
    name.trim_end_matches('\0').to_string()
}

/// Decode a profile page. The checksum is captured, not verified.
pub fn decode(page: &[u8], geometry: &ProfileGeometry) -> Result<ProfileRecord> {
    check_geometry(geometry)?;
    if page.len() != geometry.page_size || page.len() < CHUNK2_OFFSET + 2 {
        return Err(Error::WrongPageSize {
            expected: geometry.page_size,
            actual: page.len(),
        });
    }

    let report_rate = report_rate::rate_from_byte(page[0], geometry.extended_report_rate)?;
    let mut dpi_list = [0u16; DPI_SLOTS];
    for (i, dpi) in dpi_list.iter_mut().enumerate() {
        *dpi = u16::from_le_bytes([page[3 + i * 2], page[4 + i * 2]]);
    }

    let (buttons, buttons_padding) = keymap_table(page, BUTTONS_OFFSET, geometry.button_count);
    let (buttons_gshift, buttons_gshift_padding) =
        keymap_table(page, GSHIFT_OFFSET, geometry.gshift_button_count);

    let units: Vec<u16> = page[NAME_OFFSET..NAME_OFFSET + NAME_LEN]
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();
    let name = decode_name(&units);

    let mut rgb = [RgbZone::Off; RGB_ZONES];
    for (i, zone) in rgb.iter_mut().enumerate() {
        let start = RGB_OFFSET + i * RGB_ZONE_LEN;
        let mut raw = [0u8; RGB_ZONE_LEN];
        raw.copy_from_slice(&page[start..start + RGB_ZONE_LEN]);
        *zone = RgbZone::decode(&raw);
    }

    let end = page.len() - 2;
    Ok(ProfileRecord {
        report_rate,
        dpi_default: page[1],
        dpi_shift: page[2],
        dpi_list,
        color: u32::from_be_bytes([0, page[13], page[14], page[15]]),
        chunk1: page[CHUNK1_RANGE].to_vec(),
        buttons,
        buttons_padding,
        buttons_gshift,
        buttons_gshift_padding,
        name,
        rgb,
        chunk2: page[CHUNK2_OFFSET..end].to_vec(),
        checksum: u16::from_be_bytes([page[end], page[end + 1]]),
    })
}

fn expect_len(field: &'static str, expected: usize, actual: usize) -> Result<()> {
    if expected != actual {
        return Err(Error::WrongFieldSize {
            field,
            expected,
            actual,
        });
    }
    Ok(())
}

/// Encode a record into a sealed profile page.
pub fn encode(record: &ProfileRecord, geometry: &ProfileGeometry) -> Result<Vec<u8>> {
    check_geometry(geometry)?;
    if geometry.page_size < CHUNK2_OFFSET + 2 {
        return Err(Error::WrongPageSize {
            expected: CHUNK2_OFFSET + 2,
            actual: geometry.page_size,
        });
    }
    let chunk2_len = geometry.page_size - 2 - CHUNK2_OFFSET;
    expect_len("chunk1", CHUNK1_RANGE.len(), record.chunk1.len())?;
    expect_len("buttons", geometry.button_count, record.buttons.len())?;
    expect_len(
        "buttons_padding",
        KEYMAP_TABLE_LEN - geometry.button_count * 4,
        record.buttons_padding.len(),
    )?;
    expect_len(
        "buttons_gshift",
        geometry.gshift_button_count,
        record.buttons_gshift.len(),
    )?;
    expect_len(
        "buttons_gshift_padding",
        KEYMAP_TABLE_LEN - geometry.gshift_button_count * 4,
        record.buttons_gshift_padding.len(),
    )?;
    expect_len("chunk2", chunk2_len, record.chunk2.len())?;

    let mut page = Vec::with_capacity(geometry.page_size);
    page.push(report_rate::rate_to_byte(
        record.report_rate,
        geometry.extended_report_rate,
    )?);
    page.push(record.dpi_default);
    page.push(record.dpi_shift);
    for dpi in record.dpi_list {
        page.extend_from_slice(&dpi.to_le_bytes());
    }
    page.extend_from_slice(&record.color.to_be_bytes()[1..]);
    page.extend_from_slice(&record.chunk1);

    for entry in &record.buttons {
        page.extend_from_slice(&entry.encode());
    }
    page.extend_from_slice(&record.buttons_padding);
    for entry in &record.buttons_gshift {
        page.extend_from_slice(&entry.encode());
    }
    page.extend_from_slice(&record.buttons_gshift_padding);

    let mut name = [0u8; NAME_LEN];
    for (i, unit) in record.name.encode_utf16().take(NAME_LEN / 2).enumerate() {
        name[i * 2..i * 2 + 2].copy_from_slice(&unit.to_le_bytes());
    }
    page.extend_from_slice(&name);

    for zone in &record.rgb {
        page.extend_from_slice(&zone.encode());
    }
    page.extend_from_slice(&record.chunk2);

    let crc = checksum::crc16_ccitt(&page);
    page.extend_from_slice(&crc.to_be_bytes());
    Ok(page)
}
