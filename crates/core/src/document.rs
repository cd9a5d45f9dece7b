//! Editable JSON form of a profile.
//!
//! Opaque byte ranges are written as escaped-byte strings (`\xff\x00...`),
//! colors as `0xRRGGBB`, macros in their text notation. Exporting resolves
//! macro references through a [`PageSource`]; importing compiles macro text
//! back into overflow pages.

use crate::buttons::ButtonAction;
use crate::error::{Error, Result};
use crate::keycodes;
use crate::macros::{self, MacroOp, PageSource};
use crate::onboard::ProfileImage;
use crate::profile::{
    self, KeymapEntry, ProfileGeometry, ProfileRecord, RgbZone, DPI_SLOTS, RGB_ZONES, RGB_ZONE_LEN,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// A whole profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileDocument {
    pub profile_name: String,
    /// Report rate in Hz, fixed encoding.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report_rate: Option<u16>,
    /// Report rate in Hz, extended encoding.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extended_report_rate: Option<u16>,
    pub dpi_default: u8,
    pub dpi_shift: u8,
    pub dpi_list: Vec<u16>,
    pub color: String,
    pub chunk1: String,
    pub buttons: Vec<KeymapDocument>,
    pub buttons_padding: String,
    #[serde(default)]
    pub buttons_gshift: Vec<KeymapDocument>,
    /// Empty means erased flash.
    #[serde(default)]
    pub buttons_gshift_padding: String,
    pub rgb: Vec<RgbDocument>,
    pub chunk2: String,
    /// Checksum of the exported page. Ignored on import.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
}

/// One keymap slot, tagged by `action`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum KeymapDocument {
    Button {
        value: ButtonAction,
    },
    Key {
        /// `+` separated modifier names.
        #[serde(default)]
        modifier: String,
        /// Key name, `0xNN`, or empty for none.
        #[serde(default)]
        value: String,
    },
    Macro {
        value: String,
        /// Stored reference, informational.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        bytes: Option<String>,
    },
    Unknown {
        bytes: String,
    },
}

/// One lighting zone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RgbDocument {
    pub mode: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brightness: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bytes: Option<String>,
}

impl ProfileDocument {
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| Error::Document(e.to_string()))
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::Document(e.to_string()))
    }
}

/// `\xNN` per byte.
pub fn escape_bytes(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("\\x{b:02x}")).collect()
}

/// Inverse of [`escape_bytes`]; hex digits in either case.
pub fn unescape_bytes(text: &str) -> Result<Vec<u8>> {
    let raw = text.as_bytes();
    if raw.len() % 4 != 0 {
        return Err(Error::Document(format!("bad escaped bytes: {text:?}")));
    }
    raw.chunks(4)
        .map(|group| match group {
            [b'\\', b'x', hi, lo] => std::str::from_utf8(&[*hi, *lo])
                .ok()
                .and_then(|digits| u8::from_str_radix(digits, 16).ok())
                .ok_or_else(|| Error::Document(format!("bad escaped bytes: {text:?}"))),
            _ => Err(Error::Document(format!("bad escaped bytes: {text:?}"))),
        })
        .collect()
}

fn unescape_exact(field: &'static str, text: &str, len: usize) -> Result<Vec<u8>> {
    let bytes = unescape_bytes(text)?;
    if bytes.len() != len {
        return Err(Error::WrongFieldSize {
            field,
            expected: len,
            actual: bytes.len(),
        });
    }
    Ok(bytes)
}

/// Bytes after `count` keymap entries; an empty string fills them with 0xFF.
fn keymap_padding(text: &str, count: usize) -> Result<Vec<u8>> {
    if text.is_empty() {
        return Ok(vec![0xFF; profile::KEYMAP_TABLE_LEN.saturating_sub(count * 4)]);
    }
    unescape_bytes(text)
}

fn format_color(color: u32) -> String {
    format!("0x{color:06x}")
}

fn parse_color(text: &str) -> Result<u32> {
    let digits = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
        .unwrap_or(text);
    u32::from_str_radix(digits, 16)
        .ok()
        .filter(|&color| color <= 0xFF_FFFF)
        .ok_or_else(|| Error::Document(format!("bad color {text:?}")))
}

fn keymap_to_document(entry: &KeymapEntry, source: &mut dyn PageSource) -> Result<KeymapDocument> {
    Ok(match *entry {
        KeymapEntry::Button(action) => KeymapDocument::Button { value: action },
        KeymapEntry::Key { modifiers, keycode } => KeymapDocument::Key {
            modifier: keycodes::modifier_names(modifiers).join("+"),
            value: match (keycode, keycodes::key_name(keycode)) {
                (0, _) => String::new(),
                (_, Some(name)) => name.to_string(),
                (code, None) => format!("0x{code:02x}"),
            },
        },
        KeymapEntry::MacroRef { page, offset } => {
            let ops = macros::decode_macro(source, page, offset)?;
            KeymapDocument::Macro {
                value: macros::render_text(&ops),
                bytes: Some(escape_bytes(&entry.encode())),
            }
        }
        KeymapEntry::Unknown(raw) => KeymapDocument::Unknown {
            bytes: escape_bytes(&raw),
        },
    })
}

fn rgb_to_document(zone: &RgbZone) -> RgbDocument {
    let mut doc = RgbDocument {
        mode: zone.mode_name().to_string(),
        color: None,
        duration: None,
        brightness: None,
        bytes: None,
    };
    match *zone {
        RgbZone::Off => {}
        RgbZone::On { color } => doc.color = Some(format_color(color)),
        RgbZone::Cycling {
            duration,
            brightness,
        } => {
            doc.duration = Some(duration as u32);
            doc.brightness = Some(brightness as u32);
        }
        RgbZone::Breathing {
            color,
            duration,
            brightness,
        } => {
            doc.color = Some(format_color(color));
            doc.duration = Some(duration as u32);
            doc.brightness = Some(brightness as u32);
        }
        RgbZone::Unrecognized(raw) => doc.bytes = Some(escape_bytes(&raw)),
    }
    doc
}

fn required<T: Copy>(value: Option<T>, mode: &str, field: &str) -> Result<T> {
    value.ok_or_else(|| Error::Document(format!("rgb mode {mode} needs {field}")))
}

fn rgb_from_document(doc: &RgbDocument) -> Result<RgbZone> {
    let mode = doc.mode.as_str();
    let color = || -> Result<u32> {
        parse_color(
            doc.color
                .as_deref()
                .ok_or_else(|| Error::Document(format!("rgb mode {mode} needs color")))?,
        )
    };
    let duration = || required(doc.duration, mode, "duration").map(|d| d.min(u16::MAX as u32) as u16);
    let brightness = || required(doc.brightness, mode, "brightness").map(|b| b.min(u8::MAX as u32) as u8);

    Ok(match mode {
        "off" => RgbZone::Off,
        "on" => RgbZone::On { color: color()? },
        "cycling" => RgbZone::Cycling {
            duration: duration()?,
            brightness: brightness()?,
        },
        "breathing" => RgbZone::Breathing {
            color: color()?,
            duration: duration()?,
            brightness: brightness()?,
        },
        "unknown" => {
            let text = doc
                .bytes
                .as_deref()
                .ok_or_else(|| Error::Document("rgb mode unknown needs bytes".into()))?;
            let bytes = unescape_exact("rgb bytes", text, RGB_ZONE_LEN)?;
            let mut raw = [0u8; RGB_ZONE_LEN];
            raw.copy_from_slice(&bytes);
            RgbZone::Unrecognized(raw)
        }
        other => return Err(Error::InvalidRgbMode(other.to_string())),
    })
}

/// Convert a decoded profile page into a document, reading macros from `source`.
pub fn export(
    record: &ProfileRecord,
    geometry: &ProfileGeometry,
    source: &mut dyn PageSource,
) -> Result<ProfileDocument> {
    let buttons = record
        .buttons
        .iter()
        .map(|entry| keymap_to_document(entry, source))
        .collect::<Result<Vec<_>>>()?;
    let buttons_gshift = record
        .buttons_gshift
        .iter()
        .map(|entry| keymap_to_document(entry, source))
        .collect::<Result<Vec<_>>>()?;

    let (report_rate, extended_report_rate) = if geometry.extended_report_rate {
        (None, Some(record.report_rate))
    } else {
        (Some(record.report_rate), None)
    };

    Ok(ProfileDocument {
        profile_name: record.name.clone(),
        report_rate,
        extended_report_rate,
        dpi_default: record.dpi_default,
        dpi_shift: record.dpi_shift,
        dpi_list: record.dpi_list.to_vec(),
        color: format_color(record.color),
        chunk1: escape_bytes(&record.chunk1),
        buttons,
        buttons_padding: escape_bytes(&record.buttons_padding),
        buttons_gshift,
        buttons_gshift_padding: escape_bytes(&record.buttons_gshift_padding),
        rgb: record.rgb.iter().map(rgb_to_document).collect(),
        chunk2: escape_bytes(&record.chunk2),
        checksum: Some(format!("0x{:04x}", record.checksum)),
    })
}

/// Keymap slot whose macro address is known only after assembly.
enum PendingEntry {
    Ready(KeymapEntry),
    Macro(usize),
}

fn keymap_from_document(doc: &KeymapDocument, macros: &mut Vec<Vec<MacroOp>>) -> Result<PendingEntry> {
    let entry = match doc {
        KeymapDocument::Button { value } => KeymapEntry::Button(*value),
        KeymapDocument::Key { modifier, value } => {
            let modifiers = keycodes::parse_modifiers(modifier)
                .map_err(|name| Error::Document(format!("unknown modifier {name:?}")))?;
            let name = value.trim().to_ascii_lowercase();
            let keycode = if name.is_empty() {
                0
            } else {
                keycodes::key_code(&name)
                    .or_else(|| keycodes::parse_hex(&name).and_then(|v| u8::try_from(v).ok()))
                    .ok_or_else(|| Error::Document(format!("unknown key {value:?}")))?
            };
            KeymapEntry::Key { modifiers, keycode }
        }
        KeymapDocument::Macro { value, .. } => {
            macros.push(macros::parse_text(value)?);
            return Ok(PendingEntry::Macro(macros.len() - 1));
        }
        KeymapDocument::Unknown { bytes } => {
            let raw = unescape_exact("keymap bytes", bytes, 4)?;
            KeymapEntry::Unknown([raw[0], raw[1], raw[2], raw[3]])
        }
    };
    Ok(PendingEntry::Ready(entry))
}

/// Compile a document into the page set of a profile.
///
/// Macros are packed into `overflow_pages`; none are produced when the
/// profile has no macro.
pub fn import(
    doc: &ProfileDocument,
    geometry: &ProfileGeometry,
    overflow_pages: &[u16],
) -> Result<ProfileImage> {
    let report_rate = doc
        .extended_report_rate
        .or(doc.report_rate)
        .ok_or_else(|| Error::Document("missing report_rate".into()))?;

    let dpi_list: [u16; DPI_SLOTS] =
        doc.dpi_list
            .as_slice()
            .try_into()
            .map_err(|_| Error::WrongFieldSize {
                field: "dpi_list",
                expected: DPI_SLOTS,
                actual: doc.dpi_list.len(),
            })?;

    let zones = doc
        .rgb
        .iter()
        .map(rgb_from_document)
        .collect::<Result<Vec<_>>>()?;
    let rgb: [RgbZone; RGB_ZONES] = zones.try_into().map_err(|z: Vec<RgbZone>| Error::WrongFieldSize {
        field: "rgb",
        expected: RGB_ZONES,
        actual: z.len(),
    })?;

    let mut macro_ops = Vec::new();
    let buttons = doc
        .buttons
        .iter()
        .map(|b| keymap_from_document(b, &mut macro_ops))
        .collect::<Result<Vec<_>>>()?;
    let buttons_gshift = doc
        .buttons_gshift
        .iter()
        .map(|b| keymap_from_document(b, &mut macro_ops))
        .collect::<Result<Vec<_>>>()?;

    let assembled = macros::assemble(&macro_ops, overflow_pages, geometry.page_size)?;
    let resolve = |pending: Vec<PendingEntry>| -> Vec<KeymapEntry> {
        pending
            .into_iter()
            .map(|p| match p {
                PendingEntry::Ready(entry) => entry,
                PendingEntry::Macro(i) => {
                    let (page, offset) = assembled.entry_points[i];
                    KeymapEntry::MacroRef { page, offset }
                }
            })
            .collect()
    };

    let chunk2_len = geometry.page_size.saturating_sub(2 + profile::CHUNK2_OFFSET);
    let record = ProfileRecord {
        report_rate,
        dpi_default: doc.dpi_default,
        dpi_shift: doc.dpi_shift,
        dpi_list,
        color: parse_color(&doc.color)?,
        chunk1: unescape_exact("chunk1", &doc.chunk1, profile::CHUNK1_RANGE.len())?,
        buttons: resolve(buttons),
        buttons_padding: unescape_bytes(&doc.buttons_padding)?,
        buttons_gshift: resolve(buttons_gshift),
        buttons_gshift_padding: keymap_padding(
            &doc.buttons_gshift_padding,
            doc.buttons_gshift.len(),
        )?,
        name: doc.profile_name.clone(),
        rgb,
        chunk2: unescape_exact("chunk2", &doc.chunk2, chunk2_len)?,
        checksum: 0,
    };

    let profile_page = profile::encode(&record, geometry)?;
    debug!(
        name = %record.name,
        macros = macro_ops.len(),
        macro_pages = assembled.pages.len(),
        "Imported profile document"
    );
    Ok(ProfileImage {
        profile_page,
        macro_pages: assembled.pages,
    })
}
