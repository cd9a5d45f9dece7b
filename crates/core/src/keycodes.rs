//! Keyboard usage and modifier name tables.
//!
//! Key codes are HID keyboard usages (page 0x07). Modifiers are single bits
//! of the HID modifier byte. Keymap entries carry the modifier byte and the
//! usage side by side; macro key operands carry either a usage (`0x00KK`) or
//! one modifier bit shifted into the high byte (`0xMM00`).

/// Modifier bit and its name.
pub const MODIFIERS: [(u8, &str); 8] = [
    (0x01, "lctrl"),
    (0x02, "lshift"),
    (0x04, "lalt"),
    (0x08, "lgui"),
    (0x10, "rctrl"),
    (0x20, "rshift"),
    (0x40, "ralt"),
    (0x80, "rgui"),
];

/// Named keyboard usages.
pub const KEYS: &[(u8, &str)] = &[
    (0x04, "a"),
    (0x05, "b"),
    (0x06, "c"),
    (0x07, "d"),
    (0x08, "e"),
    (0x09, "f"),
    (0x0A, "g"),
    (0x0B, "h"),
    (0x0C, "i"),
    (0x0D, "j"),
    (0x0E, "k"),
    (0x0F, "l"),
    (0x10, "m"),
    (0x11, "n"),
    (0x12, "o"),
    (0x13, "p"),
    (0x14, "q"),
    (0x15, "r"),
    (0x16, "s"),
    (0x17, "t"),
    (0x18, "u"),
    (0x19, "v"),
    (0x1A, "w"),
    (0x1B, "x"),
    (0x1C, "y"),
    (0x1D, "z"),
    (0x1E, "1"),
    (0x1F, "2"),
    (0x20, "3"),
    (0x21, "4"),
    (0x22, "5"),
    (0x23, "6"),
    (0x24, "7"),
    (0x25, "8"),
    (0x26, "9"),
    (0x27, "0"),
    (0x28, "enter"),
    (0x29, "esc"),
    (0x2A, "backspace"),
    (0x2B, "tab"),
    (0x2C, "space"),
    (0x2D, "minus"),
    (0x2E, "equal"),
    (0x2F, "leftbracket"),
    (0x30, "rightbracket"),
    (0x31, "backslash"),
    (0x32, "nonus_hash"),
    (0x33, "semicolon"),
    (0x34, "quote"),
    (0x35, "grave"),
    (0x36, "comma"),
    (0x37, "dot"),
    (0x38, "slash"),
    (0x39, "capslock"),
    (0x3A, "f1"),
    (0x3B, "f2"),
    (0x3C, "f3"),
    (0x3D, "f4"),
    (0x3E, "f5"),
    (0x3F, "f6"),
    (0x40, "f7"),
    (0x41, "f8"),
    (0x42, "f9"),
    (0x43, "f10"),
    (0x44, "f11"),
    (0x45, "f12"),
    (0x46, "printscreen"),
    (0x47, "scrolllock"),
    (0x48, "pausebreak"),
    (0x49, "insert"),
    (0x4A, "home"),
    (0x4B, "pageup"),
    (0x4C, "delete"),
    (0x4D, "end"),
    (0x4E, "pagedown"),
    (0x4F, "right"),
    (0x50, "left"),
    (0x51, "down"),
    (0x52, "up"),
    (0x53, "numlock"),
    (0x54, "kp_slash"),
    (0x55, "kp_asterisk"),
    (0x56, "kp_minus"),
    (0x57, "kp_plus"),
    (0x58, "kp_enter"),
    (0x59, "kp_1"),
    (0x5A, "kp_2"),
    (0x5B, "kp_3"),
    (0x5C, "kp_4"),
    (0x5D, "kp_5"),
    (0x5E, "kp_6"),
    (0x5F, "kp_7"),
    (0x60, "kp_8"),
    (0x61, "kp_9"),
    (0x62, "kp_0"),
    (0x63, "kp_dot"),
    (0x64, "nonus_backslash"),
    (0x65, "application"),
    (0x68, "f13"),
    (0x69, "f14"),
    (0x6A, "f15"),
    (0x6B, "f16"),
    (0x6C, "f17"),
    (0x6D, "f18"),
    (0x6E, "f19"),
    (0x6F, "f20"),
    (0x70, "f21"),
    (0x71, "f22"),
    (0x72, "f23"),
    (0x73, "f24"),
];

pub fn key_name(code: u8) -> Option<&'static str> {
    KEYS.iter().find(|(c, _)| *c == code).map(|(_, name)| *name)
}

pub fn key_code(name: &str) -> Option<u8> {
    KEYS.iter().find(|(_, n)| *n == name).map(|(code, _)| *code)
}

pub fn modifier_name(bit: u8) -> Option<&'static str> {
    MODIFIERS.iter().find(|(b, _)| *b == bit).map(|(_, name)| *name)
}

pub fn modifier_bit(name: &str) -> Option<u8> {
    MODIFIERS.iter().find(|(_, n)| *n == name).map(|(bit, _)| *bit)
}

/// Names of every modifier set in `mask`, lowest bit first.
pub fn modifier_names(mask: u8) -> Vec<&'static str> {
    MODIFIERS
        .iter()
        .filter(|(bit, _)| mask & bit != 0)
        .map(|(_, name)| *name)
        .collect()
}

/// Parse a `+`, `,` or whitespace separated modifier list into a mask.
///
/// Returns the first unknown name on failure.
pub fn parse_modifiers(text: &str) -> std::result::Result<u8, String> {
    text.split(|c: char| c == '+' || c == ',' || c.is_whitespace())
        .filter(|part| !part.is_empty())
        .try_fold(0u8, |mask, part| {
            let part = part.to_ascii_lowercase();
            modifier_bit(&part).map(|bit| mask | bit).ok_or(part)
        })
}

/// Render a macro key operand: a modifier, a named usage, or `0xNNNN`.
pub fn operand_name(operand: u16) -> String {
    let [high, low] = operand.to_be_bytes();
    let named = if low == 0 {
        modifier_name(high)
    } else if high == 0 {
        key_name(low)
    } else {
        None
    };
    match named {
        Some(name) => name.to_string(),
        None => format!("0x{operand:04x}"),
    }
}

/// Inverse of [`operand_name`].
pub fn parse_operand(name: &str) -> Option<u16> {
    if let Some(bit) = modifier_bit(name) {
        return Some((bit as u16) << 8);
    }
    if let Some(code) = key_code(name) {
        return Some(code as u16);
    }
    parse_hex(name).and_then(|value| u16::try_from(value).ok())
}

/// Parse a `0x`-prefixed hexadecimal number.
pub fn parse_hex(text: &str) -> Option<u32> {
    let digits = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))?;
    u32::from_str_radix(digits, 16).ok()
}
