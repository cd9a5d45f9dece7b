//! Macro bytecode, its text notation, and packing into overflow pages.
//!
//! A macro is a stream of opcodes starting at a (page, offset) address. The
//! total length of an instruction follows from the top three bits of its
//! opcode: `000` → 1 byte, `001` → 2, `010` → 3, `011` → 5, anything else → 1.
//! Multi-byte operands are big-endian. A chain instruction continues the
//! stream on another page; an end instruction terminates it.
//!
//! Text notation, one whitespace separated token per step:
//!
//! ```text
//! +lctrl c -lctrl sleep(50) wheel(-3) move(10,-4) +btn(1,2) -btn(1,2) repeat()
//! ```
//!
//! `+key`/`-key` press and release, a bare `key` taps it.

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::keycodes;
use tracing::debug;

/// Opcode bytes.
pub mod opcodes {
    pub const PAUSE: u8 = 0x02;
    pub const REPEAT: u8 = 0x03;
    pub const LOOP: u8 = 0x04;
    pub const WHEEL: u8 = 0x24;
    pub const WHEEL_H: u8 = 0x25;
    pub const SLEEP: u8 = 0x40;
    pub const BUTTON_DOWN: u8 = 0x41;
    pub const BUTTON_UP: u8 = 0x42;
    pub const KEY_DOWN: u8 = 0x43;
    pub const KEY_UP: u8 = 0x44;
    pub const CHAIN: u8 = 0x60;
    pub const MOVE: u8 = 0x61;
    pub const END: u8 = 0xFF;
}

/// Bytes kept free at the end of a page for the chain or end instruction.
pub const PAGE_RESERVE: usize = 11;

/// Highest mouse button addressable from macro text.
pub const MAX_MACRO_BUTTON: u8 = 5;

/// Total instruction length for `opcode`, operand included.
pub fn op_length(opcode: u8) -> usize {
    match (opcode & 0xE0) >> 4 {
        0x0 => 1,
        0x2 => 2,
        0x4 => 3,
        0x6 => 5,
        _ => 1,
    }
}

/// One macro instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MacroOp {
    /// Key operand: `0x00KK` usage or `0xMM00` single modifier bit.
    KeyDown(u16),
    KeyUp(u16),
    /// Button bitmask, bit 0 is button 1.
    ButtonDown(u16),
    ButtonUp(u16),
    Wheel(i8),
    WheelH(i8),
    Move { x: i16, y: i16 },
    Sleep(u16),
    Pause,
    Repeat,
    Loop,
    Chain { page: u16, offset: u16 },
    End,
}

impl MacroOp {
    pub fn opcode(&self) -> u8 {
        match self {
            Self::KeyDown(_) => opcodes::KEY_DOWN,
            Self::KeyUp(_) => opcodes::KEY_UP,
            Self::ButtonDown(_) => opcodes::BUTTON_DOWN,
            Self::ButtonUp(_) => opcodes::BUTTON_UP,
            Self::Wheel(_) => opcodes::WHEEL,
            Self::WheelH(_) => opcodes::WHEEL_H,
            Self::Move { .. } => opcodes::MOVE,
            Self::Sleep(_) => opcodes::SLEEP,
            Self::Pause => opcodes::PAUSE,
            Self::Repeat => opcodes::REPEAT,
            Self::Loop => opcodes::LOOP,
            Self::Chain { .. } => opcodes::CHAIN,
            Self::End => opcodes::END,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = vec![self.opcode()];
        match *self {
            Self::KeyDown(v)
            | Self::KeyUp(v)
            | Self::ButtonDown(v)
            | Self::ButtonUp(v)
            | Self::Sleep(v) => out.extend_from_slice(&v.to_be_bytes()),
            Self::Wheel(d) | Self::WheelH(d) => out.push(d as u8),
            // y goes first on the wire
            Self::Move { x, y } => {
                out.extend_from_slice(&y.to_be_bytes());
                out.extend_from_slice(&x.to_be_bytes());
            }
            Self::Chain { page, offset } => {
                out.extend_from_slice(&page.to_be_bytes());
                out.extend_from_slice(&offset.to_be_bytes());
            }
            Self::Pause | Self::Repeat | Self::Loop | Self::End => {}
        }
        out
    }

    /// Decode the instruction at the start of `bytes`.
    pub fn decode(bytes: &[u8]) -> Result<(Self, usize)> {
        let opcode = *bytes
            .first()
            .ok_or_else(|| Error::MalformedMacro("instruction past end of page".into()))?;
        let len = op_length(opcode);
        if bytes.len() < len {
            return Err(Error::MalformedMacro(format!(
                "instruction 0x{opcode:02X} truncated by end of page"
            )));
        }
        let word = |at: usize| u16::from_be_bytes([bytes[at], bytes[at + 1]]);
        let op = match opcode {
            opcodes::KEY_DOWN => Self::KeyDown(word(1)),
            opcodes::KEY_UP => Self::KeyUp(word(1)),
            opcodes::BUTTON_DOWN => Self::ButtonDown(word(1)),
            opcodes::BUTTON_UP => Self::ButtonUp(word(1)),
            opcodes::SLEEP => Self::Sleep(word(1)),
            opcodes::WHEEL => Self::Wheel(bytes[1] as i8),
            opcodes::WHEEL_H => Self::WheelH(bytes[1] as i8),
            opcodes::MOVE => Self::Move {
                y: word(1) as i16,
                x: word(3) as i16,
            },
            opcodes::PAUSE => Self::Pause,
            opcodes::REPEAT => Self::Repeat,
            opcodes::LOOP => Self::Loop,
            opcodes::CHAIN => Self::Chain {
                page: word(1),
                offset: word(3),
            },
            opcodes::END => Self::End,
            other => {
                return Err(Error::MalformedMacro(format!("unknown opcode 0x{other:02X}")));
            }
        };
        Ok((op, len))
    }
}

/// Read access to onboard memory pages, as needed to follow macro chains.
pub trait PageSource {
    fn page_size(&self) -> usize;
    fn page_count(&self) -> u16;
    fn profile_count(&self) -> u8;
    /// Raw page content, no checksum verification.
    fn read_page(&mut self, page: u16) -> Result<Vec<u8>>;
}

/// Pages held in memory, e.g. an assembled image not yet written.
#[derive(Debug, Clone, Default)]
pub struct PageMap {
    page_size: usize,
    page_count: u16,
    profile_count: u8,
    pages: HashMap<u16, Vec<u8>>,
}

impl PageMap {
    pub fn new(page_size: usize, page_count: u16, profile_count: u8) -> Self {
        Self {
            page_size,
            page_count,
            profile_count,
            pages: HashMap::new(),
        }
    }

    pub fn insert(&mut self, page: u16, data: Vec<u8>) {
        self.pages.insert(page, data);
    }
}

impl PageSource for PageMap {
    fn page_size(&self) -> usize {
        self.page_size
    }

    fn page_count(&self) -> u16 {
        self.page_count
    }

    fn profile_count(&self) -> u8 {
        self.profile_count
    }

    /// Pages never inserted read as erased flash.
    fn read_page(&mut self, page: u16) -> Result<Vec<u8>> {
        Ok(self
            .pages
            .get(&page)
            .cloned()
            .unwrap_or_else(|| vec![0xFF; self.page_size]))
    }
}

fn check_address(source: &dyn PageSource, page: u16, offset: u16) -> Result<()> {
    let in_overflow = page > source.profile_count() as u16 && page < source.page_count();
    let offset_ok = (offset as usize) < source.page_size().saturating_sub(10);
    if !in_overflow || !offset_ok {
        return Err(Error::MalformedMacro(format!(
            "address page {page} offset {offset} outside macro memory"
        )));
    }
    Ok(())
}

/// Decode the macro starting at `page`/`offset`, following chains.
///
/// The result holds neither chain nor end instructions.
pub fn decode_macro(source: &mut dyn PageSource, page: u16, offset: u16) -> Result<Vec<MacroOp>> {
    check_address(source, page, offset)?;
    let mut data = source.read_page(page)?;
    let mut pos = offset as usize;
    let mut hops = 0u16;
    let mut ops = Vec::new();

    loop {
        let (op, len) = MacroOp::decode(data.get(pos..).unwrap_or(&[]))?;
        match op {
            MacroOp::End => break,
            MacroOp::Chain { page, offset } => {
                hops += 1;
                if hops > source.page_count() {
                    return Err(Error::MalformedMacro("chain does not terminate".into()));
                }
                check_address(source, page, offset)?;
                data = source.read_page(page)?;
                pos = offset as usize;
            }
            op => {
                ops.push(op);
                pos += len;
            }
        }
    }

    debug!(page, offset, ops = ops.len(), hops, "Decoded macro");
    Ok(ops)
}

/// Masks with bits past the named buttons are written whole, as `0xNNNN`.
fn button_list(mask: u16) -> String {
    if mask >> MAX_MACRO_BUTTON != 0 {
        return format!("0x{mask:04x}");
    }
    (0..MAX_MACRO_BUTTON)
        .filter(|bit| mask & (1 << bit) != 0)
        .map(|bit| (bit + 1).to_string())
        .collect::<Vec<_>>()
        .join(",")
}

fn token(op: &MacroOp) -> Option<String> {
    let text = match *op {
        MacroOp::KeyDown(k) => format!("+{}", keycodes::operand_name(k)),
        MacroOp::KeyUp(k) => format!("-{}", keycodes::operand_name(k)),
        MacroOp::ButtonDown(m) => format!("+btn({})", button_list(m)),
        MacroOp::ButtonUp(m) => format!("-btn({})", button_list(m)),
        MacroOp::Wheel(d) => format!("wheel({d})"),
        MacroOp::WheelH(d) => format!("wheelh({d})"),
        MacroOp::Move { x, y } => format!("move({x},{y})"),
        MacroOp::Sleep(ms) => format!("sleep({ms})"),
        MacroOp::Pause => "pause()".into(),
        MacroOp::Repeat => "repeat()".into(),
        MacroOp::Loop => "loop()".into(),
        MacroOp::Chain { .. } | MacroOp::End => return None,
    };
    Some(text)
}

/// Render ops as text, writing a press directly followed by its release as a tap.
pub fn render_text(ops: &[MacroOp]) -> String {
    let mut tokens: Vec<String> = Vec::with_capacity(ops.len());
    for op in ops {
        let Some(text) = token(op) else { continue };
        if let (Some(released), Some(last)) = (text.strip_prefix('-'), tokens.last_mut()) {
            if last.strip_prefix('+') == Some(released) {
                *last = released.to_string();
                continue;
            }
        }
        tokens.push(text);
    }
    tokens.join(" ")
}

fn malformed(token: &str) -> Error {
    Error::MalformedMacro(format!("cannot parse '{token}'"))
}

/// Numbers between the parentheses of `token`.
fn arguments<T: std::str::FromStr>(token: &str) -> Result<Vec<T>> {
    let inner = token
        .split_once('(')
        .and_then(|(_, rest)| rest.strip_suffix(')'))
        .ok_or_else(|| malformed(token))?;
    inner
        .split(',')
        .map(str::trim)
        .filter(|arg| !arg.is_empty())
        .map(|arg| arg.parse::<T>().map_err(|_| malformed(token)))
        .collect()
}

fn single<T: std::str::FromStr + Copy>(token: &str) -> Result<T> {
    match arguments::<T>(token)?.as_slice() {
        [value] => Ok(*value),
        _ => Err(malformed(token)),
    }
}

fn button_mask(token: &str) -> Result<u16> {
    if let Some(raw) = token
        .split_once("(0x")
        .and_then(|(_, rest)| rest.strip_suffix(')'))
    {
        return u16::from_str_radix(raw, 16).map_err(|_| malformed(token));
    }
    arguments::<u8>(token)?
        .into_iter()
        .try_fold(0u16, |mask, button| {
            if (1..=MAX_MACRO_BUTTON).contains(&button) {
                Ok(mask | 1 << (button - 1))
            } else {
                Err(Error::MalformedMacro(format!(
                    "button {button} in '{token}' (1-{MAX_MACRO_BUTTON} allowed)"
                )))
            }
        })
}

/// Parse macro text.
///
/// Every pressed key must be released exactly once before the end.
pub fn parse_text(text: &str) -> Result<Vec<MacroOp>> {
    let mut ops = Vec::new();
    let mut held: Vec<u16> = Vec::new();

    for raw in text.split_whitespace() {
        let token = raw.to_lowercase();
        let (sign, body) = match token.as_bytes()[0] {
            b'+' => (Some(true), &token[1..]),
            b'-' => (Some(false), &token[1..]),
            _ => (None, token.as_str()),
        };

        if body.starts_with("btn(") {
            let mask = button_mask(body)?;
            match sign {
                Some(true) => ops.push(MacroOp::ButtonDown(mask)),
                Some(false) => ops.push(MacroOp::ButtonUp(mask)),
                None => ops.extend([MacroOp::ButtonDown(mask), MacroOp::ButtonUp(mask)]),
            }
            continue;
        }

        if sign.is_none() && body.contains('(') {
            let name = body.split('(').next().unwrap_or_default();
            let op = match name {
                "sleep" => MacroOp::Sleep(single(body)?),
                "wheel" => MacroOp::Wheel(single(body)?),
                "wheelh" => MacroOp::WheelH(single(body)?),
                "move" => match arguments::<i16>(body)?.as_slice() {
                    [x, y] => MacroOp::Move { x: *x, y: *y },
                    _ => return Err(malformed(body)),
                },
                "pause" if body == "pause()" => MacroOp::Pause,
                "repeat" if body == "repeat()" => MacroOp::Repeat,
                "loop" if body == "loop()" => MacroOp::Loop,
                _ => return Err(malformed(body)),
            };
            ops.push(op);
            continue;
        }

        let key = keycodes::parse_operand(body)
            .ok_or_else(|| Error::MalformedMacro(format!("unknown key '{body}'")))?;
        match sign {
            Some(true) => {
                if held.contains(&key) {
                    return Err(Error::UnbalancedMacroKeys(format!("{body} is already down")));
                }
                held.push(key);
                ops.push(MacroOp::KeyDown(key));
            }
            Some(false) => {
                let Some(pos) = held.iter().position(|&k| k == key) else {
                    return Err(Error::UnbalancedMacroKeys(format!(
                        "{body} released before being pressed"
                    )));
                };
                held.remove(pos);
                ops.push(MacroOp::KeyUp(key));
            }
            None => ops.extend([MacroOp::KeyDown(key), MacroOp::KeyUp(key)]),
        }
    }

    if !held.is_empty() {
        let names: Vec<String> = held.iter().map(|&k| keycodes::operand_name(k)).collect();
        return Err(Error::UnbalancedMacroKeys(format!(
            "not released: {}",
            names.join(" ")
        )));
    }
    Ok(ops)
}

/// Macros packed into overflow pages.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssembledMacros {
    /// Start address of each macro, in input order.
    pub entry_points: Vec<(u16, u16)>,
    /// Page content, `0xFF` padded, in fill order.
    pub pages: Vec<(u16, Vec<u8>)>,
}

/// Instructions packed as one unit: a press directly followed by its release stays together.
fn units(ops: &[MacroOp]) -> Vec<Vec<u8>> {
    let mut out = Vec::with_capacity(ops.len());
    let mut i = 0;
    while i < ops.len() {
        let mut bytes = ops[i].encode();
        let tap = match (ops[i], ops.get(i + 1)) {
            (MacroOp::KeyDown(a), Some(&MacroOp::KeyUp(b))) => a == b,
            (MacroOp::ButtonDown(a), Some(&MacroOp::ButtonUp(b))) => a == b,
            _ => false,
        };
        if tap {
            bytes.extend(ops[i + 1].encode());
            i += 1;
        }
        out.push(bytes);
        i += 1;
    }
    out
}

struct PageWriter<'a> {
    overflow: &'a [u16],
    page_size: usize,
    pages: Vec<Vec<u8>>,
    pos: usize,
}

impl PageWriter<'_> {
    fn limit(&self) -> usize {
        self.page_size - PAGE_RESERVE
    }

    fn page_number(&self, index: usize) -> u16 {
        self.overflow.get(index).copied().unwrap_or(0)
    }

    fn current(&self) -> u16 {
        self.page_number(self.pages.len() - 1)
    }

    fn put(&mut self, bytes: &[u8]) {
        let pos = self.pos;
        if let Some(page) = self.pages.last_mut() {
            page[pos..pos + bytes.len()].copy_from_slice(bytes);
        }
        self.pos += bytes.len();
    }

    fn new_page(&mut self) {
        self.pages.push(vec![0xFF; self.page_size]);
        self.pos = 0;
    }

    /// Continue on the next page, linked by a chain instruction.
    fn chain(&mut self) {
        let next = self.page_number(self.pages.len());
        self.put(&MacroOp::Chain { page: next, offset: 0 }.encode());
        self.new_page();
    }
}

/// Pack `macros` into `overflow_pages`, in order, each ending with an end instruction.
///
/// An instruction goes on the current page while it fits within
/// `page_size - 11` bytes; otherwise a chain to the next overflow page is
/// written and packing continues there.
pub fn assemble(
    macros: &[Vec<MacroOp>],
    overflow_pages: &[u16],
    page_size: usize,
) -> Result<AssembledMacros> {
    if macros.is_empty() {
        return Ok(AssembledMacros::default());
    }

    let mut writer = PageWriter {
        overflow: overflow_pages,
        page_size,
        pages: Vec::new(),
        pos: 0,
    };
    writer.new_page();
    let mut entry_points = Vec::with_capacity(macros.len());

    for ops in macros {
        if writer.pos >= writer.limit() {
            writer.new_page();
        }
        entry_points.push((writer.current(), writer.pos as u16));

        let body = ops
            .iter()
            .copied()
            .filter(|op| !matches!(op, MacroOp::Chain { .. } | MacroOp::End))
            .collect::<Vec<_>>();
        for unit in units(&body) {
            if writer.pos + unit.len() > writer.limit() {
                writer.chain();
            }
            writer.put(&unit);
        }
        writer.put(&[opcodes::END]);
    }

    if writer.pages.len() > overflow_pages.len() {
        return Err(Error::MacroTooLarge {
            required: writer.pages.len(),
            available: overflow_pages.len(),
        });
    }

    debug!(
        macros = macros.len(),
        pages = writer.pages.len(),
        "Assembled macro pages"
    );
    Ok(AssembledMacros {
        entry_points,
        pages: overflow_pages.iter().copied().zip(writer.pages).collect(),
    })
}
