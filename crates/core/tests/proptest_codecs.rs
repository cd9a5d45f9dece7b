//! Property-based tests for the checksum, keymap and macro codecs.
//!
//! Macro sequences are generated from balanced building blocks (taps, held
//! modifiers, pointer and timing instructions) so that every generated
//! sequence is valid input for both the text and the binary form.

use logi_omm_core::checksum;
use logi_omm_core::document::{escape_bytes, unescape_bytes};
use logi_omm_core::macros::{self, MacroOp, PageMap};
use logi_omm_core::profile::KeymapEntry;
use proptest::prelude::*;

const PAGE_SIZE: usize = 256;
const OVERFLOW: [u16; 3] = [6, 7, 8];

fn modifier() -> impl Strategy<Value = u16> {
    (0u16..8).prop_map(|bit| 1 << (8 + bit))
}

fn block() -> impl Strategy<Value = Vec<MacroOp>> {
    prop_oneof![
        any::<u16>().prop_map(|k| vec![MacroOp::KeyDown(k), MacroOp::KeyUp(k)]),
        (modifier(), 1u16..=0xFF).prop_map(|(m, k)| vec![
            MacroOp::KeyDown(m),
            MacroOp::KeyDown(k),
            MacroOp::KeyUp(k),
            MacroOp::KeyUp(m),
        ]),
        (1u16..=u16::MAX).prop_map(|b| vec![MacroOp::ButtonDown(b), MacroOp::ButtonUp(b)]),
        any::<i8>().prop_map(|d| vec![MacroOp::Wheel(d)]),
        any::<i8>().prop_map(|d| vec![MacroOp::WheelH(d)]),
        (any::<i16>(), any::<i16>()).prop_map(|(x, y)| vec![MacroOp::Move { x, y }]),
        any::<u16>().prop_map(|ms| vec![MacroOp::Sleep(ms)]),
        Just(vec![MacroOp::Pause]),
        Just(vec![MacroOp::Repeat]),
        Just(vec![MacroOp::Loop]),
    ]
}

fn macro_ops(max_blocks: usize) -> impl Strategy<Value = Vec<MacroOp>> {
    prop::collection::vec(block(), 0..max_blocks).prop_map(|blocks| blocks.concat())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(300))]

    /// A sealed page verifies.
    #[test]
    fn prop_sealed_page_verifies(mut page in prop::collection::vec(any::<u8>(), 3..600)) {
        let len = page.len();
        let crc = checksum::crc16_ccitt(&page[..len - 2]);
        page[len - 2..].copy_from_slice(&crc.to_be_bytes());
        prop_assert!(checksum::verify(&page));
    }

    /// Any single flipped bit in a sealed page is detected.
    #[test]
    fn prop_bit_flip_detected(
        mut page in prop::collection::vec(any::<u8>(), 3..600),
        pick in any::<prop::sample::Index>(),
        bit in 0u8..8,
    ) {
        let len = page.len();
        let crc = checksum::crc16_ccitt(&page[..len - 2]);
        page[len - 2..].copy_from_slice(&crc.to_be_bytes());
        let at = pick.index(len);
        page[at] ^= 1 << bit;
        prop_assert!(!checksum::verify(&page));
    }

    /// Every 4-byte keymap slot survives decode then encode unchanged.
    #[test]
    fn prop_keymap_slot_preserved(raw in any::<[u8; 4]>()) {
        prop_assert_eq!(KeymapEntry::decode(raw).encode(), raw);
    }

    /// Keyboard and macro slots decode to the entry they were built from.
    #[test]
    fn prop_keymap_entries_roundtrip(
        modifiers in any::<u8>(),
        keycode in any::<u8>(),
        page in 0u16..256,
        offset in any::<u16>(),
    ) {
        let key = KeymapEntry::Key { modifiers, keycode };
        prop_assert_eq!(KeymapEntry::decode(key.encode()), key);
        let reference = KeymapEntry::MacroRef { page, offset };
        prop_assert_eq!(KeymapEntry::decode(reference.encode()), reference);
    }

    /// Rendered macro text parses back to the same instructions.
    #[test]
    fn prop_macro_text_roundtrip(ops in macro_ops(40)) {
        let text = macros::render_text(&ops);
        let parsed = macros::parse_text(&text);
        prop_assert!(parsed.is_ok(), "failed to parse {:?}", text);
        prop_assert_eq!(parsed.expect("already checked is_ok"), ops);
    }

    /// Assembled macros decode from their entry points to the input instructions.
    #[test]
    fn prop_macro_binary_roundtrip(set in prop::collection::vec(macro_ops(12), 1..4)) {
        let assembled = macros::assemble(&set, &OVERFLOW, PAGE_SIZE);
        prop_assert!(assembled.is_ok());
        let assembled = assembled.expect("already checked is_ok");
        prop_assert_eq!(assembled.entry_points.len(), set.len());

        let mut memory = PageMap::new(PAGE_SIZE, 16, 5);
        for (page, data) in &assembled.pages {
            prop_assert_eq!(data.len(), PAGE_SIZE);
            memory.insert(*page, data.clone());
        }
        for (ops, &(page, offset)) in set.iter().zip(&assembled.entry_points) {
            let decoded = macros::decode_macro(&mut memory, page, offset);
            prop_assert!(decoded.is_ok());
            prop_assert_eq!(&decoded.expect("already checked is_ok"), ops);
        }
    }

    /// Escaped byte strings reproduce their bytes.
    #[test]
    fn prop_escaped_bytes_roundtrip(bytes in prop::collection::vec(any::<u8>(), 0..64)) {
        let text = escape_bytes(&bytes);
        prop_assert_eq!(unescape_bytes(&text).expect("own output parses"), bytes);
    }
}
