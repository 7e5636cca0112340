//! HID keyboard usage codes (usage page 0x07)

use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct KeyCode(pub u8);

impl KeyCode {
    pub const A: KeyCode = KeyCode(0x04);
    pub const B: KeyCode = KeyCode(0x05);
    pub const C: KeyCode = KeyCode(0x06);
    pub const D: KeyCode = KeyCode(0x07);
    pub const E: KeyCode = KeyCode(0x08);
    pub const F: KeyCode = KeyCode(0x09);
    pub const G: KeyCode = KeyCode(0x0A);
    pub const H: KeyCode = KeyCode(0x0B);
    pub const I: KeyCode = KeyCode(0x0C);
    pub const J: KeyCode = KeyCode(0x0D);
    pub const K: KeyCode = KeyCode(0x0E);
    pub const L: KeyCode = KeyCode(0x0F);
    pub const M: KeyCode = KeyCode(0x10);
    pub const N: KeyCode = KeyCode(0x11);
    pub const O: KeyCode = KeyCode(0x12);
    pub const P: KeyCode = KeyCode(0x13);
    pub const Q: KeyCode = KeyCode(0x14);
    pub const R: KeyCode = KeyCode(0x15);
    pub const S: KeyCode = KeyCode(0x16);
    pub const T: KeyCode = KeyCode(0x17);
    pub const U: KeyCode = KeyCode(0x18);
    pub const V: KeyCode = KeyCode(0x19);
    pub const W: KeyCode = KeyCode(0x1A);
    pub const X: KeyCode = KeyCode(0x1B);
    pub const Y: KeyCode = KeyCode(0x1C);
    pub const Z: KeyCode = KeyCode(0x1D);

    pub const DIGIT_1: KeyCode = KeyCode(0x1E);
    pub const DIGIT_2: KeyCode = KeyCode(0x1F);
    pub const DIGIT_3: KeyCode = KeyCode(0x20);
    pub const DIGIT_4: KeyCode = KeyCode(0x21);
    pub const DIGIT_5: KeyCode = KeyCode(0x22);
    pub const DIGIT_6: KeyCode = KeyCode(0x23);
    pub const DIGIT_7: KeyCode = KeyCode(0x24);
    pub const DIGIT_8: KeyCode = KeyCode(0x25);
    pub const DIGIT_9: KeyCode = KeyCode(0x26);
    pub const DIGIT_0: KeyCode = KeyCode(0x27);

    pub const ENTER: KeyCode = KeyCode(0x28);
    pub const ESCAPE: KeyCode = KeyCode(0x29);
    pub const BACKSPACE: KeyCode = KeyCode(0x2A);
    pub const TAB: KeyCode = KeyCode(0x2B);
    pub const SPACE: KeyCode = KeyCode(0x2C);
    pub const MINUS: KeyCode = KeyCode(0x2D);
    pub const EQUAL: KeyCode = KeyCode(0x2E);
    pub const LEFT_BRACKET: KeyCode = KeyCode(0x2F);
    pub const RIGHT_BRACKET: KeyCode = KeyCode(0x30);
    pub const BACKSLASH: KeyCode = KeyCode(0x31);
    pub const SEMICOLON: KeyCode = KeyCode(0x33);
    pub const APOSTROPHE: KeyCode = KeyCode(0x34);
    pub const GRAVE: KeyCode = KeyCode(0x35);
    pub const COMMA: KeyCode = KeyCode(0x36);
    pub const PERIOD: KeyCode = KeyCode(0x37);
    pub const SLASH: KeyCode = KeyCode(0x38);
    pub const CAPS_LOCK: KeyCode = KeyCode(0x39);

    pub const F1: KeyCode = KeyCode(0x3A);
    pub const F2: KeyCode = KeyCode(0x3B);
    pub const F3: KeyCode = KeyCode(0x3C);
    pub const F4: KeyCode = KeyCode(0x3D);
    pub const F5: KeyCode = KeyCode(0x3E);
    pub const F6: KeyCode = KeyCode(0x3F);
    pub const F7: KeyCode = KeyCode(0x40);
    pub const F8: KeyCode = KeyCode(0x41);
    pub const F9: KeyCode = KeyCode(0x42);
    pub const F10: KeyCode = KeyCode(0x43);
    pub const F11: KeyCode = KeyCode(0x44);
    pub const F12: KeyCode = KeyCode(0x45);

    pub const PRINT_SCREEN: KeyCode = KeyCode(0x46);
    pub const SCROLL_LOCK: KeyCode = KeyCode(0x47);
    pub const PAUSE: KeyCode = KeyCode(0x48);
    pub const INSERT: KeyCode = KeyCode(0x49);
    pub const HOME: KeyCode = KeyCode(0x4A);
    pub const PAGE_UP: KeyCode = KeyCode(0x4B);
    pub const DELETE: KeyCode = KeyCode(0x4C);
    pub const END: KeyCode = KeyCode(0x4D);
    pub const PAGE_DOWN: KeyCode = KeyCode(0x4E);
    pub const ARROW_RIGHT: KeyCode = KeyCode(0x4F);
    pub const ARROW_LEFT: KeyCode = KeyCode(0x50);
    pub const ARROW_DOWN: KeyCode = KeyCode(0x51);
    pub const ARROW_UP: KeyCode = KeyCode(0x52);
    pub const NUM_LOCK: KeyCode = KeyCode(0x53);

    pub const LEFT_CONTROL: KeyCode = KeyCode(0xE0);
    pub const LEFT_SHIFT: KeyCode = KeyCode(0xE1);
    pub const LEFT_ALT: KeyCode = KeyCode(0xE2);
    pub const LEFT_GUI: KeyCode = KeyCode(0xE3);
    pub const RIGHT_CONTROL: KeyCode = KeyCode(0xE4);
    pub const RIGHT_SHIFT: KeyCode = KeyCode(0xE5);
    pub const RIGHT_ALT: KeyCode = KeyCode(0xE6);
    pub const RIGHT_GUI: KeyCode = KeyCode(0xE7);

    pub const fn is_modifier(self) -> bool {
        self.0 >= 0xE0 && self.0 <= 0xE7
    }

    /// Bit in the report's modifier byte, for modifier usages only
    pub const fn modifier_bit(self) -> Option<u8> {
        if self.is_modifier() {
            Some(1 << (self.0 - 0xE0))
        } else {
            None
        }
    }
}

impl fmt::Display for KeyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:02X}", self.0)
    }
}
