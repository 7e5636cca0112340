//! Report layouts written to the hidg nodes
//!
//! All reports are little-endian and carry no report ID. Staged state lives in these
//! structs; serializing does not clear it, so two flushes of unchanged state produce the
//! same bytes.

use tracing::{debug, warn};

use crate::gadget::keycode::KeyCode;

pub const JOYSTICK_STICKS: usize = 2;
pub const JOYSTICK_TRIGGERS: usize = 2;
pub const JOYSTICK_BUTTONS: usize = 24;
pub const MOUSE_BUTTONS: usize = 2;
pub const KEYBOARD_SLOTS: usize = 6;

/// Scales a `[-1.0, 1.0]` axis value to a signed byte
pub fn axis_to_i8(value: f32) -> i8 {
    if value.is_nan() {
        return 0;
    }
    (value.clamp(-1.0, 1.0) * 127.0).round() as i8
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JoystickReport {
    sticks: [[i8; 2]; JOYSTICK_STICKS],
    triggers: [i8; JOYSTICK_TRIGGERS],
    buttons: u32,
}

impl JoystickReport {
    pub const LEN: usize = 9;

    pub fn set_stick(&mut self, index: usize, x: f32, y: f32) {
        match self.sticks.get_mut(index) {
            Some(stick) => *stick = [axis_to_i8(x), axis_to_i8(y)],
            None => debug!("Ignoring joystick stick index {}", index),
        }
    }

    pub fn set_trigger(&mut self, index: usize, value: f32) {
        match self.triggers.get_mut(index) {
            Some(trigger) => *trigger = axis_to_i8(value),
            None => debug!("Ignoring joystick trigger index {}", index),
        }
    }

    pub fn set_button(&mut self, index: usize, pressed: bool) {
        if index >= JOYSTICK_BUTTONS {
            debug!("Ignoring joystick button index {}", index);
            return;
        }
        if pressed {
            self.buttons |= 1 << index;
        } else {
            self.buttons &= !(1 << index);
        }
    }

    pub fn to_bytes(&self) -> [u8; Self::LEN] {
        let buttons = self.buttons.to_le_bytes();
        [
            self.sticks[0][0] as u8,
            self.sticks[0][1] as u8,
            self.sticks[1][0] as u8,
            self.sticks[1][1] as u8,
            self.triggers[0] as u8,
            self.triggers[1] as u8,
            buttons[0],
            buttons[1],
            buttons[2],
        ]
    }
}

/// Relative mouse report with sub-count motion carried between moves
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MouseReport {
    counts_per_unit: f32,
    buttons: u8,
    dx: i8,
    dy: i8,
    remainder: [f32; 2],
}

impl MouseReport {
    pub const LEN: usize = 3;

    pub fn new(counts_per_unit: f32) -> Self {
        Self {
            counts_per_unit,
            buttons: 0,
            dx: 0,
            dy: 0,
            remainder: [0.0; 2],
        }
    }

    /// Stages the motion of the next report; replaces any previously staged motion
    pub fn move_by(&mut self, dx: f32, dy: f32) {
        self.dx = self.scale(0, dx);
        self.dy = self.scale(1, dy);
    }

    fn scale(&mut self, axis: usize, delta: f32) -> i8 {
        if !delta.is_finite() {
            self.remainder[axis] = 0.0;
            return 0;
        }
        let total = delta * self.counts_per_unit + self.remainder[axis];
        let counts = total.trunc().clamp(-127.0, 127.0);
        // Only the fractional part carries; clamped overflow is dropped
        self.remainder[axis] = total.fract();
        counts as i8
    }

    pub fn set_button(&mut self, index: usize, pressed: bool) {
        if index >= MOUSE_BUTTONS {
            debug!("Ignoring mouse button index {}", index);
            return;
        }
        if pressed {
            self.buttons |= 1 << index;
        } else {
            self.buttons &= !(1 << index);
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new(self.counts_per_unit);
    }

    pub fn to_bytes(&self) -> [u8; Self::LEN] {
        [self.buttons, self.dx as u8, self.dy as u8]
    }
}

/// Boot-protocol keyboard report
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeyboardReport {
    modifiers: u8,
    keys: [u8; KEYBOARD_SLOTS],
}

impl KeyboardReport {
    pub const LEN: usize = 8;

    /// Returns `false` if every key slot is taken and the key was dropped
    pub fn press(&mut self, key: KeyCode) -> bool {
        if let Some(bit) = key.modifier_bit() {
            self.modifiers |= bit;
            return true;
        }
        if key.0 == 0 || self.keys.contains(&key.0) {
            return true;
        }
        match self.keys.iter_mut().find(|slot| **slot == 0) {
            Some(slot) => {
                *slot = key.0;
                true
            }
            None => {
                warn!("Keyboard report full, dropping key {}", key);
                false
            }
        }
    }

    pub fn release(&mut self, key: KeyCode) {
        if let Some(bit) = key.modifier_bit() {
            self.modifiers &= !bit;
            return;
        }
        if let Some(index) = self.keys.iter().position(|k| *k == key.0) {
            // Keep held keys packed at the front
            self.keys.copy_within(index + 1.., index);
            self.keys[KEYBOARD_SLOTS - 1] = 0;
        }
    }

    pub fn is_pressed(&self, key: KeyCode) -> bool {
        match key.modifier_bit() {
            Some(bit) => self.modifiers & bit != 0,
            None => key.0 != 0 && self.keys.contains(&key.0),
        }
    }

    pub fn to_bytes(&self) -> [u8; Self::LEN] {
        let mut bytes = [0u8; Self::LEN];
        bytes[0] = self.modifiers;
        bytes[2..].copy_from_slice(&self.keys);
        bytes
    }
}
