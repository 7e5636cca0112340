//! Keyboard mapping for the on-screen keyboard
//!
//! Tapped modifiers stay latched on the emulated keyboard until the next key release,
//! which clears every latched modifier at once. LED output reports from the host are
//! decoded here as well, since they drive the same status bar.

use tracing::{debug, info, warn};

use crate::gadget::{Device, KeyCode, KeyboardSink};
use crate::ui::common::{Indicator, KeyEvent, UiSink};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ModifierCategory {
    Shift,
    Control,
    Alt,
    Gui,
}

impl ModifierCategory {
    pub const ALL: [ModifierCategory; 4] = [
        ModifierCategory::Shift,
        ModifierCategory::Control,
        ModifierCategory::Alt,
        ModifierCategory::Gui,
    ];

    /// Left and right key of the category
    pub const fn keys(self) -> [KeyCode; 2] {
        match self {
            ModifierCategory::Shift => [KeyCode::LEFT_SHIFT, KeyCode::RIGHT_SHIFT],
            ModifierCategory::Control => [KeyCode::LEFT_CONTROL, KeyCode::RIGHT_CONTROL],
            ModifierCategory::Alt => [KeyCode::LEFT_ALT, KeyCode::RIGHT_ALT],
            ModifierCategory::Gui => [KeyCode::LEFT_GUI, KeyCode::RIGHT_GUI],
        }
    }

    pub fn of(key: KeyCode) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|category| category.keys().contains(&key))
    }

    pub const fn indicator(self) -> Indicator {
        match self {
            ModifierCategory::Shift => Indicator::Shift,
            ModifierCategory::Control => Indicator::Control,
            ModifierCategory::Alt => Indicator::Alt,
            ModifierCategory::Gui => Indicator::Gui,
        }
    }

    const fn index(self) -> usize {
        self as usize
    }
}

/// Latch state of the four modifier categories
#[derive(Debug, Default)]
pub struct ModifierStateMachine {
    latched: [bool; 4],
}

impl ModifierStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_latched(&self, category: ModifierCategory) -> bool {
        self.latched[category.index()]
    }

    pub fn handle(
        &mut self,
        event: KeyEvent,
        keyboard: &mut Device<dyn KeyboardSink>,
        ui: &dyn UiSink,
    ) {
        if !keyboard.is_present() {
            debug!("No keyboard gadget, dropping {:?}", event);
            return;
        }
        match event {
            KeyEvent::Press(key) => self.press(key, keyboard, ui),
            KeyEvent::Release(key) => self.release(key, keyboard, ui),
        }
    }

    fn press(&mut self, key: KeyCode, keyboard: &mut Device<dyn KeyboardSink>, ui: &dyn UiSink) {
        debug!("Key press {}", key);
        keyboard.with(|sink| sink.press(key));
        keyboard.commit();

        if let Some(category) = ModifierCategory::of(key) {
            self.latched[category.index()] = true;
            ui.set_indicator(category.indicator(), true);
        }
    }

    /// Any release drops every held modifier together with the released key
    fn release(&mut self, key: KeyCode, keyboard: &mut Device<dyn KeyboardSink>, ui: &dyn UiSink) {
        debug!("Key release {}", key);
        for category in ModifierCategory::ALL {
            let held = keyboard
                .get()
                .is_some_and(|sink| category.keys().iter().any(|code| sink.is_pressed(*code)));
            if held {
                ui.set_indicator(category.indicator(), false);
                keyboard.with(|sink| {
                    for code in category.keys() {
                        sink.release(code);
                    }
                });
                self.latched[category.index()] = false;
            }
        }
        keyboard.with(|sink| sink.release(key));
        keyboard.commit();
    }

    /// Turns off the indicator of every latched modifier; used on shutdown
    pub fn clear_indicators(&mut self, ui: &dyn UiSink) {
        for category in ModifierCategory::ALL {
            if self.is_latched(category) {
                ui.set_indicator(category.indicator(), false);
                self.latched[category.index()] = false;
            }
        }
    }
}

/// Lock LEDs reported by the host
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LockState {
    pub num_lock: bool,
    pub caps_lock: bool,
    pub scroll_lock: bool,
}

impl LockState {
    /// Decodes a one-byte LED bitfield; any other length is rejected
    pub fn decode(report: &[u8]) -> Option<Self> {
        let &[bits] = report else {
            return None;
        };
        Some(Self {
            num_lock: bits & 0b001 != 0,
            caps_lock: bits & 0b010 != 0,
            scroll_lock: bits & 0b100 != 0,
        })
    }
}

/// Decodes an output report and forwards the lock state to the window
pub fn forward_output_report(report: &[u8], ui: &dyn UiSink) {
    match LockState::decode(report) {
        Some(state) => {
            info!(
                "Host lock state: num={} caps={} scroll={}",
                state.num_lock, state.caps_lock, state.scroll_lock
            );
            ui.set_indicator(Indicator::NumLock, state.num_lock);
            ui.set_indicator(Indicator::CapsLock, state.caps_lock);
            ui.set_indicator(Indicator::ScrollLock, state.scroll_lock);
        }
        None => warn!("Ignoring output report of {} bytes", report.len()),
    }
}
