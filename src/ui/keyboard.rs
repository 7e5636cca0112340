//! On-screen US keyboard
//!
//! Ordinary keys are held for as long as the pointer stays down on them. Modifier keys
//! toggle instead: a tap presses and latches, a tap on a latched modifier releases.

use eframe::egui::{self, Button, RichText, Vec2};
use tokio::sync::mpsc;
use tracing::warn;

use crate::gadget::KeyCode;
use crate::mapping::keyboard::ModifierCategory;
use crate::ui::common::{Indicators, KeyEvent};

#[derive(Debug, Clone, Copy)]
pub struct KeySpec {
    pub label: &'static str,
    pub code: KeyCode,
    /// Width in key units
    pub width: f32,
}

const fn key(label: &'static str, code: KeyCode) -> KeySpec {
    KeySpec {
        label,
        code,
        width: 1.0,
    }
}

const fn wide(label: &'static str, code: KeyCode, width: f32) -> KeySpec {
    KeySpec { label, code, width }
}

pub const US_LAYOUT: &[&[KeySpec]] = &[
    &[
        key("Esc", KeyCode::ESCAPE),
        key("F1", KeyCode::F1),
        key("F2", KeyCode::F2),
        key("F3", KeyCode::F3),
        key("F4", KeyCode::F4),
        key("F5", KeyCode::F5),
        key("F6", KeyCode::F6),
        key("F7", KeyCode::F7),
        key("F8", KeyCode::F8),
        key("F9", KeyCode::F9),
        key("F10", KeyCode::F10),
        key("F11", KeyCode::F11),
        key("F12", KeyCode::F12),
        key("Del", KeyCode::DELETE),
    ],
    &[
        key("`", KeyCode::GRAVE),
        key("1", KeyCode::DIGIT_1),
        key("2", KeyCode::DIGIT_2),
        key("3", KeyCode::DIGIT_3),
        key("4", KeyCode::DIGIT_4),
        key("5", KeyCode::DIGIT_5),
        key("6", KeyCode::DIGIT_6),
        key("7", KeyCode::DIGIT_7),
        key("8", KeyCode::DIGIT_8),
        key("9", KeyCode::DIGIT_9),
        key("0", KeyCode::DIGIT_0),
        key("-", KeyCode::MINUS),
        key("=", KeyCode::EQUAL),
        wide("Bksp", KeyCode::BACKSPACE, 2.0),
    ],
    &[
        wide("Tab", KeyCode::TAB, 1.5),
        key("Q", KeyCode::Q),
        key("W", KeyCode::W),
        key("E", KeyCode::E),
        key("R", KeyCode::R),
        key("T", KeyCode::T),
        key("Y", KeyCode::Y),
        key("U", KeyCode::U),
        key("I", KeyCode::I),
        key("O", KeyCode::O),
        key("P", KeyCode::P),
        key("[", KeyCode::LEFT_BRACKET),
        key("]", KeyCode::RIGHT_BRACKET),
        wide("\\", KeyCode::BACKSLASH, 1.5),
    ],
    &[
        wide("Caps", KeyCode::CAPS_LOCK, 1.75),
        key("A", KeyCode::A),
        key("S", KeyCode::S),
        key("D", KeyCode::D),
        key("F", KeyCode::F),
        key("G", KeyCode::G),
        key("H", KeyCode::H),
        key("J", KeyCode::J),
        key("K", KeyCode::K),
        key("L", KeyCode::L),
        key(";", KeyCode::SEMICOLON),
        key("'", KeyCode::APOSTROPHE),
        wide("Enter", KeyCode::ENTER, 2.25),
    ],
    &[
        wide("Shift", KeyCode::LEFT_SHIFT, 2.25),
        key("Z", KeyCode::Z),
        key("X", KeyCode::X),
        key("C", KeyCode::C),
        key("V", KeyCode::V),
        key("B", KeyCode::B),
        key("N", KeyCode::N),
        key("M", KeyCode::M),
        key(",", KeyCode::COMMA),
        key(".", KeyCode::PERIOD),
        key("/", KeyCode::SLASH),
        wide("Shift", KeyCode::RIGHT_SHIFT, 1.75),
        key("Up", KeyCode::ARROW_UP),
    ],
    &[
        wide("Ctrl", KeyCode::LEFT_CONTROL, 1.25),
        wide("Gui", KeyCode::LEFT_GUI, 1.25),
        wide("Alt", KeyCode::LEFT_ALT, 1.25),
        wide("Space", KeyCode::SPACE, 5.5),
        wide("Alt", KeyCode::RIGHT_ALT, 1.25),
        wide("Ctrl", KeyCode::RIGHT_CONTROL, 1.25),
        key("Left", KeyCode::ARROW_LEFT),
        key("Down", KeyCode::ARROW_DOWN),
        key("Right", KeyCode::ARROW_RIGHT),
    ],
];

/// Widest row, in key units
const ROW_UNITS: f32 = 15.0;

/// Turns "which ordinary key is under a pressed pointer" into press/release events
#[derive(Debug, Default)]
pub struct KeyTracker {
    held: Option<KeyCode>,
}

impl KeyTracker {
    pub fn held(&self) -> Option<KeyCode> {
        self.held
    }

    pub fn update(&mut self, down: Option<KeyCode>) -> Vec<KeyEvent> {
        if down == self.held {
            return Vec::new();
        }
        let mut events = Vec::with_capacity(2);
        if let Some(previous) = self.held.take() {
            events.push(KeyEvent::Release(previous));
        }
        if let Some(key) = down {
            events.push(KeyEvent::Press(key));
            self.held = Some(key);
        }
        events
    }
}

/// Event for a tap on a modifier key
pub fn modifier_tap(code: KeyCode, latched: bool) -> KeyEvent {
    if latched {
        KeyEvent::Release(code)
    } else {
        KeyEvent::Press(code)
    }
}

pub struct OnScreenKeyboard {
    tracker: KeyTracker,
    sender: mpsc::Sender<KeyEvent>,
}

impl OnScreenKeyboard {
    pub fn new(sender: mpsc::Sender<KeyEvent>) -> Self {
        Self {
            tracker: KeyTracker::default(),
            sender,
        }
    }

    /// Draws the keyboard; modifier keys show as selected while their indicator is lit
    pub fn render(&mut self, ui: &mut egui::Ui, indicators: Indicators) {
        let spacing = ui.spacing().item_spacing.x;
        let unit = ((ui.available_width() - spacing * ROW_UNITS) / ROW_UNITS).max(24.0);
        let mut down = None;

        for row in US_LAYOUT {
            ui.horizontal(|ui| {
                for cap in row.iter() {
                    let size = Vec2::new(
                        unit * cap.width + spacing * (cap.width - 1.0),
                        unit * 0.8,
                    );
                    let text = RichText::new(cap.label).size(unit * 0.3);

                    match ModifierCategory::of(cap.code) {
                        Some(category) => {
                            let latched = indicators.get(category.indicator());
                            let button = Button::new(text).min_size(size).selected(latched);
                            if ui.add(button).clicked() {
                                self.send(modifier_tap(cap.code, latched));
                            }
                        }
                        None => {
                            let held = self.tracker.held() == Some(cap.code);
                            let button = Button::new(text).min_size(size).selected(held);
                            if ui.add(button).is_pointer_button_down_on() {
                                down = Some(cap.code);
                            }
                        }
                    }
                }
            });
        }

        for event in self.tracker.update(down) {
            self.send(event);
        }
    }

    fn send(&self, event: KeyEvent) {
        if let Err(e) = self.sender.try_send(event) {
            warn!("Dropping on-screen key event {:?}: {}", event, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn holding_a_key_presses_once_and_releases_on_lift() {
        let mut tracker = KeyTracker::default();
        assert_eq!(tracker.update(Some(KeyCode::A)), vec![KeyEvent::Press(KeyCode::A)]);
        assert!(tracker.update(Some(KeyCode::A)).is_empty());
        assert_eq!(tracker.update(None), vec![KeyEvent::Release(KeyCode::A)]);
        assert!(tracker.update(None).is_empty());
        assert_eq!(tracker.held(), None);
    }

    #[test]
    fn sliding_to_another_key_releases_the_first() {
        let mut tracker = KeyTracker::default();
        tracker.update(Some(KeyCode::Q));
        assert_eq!(
            tracker.update(Some(KeyCode::W)),
            vec![KeyEvent::Release(KeyCode::Q), KeyEvent::Press(KeyCode::W)]
        );
        assert_eq!(tracker.held(), Some(KeyCode::W));
    }

    #[test]
    fn modifier_taps_toggle() {
        assert_eq!(
            modifier_tap(KeyCode::LEFT_SHIFT, false),
            KeyEvent::Press(KeyCode::LEFT_SHIFT)
        );
        assert_eq!(
            modifier_tap(KeyCode::LEFT_SHIFT, true),
            KeyEvent::Release(KeyCode::LEFT_SHIFT)
        );
    }

    #[test]
    fn layout_has_unique_codes_and_every_modifier_category() {
        let codes: Vec<KeyCode> = US_LAYOUT
            .iter()
            .flat_map(|row| row.iter().map(|cap| cap.code))
            .collect();
        let unique: HashSet<KeyCode> = codes.iter().copied().collect();
        assert_eq!(codes.len(), unique.len());

        for category in ModifierCategory::ALL {
            assert!(codes.iter().any(|code| ModifierCategory::of(*code) == Some(category)));
        }
        for row in US_LAYOUT {
            let width: f32 = row.iter().map(|cap| cap.width).sum();
            assert!(width <= ROW_UNITS, "row of {} units", width);
        }
    }

    #[test]
    fn full_queue_drops_events_without_panicking() {
        let (sender, mut receiver) = mpsc::channel(1);
        let keyboard = OnScreenKeyboard::new(sender);
        keyboard.send(KeyEvent::Press(KeyCode::A));
        keyboard.send(KeyEvent::Release(KeyCode::A));
        assert_eq!(receiver.try_recv().unwrap(), KeyEvent::Press(KeyCode::A));
        assert!(receiver.try_recv().is_err());
    }
}
