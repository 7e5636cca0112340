//! Fixed action tables and their resolution against the input provider
//!
//! The declaration order of every enum below is the bit/slot position of that action in
//! the emitted HID reports. Hosts read buttons by position, so the order is part of the
//! device contract and must never be reshuffled.

use crate::controller::provider::{
    ActionSetHandle, AnalogActionHandle, AnalogData, DigitalActionHandle, InputProvider,
};
use crate::mapping::error::MappingError;
use serde::Serialize;
use tracing::{debug, info};

/// Name of the single action set activated on every controller
pub const ACTION_SET_NAME: &str = "InGameControls";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum AnalogAction {
    JoyLeft,
    JoyRight,
    TrigLeft,
    TrigRight,
    Mouse,
}

impl AnalogAction {
    pub const ALL: [AnalogAction; 5] = [
        AnalogAction::JoyLeft,
        AnalogAction::JoyRight,
        AnalogAction::TrigLeft,
        AnalogAction::TrigRight,
        AnalogAction::Mouse,
    ];

    pub const fn index(self) -> usize {
        self as usize
    }

    pub const fn name(self) -> &'static str {
        match self {
            AnalogAction::JoyLeft => "JoyLeft",
            AnalogAction::JoyRight => "JoyRight",
            AnalogAction::TrigLeft => "TrigLeft",
            AnalogAction::TrigRight => "TrigRight",
            AnalogAction::Mouse => "Mouse",
        }
    }
}

/// Digital actions emitted as joystick report buttons; `index()` is the button bit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum GamepadButton {
    A,
    B,
    X,
    Y,
    Up,
    Down,
    Left,
    Right,
    BumpLeft,
    BumpRight,
    Menu,
    Start,
    JoyPressLeft,
    JoyPressRight,
    BackLeftTop,
    BackLeftBottom,
    BackRightTop,
    BackRightBottom,
}

impl GamepadButton {
    pub const ALL: [GamepadButton; 18] = [
        GamepadButton::A,
        GamepadButton::B,
        GamepadButton::X,
        GamepadButton::Y,
        GamepadButton::Up,
        GamepadButton::Down,
        GamepadButton::Left,
        GamepadButton::Right,
        GamepadButton::BumpLeft,
        GamepadButton::BumpRight,
        GamepadButton::Menu,
        GamepadButton::Start,
        GamepadButton::JoyPressLeft,
        GamepadButton::JoyPressRight,
        GamepadButton::BackLeftTop,
        GamepadButton::BackLeftBottom,
        GamepadButton::BackRightTop,
        GamepadButton::BackRightBottom,
    ];

    pub const fn index(self) -> usize {
        self as usize
    }

    pub const fn name(self) -> &'static str {
        match self {
            GamepadButton::A => "A",
            GamepadButton::B => "B",
            GamepadButton::X => "X",
            GamepadButton::Y => "Y",
            GamepadButton::Up => "UP",
            GamepadButton::Down => "DOWN",
            GamepadButton::Left => "LEFT",
            GamepadButton::Right => "RIGHT",
            GamepadButton::BumpLeft => "BumpLeft",
            GamepadButton::BumpRight => "BumpRight",
            GamepadButton::Menu => "Menu",
            GamepadButton::Start => "Start",
            GamepadButton::JoyPressLeft => "JoyPressLeft",
            GamepadButton::JoyPressRight => "JoyPressRight",
            GamepadButton::BackLeftTop => "BackLeftTop",
            GamepadButton::BackLeftBottom => "BackLeftBottom",
            GamepadButton::BackRightTop => "BackRightTop",
            GamepadButton::BackRightBottom => "BackRightBottom",
        }
    }
}

/// Digital actions emitted as mouse report buttons
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum MouseButton {
    MouseClickLeft,
    MouseClickRight,
}

impl MouseButton {
    pub const ALL: [MouseButton; 2] = [MouseButton::MouseClickLeft, MouseButton::MouseClickRight];

    pub const fn index(self) -> usize {
        self as usize
    }

    pub const fn name(self) -> &'static str {
        match self {
            MouseButton::MouseClickLeft => "MouseClickLeft",
            MouseButton::MouseClickRight => "MouseClickRight",
        }
    }
}

/// Handle table resolved once at startup; immutable afterwards
#[derive(Debug, Clone)]
pub struct ActionMapper {
    action_set: ActionSetHandle,
    analog: [AnalogActionHandle; 5],
    gamepad: [DigitalActionHandle; 18],
    mouse: [DigitalActionHandle; 2],
}

impl ActionMapper {
    /// Resolves the action set and every declared action, in declaration order.
    ///
    /// Any name the provider does not know is a contract violation and aborts startup.
    pub fn resolve(provider: &dyn InputProvider, set_name: &str) -> Result<Self, MappingError> {
        info!("Resolving action handles for action set '{}'", set_name);

        let action_set = provider
            .action_set_handle(set_name)
            .ok_or_else(|| MappingError::UnresolvedActionSet(set_name.to_string()))?;

        let analog = resolve_all(AnalogAction::ALL, |action| {
            provider
                .analog_action_handle(action.name())
                .ok_or(MappingError::UnresolvedAnalogAction(action.name()))
        })?;
        let gamepad = resolve_all(GamepadButton::ALL, |button| {
            provider
                .digital_action_handle(button.name())
                .ok_or(MappingError::UnresolvedDigitalAction(button.name()))
        })?;
        let mouse = resolve_all(MouseButton::ALL, |button| {
            provider
                .digital_action_handle(button.name())
                .ok_or(MappingError::UnresolvedDigitalAction(button.name()))
        })?;

        debug!(
            "Resolved {} analog and {} digital actions",
            analog.len(),
            gamepad.len() + mouse.len()
        );

        Ok(Self {
            action_set,
            analog,
            gamepad,
            mouse,
        })
    }

    pub fn action_set(&self) -> ActionSetHandle {
        self.action_set
    }

    pub fn analog(&self, action: AnalogAction) -> AnalogActionHandle {
        self.analog[action.index()]
    }

    pub fn gamepad(&self, button: GamepadButton) -> DigitalActionHandle {
        self.gamepad[button.index()]
    }

    pub fn mouse(&self, button: MouseButton) -> DigitalActionHandle {
        self.mouse[button.index()]
    }
}

fn resolve_all<A: Copy, H: Copy + Default, const N: usize>(
    actions: [A; N],
    mut resolve: impl FnMut(A) -> Result<H, MappingError>,
) -> Result<[H; N], MappingError> {
    let mut handles = [H::default(); N];
    for (slot, action) in handles.iter_mut().zip(actions) {
        *slot = resolve(action)?;
    }
    Ok(handles)
}

/// One tick's worth of decoded action data, indexed by action position
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ActionFrame {
    pub analog: [AnalogData; 5],
    pub gamepad: [bool; 18],
    pub mouse: [bool; 2],
}

impl ActionFrame {
    pub fn analog(&self, action: AnalogAction) -> AnalogData {
        self.analog[action.index()]
    }

    pub fn gamepad(&self, button: GamepadButton) -> bool {
        self.gamepad[button.index()]
    }

    pub fn mouse(&self, button: MouseButton) -> bool {
        self.mouse[button.index()]
    }
}
