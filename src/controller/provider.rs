//! Input-capability provider interface
//!
//! The poller only talks to controllers through [`InputProvider`]. Handles are opaque
//! values issued by the provider; a `None` from any data call is a transient failure the
//! poller simply retries next tick.

use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ControllerHandle(pub u64);

impl fmt::Display for ControllerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "controller#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ActionSetHandle(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct AnalogActionHandle(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct DigitalActionHandle(pub u64);

/// Decoded analog action, each component in `[-1.0, 1.0]`
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct AnalogData {
    pub x: f32,
    pub y: f32,
}

impl AnalogData {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("Failed to initialize input provider: {0}")]
    InitializationError(String),
}

pub trait InputProvider {
    /// Advances the provider by one tick; called before any data read of that tick
    fn run_frame(&mut self);

    fn connected_controllers(&mut self) -> Vec<ControllerHandle>;

    fn action_set_handle(&self, name: &str) -> Option<ActionSetHandle>;

    /// Activation is scoped per controller, not global
    fn activate_action_set(&mut self, controller: ControllerHandle, set: ActionSetHandle);

    fn analog_action_handle(&self, name: &str) -> Option<AnalogActionHandle>;

    fn analog_action_data(
        &self,
        controller: ControllerHandle,
        action: AnalogActionHandle,
    ) -> Option<AnalogData>;

    fn digital_action_handle(&self, name: &str) -> Option<DigitalActionHandle>;

    fn digital_action_data(
        &self,
        controller: ControllerHandle,
        action: DigitalActionHandle,
    ) -> Option<bool>;
}

#[cfg(test)]
pub mod testing {
    //! Scripted provider shared by the controller and mapping tests

    use super::*;
    use crate::mapping::actions::{AnalogAction, GamepadButton, MouseButton, ACTION_SET_NAME};
    use std::collections::{HashMap, HashSet};
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Default)]
    pub struct ScriptState {
        pub controllers: Vec<ControllerHandle>,
        pub analog: HashMap<AnalogActionHandle, AnalogData>,
        pub digital: HashMap<DigitalActionHandle, bool>,
        /// Every data read fails, as when the primary controller vanished
        pub failing: bool,
        pub failing_analog: HashSet<AnalogActionHandle>,
        pub activations: Vec<(ControllerHandle, ActionSetHandle)>,
        pub frames: usize,
        pub controller_queries: usize,
    }

    /// Provider whose state is driven by the test through a shared [`ScriptState`]
    #[derive(Clone)]
    pub struct ScriptedProvider {
        state: Arc<Mutex<ScriptState>>,
        missing: HashSet<&'static str>,
    }

    impl ScriptedProvider {
        pub fn new() -> Self {
            Self {
                state: Arc::new(Mutex::new(ScriptState::default())),
                missing: HashSet::new(),
            }
        }

        pub fn without_action(mut self, name: &'static str) -> Self {
            self.missing.insert(name);
            self
        }

        pub fn state(&self) -> std::sync::MutexGuard<'_, ScriptState> {
            self.state.lock().unwrap()
        }

        pub fn set_handle(&self) -> ActionSetHandle {
            ActionSetHandle(7)
        }

        pub fn analog_handle(&self, action: AnalogAction) -> AnalogActionHandle {
            AnalogActionHandle(100 + action.index() as u64)
        }

        pub fn gamepad_handle(&self, button: GamepadButton) -> DigitalActionHandle {
            DigitalActionHandle(200 + button.index() as u64)
        }

        pub fn mouse_handle(&self, button: MouseButton) -> DigitalActionHandle {
            DigitalActionHandle(300 + button.index() as u64)
        }

        pub fn set_analog(&self, action: AnalogAction, x: f32, y: f32) {
            let handle = self.analog_handle(action);
            self.state().analog.insert(handle, AnalogData::new(x, y));
        }

        pub fn set_gamepad(&self, button: GamepadButton, pressed: bool) {
            let handle = self.gamepad_handle(button);
            self.state().digital.insert(handle, pressed);
        }

        pub fn set_mouse(&self, button: MouseButton, pressed: bool) {
            let handle = self.mouse_handle(button);
            self.state().digital.insert(handle, pressed);
        }

        pub fn set_controllers(&self, controllers: &[u64]) {
            self.state().controllers = controllers.iter().copied().map(ControllerHandle).collect();
        }

        fn readable(&self, state: &ScriptState, controller: ControllerHandle) -> bool {
            !state.failing && state.controllers.contains(&controller)
        }
    }

    impl InputProvider for ScriptedProvider {
        fn run_frame(&mut self) {
            self.state().frames += 1;
        }

        fn connected_controllers(&mut self) -> Vec<ControllerHandle> {
            let mut state = self.state();
            state.controller_queries += 1;
            state.controllers.clone()
        }

        fn action_set_handle(&self, name: &str) -> Option<ActionSetHandle> {
            (name == ACTION_SET_NAME).then(|| self.set_handle())
        }

        fn activate_action_set(&mut self, controller: ControllerHandle, set: ActionSetHandle) {
            self.state().activations.push((controller, set));
        }

        fn analog_action_handle(&self, name: &str) -> Option<AnalogActionHandle> {
            if self.missing.contains(name) {
                return None;
            }
            AnalogAction::ALL
                .into_iter()
                .find(|action| action.name() == name)
                .map(|action| self.analog_handle(action))
        }

        fn analog_action_data(
            &self,
            controller: ControllerHandle,
            action: AnalogActionHandle,
        ) -> Option<AnalogData> {
            let state = self.state();
            if !self.readable(&state, controller) || state.failing_analog.contains(&action) {
                return None;
            }
            Some(state.analog.get(&action).copied().unwrap_or_default())
        }

        fn digital_action_handle(&self, name: &str) -> Option<DigitalActionHandle> {
            if self.missing.contains(name) {
                return None;
            }
            let gamepad = GamepadButton::ALL
                .into_iter()
                .find(|button| button.name() == name)
                .map(|button| self.gamepad_handle(button));
            gamepad.or_else(|| {
                MouseButton::ALL
                    .into_iter()
                    .find(|button| button.name() == name)
                    .map(|button| self.mouse_handle(button))
            })
        }

        fn digital_action_data(
            &self,
            controller: ControllerHandle,
            action: DigitalActionHandle,
        ) -> Option<bool> {
            let state = self.state();
            if !self.readable(&state, controller) {
                return None;
            }
            Some(state.digital.get(&action).copied().unwrap_or(false))
        }
    }
}
