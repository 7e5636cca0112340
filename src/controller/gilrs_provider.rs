use gilrs::{Axis, Button, Event, EventType, Gamepad, Gilrs};
use std::collections::HashMap;
use tracing::{debug, error, info, warn};

use crate::config::{ActionSetConfig, ActionsConfig, AnalogBinding, DigitalBinding, Side};
use crate::controller::provider::{
    ActionSetHandle, AnalogActionHandle, AnalogData, ControllerHandle, DigitalActionHandle,
    InputProvider, ProviderError,
};

/// Action sets declared in the config, flattened into handle-indexed tables.
///
/// Handles are positions in the union of all declared names, so the same action name
/// resolves to the same handle no matter which set is active on a controller.
#[derive(Debug, Default)]
pub struct BindingTable {
    set_names: Vec<String>,
    analog_names: Vec<String>,
    digital_names: Vec<String>,
    analog: Vec<HashMap<AnalogActionHandle, AnalogBinding>>,
    digital: Vec<HashMap<DigitalActionHandle, DigitalBinding>>,
    active: HashMap<ControllerHandle, ActionSetHandle>,
}

impl BindingTable {
    pub fn new(sets: &[ActionSetConfig]) -> Self {
        let mut table = Self::default();
        for set in sets {
            let mut analog = HashMap::new();
            for (name, binding) in &set.analog {
                let handle = AnalogActionHandle(intern(&mut table.analog_names, name));
                analog.insert(handle, *binding);
            }
            let mut digital = HashMap::new();
            for (name, binding) in &set.digital {
                let handle = DigitalActionHandle(intern(&mut table.digital_names, name));
                digital.insert(handle, *binding);
            }
            table.set_names.push(set.name.clone());
            table.analog.push(analog);
            table.digital.push(digital);
        }
        table
    }

    pub fn set_handle(&self, name: &str) -> Option<ActionSetHandle> {
        position(&self.set_names, name).map(ActionSetHandle)
    }

    pub fn analog_handle(&self, name: &str) -> Option<AnalogActionHandle> {
        position(&self.analog_names, name).map(AnalogActionHandle)
    }

    pub fn digital_handle(&self, name: &str) -> Option<DigitalActionHandle> {
        position(&self.digital_names, name).map(DigitalActionHandle)
    }

    pub fn activate(&mut self, controller: ControllerHandle, set: ActionSetHandle) {
        if set.0 as usize >= self.set_names.len() {
            warn!("Ignoring activation of unknown action set {:?}", set);
            return;
        }
        if self.active.insert(controller, set) != Some(set) {
            info!(
                "Activated action set '{}' on {}",
                self.set_names[set.0 as usize], controller
            );
        }
    }

    /// Binding of an analog action under the controller's active set
    pub fn analog_binding(
        &self,
        controller: ControllerHandle,
        action: AnalogActionHandle,
    ) -> Option<AnalogBinding> {
        let set = self.active.get(&controller)?;
        self.analog.get(set.0 as usize)?.get(&action).copied()
    }

    pub fn digital_binding(
        &self,
        controller: ControllerHandle,
        action: DigitalActionHandle,
    ) -> Option<DigitalBinding> {
        let set = self.active.get(&controller)?;
        self.digital.get(set.0 as usize)?.get(&action).copied()
    }

    /// Controllers that went away lose their activation
    pub fn retain_controllers(&mut self, connected: &[ControllerHandle]) {
        self.active.retain(|controller, _| connected.contains(controller));
    }
}

fn intern(names: &mut Vec<String>, name: &str) -> u64 {
    match position(names, name) {
        Some(index) => index,
        None => {
            names.push(name.to_string());
            (names.len() - 1) as u64
        }
    }
}

fn position(names: &[String], name: &str) -> Option<u64> {
    names.iter().position(|n| n == name).map(|i| i as u64)
}

/// Input provider reading gamepads through gilrs.
///
/// Gilrs is not `Send`, so this must be created on the thread that polls it.
pub struct GilrsProvider {
    gilrs: Gilrs,
    table: BindingTable,
    deadzone: f32,
}

impl GilrsProvider {
    pub fn new(actions: &ActionsConfig) -> Result<Self, ProviderError> {
        info!("Initializing gilrs controller interface");
        let gilrs = match Gilrs::new() {
            Ok(g) => {
                info!("Successfully initialized gilrs");
                g
            }
            Err(e) => {
                error!("Failed to initialize gilrs: {}", e);
                return Err(ProviderError::InitializationError(e.to_string()));
            }
        };

        for (id, gamepad) in gilrs.gamepads() {
            info!("  ID: {}, Name: {}, UUID: {:?}", id, gamepad.name(), gamepad.uuid());
        }

        Ok(Self {
            gilrs,
            table: BindingTable::new(&actions.sets),
            deadzone: actions.stick_deadzone,
        })
    }

    fn gamepad(&self, controller: ControllerHandle) -> Option<Gamepad<'_>> {
        self.gilrs
            .gamepads()
            .find(|(id, gamepad)| {
                usize::from(*id) as u64 == controller.0 && gamepad.is_connected()
            })
            .map(|(_, gamepad)| gamepad)
    }

    fn stick(&self, gamepad: &Gamepad<'_>, side: Side) -> AnalogData {
        let (x_axis, y_axis) = match side {
            Side::Left => (Axis::LeftStickX, Axis::LeftStickY),
            Side::Right => (Axis::RightStickX, Axis::RightStickY),
        };
        AnalogData::new(
            apply_deadzone(gamepad.value(x_axis), self.deadzone),
            apply_deadzone(gamepad.value(y_axis), self.deadzone),
        )
    }

    fn trigger(&self, gamepad: &Gamepad<'_>, side: Side) -> AnalogData {
        let (button, axis) = match side {
            Side::Left => (Button::LeftTrigger2, Axis::LeftZ),
            Side::Right => (Button::RightTrigger2, Axis::RightZ),
        };
        let value = gamepad
            .button_data(button)
            .map(|data| data.value())
            .unwrap_or_else(|| gamepad.value(axis).max(0.0));
        AnalogData::new(value.clamp(0.0, 1.0), 0.0)
    }
}

impl InputProvider for GilrsProvider {
    fn run_frame(&mut self) {
        while let Some(Event { id, event, .. }) = self.gilrs.next_event() {
            match event {
                EventType::Connected => info!("Controller connected event detected: {}", id),
                EventType::Disconnected => warn!("Controller disconnected event detected: {}", id),
                _ => {}
            }
        }
        self.gilrs.inc();
    }

    fn connected_controllers(&mut self) -> Vec<ControllerHandle> {
        let controllers: Vec<ControllerHandle> = self
            .gilrs
            .gamepads()
            .filter(|(_, gamepad)| gamepad.is_connected())
            .map(|(id, _)| ControllerHandle(usize::from(id) as u64))
            .collect();
        self.table.retain_controllers(&controllers);
        controllers
    }

    fn action_set_handle(&self, name: &str) -> Option<ActionSetHandle> {
        self.table.set_handle(name)
    }

    fn activate_action_set(&mut self, controller: ControllerHandle, set: ActionSetHandle) {
        self.table.activate(controller, set);
    }

    fn analog_action_handle(&self, name: &str) -> Option<AnalogActionHandle> {
        self.table.analog_handle(name)
    }

    fn analog_action_data(
        &self,
        controller: ControllerHandle,
        action: AnalogActionHandle,
    ) -> Option<AnalogData> {
        let binding = self.table.analog_binding(controller, action)?;
        let gamepad = self.gamepad(controller)?;
        Some(match binding {
            AnalogBinding::Stick(side) => self.stick(&gamepad, side),
            AnalogBinding::Trigger(side) => self.trigger(&gamepad, side),
            AnalogBinding::Unbound => AnalogData::default(),
        })
    }

    fn digital_action_handle(&self, name: &str) -> Option<DigitalActionHandle> {
        self.table.digital_handle(name)
    }

    fn digital_action_data(
        &self,
        controller: ControllerHandle,
        action: DigitalActionHandle,
    ) -> Option<bool> {
        let binding = self.table.digital_binding(controller, action)?;
        let gamepad = self.gamepad(controller)?;
        match gilrs_button(binding) {
            Some(button) => Some(gamepad.is_pressed(button)),
            None => {
                debug!("Unbound digital action {:?}", action);
                Some(false)
            }
        }
    }
}

fn gilrs_button(binding: DigitalBinding) -> Option<Button> {
    let button = match binding {
        DigitalBinding::South => Button::South,
        DigitalBinding::East => Button::East,
        DigitalBinding::North => Button::North,
        DigitalBinding::West => Button::West,
        DigitalBinding::C => Button::C,
        DigitalBinding::Z => Button::Z,
        DigitalBinding::LeftTrigger => Button::LeftTrigger,
        DigitalBinding::LeftTrigger2 => Button::LeftTrigger2,
        DigitalBinding::RightTrigger => Button::RightTrigger,
        DigitalBinding::RightTrigger2 => Button::RightTrigger2,
        DigitalBinding::Select => Button::Select,
        DigitalBinding::Start => Button::Start,
        DigitalBinding::Mode => Button::Mode,
        DigitalBinding::LeftThumb => Button::LeftThumb,
        DigitalBinding::RightThumb => Button::RightThumb,
        DigitalBinding::DPadUp => Button::DPadUp,
        DigitalBinding::DPadDown => Button::DPadDown,
        DigitalBinding::DPadLeft => Button::DPadLeft,
        DigitalBinding::DPadRight => Button::DPadRight,
        DigitalBinding::Unbound => return None,
    };
    Some(button)
}

// Rescales the remaining range so output still reaches ±1.0
fn apply_deadzone(value: f32, deadzone: f32) -> f32 {
    if value.abs() < deadzone {
        0.0
    } else {
        let sign = if value < 0.0 { -1.0 } else { 1.0 };
        sign * (value.abs() - deadzone) / (1.0 - deadzone)
    }
}
