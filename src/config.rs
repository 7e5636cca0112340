//! On-disk configuration
//!
//! Loaded once at startup from a TOML file. Every section falls back to its defaults, so
//! a partial file (or none at all) still yields a complete [`Config`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::mapping::actions::{AnalogAction, GamepadButton, MouseButton, ACTION_SET_NAME};

/// Environment variable overriding the config file location
pub const CONFIG_ENV: &str = "GADGET_DECK_CONFIG";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Failed to write config {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Plain tracing level name, overridden by RUST_LOG
    pub log_level: String,
    /// Append logs to this file instead of stdout
    pub log_file: Option<PathBuf>,
    pub gadget: GadgetConfig,
    pub poller: PollerConfig,
    pub actions: ActionsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_file: None,
            gadget: GadgetConfig::default(),
            poller: PollerConfig::default(),
            actions: ActionsConfig::default(),
        }
    }
}

/// Where the USB gadget lives and how its reports are scaled
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct GadgetConfig {
    pub name: String,
    pub configfs_root: PathBuf,
    pub sysfs_char_root: PathBuf,
    pub dev_root: PathBuf,
    /// Mouse counts emitted per unit of analog deflection per tick
    pub mouse_counts_per_unit: f32,
}

impl Default for GadgetConfig {
    fn default() -> Self {
        Self {
            name: "gadget-deck".to_string(),
            configfs_root: PathBuf::from("/sys/kernel/config/usb_gadget"),
            sysfs_char_root: PathBuf::from("/sys/dev/char"),
            dev_root: PathBuf::from("/dev"),
            mouse_counts_per_unit: 12.0,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct PollerConfig {
    /// Minimum duration of one tick
    pub tick_interval_ms: u64,
    /// How often a connected controller list is re-queried
    pub revalidate_interval_ms: u64,
    /// Capacity of the on-screen keyboard event queue
    pub key_queue_depth: usize,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 4,
            revalidate_interval_ms: 500,
            key_queue_depth: 64,
        }
    }
}

impl PollerConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn revalidate_interval(&self) -> Duration {
        Duration::from_millis(self.revalidate_interval_ms)
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct ActionsConfig {
    /// The single action set activated on every controller
    pub action_set: String,
    /// Stick deflection below this magnitude reads as centered
    pub stick_deadzone: f32,
    pub sets: Vec<ActionSetConfig>,
}

impl Default for ActionsConfig {
    fn default() -> Self {
        Self {
            action_set: ACTION_SET_NAME.to_string(),
            stick_deadzone: 0.05,
            sets: vec![ActionSetConfig::default_bindings()],
        }
    }
}

impl ActionsConfig {
    /// A deadzone of 1.0 or more leaves no stick range to rescale
    pub const MAX_STICK_DEADZONE: f32 = 0.95;

    fn clamp_deadzone(&mut self) {
        let clamped = if self.stick_deadzone.is_nan() {
            0.0
        } else {
            self.stick_deadzone.clamp(0.0, Self::MAX_STICK_DEADZONE)
        };
        if clamped != self.stick_deadzone {
            warn!(
                "stick_deadzone {} out of range, using {}",
                self.stick_deadzone, clamped
            );
            self.stick_deadzone = clamped;
        }
    }
}

/// Bindings of action names to physical gamepad inputs
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Default)]
pub struct ActionSetConfig {
    pub name: String,
    #[serde(default)]
    pub analog: BTreeMap<String, AnalogBinding>,
    #[serde(default)]
    pub digital: BTreeMap<String, DigitalBinding>,
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Left,
    Right,
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AnalogBinding {
    Stick(Side),
    Trigger(Side),
    Unbound,
}

/// Physical button an action reads from. Names follow gilrs' positional layout.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum DigitalBinding {
    South,
    East,
    North,
    West,
    C,
    Z,
    LeftTrigger,
    LeftTrigger2,
    RightTrigger,
    RightTrigger2,
    Select,
    Start,
    Mode,
    LeftThumb,
    RightThumb,
    DPadUp,
    DPadDown,
    DPadLeft,
    DPadRight,
    Unbound,
}

impl ActionSetConfig {
    /// Bindings for a standard gamepad; back paddles and mouse inputs start unbound
    pub fn default_bindings() -> Self {
        let analog = AnalogAction::ALL
            .iter()
            .map(|action| {
                let binding = match action {
                    AnalogAction::JoyLeft => AnalogBinding::Stick(Side::Left),
                    AnalogAction::JoyRight => AnalogBinding::Stick(Side::Right),
                    AnalogAction::TrigLeft => AnalogBinding::Trigger(Side::Left),
                    AnalogAction::TrigRight => AnalogBinding::Trigger(Side::Right),
                    AnalogAction::Mouse => AnalogBinding::Unbound,
                };
                (action.name().to_string(), binding)
            })
            .collect();

        let mut digital: BTreeMap<String, DigitalBinding> = GamepadButton::ALL
            .iter()
            .map(|button| {
                let binding = match button {
                    GamepadButton::A => DigitalBinding::South,
                    GamepadButton::B => DigitalBinding::East,
                    GamepadButton::X => DigitalBinding::West,
                    GamepadButton::Y => DigitalBinding::North,
                    GamepadButton::Up => DigitalBinding::DPadUp,
                    GamepadButton::Down => DigitalBinding::DPadDown,
                    GamepadButton::Left => DigitalBinding::DPadLeft,
                    GamepadButton::Right => DigitalBinding::DPadRight,
                    GamepadButton::BumpLeft => DigitalBinding::LeftTrigger,
                    GamepadButton::BumpRight => DigitalBinding::RightTrigger,
                    GamepadButton::Menu => DigitalBinding::Select,
                    GamepadButton::Start => DigitalBinding::Start,
                    GamepadButton::JoyPressLeft => DigitalBinding::LeftThumb,
                    GamepadButton::JoyPressRight => DigitalBinding::RightThumb,
                    GamepadButton::BackLeftTop
                    | GamepadButton::BackLeftBottom
                    | GamepadButton::BackRightTop
                    | GamepadButton::BackRightBottom => DigitalBinding::Unbound,
                };
                (button.name().to_string(), binding)
            })
            .collect();
        for button in MouseButton::ALL {
            digital.insert(button.name().to_string(), DigitalBinding::Unbound);
        }

        Self {
            name: ACTION_SET_NAME.to_string(),
            analog,
            digital,
        }
    }
}

impl Config {
    /// Config file location: `$GADGET_DECK_CONFIG`, else the user config directory
    pub fn default_path() -> Option<PathBuf> {
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            return Some(PathBuf::from(path));
        }
        dirs::config_dir().map(|dir| dir.join("gadget-deck").join("config.toml"))
    }

    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let content =
            tokio::fs::read_to_string(path)
                .await
                .map_err(|source| ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })?;
        let mut config: Config = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.actions.clamp_deadzone();
        Ok(config)
    }

    pub async fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| ConfigError::Write {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }
        tokio::fs::write(path, content)
            .await
            .map_err(|source| ConfigError::Write {
                path: path.to_path_buf(),
                source,
            })
    }

    /// Loads the config, writing the defaults first if the file does not exist yet
    pub async fn load_or_create(path: &Path) -> Result<Self, ConfigError> {
        let exists = tokio::fs::try_exists(path).await.unwrap_or(false);
        if !exists {
            info!("No config at {}, writing defaults", path.display());
            let config = Config::default();
            if let Err(e) = config.save(path).await {
                // A read-only config dir must not keep the bridge from starting
                warn!("{}", e);
            }
            return Ok(config);
        }

        debug!("Loading config from {}", path.display());
        Self::load(path).await
    }

    /// The configured active action set, if it is declared
    pub fn active_set(&self) -> Option<&ActionSetConfig> {
        self.actions
            .sets
            .iter()
            .find(|set| set.name == self.actions.action_set)
    }
}
