//! Driver settings
//!
//! A flat, versionless TOML record. Every key is optional; a missing key keeps
//! the built-in default. Key names follow the preference names the pad's
//! control panel has always written.

use crate::axis::StickPolicy;
use color_eyre::{eyre::eyre, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const CONFIG_DIR: &str = ".config/padlink";
const SETTINGS_FILE: &str = "settings.toml";

/// Number of entries in the button remap table, one per report bit.
pub const REMAP_TABLE_LEN: usize = 16;

/// Report bit that no named binding covers.
const RESERVED_BIT: usize = 11;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Binding {name} targets bit {target}, valid range is 0..16")]
    BindingOutOfRange { name: &'static str, target: u8 },

    #[error("Unknown rumble type {0}")]
    UnknownRumbleType(u8),
}

/// How rumble commands drive the motors of the newer pad generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RumbleMode {
    /// Main motors only.
    #[default]
    Default,
    Disabled,
    /// Trigger motors only.
    Triggers,
    Both,
}

impl TryFrom<u8> for RumbleMode {
    type Error = ConfigError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(RumbleMode::Default),
            1 => Ok(RumbleMode::Disabled),
            2 => Ok(RumbleMode::Triggers),
            3 => Ok(RumbleMode::Both),
            other => Err(ConfigError::UnknownRumbleType(other)),
        }
    }
}

/// Target bit for each named button.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct ButtonBindings {
    #[serde(rename = "BindingUp")]
    pub up: u8,
    #[serde(rename = "BindingDown")]
    pub down: u8,
    #[serde(rename = "BindingLeft")]
    pub left: u8,
    #[serde(rename = "BindingRight")]
    pub right: u8,
    #[serde(rename = "BindingStart")]
    pub start: u8,
    #[serde(rename = "BindingBack")]
    pub back: u8,
    #[serde(rename = "BindingLSC")]
    pub left_stick_click: u8,
    #[serde(rename = "BindingRSC")]
    pub right_stick_click: u8,
    #[serde(rename = "BindingLB")]
    pub left_bumper: u8,
    #[serde(rename = "BindingRB")]
    pub right_bumper: u8,
    #[serde(rename = "BindingGuide")]
    pub guide: u8,
    #[serde(rename = "BindingA")]
    pub a: u8,
    #[serde(rename = "BindingB")]
    pub b: u8,
    #[serde(rename = "BindingX")]
    pub x: u8,
    #[serde(rename = "BindingY")]
    pub y: u8,
}

impl Default for ButtonBindings {
    fn default() -> Self {
        Self {
            up: 0,
            down: 1,
            left: 2,
            right: 3,
            start: 4,
            back: 5,
            left_stick_click: 6,
            right_stick_click: 7,
            left_bumper: 8,
            right_bumper: 9,
            guide: 10,
            a: 12,
            b: 13,
            x: 14,
            y: 15,
        }
    }
}

impl ButtonBindings {
    /// (name, source bit, target bit) for every named binding.
    pub fn entries(&self) -> [(&'static str, usize, u8); 15] {
        [
            ("BindingUp", 0, self.up),
            ("BindingDown", 1, self.down),
            ("BindingLeft", 2, self.left),
            ("BindingRight", 3, self.right),
            ("BindingStart", 4, self.start),
            ("BindingBack", 5, self.back),
            ("BindingLSC", 6, self.left_stick_click),
            ("BindingRSC", 7, self.right_stick_click),
            ("BindingLB", 8, self.left_bumper),
            ("BindingRB", 9, self.right_bumper),
            ("BindingGuide", 10, self.guide),
            ("BindingA", 12, self.a),
            ("BindingB", 13, self.b),
            ("BindingX", 14, self.x),
            ("BindingY", 15, self.y),
        ]
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    #[serde(rename = "InvertLeftX")]
    pub invert_left_x: bool,
    #[serde(rename = "InvertLeftY")]
    pub invert_left_y: bool,
    #[serde(rename = "InvertRightX")]
    pub invert_right_x: bool,
    #[serde(rename = "InvertRightY")]
    pub invert_right_y: bool,

    #[serde(rename = "DeadzoneLeft")]
    pub deadzone_left: u16,
    #[serde(rename = "DeadzoneRight")]
    pub deadzone_right: u16,

    /// Linked dead-zone over both axes of the left stick.
    #[serde(rename = "RelativeLeft")]
    pub linked_left: bool,
    #[serde(rename = "RelativeRight")]
    pub linked_right: bool,

    /// Rescale the left stick outside its dead-zone.
    #[serde(rename = "DeadOffLeft")]
    pub normalize_left: bool,
    #[serde(rename = "DeadOffRight")]
    pub normalize_right: bool,

    #[serde(rename = "RumbleType")]
    pub rumble_type: u8,

    #[serde(flatten)]
    pub bindings: ButtonBindings,

    #[serde(rename = "SwapSticks")]
    pub swap_sticks: bool,

    /// Present the newer pad generation as a classic pad.
    #[serde(rename = "Pretend360")]
    pub pretend_classic: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            invert_left_x: false,
            invert_left_y: false,
            invert_right_x: false,
            invert_right_y: false,
            deadzone_left: 0,
            deadzone_right: 0,
            linked_left: false,
            linked_right: false,
            normalize_left: false,
            normalize_right: false,
            rumble_type: 0,
            bindings: ButtonBindings::default(),
            swap_sticks: false,
            pretend_classic: false,
        }
    }
}

impl Settings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, _, target) in self.bindings.entries() {
            if usize::from(target) >= REMAP_TABLE_LEN {
                return Err(ConfigError::BindingOutOfRange { name, target });
            }
        }
        RumbleMode::try_from(self.rumble_type)?;
        Ok(())
    }

    /// Target bit for every source bit. The reserved bit maps onto itself.
    pub fn remap_table(&self) -> [u8; REMAP_TABLE_LEN] {
        let mut table = [0u8; REMAP_TABLE_LEN];
        for (bit, slot) in table.iter_mut().enumerate() {
            *slot = bit as u8;
        }
        for (_, source, target) in self.bindings.entries() {
            table[source] = target;
        }
        table[RESERVED_BIT] = RESERVED_BIT as u8;
        table
    }

    /// Whether any named binding differs from its default.
    pub fn remap_active(&self) -> bool {
        self.bindings != ButtonBindings::default()
    }

    /// Unknown values fall back to the default mode. `validate` rejects them
    /// before they get here.
    pub fn rumble_mode(&self) -> RumbleMode {
        RumbleMode::try_from(self.rumble_type).unwrap_or_default()
    }

    pub fn left_policy(&self) -> StickPolicy {
        StickPolicy {
            invert_x: self.invert_left_x,
            invert_y: self.invert_left_y,
            deadzone: self.deadzone_left,
            linked: self.linked_left,
            normalize: self.normalize_left,
        }
    }

    pub fn right_policy(&self) -> StickPolicy {
        StickPolicy {
            invert_x: self.invert_right_x,
            invert_y: self.invert_right_y,
            deadzone: self.deadzone_right,
            linked: self.linked_right,
            normalize: self.normalize_right,
        }
    }
}

/// Applies a remap table to a button word.
pub fn remap_buttons(buttons: u16, table: &[u8; REMAP_TABLE_LEN]) -> u16 {
    let mut remapped = 0u16;
    for (bit, target) in table.iter().enumerate() {
        if buttons & (1u16 << bit) != 0 {
            remapped |= 1u16 << (target % 16);
        }
    }
    remapped
}

fn get_home_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from("."))
}

/// `~/.config/padlink/settings.toml`
pub fn default_settings_path() -> PathBuf {
    let mut path = get_home_dir();
    path.push(CONFIG_DIR);
    path.push(SETTINGS_FILE);
    path
}

/// Loads settings from `path`. A missing file yields the defaults.
pub async fn load_settings(path: &Path) -> Result<Settings> {
    if !tokio::fs::try_exists(path)
        .await
        .map_err(|e| eyre!("Failed to check settings file {}: {}", path.display(), e))?
    {
        warn!(
            "Settings file {} not found, using defaults",
            path.display()
        );
        return Ok(Settings::default());
    }

    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| eyre!("Failed to read settings file {}: {}", path.display(), e))?;
    let settings: Settings = toml::from_str(&content)
        .map_err(|e| eyre!("Failed to parse settings file {}: {}", path.display(), e))?;
    settings
        .validate()
        .map_err(|e| eyre!("Invalid settings in {}: {}", path.display(), e))?;

    info!("Loaded settings from {}", path.display());
    debug!("Settings: {:?}", settings);
    Ok(settings)
}

pub async fn save_settings(path: &Path, settings: &Settings) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| eyre!("Failed to create settings directory: {}", e))?;
    }

    let content = toml::to_string_pretty(settings)
        .map_err(|e| eyre!("Failed to serialize settings: {}", e))?;
    tokio::fs::write(path, content)
        .await
        .map_err(|e| eyre!("Failed to write settings file {}: {}", path.display(), e))?;

    info!("Saved settings to {}", path.display());
    Ok(())
}
