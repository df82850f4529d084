//! Desktop actions a gesture can trigger.
//!
//! Actions are resolved once, when a mapping is loaded or updated, from the
//! identifier strings clients use: a preset name such as `"Volume Up"` or a
//! keyboard shortcut such as `"keyboard:cmd+shift+a"`.

pub mod store;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub use store::{GestureConfigEntry, GestureConfigStore, StoreError};

/// Prefix marking a keyboard-shortcut identifier.
pub const KEYBOARD_PREFIX: &str = "keyboard:";

/// Built-in media and navigation actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Preset {
    VolumeUp,
    VolumeDown,
    VolumeMute,
    PlayPause,
    NextTrack,
    PreviousTrack,
    Screenshot,
    ScrollUp,
    ScrollDown,
    NextTab,
    PreviousTab,
}

impl Preset {
    pub const ALL: [Preset; 11] = [
        Preset::VolumeUp,
        Preset::VolumeDown,
        Preset::VolumeMute,
        Preset::PlayPause,
        Preset::NextTrack,
        Preset::PreviousTrack,
        Preset::Screenshot,
        Preset::ScrollUp,
        Preset::ScrollDown,
        Preset::NextTab,
        Preset::PreviousTab,
    ];

    /// Display name, as stored in configuration.
    pub fn name(&self) -> &'static str {
        match self {
            Preset::VolumeUp => "Volume Up",
            Preset::VolumeDown => "Volume Down",
            Preset::VolumeMute => "Volume Mute",
            Preset::PlayPause => "Play/Pause",
            Preset::NextTrack => "Next Track",
            Preset::PreviousTrack => "Previous Track",
            Preset::Screenshot => "Screenshot",
            Preset::ScrollUp => "Scroll Up",
            Preset::ScrollDown => "Scroll Down",
            Preset::NextTab => "Next Tab",
            Preset::PreviousTab => "Previous Tab",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.name() == name.trim())
    }
}

/// Keyboard modifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Modifier {
    Command,
    Shift,
    Option,
    Control,
}

impl Modifier {
    fn parse(token: &str) -> Option<Self> {
        match token {
            "cmd" | "command" => Some(Modifier::Command),
            "shift" => Some(Modifier::Shift),
            "alt" | "option" => Some(Modifier::Option),
            "ctrl" | "control" => Some(Modifier::Control),
            _ => None,
        }
    }

    pub fn token(&self) -> &'static str {
        match self {
            Modifier::Command => "cmd",
            Modifier::Shift => "shift",
            Modifier::Option => "alt",
            Modifier::Control => "ctrl",
        }
    }
}

/// A parsed keyboard shortcut: zero or more modifiers plus one key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyCombo {
    pub modifiers: Vec<Modifier>,
    /// Lower-case key name (`"a"`, `"space"`, `"f11"`, ...)
    pub key: String,
}

impl FromStr for KeyCombo {
    type Err = ActionParseError;

    fn from_str(combo: &str) -> Result<Self, Self::Err> {
        let mut modifiers = Vec::new();
        let mut key = None;

        for part in combo.split('+').map(|p| p.trim().to_lowercase()) {
            if part.is_empty() {
                continue;
            }
            match Modifier::parse(&part) {
                Some(m) if !modifiers.contains(&m) => modifiers.push(m),
                Some(_) => {}
                None if key.is_none() => key = Some(part),
                None => return Err(ActionParseError::MultipleKeys(combo.to_string())),
            }
        }

        let key = key.ok_or_else(|| ActionParseError::MissingKey(combo.to_string()))?;
        Ok(Self { modifiers, key })
    }
}

impl fmt::Display for KeyCombo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for m in &self.modifiers {
            write!(f, "{}+", m.token())?;
        }
        write!(f, "{}", self.key)
    }
}

/// A resolved action.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Action {
    Preset(Preset),
    KeyCombo(KeyCombo),
}

impl Action {
    /// Resolve a stored `(action_type, action, keys)` triple.
    pub fn from_parts(action_type: &str, action: &str, keys: &str) -> Result<Self, ActionParseError> {
        match action_type {
            "keyboard" => {
                let combo = if keys.trim().is_empty() { action } else { keys };
                Ok(Action::KeyCombo(combo.parse()?))
            }
            "preset" => action.parse(),
            other => Err(ActionParseError::UnknownType(other.to_string())),
        }
    }
}

impl FromStr for Action {
    type Err = ActionParseError;

    fn from_str(identifier: &str) -> Result<Self, Self::Err> {
        if let Some(keys) = identifier.strip_prefix(KEYBOARD_PREFIX) {
            return Ok(Action::KeyCombo(keys.parse()?));
        }
        Preset::from_name(identifier)
            .map(Action::Preset)
            .ok_or_else(|| ActionParseError::UnknownPreset(identifier.to_string()))
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Preset(p) => f.write_str(p.name()),
            Action::KeyCombo(combo) => write!(f, "{KEYBOARD_PREFIX}{combo}"),
        }
    }
}

/// Errors resolving an action identifier.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ActionParseError {
    #[error("Unknown preset action '{0}'")]
    UnknownPreset(String),
    #[error("Unknown action type '{0}'")]
    UnknownType(String),
    #[error("No key found in shortcut '{0}'")]
    MissingKey(String),
    #[error("More than one non-modifier key in shortcut '{0}'")]
    MultipleKeys(String),
}

/// Performs actions on the host desktop.
pub trait ActionExecutor: Send + Sync {
    /// Run the action. Returns `true` on success; failures are logged by the
    /// implementation.
    fn execute(&self, action: &Action) -> bool;
}
