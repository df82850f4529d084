//! Cross-platform desktop backend (Windows, Linux/X11 and other targets).
//!
//! Presets map to media and navigation keys; keyboard shortcuts are pressed
//! as chords. The cursor is driven with absolute mouse moves. When no input
//! device can be opened (e.g. a headless session) actions report failure.

use crate::actions::{Action, ActionExecutor, KeyCombo, Modifier, Preset};
use crate::core::mouse::{MouseButton, PointerBackend, PointerError};
use enigo::{Button, Coordinate, Direction, Enigo, InputError, Key, Keyboard, Mouse, Settings};
use std::sync::{Mutex, PoisonError};

/// Screen size assumed when the display cannot be queried.
const FALLBACK_SCREEN: (f64, f64) = (1920.0, 1080.0);

/// Modifiers held while one key is tapped.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Chord {
    modifiers: Vec<Key>,
    key: Key,
}

impl Chord {
    fn tap(key: Key) -> Self {
        Self {
            modifiers: Vec::new(),
            key,
        }
    }
}

fn modifier_key(modifier: Modifier) -> Key {
    match modifier {
        Modifier::Command => Key::Meta,
        Modifier::Shift => Key::Shift,
        Modifier::Option => Key::Alt,
        Modifier::Control => Key::Control,
    }
}

fn named_key(name: &str) -> Option<Key> {
    let key = match name {
        "return" | "enter" => Key::Return,
        "tab" => Key::Tab,
        "space" => Key::Space,
        "delete" | "backspace" => Key::Backspace,
        "escape" | "esc" => Key::Escape,
        "left" => Key::LeftArrow,
        "right" => Key::RightArrow,
        "up" => Key::UpArrow,
        "down" => Key::DownArrow,
        "pageup" => Key::PageUp,
        "pagedown" => Key::PageDown,
        "f1" => Key::F1,
        "f2" => Key::F2,
        "f3" => Key::F3,
        "f4" => Key::F4,
        "f5" => Key::F5,
        "f6" => Key::F6,
        "f7" => Key::F7,
        "f8" => Key::F8,
        "f9" => Key::F9,
        "f10" => Key::F10,
        "f11" => Key::F11,
        "f12" => Key::F12,
        other => {
            let mut chars = other.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Key::Unicode(c),
                _ => return None,
            }
        }
    };
    Some(key)
}

fn preset_chord(preset: Preset) -> Chord {
    match preset {
        Preset::VolumeUp => Chord::tap(Key::VolumeUp),
        Preset::VolumeDown => Chord::tap(Key::VolumeDown),
        Preset::VolumeMute => Chord::tap(Key::VolumeMute),
        Preset::PlayPause => Chord::tap(Key::MediaPlayPause),
        Preset::NextTrack => Chord::tap(Key::MediaNextTrack),
        Preset::PreviousTrack => Chord::tap(Key::MediaPrevTrack),
        Preset::Screenshot => Chord::tap(Key::PrintScr),
        Preset::ScrollUp => Chord::tap(Key::PageUp),
        Preset::ScrollDown => Chord::tap(Key::PageDown),
        Preset::NextTab => Chord {
            modifiers: vec![Key::Control],
            key: Key::Tab,
        },
        Preset::PreviousTab => Chord {
            modifiers: vec![Key::Control, Key::Shift],
            key: Key::Tab,
        },
    }
}

fn combo_chord(combo: &KeyCombo) -> Option<Chord> {
    Some(Chord {
        modifiers: combo.modifiers.iter().copied().map(modifier_key).collect(),
        key: named_key(&combo.key)?,
    })
}

fn press_chord(enigo: &mut Enigo, chord: &Chord) -> Result<(), InputError> {
    for modifier in &chord.modifiers {
        enigo.key(*modifier, Direction::Press)?;
    }
    let result = enigo.key(chord.key, Direction::Click);
    for modifier in chord.modifiers.iter().rev() {
        let _ = enigo.key(*modifier, Direction::Release);
    }
    result
}

/// Runs actions as synthesized key presses.
pub struct InputExecutor {
    // Opened on first use so a missing display only fails actions
    enigo: Mutex<Option<Enigo>>,
}

impl InputExecutor {
    pub fn new() -> Self {
        Self {
            enigo: Mutex::new(None),
        }
    }
}

impl Default for InputExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl ActionExecutor for InputExecutor {
    fn execute(&self, action: &Action) -> bool {
        let chord = match action {
            Action::Preset(preset) => preset_chord(*preset),
            Action::KeyCombo(combo) => match combo_chord(combo) {
                Some(chord) => chord,
                None => {
                    tracing::error!("No key mapping for '{}'", combo.key);
                    return false;
                }
            },
        };

        let mut guard = self.enigo.lock().unwrap_or_else(PoisonError::into_inner);
        if guard.is_none() {
            match Enigo::new(&Settings::default()) {
                Ok(enigo) => *guard = Some(enigo),
                Err(e) => {
                    tracing::error!("Cannot open input device: {:?}", e);
                    return false;
                }
            }
        }
        let Some(enigo) = guard.as_mut() else {
            return false;
        };

        match press_chord(enigo, &chord) {
            Ok(()) => true,
            Err(e) => {
                tracing::error!("Action '{}' failed: {:?}", action, e);
                false
            }
        }
    }
}

/// Cursor control through synthesized mouse events.
pub struct InputPointer {
    enigo: Option<Enigo>,
    screen: (f64, f64),
}

impl InputPointer {
    pub fn new() -> Self {
        match Enigo::new(&Settings::default()) {
            Ok(enigo) => {
                let screen = enigo
                    .main_display()
                    .map(|(w, h)| (w as f64, h as f64))
                    .unwrap_or(FALLBACK_SCREEN);
                Self {
                    enigo: Some(enigo),
                    screen,
                }
            }
            Err(e) => {
                tracing::warn!("Cannot open input device, cursor control disabled: {:?}", e);
                Self {
                    enigo: None,
                    screen: FALLBACK_SCREEN,
                }
            }
        }
    }

    fn device(&mut self) -> Result<&mut Enigo, PointerError> {
        self.enigo.as_mut().ok_or(PointerError::Unavailable)
    }
}

impl Default for InputPointer {
    fn default() -> Self {
        Self::new()
    }
}

impl PointerBackend for InputPointer {
    fn screen_size(&self) -> (f64, f64) {
        self.screen
    }

    fn move_to(&mut self, x: f64, y: f64) -> Result<(), PointerError> {
        self.device()?
            .move_mouse(x as i32, y as i32, Coordinate::Abs)
            .map_err(|e| PointerError::Command(format!("{:?}", e)))
    }

    fn click(&mut self, button: MouseButton) -> Result<(), PointerError> {
        let button = match button {
            MouseButton::Left => Button::Left,
            MouseButton::Right => Button::Right,
        };
        self.device()?
            .button(button, Direction::Click)
            .map_err(|e| PointerError::Command(format!("{:?}", e)))
    }
}
