//! macOS desktop backend.
//!
//! Actions run through `osascript` (AppleScript / System Events key codes)
//! and `screencapture`, each capped at five seconds. The cursor is driven
//! with CoreGraphics events, which requires the Accessibility permission.

use crate::actions::{Action, ActionExecutor, KeyCombo, Modifier, Preset};
use crate::core::mouse::{MouseButton, PointerBackend, PointerError};
use crate::desktop::process::run_logged;
use core_graphics::display::CGDisplay;
use core_graphics::event::{CGEvent, CGEventTapLocation, CGEventType, CGMouseButton};
use core_graphics::event_source::{CGEventSource, CGEventSourceStateID};
use core_graphics::geometry::CGPoint;
use std::process::Command;

/// macOS virtual key code for a lower-case key name.
fn keycode(key: &str) -> Option<u16> {
    let code = match key {
        "a" => 0,
        "s" => 1,
        "d" => 2,
        "f" => 3,
        "h" => 4,
        "g" => 5,
        "z" => 6,
        "x" => 7,
        "c" => 8,
        "v" => 9,
        "b" => 11,
        "q" => 12,
        "w" => 13,
        "e" => 14,
        "r" => 15,
        "y" => 16,
        "t" => 17,
        "1" => 18,
        "2" => 19,
        "3" => 20,
        "4" => 21,
        "6" => 22,
        "5" => 23,
        "=" => 24,
        "9" => 25,
        "7" => 26,
        "-" => 27,
        "8" => 28,
        "0" => 29,
        "]" => 30,
        "o" => 31,
        "u" => 32,
        "[" => 33,
        "i" => 34,
        "p" => 35,
        "return" | "enter" => 36,
        "l" => 37,
        "j" => 38,
        "'" => 39,
        "k" => 40,
        ";" => 41,
        "\\" => 42,
        "," => 43,
        "/" => 44,
        "n" => 45,
        "m" => 46,
        "." => 47,
        "tab" => 48,
        "space" => 49,
        "`" => 50,
        "delete" | "backspace" => 51,
        "escape" | "esc" => 53,
        "f5" => 96,
        "f6" => 97,
        "f7" => 98,
        "f3" => 99,
        "f8" => 100,
        "f9" => 101,
        "f11" => 103,
        "f10" => 109,
        "f12" => 111,
        "f4" => 118,
        "f2" => 120,
        "f1" => 122,
        "left" => 123,
        "right" => 124,
        "down" => 125,
        "up" => 126,
        _ => return None,
    };
    Some(code)
}

fn modifier_clause(modifier: Modifier) -> &'static str {
    match modifier {
        Modifier::Command => "command down",
        Modifier::Shift => "shift down",
        Modifier::Option => "option down",
        Modifier::Control => "control down",
    }
}

/// AppleScript for a key press with optional modifiers.
fn key_script(code: u16, modifiers: &[Modifier]) -> String {
    if modifiers.is_empty() {
        format!(r#"tell application "System Events" to key code {code}"#)
    } else {
        let clauses: Vec<&str> = modifiers.iter().copied().map(modifier_clause).collect();
        format!(
            r#"tell application "System Events" to key code {code} using {{{}}}"#,
            clauses.join(", ")
        )
    }
}

fn preset_script(preset: Preset) -> String {
    use Modifier::*;
    match preset {
        Preset::VolumeUp => {
            "set volume output volume ((output volume of (get volume settings)) + 6.25)".to_string()
        }
        Preset::VolumeDown => {
            "set volume output volume ((output volume of (get volume settings)) - 6.25)".to_string()
        }
        Preset::VolumeMute => {
            "set volume output muted (not (output muted of (get volume settings)))".to_string()
        }
        Preset::PlayPause => key_script(49, &[]),
        Preset::NextTrack => key_script(124, &[Command]),
        Preset::PreviousTrack => key_script(123, &[Command]),
        Preset::ScrollUp => key_script(126, &[Option]),
        Preset::ScrollDown => key_script(125, &[Option]),
        Preset::NextTab => key_script(30, &[Command, Shift]),
        Preset::PreviousTab => key_script(33, &[Command, Shift]),
        // Handled by `screencapture`
        Preset::Screenshot => String::new(),
    }
}

fn run_applescript(script: &str) -> bool {
    run_logged("osascript", Command::new("osascript").arg("-e").arg(script))
}

fn run_key_combo(combo: &KeyCombo) -> bool {
    match keycode(&combo.key) {
        Some(code) => run_applescript(&key_script(code, &combo.modifiers)),
        None => {
            tracing::error!("Unknown key '{}' for macOS keycode", combo.key);
            false
        }
    }
}

/// Runs actions via AppleScript.
#[derive(Debug, Default)]
pub struct MacOSExecutor;

impl MacOSExecutor {
    pub fn new() -> Self {
        Self
    }
}

impl ActionExecutor for MacOSExecutor {
    fn execute(&self, action: &Action) -> bool {
        match action {
            Action::Preset(Preset::Screenshot) => {
                run_logged("screencapture", Command::new("screencapture").arg("-c"))
            }
            Action::Preset(preset) => run_applescript(&preset_script(*preset)),
            Action::KeyCombo(combo) => run_key_combo(combo),
        }
    }
}

/// Cursor control through CoreGraphics events.
#[derive(Debug)]
pub struct MacOSPointer {
    position: CGPoint,
}

impl MacOSPointer {
    pub fn new() -> Self {
        Self {
            position: CGPoint::new(0.0, 0.0),
        }
    }

    fn post(&self, event_type: CGEventType, button: CGMouseButton) -> Result<(), PointerError> {
        let source = CGEventSource::new(CGEventSourceStateID::HIDSystemState)
            .map_err(|_| PointerError::EventCreation)?;
        let event = CGEvent::new_mouse_event(source, event_type, self.position, button)
            .map_err(|_| PointerError::EventCreation)?;
        event.post(CGEventTapLocation::HID);
        Ok(())
    }
}

impl Default for MacOSPointer {
    fn default() -> Self {
        Self::new()
    }
}

impl PointerBackend for MacOSPointer {
    fn screen_size(&self) -> (f64, f64) {
        let bounds = CGDisplay::main().bounds();
        (bounds.size.width, bounds.size.height)
    }

    fn move_to(&mut self, x: f64, y: f64) -> Result<(), PointerError> {
        self.position = CGPoint::new(x, y);
        self.post(CGEventType::MouseMoved, CGMouseButton::Left)
    }

    fn click(&mut self, button: MouseButton) -> Result<(), PointerError> {
        let (down, up, cg_button) = match button {
            MouseButton::Left => (
                CGEventType::LeftMouseDown,
                CGEventType::LeftMouseUp,
                CGMouseButton::Left,
            ),
            MouseButton::Right => (
                CGEventType::RightMouseDown,
                CGEventType::RightMouseUp,
                CGMouseButton::Right,
            ),
        };
        self.post(down, cg_button)?;
        self.post(up, cg_button)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_script_with_modifiers() {
        assert_eq!(
            key_script(0, &[Modifier::Command, Modifier::Shift]),
            r#"tell application "System Events" to key code 0 using {command down, shift down}"#
        );
        assert_eq!(
            key_script(49, &[]),
            r#"tell application "System Events" to key code 49"#
        );
    }

    #[test]
    fn test_keycode_lookup() {
        assert_eq!(keycode("space"), Some(49));
        assert_eq!(keycode("f11"), Some(103));
        assert_eq!(keycode("hyper"), None);
    }
}
