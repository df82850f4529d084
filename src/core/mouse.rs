//! Geometry-driven virtual mouse.
//!
//! The index fingertip steers the cursor through an "active zone" inset from
//! the camera frame, with exponential smoothing. Pinching thumb and index
//! fingertips left-clicks; thumb and middle fingertips right-clicks. The two
//! pinches have independent cooldowns and may both fire in one frame.

use crate::config::duration_serde;
use crate::vision::landmarks::{index, HandLandmarks};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Mouse engine tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MouseSettings {
    /// Pixel margin defining the active zone inside the camera frame
    pub frame_reduction: f64,
    /// Smoothing divisor (higher = smoother, more latency)
    pub smoothening: f64,
    /// Max normalized fingertip distance that counts as a pinch
    pub click_threshold: f64,
    /// Minimum time between clicks of the same button
    #[serde(with = "duration_serde")]
    pub click_cooldown: Duration,
}

impl Default for MouseSettings {
    fn default() -> Self {
        Self {
            frame_reduction: 100.0,
            smoothening: 7.0,
            click_threshold: 0.05,
            click_cooldown: Duration::from_millis(500),
        }
    }
}

/// Mouse button.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseButton {
    Left,
    Right,
}

/// Errors from the OS pointer.
#[derive(Debug, thiserror::Error)]
pub enum PointerError {
    #[error("Pointer event could not be created")]
    EventCreation,
    #[error("Pointer command failed: {0}")]
    Command(String),
    #[error("Pointer device unavailable")]
    Unavailable,
}

/// OS cursor control.
pub trait PointerBackend: Send {
    /// Screen size in pixels.
    fn screen_size(&self) -> (f64, f64);

    fn move_to(&mut self, x: f64, y: f64) -> Result<(), PointerError>;

    fn click(&mut self, button: MouseButton) -> Result<(), PointerError>;
}

/// What one invocation of the engine did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MouseReport {
    pub cursor: (f64, f64),
    pub left_click: bool,
    pub right_click: bool,
}

/// Per-session cursor state.
pub struct MouseEngine {
    settings: MouseSettings,
    backend: Box<dyn PointerBackend>,
    screen: (f64, f64),
    prev: (f64, f64),
    last_left_click: Option<Instant>,
    last_right_click: Option<Instant>,
}

impl MouseEngine {
    pub fn new(settings: MouseSettings, backend: Box<dyn PointerBackend>) -> Self {
        let screen = backend.screen_size();
        Self {
            settings,
            backend,
            screen,
            prev: (screen.0 / 2.0, screen.1 / 2.0),
            last_left_click: None,
            last_right_click: None,
        }
    }

    pub fn cursor(&self) -> (f64, f64) {
        self.prev
    }

    /// Move the cursor and emit pinch clicks for one frame of raw landmarks.
    pub fn process(&mut self, hand: &HandLandmarks, now: Instant) -> MouseReport {
        let (sw, sh) = self.screen;
        let fr = self.settings.frame_reduction;
        let tip = hand.get(index::INDEX_FINGER_TIP);

        let target_x = interp(tip.x as f64, fr / sw, 1.0 - fr / sw, 0.0, sw);
        let target_y = interp(tip.y as f64, fr / sh, 1.0 - fr / sh, 0.0, sh);

        let divisor = self.settings.smoothening.max(1.0);
        let cur_x = self.prev.0 + (target_x - self.prev.0) / divisor;
        let cur_y = self.prev.1 + (target_y - self.prev.1) / divisor;

        if let Err(e) = self.backend.move_to(cur_x.trunc(), cur_y.trunc()) {
            tracing::debug!("move_to failed: {}", e);
        }
        self.prev = (cur_x, cur_y);

        let thumb = hand.get(index::THUMB_TIP);

        let dist_left = hand.get(index::INDEX_FINGER_TIP).planar_distance(&thumb);
        let left_click = self.try_click(MouseButton::Left, dist_left, now);

        let dist_right = hand.get(index::MIDDLE_FINGER_TIP).planar_distance(&thumb);
        let right_click = self.try_click(MouseButton::Right, dist_right, now);

        MouseReport {
            cursor: self.prev,
            left_click,
            right_click,
        }
    }

    fn try_click(&mut self, button: MouseButton, distance: f64, now: Instant) -> bool {
        if distance >= self.settings.click_threshold {
            return false;
        }

        let cooldown = self.settings.click_cooldown;
        let last = match button {
            MouseButton::Left => &mut self.last_left_click,
            MouseButton::Right => &mut self.last_right_click,
        };
        // Fires once a full cooldown has elapsed (inclusive boundary)
        if let Some(prev) = *last {
            if now.saturating_duration_since(prev) < cooldown {
                return false;
            }
        }

        match self.backend.click(button) {
            Ok(()) => {
                *last = Some(now);
                tracing::debug!("{:?} click (dist={:.4})", button, distance);
                true
            }
            Err(e) => {
                tracing::warn!("{:?} click failed: {}", button, e);
                false
            }
        }
    }
}

/// Piecewise-linear map of `value` from `[in_lo, in_hi]` to `[out_lo, out_hi]`,
/// clamped at both ends.
fn interp(value: f64, in_lo: f64, in_hi: f64, out_lo: f64, out_hi: f64) -> f64 {
    if in_hi <= in_lo {
        return if value < in_lo { out_lo } else { out_hi };
    }
    if value <= in_lo {
        return out_lo;
    }
    if value >= in_hi {
        return out_hi;
    }
    out_lo + (value - in_lo) * (out_hi - out_lo) / (in_hi - in_lo)
}
