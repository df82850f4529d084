//! Velocity-based quality control for training samples.
//!
//! A training frame whose wrist moved too far since the previous frame is
//! likely motion-blurred and is rejected. Prediction frames are never gated.

use crate::vision::landmarks::Landmark;

/// Default maximum wrist travel per frame, in normalized frame units.
pub const DEFAULT_VELOCITY_THRESHOLD: f64 = 0.3;

/// Outcome of checking one training frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum QualityVerdict {
    /// The frame may be recorded
    Accepted,
    /// The wrist moved `distance` units since the previous frame
    TooFast { distance: f64 },
}

impl QualityVerdict {
    pub fn is_accepted(&self) -> bool {
        matches!(self, QualityVerdict::Accepted)
    }
}

/// Per-session wrist velocity filter.
#[derive(Debug, Clone)]
pub struct QualityGate {
    threshold: f64,
    prev_wrist: Option<(f32, f32)>,
}

impl QualityGate {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            prev_wrist: None,
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Check the raw (pre-normalization) wrist position of a training frame.
    ///
    /// The reference point is updated whether or not the frame is accepted.
    pub fn check(&mut self, wrist: Landmark) -> QualityVerdict {
        let current = (wrist.x, wrist.y);
        let verdict = match self.prev_wrist {
            Some((px, py)) => {
                let dx = (current.0 - px) as f64;
                let dy = (current.1 - py) as f64;
                let distance = (dx * dx + dy * dy).sqrt();
                if distance > self.threshold {
                    QualityVerdict::TooFast { distance }
                } else {
                    QualityVerdict::Accepted
                }
            }
            None => QualityVerdict::Accepted,
        };
        self.prev_wrist = Some(current);
        verdict
    }

    /// Forget the reference point (hand lost or training restarted).
    pub fn reset(&mut self) {
        self.prev_wrist = None;
    }
}

impl Default for QualityGate {
    fn default() -> Self {
        Self::new(DEFAULT_VELOCITY_THRESHOLD)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wrist(x: f32, y: f32) -> Landmark {
        Landmark::new(x, y, 0.0)
    }

    #[test]
    fn test_first_frame_accepted() {
        let mut gate = QualityGate::default();
        assert_eq!(gate.check(wrist(0.9, 0.9)), QualityVerdict::Accepted);
    }

    #[test]
    fn test_fast_motion_rejected() {
        let mut gate = QualityGate::default();
        gate.check(wrist(0.0, 0.0));
        match gate.check(wrist(0.5, 0.5)) {
            QualityVerdict::TooFast { distance } => assert!((distance - 0.7071).abs() < 1e-3),
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[test]
    fn test_slow_motion_accepted() {
        let mut gate = QualityGate::default();
        gate.check(wrist(0.40, 0.40));
        assert!(gate.check(wrist(0.45, 0.42)).is_accepted());
    }

    #[test]
    fn test_reference_follows_rejected_frames() {
        let mut gate = QualityGate::default();
        gate.check(wrist(0.0, 0.0));
        assert!(!gate.check(wrist(0.5, 0.5)).is_accepted());
        assert!(gate.check(wrist(0.52, 0.5)).is_accepted());
    }

    #[test]
    fn test_reset_prevents_stale_reference() {
        let mut gate = QualityGate::default();
        gate.check(wrist(0.0, 0.0));
        gate.reset();
        assert!(gate.check(wrist(0.9, 0.9)).is_accepted());
    }
}
