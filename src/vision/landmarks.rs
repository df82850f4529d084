//! Hand landmark types and the feature-vector normalizer.
//!
//! Landmarks follow the MediaPipe 21-point hand model. Coordinates are
//! camera-normalized: `x` and `y` in `[0, 1]`, `z` is relative depth.

use serde::{Deserialize, Serialize};

/// Number of tracked points on one hand.
pub const LANDMARK_COUNT: usize = 21;

/// Length of a flattened feature vector (21 points × 3 coordinates).
pub const FEATURE_LEN: usize = LANDMARK_COUNT * 3;

/// Landmark indices (MediaPipe hand model convention).
pub mod index {
    pub const WRIST: usize = 0;
    pub const THUMB_CMC: usize = 1;
    pub const THUMB_MCP: usize = 2;
    pub const THUMB_IP: usize = 3;
    pub const THUMB_TIP: usize = 4;
    pub const INDEX_FINGER_MCP: usize = 5;
    pub const INDEX_FINGER_PIP: usize = 6;
    pub const INDEX_FINGER_DIP: usize = 7;
    pub const INDEX_FINGER_TIP: usize = 8;
    pub const MIDDLE_FINGER_MCP: usize = 9;
    pub const MIDDLE_FINGER_PIP: usize = 10;
    pub const MIDDLE_FINGER_DIP: usize = 11;
    pub const MIDDLE_FINGER_TIP: usize = 12;
    pub const RING_FINGER_MCP: usize = 13;
    pub const RING_FINGER_PIP: usize = 14;
    pub const RING_FINGER_DIP: usize = 15;
    pub const RING_FINGER_TIP: usize = 16;
    pub const PINKY_MCP: usize = 17;
    pub const PINKY_PIP: usize = 18;
    pub const PINKY_DIP: usize = 19;
    pub const PINKY_TIP: usize = 20;
}

/// A single hand landmark.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Landmark {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Euclidean distance in the image plane (ignores depth).
    pub fn planar_distance(&self, other: &Landmark) -> f64 {
        let dx = (self.x - other.x) as f64;
        let dy = (self.y - other.y) as f64;
        (dx * dx + dy * dy).sqrt()
    }
}

/// All 21 landmarks of one detected hand, in raw camera-normalized space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandLandmarks {
    pub points: [Landmark; LANDMARK_COUNT],
}

impl HandLandmarks {
    pub fn new(points: [Landmark; LANDMARK_COUNT]) -> Self {
        Self { points }
    }

    /// Build from a slice, returning `None` unless it holds exactly 21 points.
    pub fn from_slice(points: &[Landmark]) -> Option<Self> {
        let points: [Landmark; LANDMARK_COUNT] = points.try_into().ok()?;
        Some(Self { points })
    }

    pub fn wrist(&self) -> Landmark {
        self.points[index::WRIST]
    }

    pub fn get(&self, idx: usize) -> Landmark {
        self.points[idx]
    }

    /// `[x, y]` pairs rounded to 4 decimals, as sent to clients.
    pub fn to_xy_list(&self) -> Vec<[f64; 2]> {
        self.points
            .iter()
            .map(|p| [round4(p.x as f64), round4(p.y as f64)])
            .collect()
    }
}

/// A 63-float, wrist-relative and scale-normalized hand pose.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f32>", into = "Vec<f32>")]
pub struct FeatureVector(Vec<f32>);

impl FeatureVector {
    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    /// Euclidean distance between two feature vectors.
    pub fn distance(&self, other: &FeatureVector) -> f64 {
        self.0
            .iter()
            .zip(other.0.iter())
            .map(|(a, b)| {
                let d = (*a - *b) as f64;
                d * d
            })
            .sum::<f64>()
            .sqrt()
    }

    /// Coordinates of landmark `idx` as `(x, y, z)`.
    pub fn point(&self, idx: usize) -> (f32, f32, f32) {
        let base = idx * 3;
        (self.0[base], self.0[base + 1], self.0[base + 2])
    }
}

impl TryFrom<Vec<f32>> for FeatureVector {
    type Error = String;

    fn try_from(values: Vec<f32>) -> Result<Self, Self::Error> {
        if values.len() != FEATURE_LEN {
            return Err(format!(
                "feature vector must have {FEATURE_LEN} values, got {}",
                values.len()
            ));
        }
        Ok(Self(values))
    }
}

impl From<FeatureVector> for Vec<f32> {
    fn from(vector: FeatureVector) -> Self {
        vector.0
    }
}

/// Normalize raw landmarks into a translation- and scale-invariant vector.
///
/// All points are shifted so the wrist sits at the origin, then divided by
/// the wrist → middle-finger-MCP distance. If that distance is zero the
/// translated coordinates are returned unscaled.
pub fn normalize(hand: &HandLandmarks) -> FeatureVector {
    let wrist = hand.wrist();
    let translated: Vec<[f64; 3]> = hand
        .points
        .iter()
        .map(|p| {
            [
                (p.x - wrist.x) as f64,
                (p.y - wrist.y) as f64,
                (p.z - wrist.z) as f64,
            ]
        })
        .collect();

    let [mx, my, mz] = translated[index::MIDDLE_FINGER_MCP];
    let scale = (mx * mx + my * my + mz * mz).sqrt();
    let divisor = if scale > 0.0 { scale } else { 1.0 };

    let values = translated
        .iter()
        .flat_map(|c| c.iter().map(move |v| (v / divisor) as f32))
        .collect();

    FeatureVector(values)
}

pub(crate) fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}
