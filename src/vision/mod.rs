//! Hand landmark acquisition and normalization.
//!
//! This module contains:
//! - Landmark types and the feature-vector normalizer
//! - Frame source / detector seams and the subprocess landmark feed

pub mod feed;
pub mod landmarks;

// Re-export commonly used types
pub use feed::{FeedError, Frame, FrameSource, JsonLineDetector, LandmarkDetector, SubprocessFeed};
pub use landmarks::{normalize, FeatureVector, HandLandmarks, Landmark, FEATURE_LEN, LANDMARK_COUNT};
