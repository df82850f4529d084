//! Core gesture pipeline components.
//!
//! This module contains:
//! - The training-sample quality gate
//! - The nearest-neighbor gesture classifier
//! - The geometry-driven mouse engine
//! - The debounced action dispatcher

pub mod classifier;
pub mod dispatcher;
pub mod mouse;
pub mod quality;

// Re-export commonly used types
pub use classifier::{GestureClassifier, ModelStats, Prediction, SnapshotError, UNKNOWN_LABEL};
pub use dispatcher::{ActionDispatcher, Dispatch, NONE_LABEL};
pub use mouse::{MouseButton, MouseEngine, MouseReport, MouseSettings, PointerBackend, PointerError};
pub use quality::{QualityGate, QualityVerdict};
