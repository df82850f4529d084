//! GestureFlow - webcam hand-gesture control for the desktop.
//!
//! This library turns per-frame hand landmarks into desktop actions and a
//! virtual mouse. Users record a few hundred frames of a pose under a label;
//! a nearest-neighbor classifier then recognizes the pose live and fires the
//! action mapped to it.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                           GestureFlow                             │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐   ┌─────────────┐   ┌─────────────┐             │
//! │  │ Landmark    │──▶│ Normalizer  │──▶│ Classifier  │──┐          │
//! │  │ feed        │   │ (63 floats) │   │   (k-NN)    │  │          │
//! │  └─────────────┘   └─────────────┘   └─────────────┘  ▼          │
//! │         │                 │                    ┌─────────────┐   │
//! │         ▼                 ▼                    │ Dispatcher  │   │
//! │  ┌─────────────┐   ┌─────────────┐             │ (debounce)  │   │
//! │  │ Mouse       │   │ QC gate     │             └─────────────┘   │
//! │  │ engine      │   │ (training)  │                    │          │
//! │  └─────────────┘   └─────────────┘                    ▼          │
//! │         │                                      ┌─────────────┐   │
//! │         └────────────────────────────────────▶│  Desktop    │   │
//! │                                                │  backend    │   │
//! │                                                └─────────────┘   │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use gestureflow::core::GestureClassifier;
//! use gestureflow::vision::{normalize, HandLandmarks, Landmark};
//!
//! let hand = HandLandmarks::new([Landmark::new(0.5, 0.5, 0.0); 21]);
//! let mut classifier = GestureClassifier::default();
//! classifier.add_sample("Fist", normalize(&hand));
//! classifier.train();
//!
//! let prediction = classifier.predict(&normalize(&hand));
//! println!("{} ({:.2})", prediction.label, prediction.confidence);
//! ```

pub mod actions;
pub mod config;
pub mod core;
pub mod desktop;
pub mod session;
pub mod state;
pub mod vision;

#[cfg(feature = "server")]
pub mod server;

// Re-export key types at crate root for convenience
pub use actions::{Action, ActionExecutor, GestureConfigEntry, GestureConfigStore, KeyCombo, Preset};
pub use config::Config;
pub use core::{ActionDispatcher, GestureClassifier, MouseEngine, Prediction, QualityGate};
pub use session::{run_session, Command, EventSender, EventStream, Outbound, Session, StatusPayload};
pub use state::{AppState, CaptureDevices, DeviceProvider};
pub use vision::{normalize, FeatureVector, HandLandmarks, Landmark};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
