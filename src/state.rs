//! Process-wide shared state.
//!
//! One [`AppState`] is shared by the HTTP handlers and every session loop.
//! The classifier sits behind an async `RwLock`; the gesture store and the
//! dispatcher use short synchronous locks. Two sessions finishing training
//! at the same moment each retrain and save; the last write wins.

use crate::actions::{Action, ActionExecutor, ActionParseError, GestureConfigEntry, GestureConfigStore, StoreError};
use crate::config::Config;
use crate::core::classifier::{write_snapshot, GestureClassifier, ModelStats, SnapshotError};
use crate::core::dispatcher::ActionDispatcher;
use crate::core::mouse::PointerBackend;
use crate::desktop::{DesktopExecutor, DesktopPointer};
use crate::vision::feed::{FeedError, FrameSource, JsonLineDetector, LandmarkDetector, SubprocessFeed};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::RwLock;

/// How long a session waits on the feed for one frame.
const FEED_READ_TIMEOUT: Duration = Duration::from_millis(100);

/// Camera + detector pair owned by one session.
pub struct CaptureDevices {
    pub source: Box<dyn FrameSource>,
    pub detector: Box<dyn LandmarkDetector>,
}

/// Opens per-session devices.
pub trait DeviceProvider: Send + Sync {
    /// Open the camera and a fresh detector. Blocking.
    fn open_capture(&self) -> Result<CaptureDevices, FeedError>;

    /// A cursor backend for a new session's mouse engine.
    fn pointer(&self) -> Box<dyn PointerBackend>;
}

/// Devices backed by the configured helper process and the platform pointer.
#[derive(Debug, Clone)]
pub struct DesktopDevices {
    config: crate::config::FeedConfig,
}

impl DesktopDevices {
    pub fn new(config: crate::config::FeedConfig) -> Self {
        Self { config }
    }
}

impl DeviceProvider for DesktopDevices {
    fn open_capture(&self) -> Result<CaptureDevices, FeedError> {
        let feed = SubprocessFeed::spawn(
            &self.config.command,
            &self.config.args,
            FEED_READ_TIMEOUT,
            self.config.open_timeout,
        )?;
        Ok(CaptureDevices {
            source: Box::new(feed),
            detector: Box::new(JsonLineDetector::new(self.config.min_hand_score)),
        })
    }

    fn pointer(&self) -> Box<dyn PointerBackend> {
        Box::new(DesktopPointer::default())
    }
}

/// Rejected mapping update.
#[derive(Debug, thiserror::Error)]
pub enum MappingError {
    #[error("Invalid action: {0}")]
    InvalidAction(#[from] ActionParseError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// State shared across all connections.
pub struct AppState {
    pub config: Config,
    pub classifier: RwLock<GestureClassifier>,
    pub dispatcher: ActionDispatcher,
    gestures: Mutex<GestureConfigStore>,
    devices: Arc<dyn DeviceProvider>,
}

impl AppState {
    /// Build state with the platform executor and devices.
    pub fn new(config: Config) -> Self {
        let devices = Arc::new(DesktopDevices::new(config.feed.clone()));
        Self::with_backends(config, Arc::new(DesktopExecutor::default()), devices)
    }

    /// Build state with explicit backends, loading the model and gesture store
    /// from the configured data path.
    pub fn with_backends(
        config: Config,
        executor: Arc<dyn ActionExecutor>,
        devices: Arc<dyn DeviceProvider>,
    ) -> Self {
        let classifier = GestureClassifier::load_or_default(
            config.classifier.n_neighbors,
            config.classifier.unknown_threshold,
            &config.model_path(),
        );
        let store = GestureConfigStore::open(config.gestures_path());
        let dispatcher = ActionDispatcher::new(store.action_map(), config.action_cooldown, executor);

        Self {
            config,
            classifier: RwLock::new(classifier),
            dispatcher,
            gestures: Mutex::new(store),
            devices,
        }
    }

    pub fn devices(&self) -> &Arc<dyn DeviceProvider> {
        &self.devices
    }

    fn store(&self) -> MutexGuard<'_, GestureConfigStore> {
        self.gestures.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn list_gestures(&self) -> Vec<GestureConfigEntry> {
        self.store().list()
    }

    /// Validate, persist and activate a mapping.
    pub fn upsert_gesture(&self, entry: GestureConfigEntry) -> Result<Action, MappingError> {
        let action = entry.resolve()?;
        let mut store = self.store();
        store.upsert(entry)?;
        self.dispatcher.replace_actions(store.action_map());
        Ok(action)
    }

    /// Remove a mapping. Returns whether it existed.
    pub fn delete_gesture(&self, name: &str) -> Result<bool, StoreError> {
        let mut store = self.store();
        let found = store.delete(name)?;
        if found {
            self.dispatcher.replace_actions(store.action_map());
        }
        Ok(found)
    }

    /// Persist the classifier without retraining.
    pub async fn save_model(&self) -> Result<(), SnapshotError> {
        let bytes = self.classifier.read().await.snapshot_bytes()?;
        let path = self.config.model_path();
        let target = path.clone();
        tokio::task::spawn_blocking(move || write_snapshot(&target, &bytes))
            .await
            .map_err(|e| SnapshotError::Io(std::io::Error::other(e)))??;
        self.classifier.write().await.mark_saved();
        tracing::info!("Model saved to {:?}", path);
        Ok(())
    }

    /// Retrain on every accumulated sample, then persist.
    pub async fn train_and_save(&self) -> Result<(), SnapshotError> {
        self.classifier.write().await.train();
        self.save_model().await
    }

    /// Drop all samples and persist the empty model.
    pub async fn reset_model(&self) -> Result<(), SnapshotError> {
        self.classifier.write().await.clear();
        self.save_model().await
    }

    pub async fn model_stats(&self) -> ModelStats {
        self.classifier.read().await.stats()
    }
}
