//! Configuration for GestureFlow.

use crate::core::mouse::MouseSettings;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP / WebSocket listener
    pub server: ServerSettings,

    /// Helper process providing landmark detections
    pub feed: FeedConfig,

    /// Per-session loop tuning
    pub pipeline: PipelineConfig,

    /// Nearest-neighbor classifier tuning
    pub classifier: ClassifierConfig,

    /// Virtual mouse tuning
    pub mouse: MouseSettings,

    /// Minimum time between two firings of the same gesture action
    #[serde(with = "duration_serde")]
    pub action_cooldown: Duration,

    /// Path for the model snapshot and gesture mappings
    pub data_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("gestureflow");

        Self {
            server: ServerSettings::default(),
            feed: FeedConfig::default(),
            pipeline: PipelineConfig::default(),
            classifier: ClassifierConfig::default(),
            mouse: MouseSettings::default(),
            action_cooldown: Duration::from_secs(1),
            data_path: data_dir,
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_path();

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config: Config = serde_json::from_str(&content)
                .map_err(|e| ConfigError::ParseError(e.to_string()))?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        let config_path = Self::config_path();

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(&config_path, content)?;

        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("gestureflow")
            .join("config.json")
    }

    /// Path of the classifier snapshot.
    pub fn model_path(&self) -> PathBuf {
        self.data_path.join("gesture_model.json")
    }

    /// Path of the gesture mapping store.
    pub fn gestures_path(&self) -> PathBuf {
        self.data_path.join("gestures.json")
    }

    /// Ensure all required directories exist.
    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.data_path)?;
        Ok(())
    }
}

/// Listener address.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    /// Port to bind to (0 for random)
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
        }
    }
}

/// Landmark feed helper process.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    /// Executable to spawn
    pub command: String,
    /// Arguments passed to the executable
    pub args: Vec<String>,
    /// Minimum hand score to accept a detection
    pub min_hand_score: f32,
    /// How long the helper may take to print `READY`
    #[serde(with = "duration_serde")]
    pub open_timeout: Duration,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            command: "python3".to_string(),
            args: vec!["hand_feed.py".to_string()],
            min_hand_score: 0.5,
            open_timeout: Duration::from_secs(15),
        }
    }
}

/// Session loop tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Tick rate of each session loop
    pub target_fps: u32,
    /// Process every Nth frame while predicting (1 = every frame)
    pub process_every_n: u32,
    /// Training target when a client omits `target_frames`
    pub default_target_frames: u32,
    /// Max wrist travel per training frame
    pub qc_velocity_threshold: f64,
    /// Whether new sessions start with mouse control on
    pub mouse_enabled: bool,
    /// How long each tick waits for a client command
    pub command_poll_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            target_fps: 30,
            process_every_n: 2,
            default_target_frames: 200,
            qc_velocity_threshold: 0.3,
            mouse_enabled: true,
            command_poll_ms: 1,
        }
    }
}

impl PipelineConfig {
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.target_fps.max(1) as f64)
    }

    pub fn command_poll(&self) -> Duration {
        Duration::from_millis(self.command_poll_ms)
    }
}

/// Classifier tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub n_neighbors: usize,
    /// Nearest distance above which a pose is reported as "Unknown"
    pub unknown_threshold: f64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            n_neighbors: 5,
            unknown_threshold: 0.6,
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    ParseError(String),
    #[error("Serialize error: {0}")]
    SerializeError(String),
}

/// Serde support for Duration as fractional seconds.
pub mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs_f64().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}
