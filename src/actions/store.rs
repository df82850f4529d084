//! Persistent gesture → action configuration.
//!
//! Entries live in a JSON file (`{"gestures": [...]}`) so mappings survive
//! restarts. A missing file is seeded with defaults.

use crate::actions::Action;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

/// One gesture configuration entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GestureConfigEntry {
    /// Gesture label, as produced by the classifier
    pub name: String,
    /// `"preset"` or `"keyboard"`
    #[serde(default = "default_action_type")]
    pub action_type: String,
    /// Preset name, or a display label for keyboard shortcuts
    #[serde(default)]
    pub action: String,
    /// Key combo such as `"cmd+shift+a"` (keyboard shortcuts only)
    #[serde(default)]
    pub keys: String,
}

fn default_action_type() -> String {
    "preset".to_string()
}

impl GestureConfigEntry {
    pub fn new(
        name: impl Into<String>,
        action_type: impl Into<String>,
        action: impl Into<String>,
        keys: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            action_type: action_type.into(),
            action: action.into(),
            keys: keys.into(),
        }
    }

    fn preset(name: &str, action: &str) -> Self {
        Self::new(name, "preset", action, "")
    }

    /// Resolve into a typed action.
    pub fn resolve(&self) -> Result<Action, crate::actions::ActionParseError> {
        Action::from_parts(&self.action_type, &self.action, &self.keys)
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreFile {
    gestures: Vec<GestureConfigEntry>,
}

/// Errors from the configuration store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialize error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Load/save gesture configurations from/to a JSON file.
#[derive(Debug)]
pub struct GestureConfigStore {
    path: PathBuf,
    // BTreeMap keeps listing order stable
    entries: BTreeMap<String, GestureConfigEntry>,
}

impl GestureConfigStore {
    /// Open the store at `path`, seeding defaults if the file does not exist.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let mut store = Self {
            path: path.into(),
            entries: BTreeMap::new(),
        };
        store.load();
        store
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&mut self) {
        if !self.path.exists() {
            tracing::info!("No gesture config file found, using defaults");
            self.load_defaults();
            if let Err(e) = self.save() {
                tracing::error!("Failed to save gesture configs: {}", e);
            }
            return;
        }

        let parsed = std::fs::read_to_string(&self.path)
            .map_err(StoreError::from)
            .and_then(|content| serde_json::from_str::<StoreFile>(&content).map_err(StoreError::from));

        match parsed {
            Ok(file) => {
                self.entries = file
                    .gestures
                    .into_iter()
                    .map(|e| (e.name.clone(), e))
                    .collect();
                tracing::info!(
                    "Loaded {} gesture configs from {:?}",
                    self.entries.len(),
                    self.path
                );
            }
            Err(e) => {
                tracing::error!("Failed to load gesture configs: {}", e);
                self.load_defaults();
            }
        }
    }

    fn load_defaults(&mut self) {
        let defaults = [
            GestureConfigEntry::preset("Fist", "Volume Mute"),
            GestureConfigEntry::preset("Open Palm", "Play/Pause"),
            GestureConfigEntry::preset("Thumbs Up", "Volume Up"),
            GestureConfigEntry::preset("Thumbs Down", "Volume Down"),
        ];
        self.entries = defaults.into_iter().map(|e| (e.name.clone(), e)).collect();
    }

    /// Persist all entries.
    pub fn save(&self) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = StoreFile {
            gestures: self.entries.values().cloned().collect(),
        };
        std::fs::write(&self.path, serde_json::to_string_pretty(&file)?)?;
        tracing::debug!("Saved {} gesture configs to {:?}", self.entries.len(), self.path);
        Ok(())
    }

    pub fn list(&self) -> Vec<GestureConfigEntry> {
        self.entries.values().cloned().collect()
    }

    pub fn get(&self, name: &str) -> Option<&GestureConfigEntry> {
        self.entries.get(name)
    }

    /// Add or replace an entry and persist.
    pub fn upsert(&mut self, entry: GestureConfigEntry) -> Result<(), StoreError> {
        tracing::info!(
            "Config upserted: {} -> {} ({})",
            entry.name,
            if entry.keys.is_empty() { &entry.action } else { &entry.keys },
            entry.action_type
        );
        self.entries.insert(entry.name.clone(), entry);
        self.save()
    }

    /// Remove an entry and persist. Returns whether it existed.
    pub fn delete(&mut self, name: &str) -> Result<bool, StoreError> {
        if self.entries.remove(name).is_none() {
            return Ok(false);
        }
        self.save()?;
        tracing::info!("Config deleted: {}", name);
        Ok(true)
    }

    /// Resolve every entry into a gesture → action map. Entries that do not
    /// resolve are logged and left out.
    pub fn action_map(&self) -> HashMap<String, Action> {
        self.entries
            .values()
            .filter_map(|entry| match entry.resolve() {
                Ok(action) => Some((entry.name.clone(), action)),
                Err(e) => {
                    tracing::warn!("Skipping gesture '{}': {}", entry.name, e);
                    None
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::Preset;

    #[test]
    fn test_missing_file_seeds_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gestures.json");
        let store = GestureConfigStore::open(&path);

        assert!(path.exists());
        assert_eq!(store.list().len(), 4);
        assert_eq!(
            store.action_map().get("Fist"),
            Some(&Action::Preset(Preset::VolumeMute))
        );
    }

    #[test]
    fn test_upsert_and_delete_persist() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gestures.json");

        let mut store = GestureConfigStore::open(&path);
        store
            .upsert(GestureConfigEntry::new("Peace", "keyboard", "Copy", "cmd+c"))
            .unwrap();
        assert!(store.delete("Fist").unwrap());
        assert!(!store.delete("Fist").unwrap());

        let reopened = GestureConfigStore::open(&path);
        assert!(reopened.get("Fist").is_none());
        assert_eq!(
            reopened.action_map()["Peace"].to_string(),
            "keyboard:cmd+c"
        );
    }

    #[test]
    fn test_corrupt_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gestures.json");
        std::fs::write(&path, "{ not json").unwrap();

        let store = GestureConfigStore::open(&path);
        assert!(store.get("Open Palm").is_some());
    }

    #[test]
    fn test_unresolvable_entries_skipped_in_map() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = GestureConfigStore::open(dir.path().join("gestures.json"));
        store
            .upsert(GestureConfigEntry::new("Wave", "preset", "Self Destruct", ""))
            .unwrap();
        let map = store.action_map();
        assert!(!map.contains_key("Wave"));
        assert_eq!(map.len(), 4);
    }
}
