//! Nearest-neighbor gesture classifier with unknown-gesture rejection.
//!
//! Samples accumulate in insertion order and are never pruned. `train()`
//! rebuilds the k-NN model from the whole buffer, so a new gesture is usable
//! right after a single retrain. Prediction cost grows linearly with the
//! number of samples, which stays small at interactive volumes.

use crate::vision::landmarks::{round4, FeatureVector};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Label reported when no gesture is recognized.
pub const UNKNOWN_LABEL: &str = "Unknown";

/// Default nearest-neighbor distance above which a pose is "Unknown".
pub const DEFAULT_UNKNOWN_THRESHOLD: f64 = 0.6;

/// Default neighbor count.
pub const DEFAULT_NEIGHBORS: usize = 5;

const SNAPSHOT_VERSION: u32 = 1;

/// One labelled training pose.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingSample {
    pub label: String,
    pub vector: FeatureVector,
}

/// A fitted k-NN model over a frozen copy of the training set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnnModel {
    k: usize,
    samples: Vec<TrainingSample>,
}

impl KnnModel {
    fn fit(samples: &[TrainingSample], k: usize) -> Self {
        Self {
            k: k.clamp(1, samples.len().max(1)),
            samples: samples.to_vec(),
        }
    }

    /// The `k` nearest samples as `(distance, label)`, closest first.
    fn neighbors(&self, vector: &FeatureVector) -> Vec<(f64, &str)> {
        let mut scored: Vec<(f64, &str)> = self
            .samples
            .iter()
            .map(|s| (s.vector.distance(vector), s.label.as_str()))
            .collect();
        scored.sort_by(|a, b| a.0.total_cmp(&b.0));
        scored.truncate(self.k);
        scored
    }

    /// Majority vote among neighbors; ties go to the lexicographically
    /// smallest label.
    fn vote<'a>(neighbors: &[(f64, &'a str)]) -> Option<&'a str> {
        let mut votes: BTreeMap<&'a str, usize> = BTreeMap::new();
        for &(_, label) in neighbors {
            *votes.entry(label).or_default() += 1;
        }
        let mut best: Option<(&'a str, usize)> = None;
        for (label, count) in votes {
            if best.map_or(true, |(_, c)| count > c) {
                best = Some((label, count));
            }
        }
        best.map(|(label, _)| label)
    }
}

/// Result of classifying one pose.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub label: String,
    /// `clamp(1 - d, 0, 1)` for a recognized gesture. For an explicit
    /// "Unknown" this carries the raw nearest distance instead, which
    /// existing clients rely on.
    pub confidence: f64,
}

impl Prediction {
    fn unknown(confidence: f64) -> Self {
        Self {
            label: UNKNOWN_LABEL.to_string(),
            confidence,
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.label == UNKNOWN_LABEL
    }
}

/// Summary of the classifier contents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelStats {
    pub trained: bool,
    pub samples: usize,
    pub classes: BTreeMap<String, usize>,
    pub saved_at: Option<DateTime<Utc>>,
}

/// Errors from persisting the classifier.
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Corrupt snapshot: {0}")]
    Corrupt(String),
    #[error("Unsupported snapshot version {0}")]
    Version(u32),
}

/// On-disk format: the whole buffer, the fitted model and the trained flag.
#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    version: u32,
    samples: Vec<TrainingSample>,
    model: Option<KnnModel>,
    is_trained: bool,
    saved_at: DateTime<Utc>,
}

/// Train / predict hand gestures via k-nearest neighbors.
#[derive(Debug, Clone)]
pub struct GestureClassifier {
    n_neighbors: usize,
    unknown_threshold: f64,
    samples: Vec<TrainingSample>,
    model: Option<KnnModel>,
    trained: bool,
    saved_at: Option<DateTime<Utc>>,
}

impl GestureClassifier {
    pub fn new(n_neighbors: usize, unknown_threshold: f64) -> Self {
        Self {
            n_neighbors: n_neighbors.max(1),
            unknown_threshold,
            samples: Vec::new(),
            model: None,
            trained: false,
            saved_at: None,
        }
    }

    /// Append a normalized pose to the buffer. Takes effect on the next `train()`.
    pub fn add_sample(&mut self, label: impl Into<String>, vector: FeatureVector) {
        self.samples.push(TrainingSample {
            label: label.into(),
            vector,
        });
    }

    /// Rebuild the model from every accumulated sample.
    pub fn train(&mut self) {
        if self.samples.is_empty() {
            tracing::warn!("train() called with no data, skipping");
            return;
        }

        let model = KnnModel::fit(&self.samples, self.n_neighbors);
        tracing::info!(
            "Model trained on {} samples across {} classes (k={})",
            self.samples.len(),
            self.class_counts().len(),
            model.k
        );
        self.model = Some(model);
        self.trained = true;
    }

    pub fn predict(&self, vector: &FeatureVector) -> Prediction {
        let model = match (&self.model, self.trained) {
            (Some(model), true) => model,
            _ => return Prediction::unknown(0.0),
        };

        let neighbors = model.neighbors(vector);
        let Some(&(nearest, _)) = neighbors.first() else {
            return Prediction::unknown(0.0);
        };

        if nearest > self.unknown_threshold {
            return Prediction::unknown(round4(nearest));
        }

        match KnnModel::vote(&neighbors) {
            Some(label) => Prediction {
                label: label.to_string(),
                confidence: round4((1.0 - nearest).clamp(0.0, 1.0)),
            },
            None => Prediction::unknown(round4(nearest)),
        }
    }

    pub fn is_trained(&self) -> bool {
        self.trained
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    pub fn samples(&self) -> &[TrainingSample] {
        &self.samples
    }

    /// Drop all samples and the fitted model.
    pub fn clear(&mut self) {
        self.samples.clear();
        self.model = None;
        self.trained = false;
    }

    fn class_counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for sample in &self.samples {
            *counts.entry(sample.label.clone()).or_default() += 1;
        }
        counts
    }

    pub fn stats(&self) -> ModelStats {
        ModelStats {
            trained: self.trained,
            samples: self.samples.len(),
            classes: self.class_counts(),
            saved_at: self.saved_at,
        }
    }

    /// Serialize the full state. Cheap enough to run under a read lock;
    /// the write itself happens in [`write_snapshot`].
    pub fn snapshot_bytes(&self) -> Result<Vec<u8>, SnapshotError> {
        let snapshot = Snapshot {
            version: SNAPSHOT_VERSION,
            samples: self.samples.clone(),
            model: self.model.clone(),
            is_trained: self.trained,
            saved_at: Utc::now(),
        };
        serde_json::to_vec(&snapshot).map_err(|e| SnapshotError::Corrupt(e.to_string()))
    }

    /// Serialize and write to `path`.
    pub fn save(&mut self, path: &Path) -> Result<(), SnapshotError> {
        let bytes = self.snapshot_bytes()?;
        write_snapshot(path, &bytes)?;
        self.saved_at = Some(Utc::now());
        tracing::info!("Model saved to {:?}", path);
        Ok(())
    }

    pub fn mark_saved(&mut self) {
        self.saved_at = Some(Utc::now());
    }

    /// Replace the current state with the snapshot at `path`.
    ///
    /// Returns `Ok(false)` when no snapshot exists.
    pub fn load(&mut self, path: &Path) -> Result<bool, SnapshotError> {
        if !path.exists() {
            tracing::info!("No saved model found at {:?}", path);
            return Ok(false);
        }

        let bytes = std::fs::read(path)?;
        let snapshot: Snapshot =
            serde_json::from_slice(&bytes).map_err(|e| SnapshotError::Corrupt(e.to_string()))?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(SnapshotError::Version(snapshot.version));
        }

        self.samples = snapshot.samples;
        self.model = snapshot.model;
        self.trained = snapshot.is_trained && self.model.is_some();
        self.saved_at = Some(snapshot.saved_at);

        tracing::info!(
            "Model loaded from {:?} ({} samples, trained={})",
            path,
            self.samples.len(),
            self.trained
        );
        Ok(true)
    }

    /// Build a classifier from `path`, falling back to an empty one on any error.
    pub fn load_or_default(n_neighbors: usize, unknown_threshold: f64, path: &Path) -> Self {
        let mut classifier = Self::new(n_neighbors, unknown_threshold);
        if let Err(e) = classifier.load(path) {
            tracing::warn!("Failed to load model from {:?}: {}; starting untrained", path, e);
            classifier = Self::new(n_neighbors, unknown_threshold);
        }
        classifier
    }
}

impl Default for GestureClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_NEIGHBORS, DEFAULT_UNKNOWN_THRESHOLD)
    }
}

/// Write `bytes` to `path` via a temporary sibling and rename, so a crash
/// never leaves a half-written snapshot behind.
pub fn write_snapshot(path: &Path, bytes: &[u8]) -> Result<(), SnapshotError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, bytes)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vision::landmarks::FEATURE_LEN;

    fn vector(fill: f32) -> FeatureVector {
        FeatureVector::try_from(vec![fill; FEATURE_LEN]).unwrap()
    }

    /// A vector at Euclidean distance `d` from `vector(0.0)`.
    fn offset(d: f32) -> FeatureVector {
        let mut values = vec![0.0; FEATURE_LEN];
        values[5] = d;
        FeatureVector::try_from(values).unwrap()
    }

    #[test]
    fn test_untrained_predicts_unknown() {
        let classifier = GestureClassifier::default();
        let p = classifier.predict(&vector(0.0));
        assert_eq!(p.label, UNKNOWN_LABEL);
        assert_eq!(p.confidence, 0.0);
    }

    #[test]
    fn test_identical_samples_full_confidence() {
        let mut classifier = GestureClassifier::default();
        for _ in 0..5 {
            classifier.add_sample("A", vector(0.2));
        }
        classifier.train();
        let p = classifier.predict(&vector(0.2));
        assert_eq!(p.label, "A");
        assert_eq!(p.confidence, 1.0);
    }

    #[test]
    fn test_far_vector_is_unknown_with_raw_distance() {
        let mut classifier = GestureClassifier::default();
        classifier.add_sample("A", vector(0.0));
        classifier.train();
        let p = classifier.predict(&offset(0.9));
        assert!(p.is_unknown());
        assert!((p.confidence - 0.9).abs() < 1e-4);
    }

    #[test]
    fn test_confidence_inverts_distance() {
        let mut classifier = GestureClassifier::default();
        classifier.add_sample("A", vector(0.0));
        classifier.train();
        let p = classifier.predict(&offset(0.25));
        assert_eq!(p.label, "A");
        assert!((p.confidence - 0.75).abs() < 1e-4);
    }

    #[test]
    fn test_train_clamps_k_for_small_classes() {
        let mut classifier = GestureClassifier::new(5, DEFAULT_UNKNOWN_THRESHOLD);
        classifier.add_sample("A", vector(0.0));
        classifier.add_sample("B", vector(1.0));
        classifier.add_sample("B", vector(1.0));
        classifier.train();
        assert!(classifier.is_trained());
        assert_eq!(classifier.predict(&vector(1.0)).label, "B");
    }

    #[test]
    fn test_majority_vote() {
        let mut classifier = GestureClassifier::new(3, DEFAULT_UNKNOWN_THRESHOLD);
        classifier.add_sample("A", offset(0.0));
        classifier.add_sample("B", offset(0.05));
        classifier.add_sample("B", offset(0.06));
        classifier.add_sample("A", offset(0.5));
        classifier.train();
        assert_eq!(classifier.predict(&offset(0.01)).label, "B");
    }

    #[test]
    fn test_train_without_samples_is_noop() {
        let mut classifier = GestureClassifier::default();
        classifier.train();
        assert!(!classifier.is_trained());
    }

    #[test]
    fn test_samples_after_train_need_retrain() {
        let mut classifier = GestureClassifier::default();
        classifier.add_sample("A", vector(0.0));
        classifier.train();
        classifier.add_sample("B", vector(1.0));
        assert!(classifier.predict(&vector(1.0)).is_unknown());
        classifier.train();
        assert_eq!(classifier.predict(&vector(1.0)).label, "B");
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");

        let mut classifier = GestureClassifier::default();
        classifier.add_sample("Fist", vector(0.1));
        classifier.add_sample("Palm", vector(0.9));
        classifier.train();
        classifier.save(&path).unwrap();

        let restored = GestureClassifier::load_or_default(5, 0.6, &path);
        assert!(restored.is_trained());
        assert_eq!(restored.sample_count(), 2);
        assert_eq!(restored.predict(&vector(0.9)).label, "Palm");
        assert!(restored.stats().saved_at.is_some());
    }

    #[test]
    fn test_corrupt_snapshot_falls_back_to_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        std::fs::write(&path, b"\x00\x01garbage").unwrap();

        let classifier = GestureClassifier::load_or_default(5, 0.6, &path);
        assert!(!classifier.is_trained());
        assert_eq!(classifier.sample_count(), 0);
    }

    #[test]
    fn test_missing_snapshot_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut classifier = GestureClassifier::default();
        assert!(!classifier.load(&dir.path().join("absent.json")).unwrap());
    }

    #[test]
    fn test_stats_counts_classes() {
        let mut classifier = GestureClassifier::default();
        classifier.add_sample("A", vector(0.0));
        classifier.add_sample("A", vector(0.0));
        classifier.add_sample("B", vector(1.0));
        let stats = classifier.stats();
        assert_eq!(stats.samples, 3);
        assert_eq!(stats.classes["A"], 2);
        assert!(!stats.trained);
    }
}
