//! Gesture → action dispatch with per-gesture debounce.

use crate::actions::{Action, ActionExecutor};
use crate::core::classifier::UNKNOWN_LABEL;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::{Duration, Instant};

/// Default minimum time between two firings of the same gesture.
pub const DEFAULT_ACTION_COOLDOWN: Duration = Duration::from_secs(1);

/// Label used for "no gesture" frames.
pub const NONE_LABEL: &str = "None";

/// Outcome of a dispatch attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// The executor ran the action
    Fired(Action),
    /// Fired too recently
    Debounced,
    /// No mapping, or a sentinel label
    Unmapped,
    /// The executor reported failure; the cooldown was not started
    Failed(Action),
}

impl Dispatch {
    pub fn fired(&self) -> Option<&Action> {
        match self {
            Dispatch::Fired(action) => Some(action),
            _ => None,
        }
    }
}

/// Maps gesture labels to actions and enforces the cooldown.
///
/// Shared by every session. The map and timestamps sit behind short-lived
/// locks; the executor runs outside them. Two sessions recognizing the same
/// gesture at the same instant may both pass the cooldown check.
pub struct ActionDispatcher {
    actions: RwLock<HashMap<String, Action>>,
    last_fired: Mutex<HashMap<String, Instant>>,
    cooldown: Duration,
    executor: Arc<dyn ActionExecutor>,
}

impl ActionDispatcher {
    pub fn new(
        actions: HashMap<String, Action>,
        cooldown: Duration,
        executor: Arc<dyn ActionExecutor>,
    ) -> Self {
        tracing::info!(
            "Action dispatcher initialized (gestures={:?})",
            actions.keys().collect::<Vec<_>>()
        );
        Self {
            actions: RwLock::new(actions),
            last_fired: Mutex::new(HashMap::new()),
            cooldown,
            executor,
        }
    }

    /// Replace the whole map (after a configuration change).
    pub fn replace_actions(&self, actions: HashMap<String, Action>) {
        *self.actions.write().unwrap_or_else(PoisonError::into_inner) = actions;
    }

    pub fn action_for(&self, gesture: &str) -> Option<Action> {
        self.actions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(gesture)
            .cloned()
    }

    /// Run the action mapped to `gesture` if its cooldown has elapsed at `now`.
    ///
    /// Blocks for as long as the executor does; call from a blocking context.
    pub fn dispatch(&self, gesture: &str, now: Instant) -> Dispatch {
        if gesture.is_empty() || gesture == UNKNOWN_LABEL || gesture == NONE_LABEL {
            return Dispatch::Unmapped;
        }
        let Some(action) = self.action_for(gesture) else {
            return Dispatch::Unmapped;
        };

        {
            let last_fired = self.last_fired.lock().unwrap_or_else(PoisonError::into_inner);
            // An action may fire again once exactly `cooldown` has elapsed
            if let Some(last) = last_fired.get(gesture) {
                if now.saturating_duration_since(*last) < self.cooldown {
                    return Dispatch::Debounced;
                }
            }
        }

        if self.executor.execute(&action) {
            self.last_fired
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(gesture.to_string(), now);
            tracing::info!("Action triggered: {} -> {}", gesture, action);
            Dispatch::Fired(action)
        } else {
            tracing::error!("Action FAILED: {} -> {}", gesture, action);
            Dispatch::Failed(action)
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::RecordingExecutor;
    use super::*;
    use crate::actions::Preset;

    fn dispatcher(executor: Arc<RecordingExecutor>) -> ActionDispatcher {
        let mut map = HashMap::new();
        map.insert("Fist".to_string(), Action::Preset(Preset::VolumeMute));
        ActionDispatcher::new(map, Duration::from_secs(1), executor)
    }

    #[test]
    fn test_debounce_within_cooldown() {
        let executor = Arc::new(RecordingExecutor::default());
        let d = dispatcher(executor.clone());
        let t0 = Instant::now();

        assert!(d.dispatch("Fist", t0).fired().is_some());
        assert_eq!(d.dispatch("Fist", t0 + Duration::from_millis(400)), Dispatch::Debounced);
        assert!(d.dispatch("Fist", t0 + Duration::from_millis(1100)).fired().is_some());
        assert_eq!(executor.count(), 2);
    }

    #[test]
    fn test_cooldown_boundary_is_inclusive() {
        let executor = Arc::new(RecordingExecutor::default());
        let d = dispatcher(executor.clone());
        let t0 = Instant::now();

        assert!(d.dispatch("Fist", t0).fired().is_some());
        assert_eq!(d.dispatch("Fist", t0 + Duration::from_millis(999)), Dispatch::Debounced);
        assert!(d.dispatch("Fist", t0 + Duration::from_secs(1)).fired().is_some());
    }

    #[test]
    fn test_sentinels_and_unmapped_never_execute() {
        let executor = Arc::new(RecordingExecutor::default());
        let d = dispatcher(executor.clone());
        let now = Instant::now();

        for label in ["Unknown", "None", "", "Wave"] {
            assert_eq!(d.dispatch(label, now), Dispatch::Unmapped);
        }
        assert_eq!(executor.count(), 0);
    }

    #[test]
    fn test_failure_does_not_start_cooldown() {
        let executor = Arc::new(RecordingExecutor::default());
        let d = dispatcher(executor.clone());
        let t0 = Instant::now();

        executor.set_failing(true);
        assert!(matches!(d.dispatch("Fist", t0), Dispatch::Failed(_)));

        executor.set_failing(false);
        assert!(d.dispatch("Fist", t0 + Duration::from_millis(10)).fired().is_some());
        assert_eq!(executor.count(), 2);
    }

    #[test]
    fn test_replace_actions_takes_effect() {
        let executor = Arc::new(RecordingExecutor::default());
        let d = dispatcher(executor.clone());

        let mut map = HashMap::new();
        map.insert("Wave".to_string(), Action::Preset(Preset::NextTab));
        d.replace_actions(map);

        let now = Instant::now();
        assert_eq!(d.dispatch("Fist", now), Dispatch::Unmapped);
        assert_eq!(
            d.dispatch("Wave", now),
            Dispatch::Fired(Action::Preset(Preset::NextTab))
        );
    }
}
