//! End-to-end tests of the session loop over a scripted landmark feed

use gestureflow::actions::{Action, ActionExecutor};
use gestureflow::core::mouse::{MouseButton, PointerBackend, PointerError};
use gestureflow::session::{outbox, run_session, EventStream, Notice, Outbound, Status};
use gestureflow::state::{AppState, CaptureDevices, DeviceProvider};
use gestureflow::vision::{FeedError, Frame, FrameSource, JsonLineDetector};
use gestureflow::Config;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

struct NullExecutor;

impl ActionExecutor for NullExecutor {
    fn execute(&self, _action: &Action) -> bool {
        true
    }
}

struct NullPointer;

impl PointerBackend for NullPointer {
    fn screen_size(&self) -> (f64, f64) {
        (1920.0, 1080.0)
    }

    fn move_to(&mut self, _x: f64, _y: f64) -> Result<(), PointerError> {
        Ok(())
    }

    fn click(&mut self, _button: MouseButton) -> Result<(), PointerError> {
        Ok(())
    }
}

/// Replays detection lines; `None` entries are read failures.
struct ScriptedFeed {
    lines: VecDeque<Option<String>>,
    sequence: u64,
    released: Arc<Mutex<bool>>,
    delivered: Arc<AtomicUsize>,
}

impl FrameSource for ScriptedFeed {
    fn read(&mut self) -> Result<Option<Frame>, FeedError> {
        match self.lines.pop_front() {
            Some(Some(line)) => {
                self.sequence += 1;
                self.delivered.fetch_add(1, Ordering::SeqCst);
                Ok(Some(Frame {
                    sequence: self.sequence,
                    data: line.into_bytes(),
                }))
            }
            Some(None) => Err(FeedError::Read("camera hiccup".to_string())),
            None => Ok(None),
        }
    }

    fn release(&mut self) {
        *self.released.lock().unwrap() = true;
    }
}

struct ScriptedCamera {
    lines: Mutex<Vec<Option<String>>>,
    released: Arc<Mutex<bool>>,
    delivered: Arc<AtomicUsize>,
}

impl ScriptedCamera {
    fn new(lines: Vec<Option<String>>) -> Self {
        Self {
            lines: Mutex::new(lines),
            released: Arc::new(Mutex::new(false)),
            delivered: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl DeviceProvider for ScriptedCamera {
    fn open_capture(&self) -> Result<CaptureDevices, FeedError> {
        let lines = std::mem::take(&mut *self.lines.lock().unwrap());
        Ok(CaptureDevices {
            source: Box::new(ScriptedFeed {
                lines: lines.into(),
                sequence: 0,
                released: self.released.clone(),
                delivered: self.delivered.clone(),
            }),
            detector: Box::new(JsonLineDetector::default()),
        })
    }

    fn pointer(&self) -> Box<dyn PointerBackend> {
        Box::new(NullPointer)
    }
}

/// A detection line with one steady open hand centred near `(cx, cy)`.
fn hand_line(cx: f32, cy: f32) -> String {
    let landmarks: Vec<serde_json::Value> = (0..21)
        .map(|i| {
            let (x, y) = if i == 0 {
                (cx, cy)
            } else {
                let finger = ((i - 1) / 4) as f32;
                let joint = ((i - 1) % 4) as f32;
                (cx + (finger - 2.0) * 0.03, cy - 0.05 - joint * 0.03)
            };
            serde_json::json!({"x": x, "y": y, "z": 0.0})
        })
        .collect();
    serde_json::json!({"hands": [{"handedness": "Right", "score": 0.99, "landmarks": landmarks}]})
        .to_string()
}

fn empty_line() -> String {
    r#"{"hands":[]}"#.to_string()
}

fn state_with(dir: &tempfile::TempDir, camera: Arc<ScriptedCamera>) -> Arc<AppState> {
    let mut config = Config::default();
    config.data_path = dir.path().to_path_buf();
    config.pipeline.target_fps = 200;
    Arc::new(AppState::with_backends(config, Arc::new(NullExecutor), camera))
}

async fn next_event(events: &mut EventStream) -> Outbound {
    tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("timed out waiting for session event")
        .expect("session ended early")
}

#[tokio::test]
async fn test_training_run_completes_and_saves() {
    let dir = tempfile::tempdir().unwrap();
    let lines = (0..12).map(|_| Some(hand_line(0.5, 0.5))).collect();
    let camera = Arc::new(ScriptedCamera::new(lines));
    let state = state_with(&dir, camera.clone());

    let (command_tx, command_rx) = mpsc::channel(8);
    let (event_tx, mut event_rx) = outbox::channel();
    command_tx
        .send(r#"{"command":"start_training","label":"Wave","target_frames":10}"#.to_string())
        .await
        .unwrap();
    let session = tokio::spawn(run_session(state.clone(), command_rx, event_tx));

    for expected in 1..=10 {
        let event = next_event(&mut event_rx).await;
        let payload = event.as_status().expect("status payload");
        assert_eq!(payload.status, Status::Tracking);
        assert_eq!(payload.gesture, "Wave");
        assert_eq!(payload.frames_captured, Some(expected));
        assert_eq!(payload.target_frames, Some(10));
        assert_eq!(payload.landmarks.as_ref().map(Vec::len), Some(21));
    }
    assert_eq!(
        next_event(&mut event_rx).await,
        Outbound::Notice(Notice::TrainingComplete)
    );

    drop(command_tx);
    while let Ok(Some(event)) = tokio::time::timeout(Duration::from_secs(5), event_rx.recv()).await {
        let payload = event.as_status().expect("status payload");
        assert_eq!(payload.status, Status::Active);
        assert_eq!(payload.frames_captured, None);
    }
    session.await.unwrap();

    assert!(*camera.released.lock().unwrap());
    assert!(state.config.model_path().exists());
    let stats = state.model_stats().await;
    assert!(stats.trained);
    assert_eq!(stats.classes.get("Wave"), Some(&10));
}

#[tokio::test]
async fn test_skipped_frames_repeat_last_payload() {
    let dir = tempfile::tempdir().unwrap();
    let lines = vec![
        Some(empty_line()),
        None,
        Some(empty_line()),
        Some(empty_line()),
    ];
    let camera = Arc::new(ScriptedCamera::new(lines));
    let state = state_with(&dir, camera);

    let (command_tx, command_rx) = mpsc::channel(8);
    let (event_tx, mut event_rx) = outbox::channel();
    let session = tokio::spawn(run_session(state, command_rx, event_tx));

    // Frame 1 is skipped and repeats the initial payload
    let first = next_event(&mut event_rx).await;
    let first = first.as_status().expect("status payload");
    assert_eq!(first.gesture, "None");
    assert_eq!(first.frames_captured, None);

    // The read failure is retried silently; frame 2 is processed
    let second = next_event(&mut event_rx).await;
    let second = second.as_status().expect("status payload");
    assert_eq!(second.status, Status::Active);
    assert_eq!(second.frames_captured, Some(0));

    // Frame 3 is skipped and repeats frame 2
    let third = next_event(&mut event_rx).await;
    assert_eq!(third.as_status(), Some(second));

    drop(command_tx);
    session.await.unwrap();
}

#[tokio::test]
async fn test_malformed_commands_do_not_end_session() {
    let dir = tempfile::tempdir().unwrap();
    let camera = Arc::new(ScriptedCamera::new(vec![Some(empty_line()), Some(empty_line())]));
    let state = state_with(&dir, camera);

    let (command_tx, command_rx) = mpsc::channel(8);
    let (event_tx, mut event_rx) = outbox::channel();
    command_tx.send("definitely not json".to_string()).await.unwrap();
    command_tx
        .send(r#"{"command":"save_model"}"#.to_string())
        .await
        .unwrap();
    let session = tokio::spawn(run_session(state, command_rx, event_tx));

    // Statuses may interleave; the reply must still arrive
    while next_event(&mut event_rx).await != Outbound::Notice(Notice::ModelSaved) {}

    drop(command_tx);
    session.await.unwrap();
}

#[tokio::test]
async fn test_stalled_client_gets_latest_payload_without_blocking_loop() {
    let dir = tempfile::tempdir().unwrap();
    let frames = 40;
    let lines = (0..frames)
        .map(|i| Some(hand_line(0.1 + 0.01 * i as f32, 0.5)))
        .collect();
    let camera = Arc::new(ScriptedCamera::new(lines));
    let mut config = Config::default();
    config.data_path = dir.path().to_path_buf();
    config.pipeline.target_fps = 200;
    config.pipeline.process_every_n = 1;
    let state = Arc::new(AppState::with_backends(
        config,
        Arc::new(NullExecutor),
        camera.clone(),
    ));

    let (command_tx, command_rx) = mpsc::channel(8);
    let (event_tx, mut event_rx) = outbox::channel();
    let session = tokio::spawn(run_session(state, command_rx, event_tx));

    // Nobody reads while the whole feed plays out
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while camera.delivered.load(Ordering::SeqCst) < frames {
        assert!(
            tokio::time::Instant::now() < deadline,
            "session loop stalled after {} frames",
            camera.delivered.load(Ordering::SeqCst)
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    tokio::time::sleep(Duration::from_millis(50)).await;

    let event = next_event(&mut event_rx).await;
    let payload = event.as_status().expect("status payload");
    let wrist = payload.landmarks.as_ref().expect("landmarks")[0];
    assert!((wrist[0] - 0.49).abs() < 1e-3, "stale payload, wrist x={}", wrist[0]);

    drop(command_tx);
    session.await.unwrap();
}
