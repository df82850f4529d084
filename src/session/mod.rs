//! Per-connection session loop.
//!
//! A session starts in prediction mode and switches to training on
//! `start_training`. Each tick takes at most one client command, grabs one
//! frame, runs the pipeline and emits an ordered batch of [`Outbound`]
//! events:
//!
//! ```text
//! command? ─▶ frame ─▶ skip? ─▶ detect ─▶ normalize ─┬─▶ QC gate ─▶ add_sample   (training)
//!                                                    └─▶ mouse ─▶ predict ─▶ dispatch (predicting)
//! ```

pub mod outbox;
pub mod protocol;

pub use outbox::{EventSender, EventStream};
pub use protocol::{Command, Notice, Outbound, Status, StatusPayload};

use crate::actions::GestureConfigEntry;
use crate::core::dispatcher::{Dispatch, NONE_LABEL};
use crate::core::mouse::{MouseEngine, PointerBackend};
use crate::core::quality::{QualityGate, QualityVerdict};
use crate::state::{AppState, CaptureDevices};
use crate::vision::feed::FeedError;
use crate::vision::landmarks::{normalize, round4, HandLandmarks};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::Instrument;
use uuid::Uuid;

/// Session mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    Predicting,
    Training { label: String },
}

/// State owned by one connection.
pub struct Session {
    id: Uuid,
    state: Arc<AppState>,
    mode: Mode,
    target_frames: u32,
    frames_captured: u32,
    gate: QualityGate,
    mouse: MouseEngine,
    mouse_enabled: bool,
    frame_count: u64,
    started: Instant,
    last_timestamp: Option<u64>,
    last_payload: StatusPayload,
}

impl Session {
    pub fn new(state: Arc<AppState>, pointer: Box<dyn PointerBackend>) -> Self {
        let pipeline = &state.config.pipeline;
        let gate = QualityGate::new(pipeline.qc_velocity_threshold);
        let mouse_enabled = pipeline.mouse_enabled;
        let target_frames = pipeline.default_target_frames.max(1);
        let mouse = MouseEngine::new(state.config.mouse.clone(), pointer);

        Self {
            id: Uuid::new_v4(),
            state,
            mode: Mode::Predicting,
            target_frames,
            frames_captured: 0,
            gate,
            mouse,
            mouse_enabled,
            frame_count: 0,
            started: Instant::now(),
            last_timestamp: None,
            last_payload: StatusPayload::idle(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn mode(&self) -> &Mode {
        &self.mode
    }

    pub fn is_training(&self) -> bool {
        matches!(self.mode, Mode::Training { .. })
    }

    pub fn frames_captured(&self) -> u32 {
        self.frames_captured
    }

    pub fn mouse_enabled(&self) -> bool {
        self.mouse_enabled
    }

    /// The payload repeated on skipped frames.
    pub fn last_payload(&self) -> &StatusPayload {
        &self.last_payload
    }

    /// Apply one client command.
    pub async fn handle_command(&mut self, command: Command) -> Vec<Outbound> {
        match command {
            Command::StartTraining {
                label,
                target_frames,
            } => {
                self.target_frames = target_frames
                    .unwrap_or(self.state.config.pipeline.default_target_frames)
                    .max(1);
                self.frames_captured = 0;
                self.gate.reset();
                tracing::info!(
                    "Training started for label: {} (target: {} frames)",
                    label,
                    self.target_frames
                );
                self.mode = Mode::Training { label };
                Vec::new()
            }
            Command::StopTraining => {
                self.mode = Mode::Predicting;
                if let Err(e) = self.state.train_and_save().await {
                    tracing::error!("Failed to save model: {}", e);
                }
                tracing::info!("Training stopped, model retrained and saved");
                vec![Notice::TrainingComplete.into()]
            }
            Command::SaveModel => match self.state.save_model().await {
                Ok(()) => vec![Notice::ModelSaved.into()],
                Err(e) => {
                    tracing::error!("Failed to save model: {}", e);
                    vec![Outbound::Error {
                        error: e.to_string(),
                    }]
                }
            },
            Command::ToggleMouse => {
                self.mouse_enabled = !self.mouse_enabled;
                tracing::info!(
                    "Mouse control {}",
                    if self.mouse_enabled { "enabled" } else { "disabled" }
                );
                Vec::new()
            }
            Command::UpdateMapping {
                gesture,
                action,
                action_type,
                keys,
            } => {
                if gesture.is_empty() || (action.is_empty() && keys.is_empty()) {
                    return Vec::new();
                }
                let entry = GestureConfigEntry::new(gesture.clone(), action_type, action.clone(), keys);
                match self.state.upsert_gesture(entry) {
                    Ok(_) => vec![Notice::MappingUpdated { gesture, action }.into()],
                    Err(e) => {
                        tracing::warn!("Rejected mapping for '{}': {}", gesture, e);
                        vec![Outbound::Error {
                            error: e.to_string(),
                        }]
                    }
                }
            }
        }
    }

    /// Count a captured frame and decide whether it gets processed.
    ///
    /// Training processes every frame; prediction only every Nth.
    pub fn next_frame(&mut self) -> bool {
        self.frame_count += 1;
        let every_n = u64::from(self.state.config.pipeline.process_every_n.max(1));
        self.is_training() || self.frame_count % every_n == 0
    }

    /// Strictly increasing detector timestamp in milliseconds.
    fn next_timestamp(&mut self) -> u64 {
        let elapsed = self.started.elapsed().as_millis() as u64;
        let ts = match self.last_timestamp {
            Some(last) if elapsed <= last => last + 1,
            _ => elapsed,
        };
        self.last_timestamp = Some(ts);
        ts
    }

    /// Run the pipeline on the first detected hand (if any).
    pub async fn process(&mut self, hand: Option<&HandLandmarks>, now: Instant) -> Vec<Outbound> {
        let Some(hand) = hand else {
            return vec![self.no_hand().into()];
        };

        let features = normalize(hand);

        if self.mouse_enabled && !self.is_training() {
            self.mouse.process(hand, now);
        }

        let mut gesture = NONE_LABEL.to_string();
        let mut confidence = 0.0;
        let mut action = None;
        let mut completed = false;

        let status = match self.mode.clone() {
            Mode::Training { label } => match self.gate.check(hand.wrist()) {
                QualityVerdict::TooFast { distance } => {
                    tracing::debug!("QC rejected frame (wrist moved {:.3})", distance);
                    Status::MovingTooFast
                }
                QualityVerdict::Accepted => {
                    self.state
                        .classifier
                        .write()
                        .await
                        .add_sample(label.clone(), features);
                    self.frames_captured += 1;
                    gesture = label;
                    confidence = 1.0;

                    if self.frames_captured >= self.target_frames {
                        self.mode = Mode::Predicting;
                        completed = true;
                        if let Err(e) = self.state.train_and_save().await {
                            tracing::error!("Failed to save model: {}", e);
                        }
                        tracing::info!(
                            "Auto-stopped training after {} frames, model retrained",
                            self.frames_captured
                        );
                    }
                    Status::Tracking
                }
            },
            Mode::Predicting => {
                let prediction = self.state.classifier.read().await.predict(&features);
                if !prediction.is_unknown() {
                    action = Self::dispatch(self.state.clone(), &prediction.label, now).await;
                }
                gesture = prediction.label;
                confidence = prediction.confidence;
                Status::Active
            }
        };

        let mut payload = StatusPayload {
            gesture,
            confidence: round4(confidence),
            landmarks: Some(hand.to_xy_list()),
            status,
            action,
            frames_captured: None,
            target_frames: None,
        };
        if self.frames_captured > 0 {
            payload.frames_captured = Some(self.frames_captured);
            payload.target_frames = Some(self.target_frames);
        }

        if completed {
            self.frames_captured = 0;
            self.last_payload = StatusPayload {
                status: Status::Active,
                frames_captured: None,
                target_frames: None,
                ..payload.clone()
            };
            return vec![payload.into(), Notice::TrainingComplete.into()];
        }

        self.last_payload = payload.clone();
        vec![payload.into()]
    }

    fn no_hand(&mut self) -> StatusPayload {
        let training = self.is_training();
        if training {
            self.gate.reset();
        }
        let payload = StatusPayload {
            status: if training { Status::HandLost } else { Status::Active },
            frames_captured: Some(if training { self.frames_captured } else { 0 }),
            ..StatusPayload::idle()
        };
        self.last_payload = payload.clone();
        payload
    }

    /// Hand the label to the shared dispatcher off the async thread.
    async fn dispatch(state: Arc<AppState>, gesture: &str, now: Instant) -> Option<String> {
        let label = gesture.to_string();
        match tokio::task::spawn_blocking(move || state.dispatcher.dispatch(&label, now)).await {
            Ok(Dispatch::Fired(action)) => Some(action.to_string()),
            Ok(_) => None,
            Err(e) => {
                tracing::warn!("Action dispatch task failed: {}", e);
                None
            }
        }
    }
}

fn lock(devices: &Mutex<CaptureDevices>) -> std::sync::MutexGuard<'_, CaptureDevices> {
    devices.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Drive one session until the client goes away or the camera fails.
///
/// `commands` carries raw client text messages. Status payloads published
/// to `events` replace any the client has not read yet; notices and errors
/// are delivered in order.
pub async fn run_session(
    state: Arc<AppState>,
    commands: mpsc::Receiver<String>,
    events: EventSender,
) {
    let session = Session::new(state.clone(), state.devices().pointer());
    let span = tracing::info_span!("session", id = %session.id());
    session_loop(session, commands, events).instrument(span).await
}

async fn session_loop(
    mut session: Session,
    mut commands: mpsc::Receiver<String>,
    events: EventSender,
) {
    let state = session.state.clone();
    let frame_interval = state.config.pipeline.frame_interval();
    let command_poll = state.config.pipeline.command_poll();

    tracing::info!("Client connected");

    let provider = state.devices().clone();
    let opened = tokio::task::spawn_blocking(move || provider.open_capture()).await;
    let devices = match opened {
        Ok(Ok(devices)) => Arc::new(Mutex::new(devices)),
        Ok(Err(e)) => {
            tracing::error!("Cannot open camera: {}", e);
            let _ = events.send(Outbound::Error { error: e.to_string() }).await;
            return;
        }
        Err(e) => {
            tracing::error!("Camera open task failed: {}", e);
            let _ = events.send(Outbound::Error { error: e.to_string() }).await;
            return;
        }
    };

    'ticks: loop {
        let tick_start = Instant::now();

        match tokio::time::timeout(command_poll, commands.recv()).await {
            Ok(Some(raw)) => {
                if let Some(command) = Command::parse(&raw) {
                    for event in session.handle_command(command).await {
                        if !events.send(event).await {
                            break 'ticks;
                        }
                    }
                }
            }
            Ok(None) => break,
            Err(_) => {}
        }

        let reader = devices.clone();
        let frame = match tokio::task::spawn_blocking(move || lock(&reader).source.read()).await {
            Ok(Ok(Some(frame))) => frame,
            Ok(Ok(None)) => {
                tokio::time::sleep(frame_interval).await;
                continue;
            }
            Ok(Err(FeedError::Closed)) => {
                tracing::error!("Landmark feed closed");
                let _ = events
                    .send(Outbound::Error {
                        error: FeedError::Closed.to_string(),
                    })
                    .await;
                break;
            }
            Ok(Err(e)) => {
                tracing::warn!("Frame capture failed, retrying: {}", e);
                tokio::time::sleep(frame_interval).await;
                continue;
            }
            Err(e) => {
                tracing::error!("Frame read task failed: {}", e);
                break;
            }
        };

        let outbound = if session.next_frame() {
            let timestamp = session.next_timestamp();
            let detector = devices.clone();
            let detected = tokio::task::spawn_blocking(move || {
                lock(&detector).detector.detect(&frame, timestamp)
            })
            .await;
            let hands = match detected {
                Ok(Ok(hands)) => hands,
                Ok(Err(e)) => {
                    tracing::debug!("Detection failed: {}", e);
                    Vec::new()
                }
                Err(e) => {
                    tracing::warn!("Detection task failed: {}", e);
                    Vec::new()
                }
            };
            session.process(hands.first(), Instant::now()).await
        } else {
            vec![session.last_payload().clone().into()]
        };

        for event in outbound {
            if !events.send(event).await {
                break 'ticks;
            }
        }

        tokio::time::sleep(frame_interval.saturating_sub(tick_start.elapsed())).await;
    }

    let releasing = devices.clone();
    if let Err(e) = tokio::task::spawn_blocking(move || lock(&releasing).source.release()).await {
        tracing::warn!("Camera release task failed: {}", e);
    }
    tracing::info!("Client disconnected, camera and detector released");
}
