//! Frame acquisition and landmark detection.
//!
//! The camera and the hand-landmark model live outside this crate. A
//! [`FrameSource`] hands out opaque frames and a [`LandmarkDetector`] turns a
//! frame into zero or more hands. [`SubprocessFeed`] is the stock
//! implementation: a helper process (typically a MediaPipe script) owns the
//! camera and the model, and prints one JSON detection per line.
//!
//! # Wire format
//!
//! ```text
//! READY
//! {"hands":[{"handedness":"Right","score":0.97,"landmarks":[{"x":0.5,"y":0.4,"z":0.0}, ...]}]}
//! {"hands":[]}
//! ```

use crate::vision::landmarks::{HandLandmarks, Landmark};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError};
use serde::Deserialize;
use std::io::{BufRead, BufReader};
use std::process::{Child, Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Frames older than this many queued lines are dropped by the reader thread.
const FEED_QUEUE_DEPTH: usize = 4;

/// One captured frame, opaque to the pipeline.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Capture sequence number, starting at 1
    pub sequence: u64,
    /// Encoded frame payload
    pub data: Vec<u8>,
}

/// Errors from acquiring or decoding frames.
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("Failed to start landmark feed `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Landmark feed did not signal ready, got: {0:?}")]
    NotReady(String),
    #[error("Landmark feed closed")]
    Closed,
    #[error("Failed to read frame: {0}")]
    Read(String),
    #[error("Invalid detection payload: {0}")]
    Decode(String),
    #[error("Detector timestamp {got} is not after {last}")]
    NonMonotonicTimestamp { last: u64, got: u64 },
}

/// Produces camera frames.
pub trait FrameSource: Send {
    /// Read the next frame.
    ///
    /// `Ok(None)` means no frame was ready in time; callers retry on the next
    /// tick. `Err` is a transient read failure unless it is [`FeedError::Closed`].
    fn read(&mut self) -> Result<Option<Frame>, FeedError>;

    /// Release the underlying device.
    fn release(&mut self) {}
}

/// Detects hands in a frame.
pub trait LandmarkDetector: Send {
    /// Detect hands. `timestamp_ms` must strictly increase per detector.
    fn detect(&mut self, frame: &Frame, timestamp_ms: u64) -> Result<Vec<HandLandmarks>, FeedError>;
}

/// JSON structures emitted by the helper process.
#[derive(Deserialize, Debug)]
struct LandmarkJson {
    x: f32,
    y: f32,
    z: f32,
}

#[derive(Deserialize, Debug)]
struct HandJson {
    #[serde(default)]
    handedness: String,
    #[serde(default = "default_score")]
    score: f32,
    landmarks: Vec<LandmarkJson>,
}

fn default_score() -> f32 {
    1.0
}

#[derive(Deserialize, Debug)]
struct DetectionJson {
    hands: Vec<HandJson>,
    #[serde(default)]
    error: Option<String>,
}

/// Helper process that captures the camera and emits detections.
pub struct SubprocessFeed {
    process: Child,
    receiver: Receiver<Vec<u8>>,
    reader: Option<JoinHandle<()>>,
    read_timeout: Duration,
    sequence: u64,
}

impl SubprocessFeed {
    /// Start the helper and wait up to `open_timeout` for its `READY` line.
    ///
    /// The handshake runs on the reader thread, so a helper that hangs while
    /// opening the camera is killed instead of blocking the caller.
    pub fn spawn(
        command: &str,
        args: &[String],
        read_timeout: Duration,
        open_timeout: Duration,
    ) -> Result<Self, FeedError> {
        tracing::info!("Starting landmark feed: {} {}", command, args.join(" "));

        let mut process = Command::new(command)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|source| FeedError::Spawn {
                command: command.to_string(),
                source,
            })?;

        let stdout = match process.stdout.take() {
            Some(stdout) => stdout,
            None => {
                let _ = process.kill();
                return Err(FeedError::Closed);
            }
        };

        let (ready_tx, ready_rx) = bounded::<Result<(), FeedError>>(1);
        // Bounded so a stalled pipeline never accumulates stale frames.
        let (sender, receiver) = bounded::<Vec<u8>>(FEED_QUEUE_DEPTH);
        let drain = receiver.clone();
        let reader = thread::spawn(move || {
            let mut stdout = BufReader::new(stdout);
            let mut ready_line = String::new();
            let handshake = match stdout.read_line(&mut ready_line) {
                Ok(_) if ready_line.trim() == "READY" => Ok(()),
                Ok(_) => Err(FeedError::NotReady(ready_line.trim().to_string())),
                Err(e) => Err(FeedError::Read(e.to_string())),
            };
            let ready = handshake.is_ok();
            if ready_tx.send(handshake).is_err() || !ready {
                return;
            }

            for line in stdout.split(b'\n') {
                let Ok(line) = line else { break };
                if line.is_empty() {
                    continue;
                }
                if sender.is_full() {
                    let _ = drain.try_recv();
                }
                if sender.send(line).is_err() {
                    break;
                }
            }
            tracing::debug!("Landmark feed reader exiting");
        });

        let handshake = match ready_rx.recv_timeout(open_timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => Err(FeedError::NotReady(format!(
                "nothing within {:?}",
                open_timeout
            ))),
            Err(RecvTimeoutError::Disconnected) => Err(FeedError::Closed),
        };
        if let Err(e) = handshake {
            tracing::warn!("Landmark feed failed to start: {}", e);
            // The reader thread ends on its own once the pipe closes
            let _ = process.kill();
            let _ = process.wait();
            return Err(e);
        }

        tracing::info!("Landmark feed ready");

        Ok(Self {
            process,
            receiver,
            reader: Some(reader),
            read_timeout,
            sequence: 0,
        })
    }
}

impl FrameSource for SubprocessFeed {
    fn read(&mut self) -> Result<Option<Frame>, FeedError> {
        match self.receiver.recv_timeout(self.read_timeout) {
            Ok(data) => {
                self.sequence += 1;
                Ok(Some(Frame {
                    sequence: self.sequence,
                    data,
                }))
            }
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(FeedError::Closed),
        }
    }

    fn release(&mut self) {
        let _ = self.process.kill();
        let _ = self.process.wait();
        if let Some(handle) = self.reader.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for SubprocessFeed {
    fn drop(&mut self) {
        self.release();
    }
}

/// Decodes the JSON detections carried by [`SubprocessFeed`] frames.
#[derive(Debug)]
pub struct JsonLineDetector {
    min_score: f32,
    last_timestamp: Option<u64>,
}

impl JsonLineDetector {
    pub fn new(min_score: f32) -> Self {
        Self {
            min_score: min_score.clamp(0.0, 1.0),
            last_timestamp: None,
        }
    }
}

impl Default for JsonLineDetector {
    fn default() -> Self {
        Self::new(0.5)
    }
}

impl LandmarkDetector for JsonLineDetector {
    fn detect(&mut self, frame: &Frame, timestamp_ms: u64) -> Result<Vec<HandLandmarks>, FeedError> {
        if let Some(last) = self.last_timestamp {
            if timestamp_ms <= last {
                return Err(FeedError::NonMonotonicTimestamp {
                    last,
                    got: timestamp_ms,
                });
            }
        }
        self.last_timestamp = Some(timestamp_ms);

        let result: DetectionJson =
            serde_json::from_slice(&frame.data).map_err(|e| FeedError::Decode(e.to_string()))?;

        if let Some(error) = result.error {
            tracing::warn!("Landmark feed error: {}", error);
            return Ok(Vec::new());
        }

        let hands = result
            .hands
            .into_iter()
            .filter(|hand| hand.score >= self.min_score)
            .filter_map(|hand| {
                let points: Vec<Landmark> = hand
                    .landmarks
                    .iter()
                    .map(|lm| Landmark::new(lm.x, lm.y, lm.z))
                    .collect();
                let parsed = HandLandmarks::from_slice(&points);
                if parsed.is_none() {
                    tracing::warn!(
                        "Expected 21 landmarks, got {} ({})",
                        points.len(),
                        hand.handedness
                    );
                }
                parsed
            })
            .collect();

        Ok(hands)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(json: &str) -> Frame {
        Frame {
            sequence: 1,
            data: json.as_bytes().to_vec(),
        }
    }

    fn hand_json(points: usize, score: f32) -> String {
        let lms: Vec<String> = (0..points)
            .map(|i| format!(r#"{{"x":{},"y":0.5,"z":0.0}}"#, i as f32 / 100.0))
            .collect();
        format!(
            r#"{{"handedness":"Right","score":{score},"landmarks":[{}]}}"#,
            lms.join(",")
        )
    }

    #[test]
    fn test_decodes_hands() {
        let mut detector = JsonLineDetector::default();
        let json = format!(r#"{{"hands":[{}]}}"#, hand_json(21, 0.9));
        let hands = detector.detect(&frame(&json), 1).unwrap();
        assert_eq!(hands.len(), 1);
        assert!((hands[0].get(20).x - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_skips_incomplete_and_low_score_hands() {
        let mut detector = JsonLineDetector::new(0.5);
        let json = format!(
            r#"{{"hands":[{},{}]}}"#,
            hand_json(20, 0.9),
            hand_json(21, 0.2)
        );
        assert!(detector.detect(&frame(&json), 1).unwrap().is_empty());
    }

    #[test]
    fn test_rejects_non_monotonic_timestamps() {
        let mut detector = JsonLineDetector::default();
        detector.detect(&frame(r#"{"hands":[]}"#), 5).unwrap();
        let err = detector.detect(&frame(r#"{"hands":[]}"#), 5).unwrap_err();
        assert!(matches!(err, FeedError::NonMonotonicTimestamp { last: 5, got: 5 }));
    }

    #[test]
    fn test_feed_error_payload_is_empty_detection() {
        let mut detector = JsonLineDetector::default();
        let hands = detector
            .detect(&frame(r#"{"hands":[],"error":"camera busy"}"#), 1)
            .unwrap();
        assert!(hands.is_empty());
    }

    #[test]
    fn test_garbage_is_decode_error() {
        let mut detector = JsonLineDetector::default();
        assert!(matches!(
            detector.detect(&frame("not json"), 1),
            Err(FeedError::Decode(_))
        ));
    }

    #[test]
    fn test_missing_helper_is_spawn_error() {
        let result = SubprocessFeed::spawn(
            "/nonexistent/gestureflow-feed",
            &[],
            Duration::from_millis(10),
            Duration::from_secs(1),
        );
        assert!(matches!(result, Err(FeedError::Spawn { .. })));
    }

    #[cfg(unix)]
    fn shell_feed(script: &str, open_timeout: Duration) -> Result<SubprocessFeed, FeedError> {
        SubprocessFeed::spawn(
            "sh",
            &["-c".to_string(), script.to_string()],
            Duration::from_secs(2),
            open_timeout,
        )
    }

    #[cfg(unix)]
    #[test]
    fn test_hung_helper_times_out() {
        let started = std::time::Instant::now();
        let result = shell_feed("sleep 5", Duration::from_millis(200));

        assert!(matches!(result, Err(FeedError::NotReady(_))));
        assert!(
            started.elapsed() < Duration::from_secs(3),
            "spawn took {:?}",
            started.elapsed()
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_helper_without_ready_line_is_rejected() {
        match shell_feed("echo hello", Duration::from_secs(5)) {
            Err(FeedError::NotReady(line)) => assert_eq!(line, "hello"),
            Err(e) => panic!("unexpected error: {e}"),
            Ok(_) => panic!("helper without READY was accepted"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_reads_lines_then_reports_closed() {
        let mut feed = shell_feed(
            r#"echo READY; echo '{"hands":[]}'"#,
            Duration::from_secs(5),
        )
        .unwrap();

        let frame = feed.read().unwrap().expect("frame");
        assert_eq!(frame.sequence, 1);
        assert_eq!(frame.data, br#"{"hands":[]}"#.to_vec());

        let mut closed = false;
        for _ in 0..5 {
            match feed.read() {
                Err(FeedError::Closed) => {
                    closed = true;
                    break;
                }
                Ok(None) => continue,
                other => panic!("unexpected read result: {:?}", other.map(|f| f.is_some())),
            }
        }
        assert!(closed);
        feed.release();
    }
}
