//! Client commands and outbound session events.

use serde::{Deserialize, Serialize};

/// Commands a client may send over the session socket.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    StartTraining {
        #[serde(default = "default_label")]
        label: String,
        #[serde(default)]
        target_frames: Option<u32>,
    },
    StopTraining,
    SaveModel,
    ToggleMouse,
    UpdateMapping {
        #[serde(default)]
        gesture: String,
        #[serde(default)]
        action: String,
        #[serde(default = "default_action_type")]
        action_type: String,
        #[serde(default)]
        keys: String,
    },
}

fn default_label() -> String {
    "gesture".to_string()
}

fn default_action_type() -> String {
    "preset".to_string()
}

impl Command {
    /// Parse one text message. Returns `None` for anything that is not a
    /// known command.
    pub fn parse(raw: &str) -> Option<Self> {
        match serde_json::from_str(raw) {
            Ok(command) => Some(command),
            Err(e) => {
                tracing::debug!("Ignoring client message ({}): {}", e, raw);
                None
            }
        }
    }
}

/// Per-tick session status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Active,
    HandLost,
    Tracking,
    MovingTooFast,
    TrainingComplete,
}

/// The status payload sent once per tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusPayload {
    pub gesture: String,
    pub confidence: f64,
    pub landmarks: Option<Vec<[f64; 2]>>,
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frames_captured: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_frames: Option<u32>,
}

impl StatusPayload {
    /// Nothing recognized yet.
    pub fn idle() -> Self {
        Self {
            gesture: crate::core::dispatcher::NONE_LABEL.to_string(),
            confidence: 0.0,
            landmarks: None,
            status: Status::Active,
            action: None,
            frames_captured: None,
            target_frames: None,
        }
    }
}

/// One-off notices outside the per-tick stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Notice {
    TrainingComplete,
    ModelSaved,
    MappingUpdated { gesture: String, action: String },
}

/// Anything a session sends to its client, in order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Outbound {
    Notice(Notice),
    Status(StatusPayload),
    Error { error: String },
}

impl Outbound {
    pub fn to_json(&self) -> String {
        // Serializing these types cannot fail: no maps with non-string keys.
        serde_json::to_string(self).unwrap_or_else(|_| String::from("{}"))
    }

    pub fn as_status(&self) -> Option<&StatusPayload> {
        match self {
            Outbound::Status(payload) => Some(payload),
            _ => None,
        }
    }
}

impl From<StatusPayload> for Outbound {
    fn from(payload: StatusPayload) -> Self {
        Outbound::Status(payload)
    }
}

impl From<Notice> for Outbound {
    fn from(notice: Notice) -> Self {
        Outbound::Notice(notice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_commands() {
        assert_eq!(
            Command::parse(r#"{"command":"start_training","label":"Fist","target_frames":50}"#),
            Some(Command::StartTraining {
                label: "Fist".to_string(),
                target_frames: Some(50),
            })
        );
        assert_eq!(
            Command::parse(r#"{"command":"start_training"}"#),
            Some(Command::StartTraining {
                label: "gesture".to_string(),
                target_frames: None,
            })
        );
        assert_eq!(Command::parse(r#"{"command":"toggle_mouse"}"#), Some(Command::ToggleMouse));
    }

    #[test]
    fn test_malformed_commands_ignored() {
        assert_eq!(Command::parse("not json"), None);
        assert_eq!(Command::parse(r#"{"command":"self_destruct"}"#), None);
        assert_eq!(Command::parse(r#"{"label":"Fist"}"#), None);
    }

    #[test]
    fn test_status_payload_omits_empty_fields() {
        let value = serde_json::to_value(Outbound::from(StatusPayload::idle())).unwrap();
        assert_eq!(
            value,
            json!({"gesture": "None", "confidence": 0.0, "landmarks": null, "status": "active"})
        );
    }

    #[test]
    fn test_notice_shapes() {
        assert_eq!(
            serde_json::to_value(Outbound::from(Notice::TrainingComplete)).unwrap(),
            json!({"status": "training_complete"})
        );
        assert_eq!(
            serde_json::to_value(Outbound::from(Notice::MappingUpdated {
                gesture: "Fist".to_string(),
                action: "Volume Mute".to_string(),
            }))
            .unwrap(),
            json!({"status": "mapping_updated", "gesture": "Fist", "action": "Volume Mute"})
        );
        assert_eq!(
            serde_json::to_value(Outbound::Error {
                error: "no camera".to_string()
            })
            .unwrap(),
            json!({"error": "no camera"})
        );
    }

    #[test]
    fn test_outbound_roundtrip_distinguishes_notice_from_status() {
        let parsed: Outbound = serde_json::from_str(r#"{"status":"model_saved"}"#).unwrap();
        assert_eq!(parsed, Outbound::Notice(Notice::ModelSaved));

        let parsed: Outbound = serde_json::from_str(
            r#"{"gesture":"Fist","confidence":0.9,"landmarks":null,"status":"active"}"#,
        )
        .unwrap();
        assert!(parsed.as_status().is_some());
    }
}
