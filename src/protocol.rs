//! Wire contract for the duplex session connection.
//!
//! One WebSocket carries two payload kinds: JSON text control frames and
//! raw binary audio. Control frames are a closed set; anything else is
//! rejected at this boundary instead of being silently ignored.

use serde_json::{json, Value};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    Start,
    End,
}

/// Progress markers emitted while a server pipeline run is underway.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Recognition,
    Reply,
    Synthesis,
}

impl PipelineStage {
    pub fn wire_name(self) -> &'static str {
        match self {
            PipelineStage::Recognition => "processing_asr",
            PipelineStage::Reply => "processing_gpt",
            PipelineStage::Synthesis => "processing_tts",
        }
    }

    fn from_wire(name: &str) -> Option<Self> {
        match name {
            "processing_asr" => Some(PipelineStage::Recognition),
            "processing_gpt" => Some(PipelineStage::Reply),
            "processing_tts" => Some(PipelineStage::Synthesis),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlMessage {
    /// Upstream `{"state": "start" | "end"}` bracketing one utterance.
    State(TurnState),
    /// Downstream `{"status": ...}` pipeline progress.
    Status(PipelineStage),
    /// Downstream `{"message": ...}` reply text preceding the audio payload.
    Reply(String),
    /// Downstream `{"error": ...}` pipeline or validation failure.
    Error(String),
    /// Downstream `{"type": "welcome", "message": ...}` sent once on connect.
    Welcome(String),
}

impl ControlMessage {
    pub fn parse(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| Error::Protocol(format!("invalid JSON control frame: {e}")))?;
        let obj = value
            .as_object()
            .ok_or_else(|| Error::Protocol("control frame is not a JSON object".to_string()))?;

        if let Some(state) = obj.get("state") {
            return match state.as_str() {
                Some("start") => Ok(ControlMessage::State(TurnState::Start)),
                Some("end") => Ok(ControlMessage::State(TurnState::End)),
                other => Err(Error::Protocol(format!("unknown state {other:?}"))),
            };
        }
        if let Some(status) = obj.get("status") {
            return status
                .as_str()
                .and_then(PipelineStage::from_wire)
                .map(ControlMessage::Status)
                .ok_or_else(|| Error::Protocol(format!("unknown status {status}")));
        }
        if let Some(kind) = obj.get("type") {
            if kind.as_str() != Some("welcome") {
                return Err(Error::Protocol(format!("unknown frame type {kind}")));
            }
            let message = obj
                .get("message")
                .and_then(|m| m.as_str())
                .ok_or_else(|| Error::Protocol("welcome frame without message".to_string()))?;
            return Ok(ControlMessage::Welcome(message.to_string()));
        }
        if let Some(message) = obj.get("message") {
            let message = message
                .as_str()
                .ok_or_else(|| Error::Protocol("message field is not a string".to_string()))?;
            return Ok(ControlMessage::Reply(message.to_string()));
        }
        if let Some(error) = obj.get("error") {
            let error = error
                .as_str()
                .ok_or_else(|| Error::Protocol("error field is not a string".to_string()))?;
            return Ok(ControlMessage::Error(error.to_string()));
        }

        Err(Error::Protocol(format!("unrecognized control frame: {text}")))
    }

    pub fn to_text(&self) -> String {
        match self {
            ControlMessage::State(TurnState::Start) => json!({"state": "start"}).to_string(),
            ControlMessage::State(TurnState::End) => json!({"state": "end"}).to_string(),
            ControlMessage::Status(stage) => json!({"status": stage.wire_name()}).to_string(),
            ControlMessage::Reply(text) => json!({"message": text}).to_string(),
            ControlMessage::Error(text) => json!({"error": text}).to_string(),
            ControlMessage::Welcome(text) => {
                json!({"type": "welcome", "message": text}).to_string()
            }
        }
    }
}
