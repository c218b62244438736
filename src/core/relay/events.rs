//! Upstream server events the relay extracts metrics from.
//!
//! Only the `type` discriminator and a couple of payload fields are decoded.
//! Every other field is ignored and the raw message is forwarded untouched,
//! so decoding here never constrains what the upstream may send.

use serde::Deserialize;

use crate::core::bridge::RelayMessage;
use crate::core::latency::TurnTracker;

const UNKNOWN_ERROR: &str = "Unknown error";

/// Server events that drive the turn tracker.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type")]
pub enum UpstreamEvent {
    #[serde(rename = "input_audio_buffer.speech_started")]
    SpeechStarted,

    #[serde(rename = "input_audio_buffer.speech_stopped")]
    SpeechStopped,

    #[serde(rename = "response.created")]
    ResponseCreated,

    /// Streaming audio chunk; `delta` is base64 audio
    #[serde(rename = "response.output_audio.delta", alias = "response.audio.delta")]
    AudioDelta {
        #[serde(default)]
        delta: String,
    },

    /// Streaming transcript or text chunk
    #[serde(
        rename = "response.output_audio_transcript.delta",
        alias = "response.audio_transcript.delta",
        alias = "response.output_text.delta",
        alias = "response.text.delta"
    )]
    TextDelta {
        #[serde(default)]
        delta: String,
    },

    #[serde(rename = "response.done")]
    ResponseDone,

    #[serde(rename = "error")]
    Error {
        #[serde(default)]
        error: Option<ErrorDetail>,
    },

    /// Any other well-formed event
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ErrorDetail {
    #[serde(default)]
    pub message: Option<String>,
}

impl UpstreamEvent {
    /// Decode a relayed message. `None` means no metrics for this message.
    pub fn decode(message: &RelayMessage) -> Option<Self> {
        let text = message.as_text()?;
        serde_json::from_str(text).ok()
    }

    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::SpeechStarted => "speech_started",
            Self::SpeechStopped => "speech_stopped",
            Self::ResponseCreated => "response_created",
            Self::AudioDelta { .. } => "audio_delta",
            Self::TextDelta { .. } => "text_delta",
            Self::ResponseDone => "response_done",
            Self::Error { .. } => "error",
            Self::Other => "other",
        }
    }

    /// Message carried by an error event.
    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::Error { error } => Some(
                error
                    .as_ref()
                    .and_then(|detail| detail.message.as_deref())
                    .unwrap_or(UNKNOWN_ERROR),
            ),
            _ => None,
        }
    }

    /// Feed this event to the session's tracker.
    pub fn apply(&self, tracker: &mut TurnTracker) {
        match self {
            Self::SpeechStarted => {
                tracker.on_speech_detected();
            }
            Self::SpeechStopped => {
                tracker.on_speech_ended();
            }
            Self::ResponseCreated => {
                tracker.on_response_created();
            }
            Self::AudioDelta { delta } => {
                tracker.on_first_audio(delta.len());
            }
            Self::TextDelta { delta } => {
                tracker.on_first_text(delta);
            }
            Self::ResponseDone => {
                tracker.on_response_done();
            }
            Self::Error { .. } => {
                let message = self.error_message().unwrap_or(UNKNOWN_ERROR);
                tracing::warn!(
                    session_id = %tracker.session_id(),
                    "Upstream reported error: {}",
                    message
                );
                tracker.on_error(message);
            }
            Self::Other => {}
        }
    }
}

/// Structured error sent to the client when the upstream cannot be reached.
pub fn connect_error_message(message: &str) -> RelayMessage {
    let payload = serde_json::json!({
        "type": "error",
        "error": { "message": message },
    });
    RelayMessage::Text(payload.to_string())
}
