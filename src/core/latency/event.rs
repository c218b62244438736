//! Latency event records.
//!
//! Every measurement the turn tracker produces is a [`LatencyEvent`]: the
//! session it belongs to, an event name and an ordered list of fields. The
//! `Display` implementation renders the line format consumed by the
//! latency-stats endpoint and offline analysis:
//!
//! ```text
//! [session_1735000000000] FIRST_AUDIO | time_to_first_audio=312.40ms
//! ```

use std::fmt::{self, Write as _};
use std::time::Duration;

use serde::Serialize;

/// Lifecycle events emitted by the turn tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LatencyEventKind {
    ConnectionStart,
    ConnectionEstablished,
    SpeechDetected,
    SpeechEnded,
    ResponseCreated,
    FirstAudio,
    FirstText,
    ResponseDone,
    Error,
    Disconnected,
}

impl LatencyEventKind {
    /// Name used in the rendered log line.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ConnectionStart => "CONNECTION_START",
            Self::ConnectionEstablished => "CONNECTION_ESTABLISHED",
            Self::SpeechDetected => "SPEECH_DETECTED",
            Self::SpeechEnded => "SPEECH_ENDED",
            Self::ResponseCreated => "RESPONSE_CREATED",
            Self::FirstAudio => "FIRST_AUDIO",
            Self::FirstText => "FIRST_TEXT",
            Self::ResponseDone => "RESPONSE_DONE",
            Self::Error => "ERROR",
            Self::Disconnected => "DISCONNECTED",
        }
    }
}

impl fmt::Display for LatencyEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Value carried by a single event field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// Timing value, rendered in milliseconds with an `ms` suffix
    Duration(Duration),
    /// Plain counter
    Count(u64),
    /// Free text (previews, error messages). Control characters are escaped
    /// when rendered so a record always stays on one line.
    Text(String),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Duration(d) => write!(f, "{:.2}ms", d.as_secs_f64() * 1000.0),
            Self::Count(n) => write!(f, "{n}"),
            Self::Text(s) => {
                for c in s.chars() {
                    if c.is_control() {
                        write!(f, "{}", c.escape_default())?;
                    } else {
                        f.write_char(c)?;
                    }
                }
                Ok(())
            }
        }
    }
}

/// A structured latency record `(session_id, event, fields)`.
#[derive(Debug, Clone, PartialEq)]
pub struct LatencyEvent {
    session_id: String,
    kind: LatencyEventKind,
    fields: Vec<(&'static str, FieldValue)>,
}

impl LatencyEvent {
    pub fn new(session_id: impl Into<String>, kind: LatencyEventKind) -> Self {
        Self {
            session_id: session_id.into(),
            kind,
            fields: Vec::new(),
        }
    }

    /// Append a timing field. `None` leaves the record untouched, which is how
    /// measurements depending on an unset timestamp are omitted.
    pub fn with_duration(mut self, key: &'static str, value: Option<Duration>) -> Self {
        if let Some(value) = value {
            self.fields.push((key, FieldValue::Duration(value)));
        }
        self
    }

    pub fn with_count(mut self, key: &'static str, value: u64) -> Self {
        self.fields.push((key, FieldValue::Count(value)));
        self
    }

    pub fn with_text(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.fields.push((key, FieldValue::Text(value.into())));
        self
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn kind(&self) -> LatencyEventKind {
        self.kind
    }

    pub fn fields(&self) -> &[(&'static str, FieldValue)] {
        &self.fields
    }

    pub fn field(&self, key: &str) -> Option<&FieldValue> {
        self.fields.iter().find(|(k, _)| *k == key).map(|(_, v)| v)
    }

    pub fn duration(&self, key: &str) -> Option<Duration> {
        match self.field(key) {
            Some(FieldValue::Duration(d)) => Some(*d),
            _ => None,
        }
    }

    pub fn count(&self, key: &str) -> Option<u64> {
        match self.field(key) {
            Some(FieldValue::Count(n)) => Some(*n),
            _ => None,
        }
    }

    pub fn text(&self, key: &str) -> Option<&str> {
        match self.field(key) {
            Some(FieldValue::Text(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Render the record as a single log line.
    pub fn to_line(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for LatencyEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.session_id, self.kind)?;
        for (key, value) in &self.fields {
            write!(f, " | {key}={value}")?;
        }
        Ok(())
    }
}
