//! Per-session turn tracker.
//!
//! The tracker consumes lifecycle events observed on the upstream stream and
//! turns them into latency measurements. Every timestamp is an explicit
//! `Option<Instant>` sampled from the monotonic clock; a measurement whose
//! reference timestamp is unset is omitted from the emitted record rather
//! than reported as zero. `RESPONSE_DONE` is the exception: it is not emitted
//! at all before speech has ended, and its `end_to_end` falls back to zero.
//!
//! A reply cycle starts at `response.created`: the first-audio/first-text
//! latches and the chunk/byte counters are reset there, so each cycle reports
//! its own time-to-first-audio and totals.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

use super::event::{LatencyEvent, LatencyEventKind};
use super::sink::LatencySink;

/// Maximum number of characters of a text delta kept as preview.
pub const TEXT_PREVIEW_CHARS: usize = 50;

/// Duration from `earlier` to `later`, or `None` when `earlier` is unset.
/// Never negative.
fn elapsed_since(later: Instant, earlier: Option<Instant>) -> Option<Duration> {
    earlier.map(|earlier| later.saturating_duration_since(earlier))
}

fn as_millis_f64(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}

/// Point-in-time view of a tracker, exposed through the session registry.
#[derive(Debug, Clone, Serialize)]
pub struct TurnSnapshot {
    pub session_id: String,
    pub connected: bool,
    pub connection_latency_ms: Option<f64>,
    pub session_age_ms: f64,
    pub request_count: u64,
    pub audio_chunks_received: u64,
    pub total_audio_bytes: u64,
    pub awaiting_first_audio: bool,
}

/// Latency state machine for one session.
pub struct TurnTracker {
    session_id: String,
    sink: Arc<dyn LatencySink>,
    created_at: Instant,

    connection_start: Option<Instant>,
    connection_established: Option<Instant>,

    speech_detected_at: Option<Instant>,
    speech_ended_at: Option<Instant>,

    response_created_at: Option<Instant>,
    first_audio_at: Option<Instant>,
    first_text_at: Option<Instant>,
    response_done_at: Option<Instant>,

    audio_chunks_received: u64,
    total_audio_bytes: u64,
    request_count: u64,
}

impl TurnTracker {
    pub fn new(session_id: impl Into<String>, sink: Arc<dyn LatencySink>) -> Self {
        Self {
            session_id: session_id.into(),
            sink,
            created_at: Instant::now(),
            connection_start: None,
            connection_established: None,
            speech_detected_at: None,
            speech_ended_at: None,
            response_created_at: None,
            first_audio_at: None,
            first_text_at: None,
            response_done_at: None,
            audio_chunks_received: 0,
            total_audio_bytes: 0,
            request_count: 0,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn request_count(&self) -> u64 {
        self.request_count
    }

    pub fn audio_chunks_received(&self) -> u64 {
        self.audio_chunks_received
    }

    pub fn total_audio_bytes(&self) -> u64 {
        self.total_audio_bytes
    }

    pub fn response_created_at(&self) -> Option<Instant> {
        self.response_created_at
    }

    pub fn first_audio_at(&self) -> Option<Instant> {
        self.first_audio_at
    }

    pub fn first_text_at(&self) -> Option<Instant> {
        self.first_text_at
    }

    pub fn response_done_at(&self) -> Option<Instant> {
        self.response_done_at
    }

    fn event(&self, kind: LatencyEventKind) -> LatencyEvent {
        LatencyEvent::new(self.session_id.clone(), kind)
    }

    fn emit(&self, event: LatencyEvent) -> LatencyEvent {
        self.sink.record(&event);
        event
    }

    pub fn on_connection_start(&mut self) -> LatencyEvent {
        self.connection_start = Some(Instant::now());
        self.emit(self.event(LatencyEventKind::ConnectionStart))
    }

    pub fn on_connection_established(&mut self) -> LatencyEvent {
        let now = Instant::now();
        self.connection_established = Some(now);
        let event = self
            .event(LatencyEventKind::ConnectionEstablished)
            .with_duration("latency", elapsed_since(now, self.connection_start));
        self.emit(event)
    }

    pub fn on_speech_detected(&mut self) -> LatencyEvent {
        self.speech_detected_at = Some(Instant::now());
        self.request_count += 1;
        let event = self
            .event(LatencyEventKind::SpeechDetected)
            .with_count("request_num", self.request_count);
        self.emit(event)
    }

    pub fn on_speech_ended(&mut self) -> LatencyEvent {
        let now = Instant::now();
        self.speech_ended_at = Some(now);
        let event = self
            .event(LatencyEventKind::SpeechEnded)
            .with_duration("speech_duration", elapsed_since(now, self.speech_detected_at));
        self.emit(event)
    }

    /// Start a new reply cycle.
    ///
    /// Clears the first-audio/first-text latches and the chunk/byte counters
    /// unconditionally, even if the previous cycle never reached
    /// `response.done`.
    pub fn on_response_created(&mut self) -> LatencyEvent {
        let now = Instant::now();
        self.response_created_at = Some(now);
        self.first_audio_at = None;
        self.first_text_at = None;
        self.audio_chunks_received = 0;
        self.total_audio_bytes = 0;

        let event = self
            .event(LatencyEventKind::ResponseCreated)
            .with_duration("processing_latency", elapsed_since(now, self.speech_ended_at));
        self.emit(event)
    }

    /// Count one audio chunk; emits `FIRST_AUDIO` only for the first chunk of
    /// the current reply cycle.
    pub fn on_first_audio(&mut self, chunk_size: usize) -> Option<LatencyEvent> {
        self.audio_chunks_received += 1;
        self.total_audio_bytes += chunk_size as u64;

        if self.first_audio_at.is_some() {
            return None;
        }

        let now = Instant::now();
        self.first_audio_at = Some(now);
        let event = self
            .event(LatencyEventKind::FirstAudio)
            .with_duration("time_to_first_audio", elapsed_since(now, self.speech_ended_at));
        Some(self.emit(event))
    }

    /// Emits `FIRST_TEXT` only for the first text delta of the current reply
    /// cycle.
    pub fn on_first_text(&mut self, text: &str) -> Option<LatencyEvent> {
        if self.first_text_at.is_some() {
            return None;
        }

        let now = Instant::now();
        self.first_text_at = Some(now);
        let preview: String = text.chars().take(TEXT_PREVIEW_CHARS).collect();
        let event = self
            .event(LatencyEventKind::FirstText)
            .with_duration("time_to_first_text", elapsed_since(now, self.speech_ended_at))
            .with_text("preview", preview);
        Some(self.emit(event))
    }

    /// Close the reply cycle. The record is only emitted once the utterance
    /// has ended; `end_to_end` reads zero when speech start was never seen.
    pub fn on_response_done(&mut self) -> Option<LatencyEvent> {
        let now = Instant::now();
        self.response_done_at = Some(now);

        let total = elapsed_since(now, self.speech_ended_at)?;
        let end_to_end = elapsed_since(now, self.speech_detected_at).unwrap_or(Duration::ZERO);

        let event = self
            .event(LatencyEventKind::ResponseDone)
            .with_duration("total_response_time", Some(total))
            .with_duration("end_to_end", Some(end_to_end))
            .with_count("audio_chunks", self.audio_chunks_received)
            .with_count("audio_bytes", self.total_audio_bytes);
        Some(self.emit(event))
    }

    pub fn on_error(&mut self, message: &str) -> LatencyEvent {
        let event = self.event(LatencyEventKind::Error).with_text("message", message);
        self.emit(event)
    }

    pub fn on_disconnect(&mut self) -> LatencyEvent {
        let now = Instant::now();
        let event = self
            .event(LatencyEventKind::Disconnected)
            .with_duration("session_duration", elapsed_since(now, self.connection_established))
            .with_count("total_requests", self.request_count);
        self.emit(event)
    }

    pub fn snapshot(&self) -> TurnSnapshot {
        let now = Instant::now();
        TurnSnapshot {
            session_id: self.session_id.clone(),
            connected: self.connection_established.is_some(),
            connection_latency_ms: self
                .connection_established
                .and_then(|established| elapsed_since(established, self.connection_start))
                .map(as_millis_f64),
            session_age_ms: as_millis_f64(now.saturating_duration_since(self.created_at)),
            request_count: self.request_count,
            audio_chunks_received: self.audio_chunks_received,
            total_audio_bytes: self.total_audio_bytes,
            awaiting_first_audio: self.response_created_at.is_some()
                && self.first_audio_at.is_none(),
        }
    }
}
