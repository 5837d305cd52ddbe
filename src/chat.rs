//! Streaming delivery: the events one turn emits, their SSE encoding, and
//! a client-side transcript that checks ordering and rebuilds the text.
//!
//! A turn emits any number of `chunk` events followed by exactly one
//! `done` or `error`. Chunks are incremental; concatenating them in order
//! gives the `response` carried by `done`.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::pipeline::retrieval::RetrievedSource;
use crate::pipeline::{TurnMetadata, TurnOutcome};

/// A client that sees neither `done` nor `error` for this long gives up.
pub const STREAM_IDLE_TIMEOUT: Duration = Duration::from_secs(180);

// ═══════════════════════════════════════════
// Wire types
// ═══════════════════════════════════════════

/// A cited source as clients see it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CitedSource {
    pub chunk_id: String,
    pub title: String,
    pub source: String,
    pub category: String,
    pub relevance_score: f32,
}

impl From<&RetrievedSource> for CitedSource {
    fn from(s: &RetrievedSource) -> Self {
        Self {
            chunk_id: s.chunk_id.clone(),
            title: s.title.clone(),
            source: s.source_name.clone(),
            category: s.category.clone(),
            relevance_score: s.relevance_score,
        }
    }
}

/// One event of a streamed turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StreamEvent {
    Chunk {
        content: String,
    },
    Done {
        response: String,
        #[serde(default)]
        response_l2: Option<String>,
        sources: Vec<CitedSource>,
        rag_used: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        disclaimer: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        metadata: Option<TurnMetadata>,
    },
    Error {
        message: String,
    },
}

impl StreamEvent {
    pub fn chunk(content: impl Into<String>) -> Self {
        Self::Chunk {
            content: content.into(),
        }
    }

    /// Terminal event for a finished turn.
    pub fn done(outcome: &TurnOutcome) -> Self {
        Self::Done {
            response: outcome.text_l1.clone(),
            response_l2: outcome.text_l2.clone(),
            sources: outcome.sources.iter().map(CitedSource::from).collect(),
            rag_used: outcome.rag_used,
            disclaimer: Some(outcome.disclaimer().to_string()),
            metadata: Some(outcome.metadata.clone()),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done { .. } | Self::Error { .. })
    }

    /// JSON payload of the SSE `data:` field.
    pub fn to_sse_data(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Full SSE frame, `data: …` plus the blank line.
    pub fn to_sse_frame(&self) -> Result<String, serde_json::Error> {
        Ok(format!("data: {}\n\n", self.to_sse_data()?))
    }
}

// ═══════════════════════════════════════════
// Transcript
// ═══════════════════════════════════════════

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TranscriptError {
    #[error("Event received after the turn ended")]
    AfterTerminal,

    #[error("Final response does not match the streamed chunks")]
    Mismatch,

    #[error("No terminal event within {0:?}")]
    TimedOut(Duration),
}

#[derive(Debug, Clone, PartialEq)]
pub enum TranscriptState {
    Streaming,
    Done,
    Failed(String),
}

/// Client-side view of one streamed turn.
#[derive(Debug, Clone)]
pub struct StreamTranscript {
    text: String,
    chunks: usize,
    state: TranscriptState,
    timeout: Duration,
    last_event_at: Instant,
}

impl StreamTranscript {
    pub fn new(timeout: Duration) -> Self {
        Self {
            text: String::new(),
            chunks: 0,
            state: TranscriptState::Streaming,
            timeout,
            last_event_at: Instant::now(),
        }
    }

    /// Apply the next event. `done` must agree with the replayed chunks.
    pub fn apply(&mut self, event: &StreamEvent) -> Result<(), TranscriptError> {
        if self.state != TranscriptState::Streaming {
            return Err(TranscriptError::AfterTerminal);
        }
        self.last_event_at = Instant::now();
        match event {
            StreamEvent::Chunk { content } => {
                self.text.push_str(content);
                self.chunks += 1;
            }
            StreamEvent::Done { response, .. } => {
                if *response != self.text {
                    self.state = TranscriptState::Failed(TranscriptError::Mismatch.to_string());
                    return Err(TranscriptError::Mismatch);
                }
                self.state = TranscriptState::Done;
            }
            StreamEvent::Error { message } => {
                self.state = TranscriptState::Failed(message.clone());
            }
        }
        Ok(())
    }

    /// Fail the turn if it has been idle past the timeout.
    pub fn check_deadline(&mut self, now: Instant) -> Result<(), TranscriptError> {
        if self.state == TranscriptState::Streaming
            && now.saturating_duration_since(self.last_event_at) > self.timeout
        {
            self.state = TranscriptState::Failed("timed out".into());
            return Err(TranscriptError::TimedOut(self.timeout));
        }
        Ok(())
    }

    pub fn final_text(&self) -> Option<&str> {
        match self.state {
            TranscriptState::Done => Some(&self.text),
            _ => None,
        }
    }

    /// Text received so far, final or not.
    pub fn partial_text(&self) -> &str {
        &self.text
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks
    }

    pub fn state(&self) -> &TranscriptState {
        &self.state
    }
}

impl Default for StreamTranscript {
    fn default() -> Self {
        Self::new(STREAM_IDLE_TIMEOUT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn done(response: &str) -> StreamEvent {
        StreamEvent::Done {
            response: response.into(),
            response_l2: None,
            sources: vec![],
            rag_used: false,
            disclaimer: None,
            metadata: None,
        }
    }

    #[test]
    fn replaying_chunks_reconstructs_done() {
        let mut transcript = StreamTranscript::default();
        for piece in ["Bol ", "su ", "için."] {
            transcript.apply(&StreamEvent::chunk(piece)).unwrap();
        }
        transcript.apply(&done("Bol su için.")).unwrap();
        assert_eq!(transcript.final_text(), Some("Bol su için."));
        assert_eq!(transcript.chunk_count(), 3);
    }

    #[test]
    fn nothing_after_terminal() {
        let mut transcript = StreamTranscript::default();
        transcript.apply(&StreamEvent::error("boom")).unwrap();
        assert_eq!(
            transcript.apply(&StreamEvent::chunk("late")),
            Err(TranscriptError::AfterTerminal)
        );
        assert_eq!(transcript.state(), &TranscriptState::Failed("boom".into()));
        assert!(transcript.final_text().is_none());
    }

    #[test]
    fn mismatched_done_fails() {
        let mut transcript = StreamTranscript::default();
        transcript.apply(&StreamEvent::chunk("abc")).unwrap();
        assert_eq!(transcript.apply(&done("abd")), Err(TranscriptError::Mismatch));
    }

    #[test]
    fn silent_stream_times_out() {
        let mut transcript = StreamTranscript::new(Duration::from_secs(5));
        transcript.apply(&StreamEvent::chunk("a")).unwrap();
        assert!(transcript.check_deadline(Instant::now()).is_ok());
        let later = Instant::now() + Duration::from_secs(6);
        assert_eq!(
            transcript.check_deadline(later),
            Err(TranscriptError::TimedOut(Duration::from_secs(5)))
        );
        assert_eq!(transcript.partial_text(), "a");
    }

    #[test]
    fn sse_encoding_is_tagged() {
        let chunk = StreamEvent::chunk("merhaba").to_sse_data().unwrap();
        assert_eq!(chunk, r#"{"type":"chunk","content":"merhaba"}"#);

        let frame = done("x").to_sse_frame().unwrap();
        assert!(frame.starts_with(r#"data: {"type":"done","response":"x""#));
        assert!(frame.contains(r#""rag_used":false"#));
        assert!(frame.ends_with("\n\n"));

        let error = StreamEvent::error("fail").to_sse_data().unwrap();
        assert_eq!(error, r#"{"type":"error","message":"fail"}"#);
    }

    #[test]
    fn cited_source_uses_wire_names() {
        let source = RetrievedSource {
            chunk_id: "kb_general_0".into(),
            relevance_score: 0.8,
            title: "Headache".into(),
            source_name: "MedlinePlus".into(),
            category: "general".into(),
        };
        let cited = CitedSource::from(&source);
        let json = serde_json::to_value(&cited).unwrap();
        assert_eq!(json["source"], "MedlinePlus");
        assert_eq!(json["title"], "Headache");
    }
}
