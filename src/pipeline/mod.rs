pub mod classify;
pub mod generation;
pub mod mask;
pub mod orchestrator;
pub mod retrieval;
pub mod text;
pub mod translation;

pub use orchestrator::{TurnPipeline, TurnRequest};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use classify::{DomainBasis, DomainVerdict, GreetingKind, DISCLAIMER, EMERGENCY_DISCLAIMER};
use generation::{GenerationError, ResponseMode};
use mask::MaskError;
use retrieval::RetrievedSource;

use crate::session::SessionError;

/// Why a turn failed. Domain rejection and emergencies are not errors:
/// they end up in [`TurnDisposition`].
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Knowledge retrieval unavailable: {0}")]
    RetrievalUnavailable(String),

    #[error("Translation unavailable: {0}")]
    TranslationUnavailable(String),

    #[error("Medicine placeholder lost in translation: {0}")]
    MaskCorruption(#[from] MaskError),

    #[error("Generation failed: {0}")]
    GenerationFailed(#[from] GenerationError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),
}

impl PipelineError {
    /// The client went away mid-stream.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::GenerationFailed(GenerationError::Cancelled))
    }
}

/// How a turn was answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnDisposition {
    /// Generated from the model.
    Answered,
    Greeting(GreetingKind),
    OffTopic,
    TopicChange,
    Unclear,
    /// Canned directive: call emergency services.
    Emergency,
}

impl TurnDisposition {
    pub fn is_canned(self) -> bool {
        self != Self::Answered
    }
}

/// Per-turn diagnostics. Degraded paths stay visible here even when the
/// user-facing text looks like a normal answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnMetadata {
    pub disposition: TurnDisposition,
    pub domain: DomainVerdict,
    pub basis: DomainBasis,
    pub is_emergency: bool,
    pub mode: ResponseMode,
    pub translation_degraded: bool,
    pub retrieval_unavailable: bool,
    pub translation_calls: usize,
    /// Chunks that cleared the retrieval floor.
    pub retrieved: usize,
    pub cited: usize,
    pub model: Option<String>,
}

/// Result of one turn, atomic or streamed.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub text_l1: String,
    /// L2 shadow to cache on the assistant turn.
    pub text_l2: Option<String>,
    pub sources: Vec<RetrievedSource>,
    pub rag_used: bool,
    pub metadata: TurnMetadata,
}

impl TurnOutcome {
    pub fn is_emergency(&self) -> bool {
        self.metadata.is_emergency
    }

    pub fn disclaimer(&self) -> &'static str {
        if self.metadata.is_emergency {
            EMERGENCY_DISCLAIMER
        } else {
            DISCLAIMER
        }
    }
}
