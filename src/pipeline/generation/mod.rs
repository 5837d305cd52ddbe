pub mod context;
pub mod generator;
pub mod ollama;
pub mod prompt;
pub mod stream_guard;

#[cfg(test)]
pub mod mock;

pub use context::{assemble_evidence, select_mode, token_hints, AssembledEvidence};
pub use generator::Generator;
pub use ollama::{OllamaClient, OllamaGenerator};
pub use prompt::{AnswerLanguage, HistoryLine, PromptParts, RenderedPrompt, ResponseMode};
pub use stream_guard::{StreamGuard, StreamGuardConfig};

#[cfg(test)]
pub use mock::MockLlm;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GenerationError {
    #[error("Ollama connection failed: {0}")]
    Connection(String),

    #[error("Ollama returned error (HTTP {status}): {body}")]
    Http { status: u16, body: String },

    #[error("Request timed out after {0}s")]
    Timeout(u64),

    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("Response parsing error: {0}")]
    ResponseParsing(String),

    #[error("Model returned an empty response")]
    EmptyResponse,

    #[error("Generation cancelled by the client")]
    Cancelled,

    #[error("Stream aborted: {0}")]
    Degenerated(String),
}

/// Sampling settings for one call.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationOptions {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 2048,
        }
    }
}

/// Text generation backend.
///
/// `generate_streaming` pushes each increment into `token_tx` and returns
/// the full text. A closed receiver means the consumer went away: the
/// implementation must stop producing and return `Cancelled`.
pub trait LlmGenerate: Send + Sync {
    fn generate(
        &self,
        system: &str,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<String, GenerationError>;

    fn generate_streaming(
        &self,
        system: &str,
        prompt: &str,
        options: &GenerationOptions,
        token_tx: std::sync::mpsc::Sender<String>,
    ) -> Result<String, GenerationError>;

    fn model_name(&self) -> &str;
}

impl LlmGenerate for Box<dyn LlmGenerate> {
    fn generate(
        &self,
        system: &str,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<String, GenerationError> {
        (**self).generate(system, prompt, options)
    }

    fn generate_streaming(
        &self,
        system: &str,
        prompt: &str,
        options: &GenerationOptions,
        token_tx: std::sync::mpsc::Sender<String>,
    ) -> Result<String, GenerationError> {
        (**self).generate_streaming(system, prompt, options, token_tx)
    }

    fn model_name(&self) -> &str {
        (**self).model_name()
    }
}
