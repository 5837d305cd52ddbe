//! Scripted `LlmGenerate` for tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use super::{GenerationError, GenerationOptions, LlmGenerate};

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub system: String,
    pub prompt: String,
    pub temperature: f32,
}

/// Mock LLM returning canned output. Streams `pieces` when set, otherwise
/// the response split after each space.
pub struct MockLlm {
    response: String,
    pieces: Option<Vec<String>>,
    failure: Option<GenerationError>,
    fail_after_pieces: Option<usize>,
    calls: AtomicUsize,
    recorded: Mutex<Vec<RecordedCall>>,
}

impl MockLlm {
    pub fn new(response: &str) -> Self {
        Self {
            response: response.to_string(),
            pieces: None,
            failure: None,
            fail_after_pieces: None,
            calls: AtomicUsize::new(0),
            recorded: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(message: &str) -> Self {
        let mut mock = Self::new("");
        mock.failure = Some(GenerationError::Connection(message.to_string()));
        mock
    }

    pub fn streaming(pieces: &[&str]) -> Self {
        let mut mock = Self::new(&pieces.concat());
        mock.pieces = Some(pieces.iter().map(|p| p.to_string()).collect());
        mock
    }

    /// Stream `n` pieces, then fail with a timeout.
    pub fn failing_after(mut self, n: usize) -> Self {
        self.fail_after_pieces = Some(n);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn recorded(&self) -> Vec<RecordedCall> {
        self.recorded.lock().unwrap().clone()
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.recorded.lock().unwrap().last().map(|c| c.prompt.clone())
    }

    fn record(&self, system: &str, prompt: &str, options: &GenerationOptions) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.recorded.lock().unwrap().push(RecordedCall {
            system: system.to_string(),
            prompt: prompt.to_string(),
            temperature: options.temperature,
        });
    }

    fn stream_pieces(&self) -> Vec<String> {
        match &self.pieces {
            Some(p) => p.clone(),
            None => self
                .response
                .split_inclusive(' ')
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl LlmGenerate for MockLlm {
    fn generate(
        &self,
        system: &str,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<String, GenerationError> {
        self.record(system, prompt, options);
        match &self.failure {
            Some(e) => Err(e.clone()),
            None => Ok(self.response.clone()),
        }
    }

    fn generate_streaming(
        &self,
        system: &str,
        prompt: &str,
        options: &GenerationOptions,
        token_tx: std::sync::mpsc::Sender<String>,
    ) -> Result<String, GenerationError> {
        self.record(system, prompt, options);
        if let Some(e) = &self.failure {
            return Err(e.clone());
        }
        let mut full = String::new();
        for (i, piece) in self.stream_pieces().into_iter().enumerate() {
            if self.fail_after_pieces == Some(i) {
                return Err(GenerationError::Timeout(120));
            }
            full.push_str(&piece);
            token_tx.send(piece).map_err(|_| GenerationError::Cancelled)?;
        }
        Ok(full)
    }

    fn model_name(&self) -> &str {
        "mock"
    }
}
