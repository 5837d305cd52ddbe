use std::sync::mpsc;

use super::prompt::PromptParts;
use super::stream_guard::{StreamGuard, StreamGuardConfig};
use super::{GenerationError, LlmGenerate};

/// Runs one assembled prompt through an [`LlmGenerate`] backend.
pub struct Generator<'a> {
    llm: &'a dyn LlmGenerate,
    guard_config: StreamGuardConfig,
}

impl<'a> Generator<'a> {
    pub fn new(llm: &'a dyn LlmGenerate, guard_config: StreamGuardConfig) -> Self {
        Self { llm, guard_config }
    }

    pub fn model_name(&self) -> &str {
        self.llm.model_name()
    }

    /// Single call, full text back. Whitespace-only output is an error.
    pub fn generate_atomic(&self, parts: &PromptParts) -> Result<String, GenerationError> {
        let rendered = parts.render();
        tracing::debug!(
            model = self.llm.model_name(),
            prompt_chars = rendered.prompt.len(),
            temperature = rendered.options.temperature,
            "Generating"
        );

        let text = self
            .llm
            .generate(&rendered.system, &rendered.prompt, &rendered.options)?;
        let text = text.trim();
        if text.is_empty() {
            return Err(GenerationError::EmptyResponse);
        }
        Ok(text.to_string())
    }

    /// Stream pieces to `on_piece` as the backend produces them.
    ///
    /// The backend runs on a scoped producer thread; this thread consumes,
    /// checks every piece against the stream guard, then hands it on.
    /// `on_piece` returning `false` means the consumer went away: the
    /// receiver is dropped, which stops the producer at its next send.
    /// Returns the concatenation of every forwarded piece.
    pub fn generate_streaming<F>(
        &self,
        parts: &PromptParts,
        mut on_piece: F,
    ) -> Result<String, GenerationError>
    where
        F: FnMut(&str) -> bool,
    {
        let rendered = parts.render();
        let mut guard = StreamGuard::new(self.guard_config.clone());
        let llm = self.llm;

        std::thread::scope(|scope| {
            let (tx, rx) = mpsc::channel::<String>();
            let producer = scope.spawn(move || {
                llm.generate_streaming(&rendered.system, &rendered.prompt, &rendered.options, tx)
            });

            let mut forwarded = String::new();
            let mut stopped: Option<GenerationError> = None;
            for piece in rx.iter() {
                if let Err(abort) = guard.feed(&piece) {
                    stopped = Some(GenerationError::Degenerated(abort.to_string()));
                    break;
                }
                if !on_piece(&piece) {
                    stopped = Some(GenerationError::Cancelled);
                    break;
                }
                forwarded.push_str(&piece);
            }
            drop(rx);

            let produced = producer
                .join()
                .map_err(|_| GenerationError::HttpClient("generation thread panicked".into()))?;

            if let Some(err) = stopped {
                tracing::warn!(pieces = guard.total_pieces(), error = %err, "Stream stopped early");
                return Err(err);
            }
            produced?;

            if forwarded.trim().is_empty() {
                return Err(GenerationError::EmptyResponse);
            }
            Ok(forwarded)
        })
    }
}
