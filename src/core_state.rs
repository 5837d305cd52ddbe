//! Process-wide application state.
//!
//! `CoreState` is built once at startup and shared behind an `Arc` by every
//! HTTP handler. The knowledge base, embedding index and service clients are
//! read-only after construction; the only mutable part is the session store,
//! which serializes turns per session.

use std::path::Path;
use std::time::Instant;

use crate::config::AppConfig;
use crate::pipeline::classify::EmergencyDetector;
use crate::pipeline::generation::{GenerationError, LlmGenerate, OllamaClient, OllamaGenerator};
use crate::pipeline::mask::EntityMask;
use crate::pipeline::retrieval::{
    CachedEmbedder, EmbeddingModel, HashingEmbedder, KnowledgeBase, OllamaEmbedder,
    RetrievalError,
};
use crate::pipeline::translation::{HttpTranslator, TranslationError, Translator};
use crate::pipeline::TurnPipeline;
use crate::session::SessionStore;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("LLM client setup failed: {0}")]
    Generation(#[from] GenerationError),
    #[error("Translation client setup failed: {0}")]
    Translation(#[from] TranslationError),
    #[error("Knowledge base error: {0}")]
    Retrieval(#[from] RetrievalError),
}

// ═══════════════════════════════════════════════════════════
// CoreState
// ═══════════════════════════════════════════════════════════

pub struct CoreState {
    config: AppConfig,
    knowledge: KnowledgeBase,
    embedder: Box<dyn EmbeddingModel>,
    mask: EntityMask,
    detector: EmergencyDetector,
    llm: Box<dyn LlmGenerate>,
    translator: Option<Box<dyn Translator>>,
    /// Separate client for model availability probes.
    ollama: Option<OllamaClient>,
    sessions: SessionStore,
    started_at: Instant,
}

impl CoreState {
    /// Build every service from configuration. Blocking: call this before
    /// the async runtime starts.
    ///
    /// A missing or unreadable knowledge file is not fatal: the server
    /// starts with an empty knowledge base and answers without evidence.
    pub fn from_config(config: AppConfig) -> Result<Self, CoreError> {
        let llm = OllamaGenerator::new(
            OllamaClient::new(&config.ollama_url, config.llm_timeout_secs)?,
            config.model.clone(),
        );
        let ollama = OllamaClient::new(&config.ollama_url, config.llm_timeout_secs)?;

        let embedder = build_embedder(&config)?;
        let knowledge = load_knowledge(&config.knowledge_path, embedder.as_ref());

        let translator: Option<Box<dyn Translator>> = match config.translate_url.as_deref() {
            Some(url) => {
                let client = HttpTranslator::new(
                    url,
                    config.translate_api_key.clone(),
                    config.translate_timeout_secs,
                )?;
                tracing::info!(url, "Translation service configured");
                Some(Box::new(client))
            }
            None => {
                tracing::warn!("No translation service configured, relay runs in passthrough");
                None
            }
        };

        tracing::info!(
            model = %config.model,
            embedder = embedder.name(),
            chunks = knowledge.len(),
            "Core state ready"
        );

        Ok(Self {
            detector: EmergencyDetector::new(config.pipeline.emergency()),
            mask: EntityMask::default(),
            knowledge,
            embedder,
            llm: Box::new(llm),
            translator,
            ollama: Some(ollama),
            sessions: SessionStore::new(),
            started_at: Instant::now(),
            config,
        })
    }

    /// Assemble state from ready-made services. No network clients are
    /// created, so this is safe inside an async context.
    pub fn with_services(
        config: AppConfig,
        knowledge: KnowledgeBase,
        embedder: Box<dyn EmbeddingModel>,
        llm: Box<dyn LlmGenerate>,
        translator: Option<Box<dyn Translator>>,
    ) -> Self {
        Self {
            detector: EmergencyDetector::new(config.pipeline.emergency()),
            mask: EntityMask::default(),
            knowledge,
            embedder,
            llm,
            translator,
            ollama: None,
            sessions: SessionStore::new(),
            started_at: Instant::now(),
            config,
        }
    }

    /// Borrowed pipeline over the shared services.
    pub fn pipeline(&self) -> TurnPipeline<'_> {
        TurnPipeline::new(
            &self.knowledge,
            self.embedder.as_ref(),
            &self.mask,
            &self.detector,
            self.llm.as_ref(),
            &self.config.pipeline,
        )
        .with_translator(self.translator.as_deref())
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn knowledge(&self) -> &KnowledgeBase {
        &self.knowledge
    }

    pub fn embedder(&self) -> &dyn EmbeddingModel {
        self.embedder.as_ref()
    }

    pub fn mask(&self) -> &EntityMask {
        &self.mask
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn model_name(&self) -> &str {
        self.llm.model_name()
    }

    pub fn translator_name(&self) -> Option<&str> {
        self.translator.as_deref().map(|t| t.name())
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    /// Ask Ollama whether the chat model is installed. `None` when the
    /// state was built without a live client. Blocking.
    pub fn probe_model(&self) -> Option<Result<bool, GenerationError>> {
        self.ollama
            .as_ref()
            .map(|client| client.is_model_available(&self.config.model))
    }
}

fn build_embedder(config: &AppConfig) -> Result<Box<dyn EmbeddingModel>, CoreError> {
    let Some(model) = config.embed_model.as_deref() else {
        tracing::info!("Using offline hashing embedder");
        return Ok(Box::new(CachedEmbedder::new(HashingEmbedder::new())));
    };
    let client = OllamaClient::new(&config.ollama_url, config.llm_timeout_secs)?;
    match OllamaEmbedder::connect(client, model) {
        Ok(embedder) => Ok(Box::new(CachedEmbedder::new(embedder))),
        Err(e) => {
            tracing::warn!(model, error = %e, "Embedding model unavailable, using hashing embedder");
            Ok(Box::new(CachedEmbedder::new(HashingEmbedder::new())))
        }
    }
}

fn load_knowledge(path: &Path, embedder: &dyn EmbeddingModel) -> KnowledgeBase {
    let mut knowledge = KnowledgeBase::new();
    if !path.exists() {
        tracing::warn!(path = %path.display(), "Knowledge file not found, starting empty");
        return knowledge;
    }
    if let Err(e) = knowledge.load_json(path, embedder) {
        tracing::error!(path = %path.display(), error = %e, "Knowledge file rejected, starting empty");
        return KnowledgeBase::new();
    }
    knowledge
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::generation::MockLlm;
    use crate::pipeline::translation::MockTranslator;
    use std::io::Write;

    const KNOWLEDGE: &str = r#"[
        {"id": "headache_1", "title": "Headache", "title_tr": "Baş ağrısı",
         "content": "Most headaches are tension headaches. Rest and fluids help.",
         "category": "neurology", "source_name": "MedlinePlus"},
        {"id": "fever_1", "title": "Fever", "content": "A fever above 38C in adults.",
         "category": "general", "source": "NHS"}
    ]"#;

    fn knowledge_file(raw: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        file.write_all(raw.as_bytes()).unwrap();
        file
    }

    #[test]
    fn loads_knowledge_from_disk() {
        let file = knowledge_file(KNOWLEDGE);
        let embedder = HashingEmbedder::new();
        let knowledge = load_knowledge(file.path(), &embedder);
        assert_eq!(knowledge.len(), 2);
        assert_eq!(knowledge.categories().get("neurology"), Some(&1));
    }

    #[test]
    fn missing_knowledge_file_starts_empty() {
        let embedder = HashingEmbedder::new();
        let knowledge = load_knowledge(Path::new("/nonexistent/knowledge.json"), &embedder);
        assert!(knowledge.is_empty());
    }

    #[test]
    fn malformed_knowledge_file_starts_empty() {
        let file = knowledge_file(r#"{"not": "a list"}"#);
        let embedder = HashingEmbedder::new();
        assert!(load_knowledge(file.path(), &embedder).is_empty());
    }

    #[test]
    fn services_are_exposed_through_state() {
        let state = CoreState::with_services(
            AppConfig::default(),
            KnowledgeBase::new(),
            Box::new(HashingEmbedder::new()),
            Box::new(MockLlm::new("ok")),
            Some(Box::new(MockTranslator::new())),
        );
        assert_eq!(state.model_name(), MockLlm::new("ok").model_name());
        assert!(state.translator_name().is_some());
        assert!(state.probe_model().is_none());
        assert!(state.sessions().is_empty());
    }

    #[test]
    fn pipeline_answers_a_greeting_without_the_model() {
        let state = CoreState::with_services(
            AppConfig::default(),
            KnowledgeBase::new(),
            Box::new(HashingEmbedder::new()),
            Box::new(MockLlm::failing("offline")),
            None,
        );
        let outcome = state
            .pipeline()
            .run_turn(&crate::pipeline::TurnRequest::new("merhaba", &[]))
            .unwrap();
        assert!(outcome.metadata.disposition.is_canned());
    }
}
