use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

use serde::Serialize;

use crate::pipeline::classify::EmergencyConfig;
use crate::pipeline::generation::context::DEFAULT_CONTEXT_TOKEN_BUDGET;
use crate::pipeline::generation::StreamGuardConfig;
use crate::pipeline::retrieval::search::MAX_CITED_SOURCES;

/// Application-level constants
pub const APP_NAME: &str = "MedRelay";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

const DEFAULT_BIND: &str = "127.0.0.1:8000";
const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
const DEFAULT_MODEL: &str = "llama3.1:8b";
const DEFAULT_LLM_TIMEOUT_SECS: u64 = 120;
const DEFAULT_TRANSLATE_TIMEOUT_SECS: u64 = 15;

/// Default tracing filter when `RUST_LOG` is unset.
pub fn default_log_filter() -> &'static str {
    "medrelay_lib=info,tower_http=warn"
}

/// Application data directory: ~/MedRelay/, or ./MedRelay when no home
/// directory can be determined.
pub fn app_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

/// Default knowledge-base file.
pub fn default_knowledge_path() -> PathBuf {
    app_data_dir().join("knowledge.json")
}

// ═══════════════════════════════════════════════════════════
// PipelineConfig
// ═══════════════════════════════════════════════════════════

/// Per-turn tunables.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineConfig {
    /// Chunks retrieved for the prompt.
    pub top_k: usize,
    /// Inclusive floor for prompt evidence.
    pub min_relevance: f32,
    /// Upper bound on cited sources.
    pub max_cited: usize,
    /// History turns sent with RAG turns.
    pub rag_history_turns: usize,
    /// History turns sent with plain chat turns.
    pub chat_history_turns: usize,
    pub context_token_budget: usize,
    pub negation_window: usize,
    pub trailing_negation_window: usize,
    /// Ask the model when keywords cannot decide the domain.
    pub classifier_fallback: bool,
    /// Fail the turn instead of passing text through untranslated.
    pub require_translation: bool,
    #[serde(skip)]
    pub stream_guard: StreamGuardConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let emergency = EmergencyConfig::default();
        Self {
            top_k: 5,
            min_relevance: 0.3,
            max_cited: MAX_CITED_SOURCES,
            rag_history_turns: 6,
            chat_history_turns: 10,
            context_token_budget: DEFAULT_CONTEXT_TOKEN_BUDGET,
            negation_window: emergency.negation_window,
            trailing_negation_window: emergency.trailing_negation_window,
            classifier_fallback: true,
            require_translation: false,
            stream_guard: StreamGuardConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn emergency(&self) -> EmergencyConfig {
        EmergencyConfig {
            negation_window: self.negation_window,
            trailing_negation_window: self.trailing_negation_window,
        }
    }
}

// ═══════════════════════════════════════════════════════════
// AppConfig
// ═══════════════════════════════════════════════════════════

/// Process configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind: SocketAddr,
    pub ollama_url: String,
    pub model: String,
    /// Ollama embedding model; `None` selects the offline hashing embedder.
    pub embed_model: Option<String>,
    /// LibreTranslate-compatible endpoint; `None` runs the relay degraded.
    pub translate_url: Option<String>,
    pub translate_api_key: Option<String>,
    pub knowledge_path: PathBuf,
    pub llm_timeout_secs: u64,
    pub translate_timeout_secs: u64,
    pub pipeline: PipelineConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 8000)),
            ollama_url: DEFAULT_OLLAMA_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            embed_model: None,
            translate_url: None,
            translate_api_key: None,
            knowledge_path: default_knowledge_path(),
            llm_timeout_secs: DEFAULT_LLM_TIMEOUT_SECS,
            translate_timeout_secs: DEFAULT_TRANSLATE_TIMEOUT_SECS,
            pipeline: PipelineConfig::default(),
        }
    }
}

impl AppConfig {
    /// Defaults overridden by `MEDRELAY_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) over an arbitrary source.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let mut config = Self::default();

        config.bind = parse_or(get("MEDRELAY_BIND"), "MEDRELAY_BIND", config.bind);
        if let Some(url) = get("MEDRELAY_OLLAMA_URL") {
            config.ollama_url = url;
        }
        if let Some(model) = get("MEDRELAY_MODEL") {
            config.model = model;
        }
        config.embed_model = get("MEDRELAY_EMBED_MODEL");
        config.translate_url = get("MEDRELAY_TRANSLATE_URL");
        config.translate_api_key = get("MEDRELAY_TRANSLATE_API_KEY");
        if let Some(path) = get("MEDRELAY_KB_PATH") {
            config.knowledge_path = PathBuf::from(path);
        }
        config.llm_timeout_secs = parse_or(
            get("MEDRELAY_LLM_TIMEOUT_SECS"),
            "MEDRELAY_LLM_TIMEOUT_SECS",
            config.llm_timeout_secs,
        );
        config.pipeline.negation_window = parse_or(
            get("MEDRELAY_NEGATION_WINDOW"),
            "MEDRELAY_NEGATION_WINDOW",
            config.pipeline.negation_window,
        );
        config.pipeline.classifier_fallback = parse_or(
            get("MEDRELAY_CLASSIFIER_FALLBACK"),
            "MEDRELAY_CLASSIFIER_FALLBACK",
            config.pipeline.classifier_fallback,
        );
        config.pipeline.require_translation = parse_or(
            get("MEDRELAY_REQUIRE_TRANSLATION"),
            "MEDRELAY_REQUIRE_TRANSLATION",
            config.pipeline.require_translation,
        );

        config
    }
}

fn parse_or<T: FromStr>(raw: Option<String>, key: &str, default: T) -> T {
    match raw {
        None => default,
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, "Invalid configuration value, using default");
            default
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_without_environment() {
        let config = AppConfig::from_lookup(|_| None);
        assert_eq!(config.bind.to_string(), DEFAULT_BIND);
        assert_eq!(config.model, DEFAULT_MODEL);
        assert!(config.translate_url.is_none());
        assert!(config.embed_model.is_none());
        assert_eq!(config.pipeline.negation_window, 4);
        assert_eq!(config.pipeline.top_k, 5);
        assert_eq!(config.pipeline.max_cited, 3);
    }

    #[test]
    fn environment_overrides() {
        let config = AppConfig::from_lookup(lookup(&[
            ("MEDRELAY_BIND", "0.0.0.0:9000"),
            ("MEDRELAY_TRANSLATE_URL", "http://localhost:5000"),
            ("MEDRELAY_NEGATION_WINDOW", "6"),
            ("MEDRELAY_KB_PATH", "/tmp/kb.json"),
            ("MEDRELAY_REQUIRE_TRANSLATION", "true"),
        ]));
        assert_eq!(config.bind.port(), 9000);
        assert_eq!(config.translate_url.as_deref(), Some("http://localhost:5000"));
        assert_eq!(config.pipeline.negation_window, 6);
        assert_eq!(config.pipeline.emergency().negation_window, 6);
        assert_eq!(config.knowledge_path, PathBuf::from("/tmp/kb.json"));
        assert!(config.pipeline.require_translation);
    }

    #[test]
    fn invalid_values_fall_back() {
        let config = AppConfig::from_lookup(lookup(&[
            ("MEDRELAY_BIND", "not an address"),
            ("MEDRELAY_NEGATION_WINDOW", "-1"),
            ("MEDRELAY_MODEL", "   "),
        ]));
        assert_eq!(config.bind.to_string(), DEFAULT_BIND);
        assert_eq!(config.pipeline.negation_window, 4);
        assert_eq!(config.model, DEFAULT_MODEL);
    }

    #[test]
    fn app_data_dir_ends_with_app_name() {
        assert!(app_data_dir().ends_with("MedRelay"));
        assert!(default_knowledge_path().ends_with("knowledge.json"));
    }

    #[test]
    fn app_version_matches_cargo() {
        assert_eq!(APP_VERSION, "0.1.0");
    }
}
