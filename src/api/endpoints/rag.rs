//! Retrieval-augmented chat and knowledge-base inspection.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use futures_util::Stream;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::endpoints::turn::{run_atomic, start_streaming};
use crate::api::error::ApiError;
use crate::api::types::{ApiContext, RagChatRequest};
use crate::chat::CitedSource;
use crate::core_state::CoreState;
use crate::pipeline::mask::{unmask, UnmaskStyle};
use crate::pipeline::retrieval::Retriever;
use crate::pipeline::text::truncate_chars;
use crate::pipeline::{PipelineError, TurnMetadata, TurnOutcome};

/// Upper bound on `top_k` for `/rag/search`.
const MAX_SEARCH_RESULTS: usize = 20;
const EXCERPT_CHARS: usize = 240;

// ═══════════════════════════════════════════════════════════
// Chat
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Serialize)]
pub struct RagChatResponse {
    pub response: String,
    pub response_l2: Option<String>,
    pub rag_used: bool,
    pub sources: Vec<CitedSource>,
    pub is_emergency: bool,
    pub disclaimer: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<Uuid>,
    pub metadata: TurnMetadata,
}

impl RagChatResponse {
    fn new(outcome: TurnOutcome, session_id: Option<Uuid>) -> Self {
        Self {
            is_emergency: outcome.is_emergency(),
            disclaimer: outcome.disclaimer(),
            sources: outcome.sources.iter().map(CitedSource::from).collect(),
            rag_used: outcome.rag_used,
            response: outcome.text_l1,
            response_l2: outcome.text_l2,
            session_id,
            metadata: outcome.metadata,
        }
    }
}

/// `POST /rag/chat`
pub async fn chat(
    State(ctx): State<ApiContext>,
    Json(req): Json<RagChatRequest>,
) -> Result<Json<RagChatResponse>, ApiError> {
    let session_id = req.session_id;
    let input = req.into_input(ctx.core.config().pipeline.rag_history_turns);
    let outcome = run_atomic(Arc::clone(&ctx.core), input).await?;
    Ok(Json(RagChatResponse::new(outcome, session_id)))
}

/// `POST /rag/chat/stream`: server-sent events, `chunk`* then one
/// `done` or `error`.
pub async fn chat_stream(
    State(ctx): State<ApiContext>,
    Json(req): Json<RagChatRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, ApiError> {
    let input = req.into_input(ctx.core.config().pipeline.rag_history_turns);
    let rx = start_streaming(Arc::clone(&ctx.core), input)?;
    let events = futures_util::stream::unfold(rx, |mut rx| async move {
        let event = rx.recv().await?;
        Some((Event::default().json_data(&event), rx))
    });
    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

// ═══════════════════════════════════════════════════════════
// Search
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    #[serde(default)]
    pub top_k: Option<usize>,
    #[serde(default)]
    pub min_relevance: Option<f32>,
    #[serde(default)]
    pub category: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SearchHit {
    pub chunk_id: String,
    pub title: String,
    pub source: String,
    pub category: String,
    pub relevance_score: f32,
    pub keyword_hits: usize,
    pub excerpt: String,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub results: Vec<SearchHit>,
}

/// `POST /rag/search`: raw ranked chunks, no generation. Medicine brand
/// names in the query are searched by their generic names.
pub async fn search(
    State(ctx): State<ApiContext>,
    Json(req): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, ApiError> {
    if req.query.trim().is_empty() {
        return Err(ApiError::BadRequest("query must not be empty".into()));
    }
    let core = Arc::clone(&ctx.core);
    tokio::task::spawn_blocking(move || run_search(&core, req))
        .await
        .map_err(|e| ApiError::Internal(format!("search task failed: {e}")))?
        .map(Json)
}

fn run_search(core: &CoreState, req: SearchRequest) -> Result<SearchResponse, ApiError> {
    let defaults = &core.config().pipeline;
    let top_k = req.top_k.unwrap_or(defaults.top_k).clamp(1, MAX_SEARCH_RESULTS);
    let min_relevance = req
        .min_relevance
        .unwrap_or(defaults.min_relevance)
        .clamp(0.0, 1.0);

    let (masked, map) = core.mask().mask(&req.query);
    let query = unmask(&masked, &map, UnmaskStyle::Generic)
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    let ranked = Retriever::new(core.knowledge(), core.embedder())
        .search_in_category(&query, top_k, min_relevance, req.category.as_deref())
        .map_err(|e| PipelineError::RetrievalUnavailable(e.to_string()))?;

    let results = ranked
        .iter()
        .map(|r| SearchHit {
            chunk_id: r.chunk.id.clone(),
            title: r.chunk.title.clone(),
            source: r.chunk.source_name.clone(),
            category: r.chunk.category.clone(),
            relevance_score: r.relevance,
            keyword_hits: r.keyword_hits,
            excerpt: truncate_chars(&r.chunk.body, EXCERPT_CHARS).to_string(),
        })
        .collect();

    Ok(SearchResponse { query, results })
}

// ═══════════════════════════════════════════════════════════
// Stats and health
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub chunks: usize,
    pub dimension: Option<usize>,
    pub categories: BTreeMap<String, usize>,
    pub embedder: String,
    pub model: String,
    pub translator: Option<String>,
    pub active_sessions: usize,
}

/// `GET /rag/stats`
pub async fn stats(State(ctx): State<ApiContext>) -> Json<StatsResponse> {
    let core = &ctx.core;
    Json(StatsResponse {
        chunks: core.knowledge().len(),
        dimension: core.knowledge().dimension(),
        categories: core.knowledge().categories(),
        embedder: core.embedder().name().to_string(),
        model: core.model_name().to_string(),
        translator: core.translator_name().map(str::to_string),
        active_sessions: core.sessions().len(),
    })
}

#[derive(Debug, Serialize)]
pub struct RagHealthResponse {
    pub status: &'static str,
    pub knowledge_loaded: bool,
    pub model: String,
    /// `None` when no live model client is configured.
    pub model_available: Option<bool>,
    pub translation_configured: bool,
}

/// `GET /rag/health`: `degraded` when the knowledge base is empty, the
/// model is missing or no translation service is configured.
pub async fn health(State(ctx): State<ApiContext>) -> Result<Json<RagHealthResponse>, ApiError> {
    let core = Arc::clone(&ctx.core);
    let probe = tokio::task::spawn_blocking(move || core.probe_model())
        .await
        .map_err(|e| ApiError::Internal(format!("model probe failed: {e}")))?;
    let model_available = match probe {
        Some(Ok(available)) => Some(available),
        Some(Err(e)) => {
            tracing::warn!(error = %e, "Model probe failed");
            Some(false)
        }
        None => None,
    };

    let core = &ctx.core;
    let knowledge_loaded = !core.knowledge().is_empty();
    let translation_configured = core.translator_name().is_some();
    let healthy = knowledge_loaded && translation_configured && model_available != Some(false);

    Ok(Json(RagHealthResponse {
        status: if healthy { "ok" } else { "degraded" },
        knowledge_loaded,
        model: core.model_name().to_string(),
        model_available,
        translation_configured,
    }))
}
