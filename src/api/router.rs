//! HTTP router.
//!
//! Returns a composable `Router` that can be mounted on any axum server.
//! Every request is traced; CORS is open for browser front-ends.

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::api::endpoints;
use crate::api::types::ApiContext;
use crate::core_state::CoreState;

/// Build the API router over shared state.
///
/// NOTE: Path params use `:param` syntax (matchit 0.7 / axum 0.7).
pub fn api_router(core: Arc<CoreState>) -> Router {
    let ctx = ApiContext::new(core);

    Router::new()
        .route("/health", get(endpoints::health::check))
        .route("/chat", post(endpoints::chat::send))
        .route("/rag/chat", post(endpoints::rag::chat))
        .route("/rag/chat/stream", post(endpoints::rag::chat_stream))
        .route("/rag/search", post(endpoints::rag::search))
        .route("/rag/stats", get(endpoints::rag::stats))
        .route("/rag/health", get(endpoints::rag::health))
        .route("/sessions", post(endpoints::sessions::create))
        .route("/sessions/:id", get(endpoints::sessions::detail))
        .route("/sessions/:id/intake", post(endpoints::sessions::intake))
        .route("/sessions/:id/reset", post(endpoints::sessions::reset))
        .route("/sessions/:id/home", post(endpoints::sessions::home))
        .with_state(ctx)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
