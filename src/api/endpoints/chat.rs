//! Plain chat: `POST /chat`.
//!
//! No retrieval. The turn still goes through the domain gate, the
//! emergency check and the translation relay; structured symptom context
//! shapes the prompt when the client sends one.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::Serialize;
use uuid::Uuid;

use crate::api::endpoints::turn::run_atomic;
use crate::api::error::ApiError;
use crate::api::types::{ApiContext, ChatRequest};
use crate::pipeline::{TurnMetadata, TurnOutcome};

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub response: String,
    pub response_l2: Option<String>,
    pub is_emergency: bool,
    pub disclaimer: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<Uuid>,
    pub metadata: TurnMetadata,
}

impl ChatResponse {
    fn new(outcome: TurnOutcome, session_id: Option<Uuid>) -> Self {
        Self {
            is_emergency: outcome.is_emergency(),
            disclaimer: outcome.disclaimer(),
            response: outcome.text_l1,
            response_l2: outcome.text_l2,
            session_id,
            metadata: outcome.metadata,
        }
    }
}

/// `POST /chat`
pub async fn send(
    State(ctx): State<ApiContext>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let session_id = req.session_id;
    let input = req.into_input(ctx.core.config().pipeline.chat_history_turns);
    let outcome = run_atomic(Arc::clone(&ctx.core), input).await?;
    Ok(Json(ChatResponse::new(outcome, session_id)))
}
