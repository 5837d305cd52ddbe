//! Shared state and wire types for the HTTP layer.

use std::sync::Arc;

use serde::Deserialize;
use uuid::Uuid;

use crate::core_state::CoreState;
use crate::intake::SymptomReport;
use crate::pipeline::retrieval::search::MAX_CITED_SOURCES;
use crate::session::{Role, Turn};

use super::error::ApiError;

/// Longest accepted user message, in characters.
pub const MAX_MESSAGE_CHARS: usize = 4000;

// ═══════════════════════════════════════════════════════════
// API context
// ═══════════════════════════════════════════════════════════

/// Shared context for all API routes.
#[derive(Clone)]
pub struct ApiContext {
    pub core: Arc<CoreState>,
}

impl ApiContext {
    pub fn new(core: Arc<CoreState>) -> Self {
        Self { core }
    }
}

// ═══════════════════════════════════════════════════════════
// Chat requests
// ═══════════════════════════════════════════════════════════

/// One earlier turn as echoed back by a stateless client. `content_l2`
/// is the cached L2 shadow from the earlier response; when present the
/// turn is never translated again.
#[derive(Debug, Clone, Deserialize)]
pub struct HistoryItem {
    pub role: Role,
    pub content: String,
    #[serde(default)]
    pub content_l2: Option<String>,
}

impl HistoryItem {
    pub fn into_turn(self) -> Turn {
        let shadow = self.content_l2.filter(|t| !t.trim().is_empty());
        match self.role {
            Role::User => Turn::user(self.content, shadow),
            Role::Assistant => Turn::assistant_complete(self.content, shadow, false),
        }
    }
}

/// `POST /chat`
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub history: Vec<HistoryItem>,
    #[serde(default)]
    pub symptom_context: Option<SymptomReport>,
    #[serde(default)]
    pub session_id: Option<Uuid>,
}

/// `POST /rag/chat` and `POST /rag/chat/stream`
#[derive(Debug, Deserialize)]
pub struct RagChatRequest {
    pub message: String,
    #[serde(default)]
    pub history: Vec<HistoryItem>,
    #[serde(default = "default_use_rag")]
    pub use_rag: bool,
    #[serde(default = "default_max_sources")]
    pub max_sources: usize,
    #[serde(default)]
    pub symptom_context: Option<SymptomReport>,
    #[serde(default)]
    pub session_id: Option<Uuid>,
}

fn default_use_rag() -> bool {
    true
}

fn default_max_sources() -> usize {
    MAX_CITED_SOURCES
}

/// Owned input for one turn, shared by every chat endpoint.
#[derive(Debug, Clone)]
pub struct TurnInput {
    pub message: String,
    pub history: Vec<HistoryItem>,
    pub report: Option<SymptomReport>,
    pub use_rag: bool,
    pub max_sources: usize,
    pub history_limit: usize,
    pub session_id: Option<Uuid>,
}

impl TurnInput {
    /// Reject empty and oversized messages before any work is done.
    pub fn validate(&self) -> Result<(), ApiError> {
        if self.message.trim().is_empty() {
            return Err(ApiError::BadRequest("message must not be empty".into()));
        }
        let chars = self.message.chars().count();
        if chars > MAX_MESSAGE_CHARS {
            return Err(ApiError::BadRequest(format!(
                "message is {chars} characters, limit is {MAX_MESSAGE_CHARS}"
            )));
        }
        Ok(())
    }

    pub fn history_turns(&self) -> Vec<Turn> {
        self.history.iter().cloned().map(HistoryItem::into_turn).collect()
    }
}

impl ChatRequest {
    pub fn into_input(self, history_limit: usize) -> TurnInput {
        TurnInput {
            message: self.message,
            history: self.history,
            report: self.symptom_context,
            use_rag: false,
            max_sources: 0,
            history_limit,
            session_id: self.session_id,
        }
    }
}

impl RagChatRequest {
    pub fn into_input(self, history_limit: usize) -> TurnInput {
        TurnInput {
            message: self.message,
            history: self.history,
            report: self.symptom_context,
            use_rag: self.use_rag,
            max_sources: self.max_sources,
            history_limit,
            session_id: self.session_id,
        }
    }
}

/// Parse a path segment as a session id.
pub fn parse_session_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ApiError::BadRequest(format!("invalid session id: {raw}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_items_keep_their_shadow() {
        let items: Vec<HistoryItem> = serde_json::from_str(
            r#"[
                {"role": "user", "content": "başım ağrıyor"},
                {"role": "assistant", "content": "Dinlenin.", "content_l2": "Rest."},
                {"role": "assistant", "content": "Su için.", "content_l2": "  "}
            ]"#,
        )
        .unwrap();
        let turns: Vec<Turn> = items.into_iter().map(HistoryItem::into_turn).collect();
        assert_eq!(turns[0].role, Role::User);
        assert_eq!(turns[0].text_l2(), None);
        assert_eq!(turns[1].text_l2(), Some("Rest."));
        assert_eq!(turns[2].text_l2(), None);
    }

    #[test]
    fn rag_request_defaults() {
        let req: RagChatRequest = serde_json::from_str(r#"{"message": "ateşim var"}"#).unwrap();
        assert!(req.use_rag);
        assert_eq!(req.max_sources, 3);
        assert!(req.history.is_empty());
        assert!(req.session_id.is_none());
    }

    #[test]
    fn plain_chat_skips_retrieval() {
        let req: ChatRequest = serde_json::from_str(
            r#"{"message": "dizim ağrıyor", "symptom_context": {"region": "knee", "severity_0_10": 6}}"#,
        )
        .unwrap();
        let input = req.into_input(10);
        assert!(!input.use_rag);
        assert_eq!(input.history_limit, 10);
        assert_eq!(input.report.unwrap().severity, Some(6));
    }

    #[test]
    fn empty_and_oversized_messages_are_rejected() {
        let mut input = RagChatRequest {
            message: "   ".into(),
            history: vec![],
            use_rag: true,
            max_sources: 3,
            symptom_context: None,
            session_id: None,
        }
        .into_input(6);
        assert!(matches!(input.validate(), Err(ApiError::BadRequest(_))));

        input.message = "a".repeat(MAX_MESSAGE_CHARS + 1);
        assert!(matches!(input.validate(), Err(ApiError::BadRequest(_))));

        input.message = "ateşim var".into();
        assert!(input.validate().is_ok());
    }

    #[test]
    fn bad_session_id_is_a_bad_request() {
        assert!(matches!(
            parse_session_id("not-a-uuid"),
            Err(ApiError::BadRequest(_))
        ));
        assert!(parse_session_id(&Uuid::new_v4().to_string()).is_ok());
    }
}
