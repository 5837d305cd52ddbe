//! Server-side conversation sessions and the intake wizard.
//!
//! - `POST /sessions`: create (mode `chat` or `intake`)
//! - `GET /sessions/:id`: turns, wizard state and draft
//! - `POST /sessions/:id/intake`: one wizard event
//! - `POST /sessions/:id/reset`: new complaint, conversation kept
//! - `POST /sessions/:id/home`: back to the start screen
//!
//! Mutations take the session's turn lock, so they are refused with 409
//! while a chat turn is running.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::types::{parse_session_id, ApiContext};
use crate::intake::{IntakeEvent, IntakeState, SymptomReport};
use crate::session::{InteractionMode, Session, Turn};

#[derive(Debug, Default, Deserialize)]
pub struct CreateSessionRequest {
    #[serde(default)]
    pub mode: Option<InteractionMode>,
}

/// A mode starts the next conversation right away; without one the
/// session waits on the start screen.
#[derive(Debug, Default, Deserialize)]
pub struct HomeRequest {
    #[serde(default)]
    pub mode: Option<InteractionMode>,
}

#[derive(Debug, Serialize)]
pub struct SessionView {
    pub id: Uuid,
    pub mode: Option<InteractionMode>,
    pub intake_state: IntakeState,
    pub intake_draft: SymptomReport,
    pub health_context: bool,
    pub turns: Vec<Turn>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Session> for SessionView {
    fn from(session: &Session) -> Self {
        Self {
            id: session.id(),
            mode: session.mode(),
            intake_state: session.intake_state(),
            intake_draft: session.intake_draft().clone(),
            health_context: session.has_health_context(),
            turns: session.turns().to_vec(),
            created_at: session.created_at(),
            updated_at: session.updated_at(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct IntakeResponse {
    pub state: IntakeState,
    pub draft: SymptomReport,
    /// Synthesized first user message once the wizard hands over to chat.
    /// Send it to a chat endpoint with this session id; the report goes
    /// along with it.
    pub first_message: Option<String>,
}

/// `POST /sessions`
pub async fn create(
    State(ctx): State<ApiContext>,
    body: Option<Json<CreateSessionRequest>>,
) -> Result<(StatusCode, Json<SessionView>), ApiError> {
    let mode = body
        .and_then(|Json(req)| req.mode)
        .unwrap_or(InteractionMode::Chat);
    let sessions = ctx.core.sessions();
    let id = sessions.create(mode)?;
    let handle = sessions.get(id)?;
    let session = handle.lock().await;
    Ok((StatusCode::CREATED, Json(SessionView::from(&*session))))
}

/// `GET /sessions/:id`. Waits for a running turn to finish.
pub async fn detail(
    State(ctx): State<ApiContext>,
    Path(id): Path<String>,
) -> Result<Json<SessionView>, ApiError> {
    let id = parse_session_id(&id)?;
    let handle = ctx.core.sessions().get(id)?;
    let session = handle.lock().await;
    Ok(Json(SessionView::from(&*session)))
}

/// `POST /sessions/:id/intake`
pub async fn intake(
    State(ctx): State<ApiContext>,
    Path(id): Path<String>,
    Json(event): Json<IntakeEvent>,
) -> Result<Json<IntakeResponse>, ApiError> {
    let id = parse_session_id(&id)?;
    let mut session = ctx.core.sessions().lock_for_turn(id)?;
    let first_message = session.apply_intake(event)?;
    Ok(Json(IntakeResponse {
        state: session.intake_state(),
        draft: session.intake_draft().clone(),
        first_message,
    }))
}

/// `POST /sessions/:id/reset`
pub async fn reset(
    State(ctx): State<ApiContext>,
    Path(id): Path<String>,
) -> Result<Json<SessionView>, ApiError> {
    let id = parse_session_id(&id)?;
    let mut session = ctx.core.sessions().lock_for_turn(id)?;
    session.reset_complaint();
    tracing::info!(session = %id, "Complaint reset");
    Ok(Json(SessionView::from(&*session)))
}

/// `POST /sessions/:id/home`
pub async fn home(
    State(ctx): State<ApiContext>,
    Path(id): Path<String>,
    body: Option<Json<HomeRequest>>,
) -> Result<Json<SessionView>, ApiError> {
    let id = parse_session_id(&id)?;
    let mut session = ctx.core.sessions().lock_for_turn(id)?;
    session.back_to_home();
    if let Some(mode) = body.and_then(|Json(req)| req.mode) {
        session.choose_mode(mode);
    }
    tracing::info!(session = %id, "Session back to home");
    Ok(Json(SessionView::from(&*session)))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::json;

    use crate::api::router::api_router;
    use crate::api::test_support::{get, post_json, test_core, test_router, TestServices};
    use crate::pipeline::generation::MockLlm;

    async fn create_session(app: &axum::Router, mode: &str) -> String {
        let (status, json) = post_json(app, "/sessions", json!({"mode": mode})).await;
        assert_eq!(status, StatusCode::CREATED);
        json["id"].as_str().unwrap().to_string()
    }

    async fn intake(app: &axum::Router, id: &str, event: serde_json::Value) -> serde_json::Value {
        let (status, json) = post_json(app, &format!("/sessions/{id}/intake"), event).await;
        assert_eq!(status, StatusCode::OK, "{json}");
        json
    }

    #[tokio::test]
    async fn create_and_fetch() {
        let app = test_router(TestServices::default());
        let id = create_session(&app, "chat").await;
        let (status, json) = get(&app, &format!("/sessions/{id}")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["mode"], "chat");
        assert_eq!(json["intake_state"], "chat");
        assert!(json["turns"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_and_malformed_ids() {
        let app = test_router(TestServices::default());
        let (status, _) = get(&app, &format!("/sessions/{}", uuid::Uuid::new_v4())).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = get(&app, "/sessions/not-a-uuid").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn intake_report_reaches_the_first_turn() {
        let app = test_router(TestServices {
            llm: MockLlm::new("Rest and keep your head still."),
            ..TestServices::default()
        });
        let id = create_session(&app, "intake").await;

        intake(&app, &id, json!({"event": "select_region", "region": "head"})).await;
        intake(&app, &id, json!({"event": "select_symptom", "symptom": "pain"})).await;
        intake(&app, &id, json!({"event": "set_severity", "severity": 6})).await;
        let done = intake(&app, &id, json!({"event": "complete", "onset": "today"})).await;
        assert_eq!(done["state"], "intake_complete");
        let chat = intake(&app, &id, json!({"event": "start_chat"})).await;
        assert_eq!(chat["state"], "chat");
        let first = chat["first_message"].as_str().unwrap().to_string();
        assert!(first.contains("Baş"));

        let (status, json) = post_json(
            &app,
            "/rag/chat",
            json!({"message": first, "session_id": id}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["metadata"]["disposition"], "answered");

        let (_, session) = get(&app, &format!("/sessions/{id}")).await;
        assert_eq!(session["turns"].as_array().unwrap().len(), 2);
        assert_eq!(session["health_context"], true);
    }

    #[tokio::test]
    async fn critical_red_flag_short_circuits_the_model() {
        let app = test_router(TestServices {
            llm: MockLlm::failing("must not be called"),
            ..TestServices::default()
        });
        let id = create_session(&app, "intake").await;
        intake(&app, &id, json!({"event": "select_region", "region": "chest"})).await;
        intake(&app, &id, json!({"event": "select_symptom", "symptom": "pain"})).await;
        intake(&app, &id, json!({"event": "set_severity", "severity": 9})).await;
        intake(
            &app,
            &id,
            json!({"event": "complete", "onset": "just_now", "red_flags": ["chest_pain"]}),
        )
        .await;
        let chat = intake(&app, &id, json!({"event": "start_chat"})).await;
        let first = chat["first_message"].as_str().unwrap().to_string();

        let (status, json) =
            post_json(&app, "/chat", json!({"message": first, "session_id": id})).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["is_emergency"], true);
        assert_eq!(json["metadata"]["disposition"], "emergency");
    }

    #[tokio::test]
    async fn emergency_turn_carries_health_context_to_the_follow_up() {
        let app = test_router(TestServices::default());
        let id = create_session(&app, "chat").await;

        let (status, json) = post_json(
            &app,
            "/chat",
            json!({"message": "göğsümde ağrı var", "session_id": id}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["metadata"]["disposition"], "emergency");

        let (_, session) = get(&app, &format!("/sessions/{id}")).await;
        assert_eq!(session["health_context"], true);

        let (status, json) = post_json(
            &app,
            "/chat",
            json!({"message": "peki kaç gün?", "session_id": id}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["metadata"]["disposition"], "answered");
    }

    #[tokio::test]
    async fn failed_turn_is_recorded_as_an_error() {
        let app = test_router(TestServices {
            llm: MockLlm::failing("model down"),
            ..TestServices::default()
        });
        let id = create_session(&app, "chat").await;

        let (status, _) = post_json(
            &app,
            "/rag/chat",
            json!({"message": "başım ağrıyor", "session_id": id}),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);

        let (_, session) = get(&app, &format!("/sessions/{id}")).await;
        let turns = session["turns"].as_array().unwrap();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0]["role"], "user");
        assert_eq!(turns[1]["role"], "assistant");
        assert_eq!(turns[1]["status"], "error");
    }

    #[tokio::test]
    async fn intake_report_survives_a_failed_hand_off() {
        let core = test_core(TestServices {
            llm: MockLlm::failing("model down"),
            ..TestServices::default()
        });
        let app = api_router(core.clone());
        let id = create_session(&app, "intake").await;
        let uuid = uuid::Uuid::parse_str(&id).unwrap();

        intake(&app, &id, json!({"event": "select_region", "region": "head"})).await;
        intake(&app, &id, json!({"event": "select_symptom", "symptom": "pain"})).await;
        intake(&app, &id, json!({"event": "set_severity", "severity": 6})).await;
        intake(&app, &id, json!({"event": "complete", "onset": "today"})).await;
        let chat = intake(&app, &id, json!({"event": "start_chat"})).await;
        let first = chat["first_message"].as_str().unwrap().to_string();

        let (status, _) =
            post_json(&app, "/rag/chat", json!({"message": first, "session_id": id})).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);

        let session = core.sessions().get(uuid).unwrap();
        assert!(session.lock().await.pending_report().is_some());
    }

    #[tokio::test]
    async fn invalid_wizard_step_is_a_bad_request() {
        let app = test_router(TestServices::default());
        let id = create_session(&app, "intake").await;
        let (status, json) = post_json(
            &app,
            &format!("/sessions/{id}/intake"),
            json!({"event": "set_severity", "severity": 5}),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"]["code"], "BAD_REQUEST");
    }

    #[tokio::test]
    async fn reset_keeps_turns_and_home_clears_them() {
        let core = test_core(TestServices::default());
        let app = api_router(core.clone());
        let id = create_session(&app, "intake").await;
        intake(&app, &id, json!({"event": "select_region", "region": "head"})).await;

        let (status, json) = post_json(&app, &format!("/sessions/{id}/reset"), json!({})).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["intake_state"], "idle");

        let (status, json) =
            post_json(&app, &format!("/sessions/{id}/home"), json!({"mode": "chat"})).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["mode"], "chat");
        assert_eq!(json["intake_state"], "chat");
        assert!(json["turns"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn mutation_during_a_turn_is_a_conflict() {
        let core = test_core(TestServices::default());
        let app = api_router(core.clone());
        let id = create_session(&app, "intake").await;
        let uuid = uuid::Uuid::parse_str(&id).unwrap();

        let _turn = core.sessions().lock_for_turn(uuid).unwrap();
        let (status, _) = post_json(&app, &format!("/sessions/{id}/reset"), json!({})).await;
        assert_eq!(status, StatusCode::CONFLICT);
    }
}
