//! Conversation sessions.
//!
//! A `Session` owns its ordered turn history and the intake wizard. Turns
//! are append-only; the one exception is the newest assistant turn, whose
//! text grows while it streams. Each assistant turn's L2 shadow is set at
//! most once.
//!
//! `SessionStore` hands out one writer per session: a turn holds the
//! session's async mutex from classification to the final history update,
//! and a second turn arriving meanwhile is refused instead of queued.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::intake::{IntakeError, IntakeEvent, IntakeMachine, IntakeState, SymptomReport};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("Session not found: {0}")]
    NotFound(Uuid),

    #[error("A turn is already in progress for this session")]
    TurnInProgress,

    #[error("No assistant turn is streaming")]
    NoStreamingTurn,

    #[error("L2 text of this turn is already set")]
    ShadowAlreadySet,

    #[error("Session store lock poisoned")]
    LockPoisoned,

    #[error("Intake error: {0}")]
    Intake(#[from] IntakeError),
}

// ═══════════════════════════════════════════════════════════
// Turn
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnStatus {
    Complete,
    /// Assistant turn still receiving chunks.
    Streaming,
    /// Client went away mid-stream; the partial text is kept.
    Incomplete,
    /// Generation failed after some chunks were delivered.
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Turn {
    pub id: Uuid,
    pub role: Role,
    pub text_l1: String,
    text_l2: Option<String>,
    pub emergency: bool,
    pub status: TurnStatus,
    pub created_at: DateTime<Utc>,
}

impl Turn {
    fn new(role: Role, text_l1: String, text_l2: Option<String>, status: TurnStatus) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            text_l1,
            text_l2: text_l2.filter(|t| !t.trim().is_empty()),
            emergency: false,
            status,
            created_at: Utc::now(),
        }
    }

    /// User turn. `text_l2` is only kept when a client echoes one back.
    pub fn user(text_l1: impl Into<String>, text_l2: Option<String>) -> Self {
        Self::new(Role::User, text_l1.into(), text_l2, TurnStatus::Complete)
    }

    /// Finished assistant turn, as rebuilt from client-supplied history.
    pub fn assistant_complete(
        text_l1: impl Into<String>,
        text_l2: Option<String>,
        emergency: bool,
    ) -> Self {
        let mut turn = Self::new(Role::Assistant, text_l1.into(), text_l2, TurnStatus::Complete);
        turn.emergency = emergency;
        turn
    }

    pub fn text_l2(&self) -> Option<&str> {
        self.text_l2.as_deref()
    }

    /// Complete and interrupted turns go back into prompts; failed and
    /// still-streaming ones do not.
    pub fn usable_as_history(&self) -> bool {
        matches!(self.status, TurnStatus::Complete | TurnStatus::Incomplete)
            && !self.text_l1.trim().is_empty()
    }
}

// ═══════════════════════════════════════════════════════════
// Session
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionMode {
    /// Free text from the first turn.
    Chat,
    /// Structured intake first, then free text.
    Intake,
}

#[derive(Debug, Clone)]
pub struct Session {
    id: Uuid,
    mode: Option<InteractionMode>,
    turns: Vec<Turn>,
    intake: IntakeMachine,
    /// Report consumed by the next turn only.
    pending_report: Option<SymptomReport>,
    health_context: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Session {
    pub fn new(mode: InteractionMode) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            mode: Some(mode),
            turns: Vec::new(),
            intake: intake_for(mode),
            pending_report: None,
            health_context: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Ephemeral session rebuilt from client-supplied history.
    pub fn from_history(turns: Vec<Turn>) -> Self {
        let mut session = Self::new(InteractionMode::Chat);
        session.turns = turns;
        session
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn mode(&self) -> Option<InteractionMode> {
        self.mode
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn intake_state(&self) -> IntakeState {
        self.intake.state()
    }

    pub fn intake_draft(&self) -> &SymptomReport {
        self.intake.draft()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// An earlier turn was accepted as in-domain.
    pub fn has_health_context(&self) -> bool {
        self.health_context
    }

    pub fn mark_health_context(&mut self) {
        self.health_context = true;
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    fn streaming_index(&self) -> Option<usize> {
        self.turns
            .iter()
            .rposition(|t| t.status == TurnStatus::Streaming)
    }

    // ── Turn lifecycle ──────────────────────────────────

    pub fn begin_user_turn(&mut self, text_l1: &str) -> Result<(), SessionError> {
        if self.streaming_index().is_some() {
            return Err(SessionError::TurnInProgress);
        }
        self.turns.push(Turn::user(text_l1, None));
        self.touch();
        Ok(())
    }

    /// Open an empty assistant turn that chunks are appended to.
    pub fn begin_assistant_turn(&mut self, emergency: bool) -> Result<Uuid, SessionError> {
        if self.streaming_index().is_some() {
            return Err(SessionError::TurnInProgress);
        }
        let mut turn = Turn::new(Role::Assistant, String::new(), None, TurnStatus::Streaming);
        turn.emergency = emergency;
        let id = turn.id;
        self.turns.push(turn);
        self.touch();
        Ok(id)
    }

    pub fn append_chunk(&mut self, chunk: &str) -> Result<(), SessionError> {
        let index = self.streaming_index().ok_or(SessionError::NoStreamingTurn)?;
        self.turns[index].text_l1.push_str(chunk);
        Ok(())
    }

    pub fn flag_emergency(&mut self) -> Result<(), SessionError> {
        let index = self.streaming_index().ok_or(SessionError::NoStreamingTurn)?;
        self.turns[index].emergency = true;
        Ok(())
    }

    /// Close the streaming turn. The L2 shadow, when present, is set here
    /// and never again.
    pub fn complete_assistant_turn(&mut self, text_l2: Option<String>) -> Result<(), SessionError> {
        let index = self.streaming_index().ok_or(SessionError::NoStreamingTurn)?;
        let turn = &mut self.turns[index];
        if turn.text_l2.is_some() {
            return Err(SessionError::ShadowAlreadySet);
        }
        turn.text_l2 = text_l2.filter(|t| !t.trim().is_empty());
        turn.status = TurnStatus::Complete;
        self.touch();
        Ok(())
    }

    /// Record a whole assistant answer in one step.
    pub fn record_assistant_turn(
        &mut self,
        text_l1: &str,
        text_l2: Option<String>,
        emergency: bool,
    ) -> Result<(), SessionError> {
        self.begin_assistant_turn(emergency)?;
        self.append_chunk(text_l1)?;
        self.complete_assistant_turn(text_l2)
    }

    /// The client disconnected mid-stream: keep what was delivered.
    pub fn mark_incomplete(&mut self) -> Result<(), SessionError> {
        let index = self.streaming_index().ok_or(SessionError::NoStreamingTurn)?;
        self.turns[index].status = TurnStatus::Incomplete;
        self.touch();
        tracing::info!(session = %self.id, "Assistant turn marked incomplete");
        Ok(())
    }

    pub fn mark_error(&mut self) -> Result<(), SessionError> {
        let index = self.streaming_index().ok_or(SessionError::NoStreamingTurn)?;
        self.turns[index].status = TurnStatus::Error;
        self.touch();
        Ok(())
    }

    // ── Intake ──────────────────────────────────────────

    /// Feed the intake wizard. Entering `chat` returns the synthesized
    /// first user turn; the report itself waits in `take_pending_report`.
    pub fn apply_intake(&mut self, event: IntakeEvent) -> Result<Option<String>, SessionError> {
        let report = self.intake.apply(event)?;
        self.touch();
        Ok(report.map(|report| {
            let text = report.to_turn_text();
            self.pending_report = Some(report);
            text
        }))
    }

    /// Report waiting for the first chat turn. It stays until that turn
    /// succeeds, so a failed hand-off can be retried with it.
    pub fn pending_report(&self) -> Option<&SymptomReport> {
        self.pending_report.as_ref()
    }

    pub fn take_pending_report(&mut self) -> Option<SymptomReport> {
        self.pending_report.take()
    }

    /// New complaint: restart intake, keep the conversation.
    pub fn reset_complaint(&mut self) {
        self.intake = intake_for(self.mode.unwrap_or(InteractionMode::Chat));
        self.pending_report = None;
        self.touch();
    }

    pub fn clear_messages(&mut self) {
        self.turns.clear();
        self.health_context = false;
        self.touch();
    }

    /// Back to the start screen: nothing survives, not even the mode.
    pub fn back_to_home(&mut self) {
        self.mode = None;
        self.turns.clear();
        self.intake = IntakeMachine::new();
        self.pending_report = None;
        self.health_context = false;
        self.touch();
    }

    /// Pick an interaction mode after `back_to_home`.
    pub fn choose_mode(&mut self, mode: InteractionMode) {
        self.mode = Some(mode);
        self.intake = intake_for(mode);
        self.touch();
    }
}

fn intake_for(mode: InteractionMode) -> IntakeMachine {
    match mode {
        InteractionMode::Chat => IntakeMachine::skipped(),
        InteractionMode::Intake => IntakeMachine::new(),
    }
}

// ═══════════════════════════════════════════════════════════
// SessionStore
// ═══════════════════════════════════════════════════════════

pub type SessionHandle = Arc<Mutex<Session>>;

/// All live sessions, one async mutex each.
#[derive(Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<Uuid, SessionHandle>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self, mode: InteractionMode) -> Result<Uuid, SessionError> {
        let session = Session::new(mode);
        let id = session.id();
        self.sessions
            .write()
            .map_err(|_| SessionError::LockPoisoned)?
            .insert(id, Arc::new(Mutex::new(session)));
        tracing::info!(session = %id, ?mode, "Session created");
        Ok(id)
    }

    pub fn get(&self, id: Uuid) -> Result<SessionHandle, SessionError> {
        self.sessions
            .read()
            .map_err(|_| SessionError::LockPoisoned)?
            .get(&id)
            .cloned()
            .ok_or(SessionError::NotFound(id))
    }

    /// Exclusive access for one turn. Fails immediately if another turn
    /// holds the session.
    pub fn lock_for_turn(&self, id: Uuid) -> Result<OwnedMutexGuard<Session>, SessionError> {
        self.get(id)?
            .try_lock_owned()
            .map_err(|_| SessionError::TurnInProgress)
    }

    pub fn remove(&self, id: Uuid) -> Result<bool, SessionError> {
        Ok(self
            .sessions
            .write()
            .map_err(|_| SessionError::LockPoisoned)?
            .remove(&id)
            .is_some())
    }

    /// Number of live sessions; 0 when the store lock is poisoned.
    pub fn len(&self) -> usize {
        match self.sessions.read() {
            Ok(sessions) => sessions.len(),
            Err(_) => {
                tracing::warn!("Session store lock poisoned, reporting no sessions");
                0
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn streaming_turn_grows_then_completes_once() {
        let mut session = Session::new(InteractionMode::Chat);
        session.begin_user_turn("başım ağrıyor").unwrap();
        session.begin_assistant_turn(false).unwrap();
        session.append_chunk("Bol ").unwrap();
        session.append_chunk("su için.").unwrap();
        session
            .complete_assistant_turn(Some("Drink plenty of water.".into()))
            .unwrap();

        let turn = &session.turns()[1];
        assert_eq!(turn.text_l1, "Bol su için.");
        assert_eq!(turn.text_l2(), Some("Drink plenty of water."));
        assert_eq!(turn.status, TurnStatus::Complete);
        assert_eq!(
            session.complete_assistant_turn(Some("again".into())),
            Err(SessionError::NoStreamingTurn)
        );
        assert_eq!(session.append_chunk("x"), Err(SessionError::NoStreamingTurn));
    }

    #[test]
    fn second_turn_rejected_while_streaming() {
        let mut session = Session::new(InteractionMode::Chat);
        session.begin_user_turn("a").unwrap();
        session.begin_assistant_turn(false).unwrap();
        assert_eq!(session.begin_user_turn("b"), Err(SessionError::TurnInProgress));
        assert_eq!(
            session.begin_assistant_turn(false),
            Err(SessionError::TurnInProgress)
        );
    }

    #[test]
    fn cancelled_turn_is_kept_incomplete() {
        let mut session = Session::new(InteractionMode::Chat);
        session.begin_user_turn("a").unwrap();
        session.begin_assistant_turn(false).unwrap();
        session.append_chunk("partial").unwrap();
        session.mark_incomplete().unwrap();

        let turn = session.turns().last().unwrap();
        assert_eq!(turn.status, TurnStatus::Incomplete);
        assert_eq!(turn.text_l1, "partial");
        assert!(turn.text_l2().is_none());
        assert!(turn.usable_as_history());
        session.begin_user_turn("next").unwrap();
    }

    #[test]
    fn emergency_flag_lands_on_streaming_turn() {
        let mut session = Session::new(InteractionMode::Chat);
        assert_eq!(session.flag_emergency(), Err(SessionError::NoStreamingTurn));
        session.begin_assistant_turn(false).unwrap();
        session.flag_emergency().unwrap();
        session.complete_assistant_turn(None).unwrap();
        assert!(session.turns()[0].emergency);
    }

    #[test]
    fn failed_turn_is_not_history() {
        let mut session = Session::new(InteractionMode::Chat);
        session.begin_assistant_turn(false).unwrap();
        session.append_chunk("half").unwrap();
        session.mark_error().unwrap();
        assert!(!session.turns()[0].usable_as_history());
    }

    #[test]
    fn intake_synthesizes_first_turn() {
        let mut session = Session::new(InteractionMode::Intake);
        assert_eq!(session.intake_state(), IntakeState::Idle);
        for event in [
            IntakeEvent::SelectRegion {
                region: "left_knee".into(),
            },
            IntakeEvent::SelectSymptom {
                symptom: "pain".into(),
            },
            IntakeEvent::SetSeverity { severity: 7 },
            IntakeEvent::Complete {
                onset: "2_3_days".into(),
                trigger: None,
                red_flags: vec!["cannot_bear_weight".into()],
                notes: None,
            },
        ] {
            assert_eq!(session.apply_intake(event).unwrap(), None);
        }
        let text = session.apply_intake(IntakeEvent::StartChat).unwrap().unwrap();
        assert!(text.starts_with("Sol diz bölgemde ağrı var."));
        assert_eq!(session.intake_state(), IntakeState::Chat);
        assert!(session.take_pending_report().is_some());
        assert!(session.take_pending_report().is_none());
    }

    #[test]
    fn reset_keeps_history_home_clears_everything() {
        let mut session = Session::new(InteractionMode::Intake);
        session.begin_user_turn("a").unwrap();
        session
            .apply_intake(IntakeEvent::SelectRegion {
                region: "head".into(),
            })
            .unwrap();

        session.reset_complaint();
        assert_eq!(session.intake_state(), IntakeState::Idle);
        assert_eq!(session.turns().len(), 1);
        assert_eq!(session.mode(), Some(InteractionMode::Intake));

        session.mark_health_context();
        session.back_to_home();
        assert!(session.turns().is_empty());
        assert_eq!(session.mode(), None);
        assert!(!session.has_health_context());

        session.choose_mode(InteractionMode::Chat);
        assert_eq!(session.intake_state(), IntakeState::Chat);
    }

    #[test]
    fn empty_shadow_is_not_stored() {
        let turn = Turn::assistant_complete("Dinlenin.", Some("  ".into()), false);
        assert!(turn.text_l2().is_none());
    }

    #[tokio::test]
    async fn store_allows_one_writer() {
        let store = SessionStore::new();
        let id = store.create(InteractionMode::Chat).unwrap();
        let guard = store.lock_for_turn(id).unwrap();
        assert_eq!(
            store.lock_for_turn(id).unwrap_err(),
            SessionError::TurnInProgress
        );
        drop(guard);
        assert!(store.lock_for_turn(id).is_ok());
    }

    #[tokio::test]
    async fn unknown_session_is_not_found() {
        let store = SessionStore::new();
        let id = Uuid::new_v4();
        assert_eq!(store.get(id).unwrap_err(), SessionError::NotFound(id));
        assert!(store.is_empty());
    }

    #[test]
    fn pending_report_survives_a_peek() {
        let mut session = Session::new(InteractionMode::Intake);
        session
            .apply_intake(IntakeEvent::SelectRegion { region: "head".into() })
            .unwrap();
        session
            .apply_intake(IntakeEvent::SelectSymptom { symptom: "pain".into() })
            .unwrap();
        session
            .apply_intake(IntakeEvent::SetSeverity { severity: 4 })
            .unwrap();
        session
            .apply_intake(IntakeEvent::Complete {
                onset: "today".into(),
                trigger: None,
                red_flags: vec![],
                notes: None,
            })
            .unwrap();
        session.apply_intake(IntakeEvent::StartChat).unwrap();

        assert_eq!(session.pending_report().and_then(|r| r.severity), Some(4));
        assert!(session.pending_report().is_some());
        assert!(session.take_pending_report().is_some());
        assert!(session.pending_report().is_none());
    }

    #[test]
    fn poisoned_store_reports_no_sessions() {
        let store = SessionStore::new();
        store.create(InteractionMode::Chat).unwrap();
        std::thread::scope(|scope| {
            let poisoner = scope.spawn(|| {
                let _guard = store.sessions.write().unwrap();
                panic!("poison the store");
            });
            assert!(poisoner.join().is_err());
        });
        assert_eq!(store.len(), 0);
        assert_eq!(
            store.create(InteractionMode::Chat).unwrap_err(),
            SessionError::LockPoisoned
        );
    }
}
