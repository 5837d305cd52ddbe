//! Runs one chat turn for an endpoint: stateless over client history, or
//! against a server-side session that holds its single-writer lock from
//! the first pipeline step to the final history update.
//!
//! Pipeline work is blocking and runs on the blocking pool.

use std::sync::Arc;

use tokio::sync::{mpsc, OwnedMutexGuard};

use crate::api::error::ApiError;
use crate::api::types::TurnInput;
use crate::chat::StreamEvent;
use crate::core_state::CoreState;
use crate::intake::SymptomReport;
use crate::pipeline::classify::DomainVerdict;
use crate::pipeline::{TurnOutcome, TurnRequest};
use crate::session::{Session, Turn};

/// Capacity of the chunk channel between the pipeline and the SSE body.
const STREAM_BUFFER: usize = 64;

type SessionGuard = OwnedMutexGuard<Session>;

/// Take the session's turn lock, failing with 409 if it is busy.
fn lock_session(core: &CoreState, input: &TurnInput) -> Result<Option<SessionGuard>, ApiError> {
    match input.session_id {
        Some(id) => Ok(Some(core.sessions().lock_for_turn(id)?)),
        None => Ok(None),
    }
}

/// History, report and health context for this turn. A session supplies
/// its own history and any report left by the intake wizard; a report in
/// the request wins over the pending one. The pending report is only
/// consumed once the turn has an answer.
struct Prepared {
    history: Vec<Turn>,
    report: Option<SymptomReport>,
    health_context: Option<bool>,
}

fn prepare(input: &TurnInput, session: Option<&mut SessionGuard>) -> Prepared {
    match session {
        Some(session) => Prepared {
            history: session.turns().to_vec(),
            report: input
                .report
                .clone()
                .or_else(|| session.pending_report().cloned()),
            health_context: Some(session.has_health_context()),
        },
        None => Prepared {
            history: input.history_turns(),
            report: input.report.clone(),
            health_context: None,
        },
    }
}

fn request<'r>(input: &'r TurnInput, prepared: &'r Prepared) -> TurnRequest<'r> {
    let mut req = TurnRequest::new(&input.message, &prepared.history);
    req.report = prepared.report.as_ref();
    req.health_context = prepared.health_context;
    req.use_rag = input.use_rag;
    req.max_sources = input.max_sources;
    req.history_limit = input.history_limit;
    req
}

/// Any accepted in-domain turn establishes health context, including one
/// answered with the canned emergency directive.
fn note_health_context(session: &mut Session, outcome: &TurnOutcome) {
    if outcome.metadata.domain == DomainVerdict::Yes {
        session.mark_health_context();
    }
}

/// Close the failed exchange: the user turn stays, followed by an
/// assistant turn marked as an error, and history leaves both out.
fn record_failure(session: &mut Session) {
    let marked = session
        .begin_assistant_turn(false)
        .and_then(|_| session.mark_error());
    if let Err(e) = marked {
        tracing::error!(error = %e, "Failed turn not marked");
    }
}

// ═══════════════════════════════════════════════════════════
// Atomic
// ═══════════════════════════════════════════════════════════

/// Run a turn to completion and return the whole answer.
pub async fn run_atomic(core: Arc<CoreState>, input: TurnInput) -> Result<TurnOutcome, ApiError> {
    input.validate()?;
    let session = lock_session(&core, &input)?;
    tokio::task::spawn_blocking(move || atomic_turn(&core, &input, session))
        .await
        .map_err(|e| ApiError::Internal(format!("turn task failed: {e}")))?
}

fn atomic_turn(
    core: &CoreState,
    input: &TurnInput,
    mut session: Option<SessionGuard>,
) -> Result<TurnOutcome, ApiError> {
    let prepared = prepare(input, session.as_mut());
    let req = request(input, &prepared);

    if let Some(session) = session.as_mut() {
        session.begin_user_turn(&input.message)?;
    }
    let outcome = match core.pipeline().run_turn(&req) {
        Ok(outcome) => outcome,
        Err(e) => {
            if let Some(session) = session.as_mut() {
                record_failure(session);
            }
            return Err(e.into());
        }
    };

    if let Some(session) = session.as_mut() {
        session.take_pending_report();
        session.record_assistant_turn(
            &outcome.text_l1,
            outcome.text_l2.clone(),
            outcome.is_emergency(),
        )?;
        note_health_context(session, &outcome);
    }
    Ok(outcome)
}

// ═══════════════════════════════════════════════════════════
// Streaming
// ═══════════════════════════════════════════════════════════

/// Start a streamed turn. Events arrive on the returned receiver: chunks,
/// then exactly one `done` or `error`. Dropping the receiver cancels
/// generation; a session then keeps the partial answer as incomplete.
pub fn start_streaming(
    core: Arc<CoreState>,
    input: TurnInput,
) -> Result<mpsc::Receiver<StreamEvent>, ApiError> {
    input.validate()?;
    let session = lock_session(&core, &input)?;
    let (tx, rx) = mpsc::channel(STREAM_BUFFER);
    tokio::task::spawn_blocking(move || streamed_turn(&core, &input, session, &tx));
    Ok(rx)
}

fn streamed_turn(
    core: &CoreState,
    input: &TurnInput,
    mut session: Option<SessionGuard>,
    tx: &mpsc::Sender<StreamEvent>,
) {
    let prepared = prepare(input, session.as_mut());
    let req = request(input, &prepared);

    if let Some(session) = session.as_mut() {
        let opened = session
            .begin_user_turn(&input.message)
            .and_then(|_| session.begin_assistant_turn(false));
        if let Err(e) = opened {
            let _ = tx.blocking_send(StreamEvent::error(ApiError::from(e).public_message()));
            return;
        }
    }

    let result = core.pipeline().run_turn_streaming(&req, |piece| {
        if let Some(session) = session.as_mut() {
            if let Err(e) = session.append_chunk(piece) {
                tracing::warn!(error = %e, "Chunk not recorded in session");
            }
        }
        tx.blocking_send(StreamEvent::chunk(piece)).is_ok()
    });

    match result {
        Ok(outcome) => {
            if let Some(session) = session.as_mut() {
                session.take_pending_report();
                let flagged = if outcome.is_emergency() {
                    session.flag_emergency()
                } else {
                    Ok(())
                };
                let recorded =
                    flagged.and_then(|_| session.complete_assistant_turn(outcome.text_l2.clone()));
                if let Err(e) = recorded {
                    tracing::error!(error = %e, "Streamed turn not recorded in session");
                }
                note_health_context(session, &outcome);
            }
            if tx.blocking_send(StreamEvent::done(&outcome)).is_err() {
                tracing::warn!("Client left before the final event");
            }
        }
        Err(e) if e.is_cancelled() => {
            tracing::warn!("Stream cancelled by the client");
            if let Some(session) = session.as_mut() {
                session.take_pending_report();
                if let Err(e) = session.mark_incomplete() {
                    tracing::error!(error = %e, "Cancelled turn not marked incomplete");
                }
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "Streamed turn failed");
            if let Some(session) = session.as_mut() {
                if let Err(e) = session.mark_error() {
                    tracing::error!(error = %e, "Failed turn not marked");
                }
            }
            let _ = tx.blocking_send(StreamEvent::error(ApiError::from(e).public_message()));
        }
    }
}
