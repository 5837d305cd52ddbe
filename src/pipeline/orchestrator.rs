//! One turn end to end: classify, mask, relay to L2, retrieve, generate,
//! relay back to L1.
//!
//! Atomic turns generate in L2 and make one inbound translation at the end.
//! Streamed turns prompt the model to answer in L1 directly and make one
//! translation afterwards for the L2 shadow. Either way a turn costs at most
//! one outbound and one further translation call, and cached history is
//! never re-translated.

use std::time::Instant;

use crate::config::PipelineConfig;
use crate::intake::SymptomReport;
use crate::session::{Role, Turn};

use super::classify::{
    classify_turn, critical_flags_response, emergency_response, greeting_response,
    ClassificationResult, ClassifyContext, DomainSignals, DomainVerdict, EmergencyDetector,
    EMERGENCY_NUMBER, OFF_TOPIC_RESPONSE, TOPIC_CHANGE_RESPONSE, UNCLEAR_RESPONSE,
};
use super::generation::{
    assemble_evidence, select_mode, token_hints, AnswerLanguage, GenerationError, Generator,
    LlmGenerate, PromptParts, ResponseMode,
};
use super::mask::{unmask_expecting, EntityMask, MaskError, StreamUnmasker, UnmaskStyle};
use super::retrieval::search::MAX_CITED_SOURCES;
use super::retrieval::{citable, EmbeddingModel, KnowledgeBase, RankedChunk, Retriever};
use super::translation::{Outbound, TranslationRelay, Translator};
use super::{PipelineError, TurnDisposition, TurnMetadata, TurnOutcome};

/// Default number of history turns sent with a RAG turn.
pub const DEFAULT_HISTORY_LIMIT: usize = 6;

/// Input for one turn.
#[derive(Debug, Clone, Copy)]
pub struct TurnRequest<'r> {
    pub message: &'r str,
    /// Earlier turns, oldest first.
    pub history: &'r [Turn],
    /// Structured report that synthesized this turn.
    pub report: Option<&'r SymptomReport>,
    /// Known health context. `None` derives it from the user turns in
    /// `history`.
    pub health_context: Option<bool>,
    pub use_rag: bool,
    pub max_sources: usize,
    pub history_limit: usize,
}

impl<'r> TurnRequest<'r> {
    pub fn new(message: &'r str, history: &'r [Turn]) -> Self {
        Self {
            message,
            history,
            report: None,
            health_context: None,
            use_rag: true,
            max_sources: MAX_CITED_SOURCES,
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }
}

/// A turn that still needs the model.
struct GenerationPlan {
    parts: PromptParts,
    outbound: Outbound,
    metadata: TurnMetadata,
    sources: Vec<crate::pipeline::retrieval::RetrievedSource>,
    rag_used: bool,
}

enum Plan {
    Canned(TurnOutcome),
    Generate(Box<GenerationPlan>),
}

/// Borrowed view over the services one turn needs.
pub struct TurnPipeline<'a> {
    kb: &'a KnowledgeBase,
    embedder: &'a dyn EmbeddingModel,
    mask: &'a EntityMask,
    detector: &'a EmergencyDetector,
    llm: &'a dyn LlmGenerate,
    translator: Option<&'a dyn Translator>,
    config: &'a PipelineConfig,
}

impl<'a> TurnPipeline<'a> {
    pub fn new(
        kb: &'a KnowledgeBase,
        embedder: &'a dyn EmbeddingModel,
        mask: &'a EntityMask,
        detector: &'a EmergencyDetector,
        llm: &'a dyn LlmGenerate,
        config: &'a PipelineConfig,
    ) -> Self {
        Self {
            kb,
            embedder,
            mask,
            detector,
            llm,
            translator: None,
            config,
        }
    }

    pub fn with_translator(mut self, translator: Option<&'a dyn Translator>) -> Self {
        self.translator = translator;
        self
    }

    /// Run one turn and return the whole answer.
    pub fn run_turn(&self, req: &TurnRequest<'_>) -> Result<TurnOutcome, PipelineError> {
        let started = Instant::now();
        let mut relay = TranslationRelay::new(self.translator, self.mask);

        let plan = match self.plan(req, &mut relay)? {
            Plan::Canned(outcome) => return Ok(outcome),
            Plan::Generate(plan) => *plan,
        };
        let GenerationPlan {
            parts,
            outbound,
            mut metadata,
            sources,
            rag_used,
        } = plan;

        let generator = Generator::new(self.llm, self.config.stream_guard.clone());
        let answer_l2 = generator.generate_atomic(&parts)?;

        let inbound = relay.to_l1(&answer_l2, &outbound.map)?;
        if inbound.degraded && self.config.require_translation {
            return Err(self.translation_unavailable(&relay));
        }

        metadata.translation_degraded = relay.is_degraded();
        metadata.translation_calls = relay.stats().total_calls();
        metadata.model = Some(generator.model_name().to_string());
        log_turn(&metadata, started);

        Ok(TurnOutcome {
            text_l1: inbound.text_l1,
            text_l2: Some(inbound.text_l2),
            sources,
            rag_used,
            metadata,
        })
    }

    /// Run one turn, handing L1 text to `on_chunk` as it is produced.
    ///
    /// `on_chunk` returning `false` cancels the turn: generation stops and
    /// the error is [`PipelineError::is_cancelled`]. Canned answers arrive
    /// as a single chunk. On success the concatenated chunks equal
    /// `text_l1` of the outcome.
    pub fn run_turn_streaming<F>(
        &self,
        req: &TurnRequest<'_>,
        mut on_chunk: F,
    ) -> Result<TurnOutcome, PipelineError>
    where
        F: FnMut(&str) -> bool,
    {
        let started = Instant::now();
        let mut relay = TranslationRelay::new(self.translator, self.mask);

        let plan = match self.plan(req, &mut relay)? {
            Plan::Canned(outcome) => {
                if !on_chunk(&outcome.text_l1) {
                    return Err(GenerationError::Cancelled.into());
                }
                return Ok(outcome);
            }
            Plan::Generate(plan) => *plan,
        };
        let GenerationPlan {
            mut parts,
            outbound,
            mut metadata,
            sources,
            rag_used,
        } = plan;
        parts.answer_language = AnswerLanguage::Turkish;

        let generator = Generator::new(self.llm, self.config.stream_guard.clone());
        let mut unmasker = StreamUnmasker::new(&outbound.map, UnmaskStyle::Surface);
        let mut delivered = String::new();
        let mut mask_failure: Option<MaskError> = None;

        let generated = generator.generate_streaming(&parts, |piece| match unmasker.push(piece) {
            Ok(ready) if ready.is_empty() => true,
            Ok(ready) => {
                delivered.push_str(&ready);
                on_chunk(&ready)
            }
            Err(e) => {
                mask_failure = Some(e);
                false
            }
        });
        if let Some(e) = mask_failure {
            tracing::error!(error = %e, "Placeholder damaged in streamed answer");
            return Err(e.into());
        }
        generated?;

        let tail = unmasker.finish()?;
        if !tail.is_empty() {
            delivered.push_str(&tail);
            if !on_chunk(&tail) {
                return Err(GenerationError::Cancelled.into());
            }
        }

        let mut shadow_map = outbound.map.clone();
        let text_l2 = relay.shadow_for_streamed(&delivered, &mut shadow_map);

        metadata.translation_degraded = relay.is_degraded();
        metadata.translation_calls = relay.stats().total_calls();
        metadata.model = Some(generator.model_name().to_string());
        log_turn(&metadata, started);

        Ok(TurnOutcome {
            text_l1: delivered,
            text_l2,
            sources,
            rag_used,
            metadata,
        })
    }

    /// Everything up to the model call. Canned answers end here.
    fn plan(
        &self,
        req: &TurnRequest<'_>,
        relay: &mut TranslationRelay<'_>,
    ) -> Result<Plan, PipelineError> {
        // Step 1: Classify
        let health_context = req
            .health_context
            .unwrap_or_else(|| self.history_has_health_context(req.history));
        let ctx = ClassifyContext {
            mask: self.mask,
            detector: self.detector,
            fallback: self.config.classifier_fallback.then_some(self.llm),
            has_health_context: health_context,
            report: req.report,
        };
        let classification = classify_turn(req.message, &ctx);
        let canned = |disposition: TurnDisposition, text: String| {
            Ok(Plan::Canned(canned_outcome(&classification, disposition, text)))
        };

        // Step 2: Answers that need no model
        if classification.is_pure_greeting() && !health_context {
            if let Some(kind) = classification.greeting {
                return canned(
                    TurnDisposition::Greeting(kind),
                    greeting_response(kind).to_string(),
                );
            }
        }
        let critical = !classification.critical_red_flags.is_empty();
        if let Some(report) = req.report.filter(|_| critical) {
            tracing::warn!(
                flags = classification.critical_red_flags.len(),
                "Critical red flags reported"
            );
            return canned(
                TurnDisposition::Emergency,
                critical_flags_response(report, &classification.critical_red_flags),
            );
        }
        if let Some(reason) = classification
            .emergency_reason
            .as_deref()
            .filter(|_| !req.use_rag)
        {
            tracing::warn!("Emergency phrase on a turn without retrieval");
            return canned(TurnDisposition::Emergency, emergency_response(reason));
        }
        match classification.domain {
            DomainVerdict::Yes => {}
            DomainVerdict::No if health_context => {
                return canned(TurnDisposition::TopicChange, TOPIC_CHANGE_RESPONSE.to_string())
            }
            DomainVerdict::No => {
                return canned(TurnDisposition::OffTopic, OFF_TOPIC_RESPONSE.to_string())
            }
            DomainVerdict::Uncertain => {
                return canned(TurnDisposition::Unclear, UNCLEAR_RESPONSE.to_string())
            }
        }

        // Step 3: Mask and translate the user turn
        let outbound = relay.to_l2(req.message);
        if outbound.degraded && self.config.require_translation {
            return Err(self.translation_unavailable(relay));
        }
        let query = retrieval_query(&outbound)?;

        // Step 4: Retrieve
        let small_talk = classification.greeting.is_some()
            && !classification.signals.has_health_signal();
        let mut retrieval_unavailable = false;
        let ranked: Vec<RankedChunk<'_>> = if req.use_rag && !small_talk {
            match Retriever::new(self.kb, self.embedder).search(
                &query,
                self.config.top_k,
                self.config.min_relevance,
            ) {
                Ok(ranked) => ranked,
                Err(e) => {
                    tracing::warn!(error = %e, "Retrieval unavailable, answering without evidence");
                    retrieval_unavailable = true;
                    Vec::new()
                }
            }
        } else {
            Vec::new()
        };

        if ranked.is_empty() {
            if let Some(reason) = classification.emergency_reason.as_deref() {
                tracing::warn!("Emergency phrase with no supporting evidence");
                let mut outcome =
                    canned_outcome(&classification, TurnDisposition::Emergency, emergency_response(reason));
                outcome.metadata.translation_degraded = relay.is_degraded();
                outcome.metadata.translation_calls = relay.stats().total_calls();
                outcome.metadata.retrieval_unavailable = retrieval_unavailable;
                return Ok(Plan::Canned(outcome));
            }
        }

        // Step 5: Assemble the prompt
        let evidence = assemble_evidence(&ranked, self.config.context_token_budget);
        let report_flags = req.report.is_some_and(|r| !r.red_flags.is_empty());
        let mode = if report_flags {
            ResponseMode::Emergency
        } else {
            select_mode(&ranked)
        };
        let emergency_number = ranked
            .iter()
            .find_map(|r| r.chunk.safety.emergency_number.clone())
            .unwrap_or_else(|| EMERGENCY_NUMBER.to_string());

        let history = relay.history_l2(req.history, req.history_limit);
        let follow_up = history.iter().any(|line| line.role == Role::Assistant);
        let parts = PromptParts {
            mode,
            follow_up,
            emergency_flagged: classification.is_emergency,
            emergency_number: Some(emergency_number),
            token_hints: token_hints(&outbound.map),
            evidence: (!evidence.is_empty()).then(|| evidence.text.clone()),
            history,
            user_text: outbound.masked_l2.clone(),
            symptom_context: req.report.map(SymptomReport::to_prompt_fields),
            answer_language: AnswerLanguage::English,
        };

        let max_cited = req.max_sources.min(self.config.max_cited);
        let sources = citable(&ranked, max_cited);
        let rag_used = !evidence.is_empty();
        tracing::debug!(
            retrieved = ranked.len(),
            included = evidence.included.len(),
            estimated_tokens = evidence.estimated_tokens,
            cited = sources.len(),
            mode = ?mode,
            "Prompt assembled"
        );

        let mut metadata = base_metadata(&classification, TurnDisposition::Answered);
        metadata.mode = mode;
        metadata.retrieved = ranked.len();
        metadata.cited = sources.len();
        metadata.retrieval_unavailable = retrieval_unavailable;

        Ok(Plan::Generate(Box::new(GenerationPlan {
            parts,
            outbound,
            metadata,
            sources,
            rag_used,
        })))
    }

    fn history_has_health_context(&self, history: &[Turn]) -> bool {
        history
            .iter()
            .filter(|t| t.role == Role::User)
            .any(|t| DomainSignals::gather(&t.text_l1, self.mask).has_health_signal())
    }

    fn translation_unavailable(&self, relay: &TranslationRelay<'_>) -> PipelineError {
        let reason = relay
            .stats()
            .last_error
            .as_ref()
            .map(|e| e.to_string())
            .unwrap_or_else(|| "translation service unavailable".to_string());
        PipelineError::TranslationUnavailable(reason)
    }
}

/// Retrieval query: the L2 turn with medicine placeholders resolved to
/// generic names, generics appended once more for keyword hits. A
/// placeholder the translator dropped fails the turn here.
fn retrieval_query(outbound: &Outbound) -> Result<String, MaskError> {
    let expected: Vec<String> = outbound.map.iter().map(|(p, _)| p).collect();
    let query = unmask_expecting(
        &outbound.masked_l2,
        &outbound.map,
        &expected,
        UnmaskStyle::Generic,
    )?;
    let generics = outbound.map.generics();
    if generics.is_empty() {
        return Ok(query);
    }
    Ok(format!("{query} {}", generics.join(" ")))
}

fn base_metadata(c: &ClassificationResult, disposition: TurnDisposition) -> TurnMetadata {
    TurnMetadata {
        disposition,
        domain: c.domain,
        basis: c.basis,
        is_emergency: c.is_emergency,
        mode: ResponseMode::Normal,
        translation_degraded: false,
        retrieval_unavailable: false,
        translation_calls: 0,
        retrieved: 0,
        cited: 0,
        model: None,
    }
}

fn canned_outcome(
    c: &ClassificationResult,
    disposition: TurnDisposition,
    text: String,
) -> TurnOutcome {
    tracing::info!(disposition = ?disposition, "Canned reply");
    TurnOutcome {
        text_l1: text,
        text_l2: None,
        sources: Vec::new(),
        rag_used: false,
        metadata: base_metadata(c, disposition),
    }
}

fn log_turn(metadata: &TurnMetadata, started: Instant) {
    if metadata.translation_degraded {
        tracing::warn!("Turn answered with degraded translation");
    }
    tracing::info!(
        mode = ?metadata.mode,
        emergency = metadata.is_emergency,
        retrieved = metadata.retrieved,
        cited = metadata.cited,
        translation_calls = metadata.translation_calls,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Turn answered"
    );
}
