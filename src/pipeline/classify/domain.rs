//! Health-domain gating.
//!
//! Keyword evidence decides most turns; only messages with no signal either
//! way reach the optional model classifier.

use serde::{Deserialize, Serialize};

use crate::pipeline::generation::{GenerationOptions, LlmGenerate};
use crate::pipeline::mask::EntityMask;
use crate::pipeline::text::{fold_case, word_spans};

use super::lexicon::{
    health_pattern_hits, matched, HARD_NON_HEALTH_PHRASES, HEALTH_PHRASES,
    SOFT_NON_HEALTH_PHRASES,
};
use super::DomainVerdict;

const CLASSIFIER_SYSTEM_PROMPT: &str = "You are a strict topic classifier for a health assistant. \
Decide whether the user's message is about human health: symptoms, diseases, medicines, \
treatments, body parts, mental health or medical services. The message may be in Turkish. \
Answer with exactly one word: YES or NO.";

/// Keyword evidence for one turn.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DomainSignals {
    pub health: usize,
    pub hard_non_health: usize,
    pub soft_non_health: usize,
    pub medicines: usize,
}

impl DomainSignals {
    pub fn gather(text: &str, mask: &EntityMask) -> Self {
        let spans = word_spans(text);
        let folded = fold_case(text);
        Self {
            health: matched(&HEALTH_PHRASES, text, &spans).len() + health_pattern_hits(&folded),
            hard_non_health: matched(&HARD_NON_HEALTH_PHRASES, text, &spans).len(),
            soft_non_health: matched(&SOFT_NON_HEALTH_PHRASES, text, &spans).len(),
            medicines: mask.detect(text).len(),
        }
    }

    pub fn has_health_signal(&self) -> bool {
        self.health > 0 || self.medicines > 0
    }
}

/// What settled the verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DomainBasis {
    Medicine,
    /// A structured symptom report opened the turn.
    SymptomReport,
    /// A red-flag phrase fired.
    Emergency,
    Keywords,
    FollowUp,
    Classifier,
    ClassifierError,
    NoSignal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DomainDecision {
    pub verdict: DomainVerdict,
    pub basis: DomainBasis,
}

impl DomainDecision {
    fn new(verdict: DomainVerdict, basis: DomainBasis) -> Self {
        Self { verdict, basis }
    }
}

/// Decide whether a turn belongs to the health domain.
///
/// With established health context an ambiguous turn is a continuation;
/// only a turn with zero health signal and a hard off-topic marker is a
/// topic change.
pub fn classify_domain(
    text: &str,
    signals: &DomainSignals,
    has_health_context: bool,
    fallback: Option<&dyn LlmGenerate>,
) -> DomainDecision {
    if signals.medicines > 0 {
        return DomainDecision::new(DomainVerdict::Yes, DomainBasis::Medicine);
    }

    if has_health_context {
        if signals.health == 0 && signals.hard_non_health > 0 {
            return DomainDecision::new(DomainVerdict::No, DomainBasis::Keywords);
        }
        return DomainDecision::new(DomainVerdict::Yes, DomainBasis::FollowUp);
    }

    if signals.health > 0 && signals.health >= signals.hard_non_health {
        return DomainDecision::new(DomainVerdict::Yes, DomainBasis::Keywords);
    }
    if signals.hard_non_health > 0 {
        return DomainDecision::new(DomainVerdict::No, DomainBasis::Keywords);
    }

    if signals.soft_non_health > 0 {
        tracing::debug!(soft = signals.soft_non_health, "Only ambiguous off-topic markers");
    }

    match fallback {
        Some(llm) => classify_with_model(text, llm),
        None => DomainDecision::new(DomainVerdict::Uncertain, DomainBasis::NoSignal),
    }
}

fn classify_with_model(text: &str, llm: &dyn LlmGenerate) -> DomainDecision {
    let options = GenerationOptions {
        temperature: 0.0,
        max_tokens: 5,
    };
    match llm.generate(CLASSIFIER_SYSTEM_PROMPT, text, &options) {
        Ok(answer) => {
            let verdict = parse_classifier_answer(&answer);
            tracing::debug!(verdict = ?verdict, "Model domain classification");
            DomainDecision::new(verdict, DomainBasis::Classifier)
        }
        Err(e) => {
            // Leaning YES: a wrong refusal is worse than an extra answer.
            tracing::warn!(error = %e, "Domain classifier failed, accepting turn");
            DomainDecision::new(DomainVerdict::Yes, DomainBasis::ClassifierError)
        }
    }
}

/// Read the classifier's one-word answer by prefix.
pub fn parse_classifier_answer(answer: &str) -> DomainVerdict {
    let answer = answer.trim().trim_start_matches(['*', '"', '\'']).to_uppercase();
    if answer.starts_with("YES") || answer.starts_with("EVET") {
        DomainVerdict::Yes
    } else if answer.starts_with("NO") || answer.starts_with("HAYIR") {
        DomainVerdict::No
    } else {
        DomainVerdict::Uncertain
    }
}
