pub mod domain;
pub mod emergency;
pub mod greeting;
pub mod lexicon;

pub use domain::{classify_domain, DomainBasis, DomainDecision, DomainSignals};
pub use emergency::{
    critical_flags_response, emergency_response, red_flags_from_report, EmergencyConfig,
    EmergencyDetector, EmergencyScan, RedFlagAssessment, EMERGENCY_NUMBER,
};
pub use greeting::{detect_greeting, greeting_response, GreetingKind};

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::intake::SymptomReport;
use crate::pipeline::generation::LlmGenerate;
use crate::pipeline::mask::EntityMask;

pub const DISCLAIMER: &str =
    "⚠️ Bu bilgiler eğitim amaçlıdır, tıbbi tavsiye değildir. Acil durumlarda 112'yi arayın.";

pub const EMERGENCY_DISCLAIMER: &str = "🚨 ACİL DURUM - Hemen 112'yi arayın!";

pub const OFF_TOPIC_RESPONSE: &str = "Merhaba! Ben sağlık odaklı bir asistanım. 🏥\n\n\
Sadece sağlık, hastalık, semptom ve tedavi ile ilgili sorularınızda size yardımcı olabilirim. \
Sağlık dışı konularda maalesef yardımcı olamıyorum.\n\nSağlıkla ilgili bir sorunuz varsa, lütfen sorun!";

pub const UNCLEAR_RESPONSE: &str = "Merhaba! 😊 Mesajınızı tam anlayamadım.\n\n\
Ben sağlık konularında yardımcı olan bir asistanım. Sağlık, semptom veya ilaçlarla ilgili bir sorunuz mu var?\n\n\
Lütfen sorunuzu biraz daha açıklayabilir misiniz?";

pub const TOPIC_CHANGE_RESPONSE: &str = "Anladım, konu değiştirmek istiyorsunuz. 😊\n\n\
Ancak ben sadece sağlık konularında yardımcı olabiliyorum. Eğer sağlıkla ilgili başka bir sorunuz varsa, \
sormaktan çekinmeyin!\n\nÖnceki konuya devam etmek isterseniz de yanınızdayım.";

/// Tri-state health-domain gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DomainVerdict {
    Yes,
    No,
    Uncertain,
}

/// Per-turn classification. Never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationResult {
    pub domain: DomainVerdict,
    pub basis: DomainBasis,
    pub is_emergency: bool,
    /// Lexicon phrases and structured flag ids that fired.
    pub matched_red_flags: BTreeSet<String>,
    /// Structured flags that skip generation entirely.
    pub critical_red_flags: Vec<String>,
    pub emergency_reason: Option<String>,
    pub greeting: Option<GreetingKind>,
    pub signals: DomainSignals,
}

impl ClassificationResult {
    /// Small talk with nothing health-related in it.
    pub fn is_pure_greeting(&self) -> bool {
        self.greeting.is_some()
            && !self.signals.has_health_signal()
            && !self.is_emergency
            && self.basis != DomainBasis::SymptomReport
    }
}

/// Everything the classifier needs besides the text.
#[derive(Clone, Copy)]
pub struct ClassifyContext<'a> {
    pub mask: &'a EntityMask,
    pub detector: &'a EmergencyDetector,
    /// Model consulted when keywords are inconclusive.
    pub fallback: Option<&'a dyn LlmGenerate>,
    /// The session already has an accepted in-domain turn.
    pub has_health_context: bool,
    /// Structured report that synthesized this turn.
    pub report: Option<&'a SymptomReport>,
}

/// Classify one user turn: domain gate, red-flag scan and greeting check.
pub fn classify_turn(text: &str, ctx: &ClassifyContext<'_>) -> ClassificationResult {
    let signals = DomainSignals::gather(text, ctx.mask);
    let scan = ctx.detector.scan(text);
    let assessment = ctx
        .report
        .map(red_flags_from_report)
        .unwrap_or_default();
    let greeting = detect_greeting(text);

    let mut matched_red_flags: BTreeSet<String> =
        scan.phrases().map(|p| p.to_string()).collect();
    matched_red_flags.extend(assessment.flags.iter().cloned());
    let is_emergency = scan.is_emergency() || assessment.is_emergency();

    let decision = if ctx.report.is_some() {
        DomainDecision {
            verdict: DomainVerdict::Yes,
            basis: DomainBasis::SymptomReport,
        }
    } else if scan.is_emergency() {
        DomainDecision {
            verdict: DomainVerdict::Yes,
            basis: DomainBasis::Emergency,
        }
    } else {
        let small_talk = greeting.is_some() && !signals.has_health_signal();
        let fallback = if small_talk { None } else { ctx.fallback };
        classify_domain(text, &signals, ctx.has_health_context, fallback)
    };

    let domain = match decision.verdict {
        DomainVerdict::Uncertain if ctx.has_health_context => DomainVerdict::Yes,
        verdict => verdict,
    };

    tracing::debug!(
        domain = ?domain,
        basis = ?decision.basis,
        is_emergency,
        health = signals.health,
        medicines = signals.medicines,
        "Turn classified"
    );
    if !scan.suppressed.is_empty() {
        tracing::debug!(suppressed = scan.suppressed.len(), "Negated red flags ignored");
    }

    ClassificationResult {
        domain,
        basis: decision.basis,
        is_emergency,
        matched_red_flags,
        critical_red_flags: assessment.critical,
        emergency_reason: scan.reason().map(str::to_string),
        greeting,
        signals,
    }
}
