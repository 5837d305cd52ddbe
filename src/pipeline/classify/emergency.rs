//! Red-flag scanning with negation scope.
//!
//! A finding is suppressed when a negation cue sits in the same clause
//! either in the window of tokens before it ("no chest pain") or, for
//! Turkish word order, just after it ("göğüs ağrım yok"). Clause
//! punctuation and contrast words ("but", "ama") close the scope, so
//! "no fever but chest pain" still fires.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use crate::intake::SymptomReport;
use crate::pipeline::text::{clause_break_between, word_spans, WordSpan};

use super::lexicon::{
    phrases, MatchMode, Phrase, COMBINED_SYMPTOM_REASON, EMERGENCY_LEXICON, LEADING_NEGATIONS,
    SCOPE_BREAKERS, SERIOUS_SYMPTOMS, TRAILING_NEGATIONS, URGENCY_INDICATORS,
};

/// Default preceding-token window for negation cues.
pub const DEFAULT_NEGATION_WINDOW: usize = 4;
/// Default following-token window for Turkish trailing negators.
pub const DEFAULT_TRAILING_NEGATION_WINDOW: usize = 2;

/// Structured red flags that get the emergency directive without a model call.
pub const CRITICAL_RED_FLAGS: &[&str] = &[
    "loss_of_consciousness",
    "difficulty_breathing",
    "chest_pain",
    "severe_bleeding",
];

/// Emergency numbers used in every directive.
pub const EMERGENCY_NUMBER: &str = "112";
pub const POISON_CONTROL_NUMBER: &str = "182";

pub const EMERGENCY_RESPONSE_TEMPLATE: &str = "🚨 **ACİL DURUM UYARISI** 🚨\n\n\
{reason}\n\n\
**HEMEN 112'Yİ ARAYIN!**\n\n\
Beklerken:\n\
- Sakin kalmaya çalışın\n\
- Yalnızsanız kapıyı açık bırakın\n\
- Yanınızda biri varsa durumu ona bildirin\n\
- Zehirlenme şüphesinde Ulusal Zehir Danışma Merkezi: 182\n\n\
Bu bir acil durum olabilir. Lütfen profesyonel tıbbi yardım alın.";

/// Negation window sizes. Both are token counts.
#[derive(Debug, Clone)]
pub struct EmergencyConfig {
    pub negation_window: usize,
    pub trailing_negation_window: usize,
}

impl Default for EmergencyConfig {
    fn default() -> Self {
        Self {
            negation_window: DEFAULT_NEGATION_WINDOW,
            trailing_negation_window: DEFAULT_TRAILING_NEGATION_WINDOW,
        }
    }
}

/// One red-flag phrase that fired.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmergencyHit {
    pub phrase: String,
    pub reason: String,
}

/// Outcome of a lexical scan.
#[derive(Debug, Clone, Default)]
pub struct EmergencyScan {
    pub hits: Vec<EmergencyHit>,
    /// Red-flag phrases found but negated.
    pub suppressed: Vec<String>,
}

impl EmergencyScan {
    pub fn is_emergency(&self) -> bool {
        !self.hits.is_empty()
    }

    pub fn reason(&self) -> Option<&str> {
        self.hits.first().map(|h| h.reason.as_str())
    }

    pub fn phrases(&self) -> impl Iterator<Item = &str> {
        self.hits.iter().map(|h| h.phrase.as_str())
    }
}

struct RedFlagPhrase {
    phrase: Phrase,
    reason: &'static str,
}

static RED_FLAG_PHRASES: LazyLock<Vec<RedFlagPhrase>> = LazyLock::new(|| {
    EMERGENCY_LEXICON
        .iter()
        .map(|(text, reason)| RedFlagPhrase {
            phrase: Phrase::new(text, MatchMode::Stem),
            reason,
        })
        .collect()
});

static LEADING_CUES: LazyLock<Vec<Phrase>> =
    LazyLock::new(|| phrases(LEADING_NEGATIONS, MatchMode::Exact));
static TRAILING_CUES: LazyLock<Vec<Phrase>> =
    LazyLock::new(|| phrases(TRAILING_NEGATIONS, MatchMode::Stem));
static BREAKERS: LazyLock<Vec<Phrase>> =
    LazyLock::new(|| phrases(SCOPE_BREAKERS, MatchMode::Exact));
static INDICATORS: LazyLock<Vec<Phrase>> =
    LazyLock::new(|| phrases(URGENCY_INDICATORS, MatchMode::Stem));
static SERIOUS: LazyLock<Vec<Phrase>> =
    LazyLock::new(|| phrases(SERIOUS_SYMPTOMS, MatchMode::Stem));

/// Lexical red-flag detector.
#[derive(Debug, Clone, Default)]
pub struct EmergencyDetector {
    config: EmergencyConfig,
}

impl EmergencyDetector {
    pub fn new(config: EmergencyConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EmergencyConfig {
        &self.config
    }

    /// Scan turn text for red flags.
    pub fn scan(&self, text: &str) -> EmergencyScan {
        let spans = word_spans(text);
        let mut scan = EmergencyScan::default();

        for flag in RED_FLAG_PHRASES.iter() {
            let mut fired = false;
            let mut negated = false;
            for (start, end) in flag.phrase.find_all(text, &spans) {
                if self.is_negated(text, &spans, start, end) {
                    negated = true;
                } else {
                    fired = true;
                    break;
                }
            }
            if fired {
                scan.hits.push(EmergencyHit {
                    phrase: flag.phrase.text.to_string(),
                    reason: flag.reason.to_string(),
                });
            } else if negated {
                scan.suppressed.push(flag.phrase.text.to_string());
            }
        }

        if scan.hits.is_empty() {
            if let Some(symptom) = self.urgent_combination(text, &spans) {
                scan.hits.push(EmergencyHit {
                    phrase: symptom,
                    reason: COMBINED_SYMPTOM_REASON.to_string(),
                });
            }
        }

        if !scan.suppressed.is_empty() {
            tracing::debug!(suppressed = scan.suppressed.len(), "Negated red flags ignored");
        }
        scan
    }

    /// Urgency indicator plus a non-negated serious symptom ("ani baş
    /// dönmesi", "sudden numbness").
    fn urgent_combination(&self, text: &str, spans: &[WordSpan]) -> Option<String> {
        let has_indicator = INDICATORS
            .iter()
            .any(|p| !p.find_all(text, spans).is_empty());
        if !has_indicator {
            return None;
        }
        SERIOUS.iter().find_map(|symptom| {
            symptom
                .find_all(text, spans)
                .into_iter()
                .any(|(s, e)| !self.is_negated(text, spans, s, e))
                .then(|| symptom.text.to_string())
        })
    }

    fn is_negated(&self, text: &str, spans: &[WordSpan], start: usize, end: usize) -> bool {
        let clause_start = clause_start(text, spans, start);
        let lead_from = start
            .saturating_sub(self.config.negation_window)
            .max(clause_start);
        if LEADING_CUES
            .iter()
            .any(|cue| cue.occurs_within(text, spans, lead_from, start))
        {
            return true;
        }

        let clause_end = clause_end(text, spans, end);
        let trail_to = (end + self.config.trailing_negation_window).min(clause_end);
        TRAILING_CUES
            .iter()
            .any(|cue| cue.occurs_within(text, spans, end, trail_to))
    }
}

/// Index of the first span in the clause containing span `at`.
fn clause_start(text: &str, spans: &[WordSpan], at: usize) -> usize {
    let mut i = at;
    while i > 0 {
        if clause_break_between(text, &spans[i - 1], &spans[i]) || is_breaker(text, spans, i - 1) {
            return i;
        }
        i -= 1;
    }
    0
}

/// One past the last span of the clause that starts at or before `from`.
fn clause_end(text: &str, spans: &[WordSpan], from: usize) -> usize {
    if from == 0 || from >= spans.len() {
        return from.min(spans.len());
    }
    let mut i = from;
    while i < spans.len() {
        if clause_break_between(text, &spans[i - 1], &spans[i]) || is_breaker(text, spans, i) {
            return i;
        }
        i += 1;
    }
    spans.len()
}

fn is_breaker(text: &str, spans: &[WordSpan], at: usize) -> bool {
    BREAKERS.iter().any(|b| b.matches_at(text, spans, at))
}

// ═══════════════════════════════════════════════════════════
// Structured red flags
// ═══════════════════════════════════════════════════════════

/// Red flags carried by a structured symptom report.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RedFlagAssessment {
    pub flags: BTreeSet<String>,
    pub critical: Vec<String>,
}

impl RedFlagAssessment {
    pub fn is_emergency(&self) -> bool {
        !self.flags.is_empty()
    }

    pub fn is_critical(&self) -> bool {
        !self.critical.is_empty()
    }
}

/// Every reported red flag counts; the critical subset skips generation.
pub fn red_flags_from_report(report: &SymptomReport) -> RedFlagAssessment {
    let flags: BTreeSet<String> = report
        .red_flags
        .iter()
        .map(|f| f.trim().to_lowercase())
        .filter(|f| !f.is_empty())
        .collect();
    let critical = flags
        .iter()
        .filter(|f| CRITICAL_RED_FLAGS.contains(&f.as_str()))
        .cloned()
        .collect();
    RedFlagAssessment { flags, critical }
}

/// Directive response for a lexical emergency.
pub fn emergency_response(reason: &str) -> String {
    EMERGENCY_RESPONSE_TEMPLATE.replace("{reason}", reason)
}

/// Directive response for critical structured red flags.
pub fn critical_flags_response(report: &SymptomReport, critical: &[String]) -> String {
    let labels: Vec<&str> = critical.iter().map(|f| red_flag_label(f)).collect();
    let location = match (&report.region, &report.symptom) {
        (Some(region), Some(symptom)) => format!(
            "{} bölgesindeki {} şikayetinizle birlikte ",
            crate::intake::region_label(region),
            crate::intake::symptom_label(symptom)
        ),
        _ => String::new(),
    };
    let reason = format!(
        "{}bildirdiğiniz belirtiler ({}) acil değerlendirme gerektirir!",
        location,
        labels.join(", ")
    );
    let mut chars = reason.chars();
    let reason = match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => reason,
    };
    emergency_response(&reason)
}

/// Turkish label for a structured red-flag id.
pub fn red_flag_label(flag: &str) -> &str {
    match flag {
        "loss_of_consciousness" => "bilinç kaybı",
        "difficulty_breathing" => "nefes almada zorluk",
        "chest_pain" => "göğüs ağrısı",
        "severe_bleeding" => "şiddetli kanama",
        "cannot_bear_weight" => "üzerine basamama",
        "high_fever" => "yüksek ateş",
        "sudden_onset" => "ani başlangıç",
        "numbness" => "uyuşma",
        "vision_loss" => "görme kaybı",
        "stiff_neck" => "ense sertliği",
        "blood_in_stool" => "dışkıda kan",
        "vomiting_blood" => "kan kusma",
        other => other,
    }
}
