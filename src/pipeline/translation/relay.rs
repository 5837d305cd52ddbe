//! L1 ⇄ L2 relay around the generator.
//!
//! Outbound user text is masked, then translated once. Inbound model text
//! is translated once, then unmasked against the same map. History is never
//! translated: assistant turns carry the L2 text cached when they were
//! generated, user turns fall back to what the user typed.

use crate::pipeline::generation::HistoryLine;
use crate::pipeline::mask::{
    localize_generics, placeholders_in, unmask, unmask_expecting, EntityMask, EntityMaskMap,
    MaskError, UnmaskStyle,
};
use crate::session::{Role, Turn, TurnStatus};

use super::{Language, TranslationError, Translator};

/// Shorter inputs are passed through without a service call.
const MIN_TRANSLATABLE_CHARS: usize = 2;

/// Service calls made for one turn and whether any of them degraded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelayStats {
    pub outbound_calls: usize,
    pub inbound_calls: usize,
    pub degraded: bool,
    pub last_error: Option<TranslationError>,
}

impl RelayStats {
    pub fn total_calls(&self) -> usize {
        self.outbound_calls + self.inbound_calls
    }
}

/// A user turn on its way to the generator.
#[derive(Debug, Clone, PartialEq)]
pub struct Outbound {
    /// L2 text with medicine names still masked.
    pub masked_l2: String,
    pub map: EntityMaskMap,
    pub degraded: bool,
}

/// A model answer on its way back to the user.
#[derive(Debug, Clone, PartialEq)]
pub struct Inbound {
    pub text_l1: String,
    /// The model's own L2 text with placeholders resolved to generics.
    pub text_l2: String,
    pub degraded: bool,
}

pub struct TranslationRelay<'a> {
    translator: Option<&'a dyn Translator>,
    mask: &'a EntityMask,
    stats: RelayStats,
}

impl<'a> TranslationRelay<'a> {
    pub fn new(translator: Option<&'a dyn Translator>, mask: &'a EntityMask) -> Self {
        Self {
            translator,
            mask,
            stats: RelayStats::default(),
        }
    }

    pub fn stats(&self) -> &RelayStats {
        &self.stats
    }

    pub fn is_degraded(&self) -> bool {
        self.stats.degraded
    }

    /// Mask the user's L1 text and translate it to L2.
    pub fn to_l2(&mut self, text_l1: &str) -> Outbound {
        let (masked, map) = self.mask.mask(text_l1);
        tracing::debug!(entities = map.len(), "Outbound text masked");
        let (masked_l2, degraded) = self.call(&masked, Language::Turkish, Language::English);
        Outbound {
            masked_l2,
            map,
            degraded,
        }
    }

    /// Translate the model's masked L2 answer to L1 and restore medicine
    /// names. A placeholder the translator damaged fails the turn.
    pub fn to_l1(&mut self, masked_l2: &str, map: &EntityMaskMap) -> Result<Inbound, MaskError> {
        let text_l2 = unmask(masked_l2, map, UnmaskStyle::Generic)?;
        let (translated, degraded) = self.call(masked_l2, Language::English, Language::Turkish);
        let expected = placeholders_in(masked_l2);
        let text_l1 = unmask_expecting(&translated, map, &expected, UnmaskStyle::Surface)?;
        let text_l1 = localize_generics(&text_l1, true);
        Ok(Inbound {
            text_l1,
            text_l2,
            degraded,
        })
    }

    /// L2 history for the prompt, last `limit` usable turns. No service
    /// calls are made here.
    pub fn history_l2(&self, turns: &[Turn], limit: usize) -> Vec<HistoryLine> {
        let usable: Vec<&Turn> = turns
            .iter()
            .enumerate()
            .filter(|(i, t)| t.usable_as_history() && !went_unanswered(turns, *i))
            .map(|(_, t)| t)
            .collect();
        let start = usable.len().saturating_sub(limit);
        let mut missing_shadow = 0usize;
        let lines = usable[start..]
            .iter()
            .map(|turn| {
                let text = match turn.text_l2() {
                    Some(l2) => l2.to_string(),
                    None => {
                        if turn.role == Role::Assistant {
                            missing_shadow += 1;
                        }
                        turn.text_l1.clone()
                    }
                };
                HistoryLine {
                    role: turn.role,
                    text,
                }
            })
            .collect();
        if missing_shadow > 0 {
            tracing::debug!(missing_shadow, "Assistant turns without L2 shadow used as L1");
        }
        lines
    }

    /// L2 shadow for an answer that was streamed in L1. One translation
    /// call; `None` when the service is unavailable or a placeholder came
    /// back damaged, which leaves the shadow invalidated.
    pub fn shadow_for_streamed(&mut self, text_l1: &str, map: &mut EntityMaskMap) -> Option<String> {
        let masked = self.mask.mask_continuing(text_l1, map);
        let (translated, degraded) = self.call(&masked, Language::Turkish, Language::English);
        if degraded {
            return None;
        }
        match unmask(&translated, map, UnmaskStyle::Generic) {
            Ok(shadow) => Some(shadow),
            Err(e) => {
                tracing::warn!(error = %e, "Shadow translation damaged a placeholder");
                self.stats.degraded = true;
                None
            }
        }
    }

    fn call(&mut self, text: &str, source: Language, target: Language) -> (String, bool) {
        if text.trim().chars().count() < MIN_TRANSLATABLE_CHARS {
            return (text.to_string(), false);
        }
        let Some(translator) = self.translator else {
            self.mark_degraded(TranslationError::NotConfigured);
            return (text.to_string(), true);
        };

        match target {
            Language::English => self.stats.outbound_calls += 1,
            Language::Turkish => self.stats.inbound_calls += 1,
        }
        match translator.translate(text, source, target) {
            Ok(out) if !out.trim().is_empty() => (out, false),
            Ok(_) => {
                self.mark_degraded(TranslationError::ResponseParsing("empty translation".into()));
                (text.to_string(), true)
            }
            Err(e) => {
                self.mark_degraded(e);
                (text.to_string(), true)
            }
        }
    }

    fn mark_degraded(&mut self, error: TranslationError) {
        tracing::warn!(error = %error, "Translation unavailable, passing text through");
        self.stats.degraded = true;
        self.stats.last_error = Some(error);
    }
}

/// A user turn whose answer failed is dropped along with the failed
/// answer; the client retries it as a new turn.
fn went_unanswered(turns: &[Turn], index: usize) -> bool {
    turns[index].role == Role::User
        && turns
            .get(index + 1)
            .is_some_and(|next| next.role == Role::Assistant && next.status == TurnStatus::Error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::translation::MockTranslator;

    #[test]
    fn outbound_masks_before_translating() {
        let mask = EntityMask::default();
        let translator = MockTranslator::with(&[("MEDTOK0X aldım", "I took MEDTOK0X")]);
        let mut relay = TranslationRelay::new(Some(&translator), &mask);

        let out = relay.to_l2("Parol aldım");
        assert_eq!(out.masked_l2, "I took MEDTOK0X");
        assert_eq!(out.map.len(), 1);
        assert!(!out.degraded);
        assert_eq!(translator.inputs(), vec!["MEDTOK0X aldım"]);
        assert_eq!(relay.stats().outbound_calls, 1);
    }

    #[test]
    fn inbound_restores_surface_and_keeps_generic_shadow() {
        let mask = EntityMask::default();
        let translator = MockTranslator::with(&[(
            "MEDTOK0X can help.",
            "MEDTOK0X yardımcı olabilir.",
        )]);
        let mut relay = TranslationRelay::new(Some(&translator), &mask);
        let out = relay.to_l2("parol");

        let back = relay.to_l1("MEDTOK0X can help.", &out.map).unwrap();
        assert_eq!(back.text_l1, "parol yardımcı olabilir.");
        assert_eq!(back.text_l2, "paracetamol can help.");
        assert_eq!(relay.stats().inbound_calls, 1);
        assert_eq!(relay.stats().total_calls(), 2);
    }

    #[test]
    fn corrupted_placeholder_fails_loud() {
        let mask = EntityMask::default();
        let translator = MockTranslator::corrupting();
        let mut relay = TranslationRelay::new(Some(&translator), &mask);
        let out = relay.to_l2("parol");
        let err = relay.to_l1("Take MEDTOK0X with water.", &out.map).unwrap_err();
        assert!(matches!(err, MaskError::Corrupted(_)));
    }

    #[test]
    fn dropped_placeholder_fails_loud() {
        let mask = EntityMask::default();
        let translator = MockTranslator::with(&[("Take MEDTOK0X.", "Alın.")]);
        let mut relay = TranslationRelay::new(Some(&translator), &mask);
        let out = relay.to_l2("parol");
        let err = relay.to_l1("Take MEDTOK0X.", &out.map).unwrap_err();
        assert_eq!(err, MaskError::Missing("MEDTOK0X".into()));
    }

    #[test]
    fn unavailable_service_passes_through_flagged() {
        let mask = EntityMask::default();
        let translator = MockTranslator::failing();
        let mut relay = TranslationRelay::new(Some(&translator), &mask);
        let out = relay.to_l2("başım ağrıyor");
        assert_eq!(out.masked_l2, "başım ağrıyor");
        assert!(out.degraded);
        assert!(relay.is_degraded());
        assert!(relay.stats().last_error.is_some());
    }

    #[test]
    fn missing_translator_is_degraded_without_calls() {
        let mask = EntityMask::default();
        let mut relay = TranslationRelay::new(None, &mask);
        let out = relay.to_l2("başım ağrıyor");
        assert!(out.degraded);
        assert_eq!(relay.stats().total_calls(), 0);
        assert_eq!(relay.stats().last_error, Some(TranslationError::NotConfigured));
    }

    #[test]
    fn tiny_text_is_not_sent() {
        let mask = EntityMask::default();
        let translator = MockTranslator::new();
        let mut relay = TranslationRelay::new(Some(&translator), &mask);
        let out = relay.to_l2("?");
        assert!(!out.degraded);
        assert_eq!(translator.calls(), 0);
    }

    #[test]
    fn history_uses_cached_shadow_without_calls() {
        let mask = EntityMask::default();
        let translator = MockTranslator::new();
        let relay = TranslationRelay::new(Some(&translator), &mask);

        let turns = vec![
            Turn::user("başım ağrıyor", None),
            Turn::assistant_complete("Dinlenin.", Some("Rest.".into()), false),
            Turn::user("kaç gün?", Some("how many days?".into())),
        ];
        let lines = relay.history_l2(&turns, 6);
        let texts: Vec<&str> = lines.iter().map(|l| l.text.as_str()).collect();
        assert_eq!(texts, vec!["başım ağrıyor", "Rest.", "how many days?"]);
        assert_eq!(translator.calls(), 0);

        let last_two = relay.history_l2(&turns, 2);
        assert_eq!(last_two.len(), 2);
        assert_eq!(last_two[0].role, Role::Assistant);
    }

    #[test]
    fn failed_exchange_is_left_out_of_history() {
        let mask = EntityMask::default();
        let relay = TranslationRelay::new(None, &mask);

        let mut failed = Turn::assistant_complete("Sessiz", None, false);
        failed.status = TurnStatus::Error;
        let turns = vec![
            Turn::user("başım ağrıyor", None),
            failed,
            Turn::user("başım ağrıyor", None),
            Turn::assistant_complete("Dinlenin.", Some("Rest.".into()), false),
        ];
        let lines = relay.history_l2(&turns, 6);
        let texts: Vec<&str> = lines.iter().map(|l| l.text.as_str()).collect();
        assert_eq!(texts, vec!["başım ağrıyor", "Rest."]);
    }

    #[test]
    fn streamed_shadow_is_one_call() {
        let mask = EntityMask::default();
        let translator = MockTranslator::with(&[(
            "MEDTOK0X alabilirsiniz.",
            "You can take MEDTOK0X.",
        )]);
        let mut relay = TranslationRelay::new(Some(&translator), &mask);
        let mut map = EntityMaskMap::default();
        let shadow = relay.shadow_for_streamed("Parol alabilirsiniz.", &mut map);
        assert_eq!(shadow.as_deref(), Some("You can take paracetamol."));
        assert_eq!(translator.calls(), 1);
        assert_eq!(translator.calls_to(Language::English), 1);
    }

    #[test]
    fn streamed_shadow_invalidated_when_service_down() {
        let mask = EntityMask::default();
        let translator = MockTranslator::failing();
        let mut relay = TranslationRelay::new(Some(&translator), &mask);
        let mut map = EntityMaskMap::default();
        assert!(relay.shadow_for_streamed("Dinlenin.", &mut map).is_none());
        assert!(relay.is_degraded());
    }
}
